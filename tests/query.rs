//! Facade-level tests: path terms and expression trees through the public
//! `silo` surface, compiled against a small commerce schema.
use silo::{
    ColumnDef, ColumnRef, Expr, ExpressionVisitor, GenericDialect, Order, QueryCompiler,
    RelationDef, RelationKind, TableDef, TableRegistry, Value,
};
use std::sync::LazyLock;

const GENERIC: GenericDialect = GenericDialect::new();

static CUSTOMER: LazyLock<TableDef> = LazyLock::new(|| {
    TableDef::new("customer")
        .with_columns(vec![
            ColumnDef::new("customer", "id", Value::Uuid(None))
                .primary_key()
                .auto_generated(),
            ColumnDef::new("customer", "name", Value::Varchar(None)),
            ColumnDef::new("customer", "tier", Value::Varchar(None)).nullable(),
        ])
        .with_relations(vec![RelationDef {
            name: "purchase",
            kind: RelationKind::ToMany,
            target: purchase_def,
            local: "id",
            foreign: "customer_id",
        }])
});

static PURCHASE: LazyLock<TableDef> = LazyLock::new(|| {
    TableDef::new("purchase")
        .with_columns(vec![
            ColumnDef::new("purchase", "id", Value::Uuid(None))
                .primary_key()
                .auto_generated(),
            ColumnDef::new("purchase", "customer_id", Value::Uuid(None))
                .references(ColumnRef::new("customer", "id")),
            ColumnDef::new("purchase", "total", Value::Int64(None)),
            ColumnDef::new("purchase", "voided", Value::Boolean(None)),
        ])
        .with_soft_delete("voided")
});

fn customer_def() -> &'static TableDef {
    &CUSTOMER
}

fn purchase_def() -> &'static TableDef {
    &PURCHASE
}

fn registry() -> TableRegistry {
    let _ = env_logger::builder().is_test(true).try_init();
    TableRegistry::builder()
        .register("Customer", customer_def())
        .register("Purchase", purchase_def())
        .build()
        .unwrap()
}

#[test]
fn term_over_a_plain_column() {
    let registry = registry();
    let compiler = QueryCompiler::new(&registry, &GENERIC);
    let query = compiler
        .select(customer_def(), &[("name", "~smith")])
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT * FROM customer WHERE customer.name ILIKE ?"
    );
    assert_eq!(query.args(), &[Value::from("%smith%")]);
}

#[test]
fn term_over_a_collection_becomes_exists() {
    let registry = registry();
    let compiler = QueryCompiler::new(&registry, &GENERIC);
    let query = compiler
        .select(customer_def(), &[("purchase.total", ">=100")])
        .unwrap();
    assert_eq!(
        query.sql(),
        "SELECT * FROM customer WHERE EXISTS (\
         SELECT 1 FROM purchase \
         WHERE purchase.customer_id = customer.id \
         AND purchase.voided = FALSE \
         AND purchase.total >= ?)"
    );
    assert_eq!(query.args(), &[Value::Int64(Some(100))]);
}

#[test]
fn ordering_resolves_through_the_root() {
    let registry = registry();
    let compiler = QueryCompiler::new(&registry, &GENERIC);
    let query = compiler
        .select_ordered(
            customer_def(),
            &[("tier", "gold")],
            &[("name", Order::Asc)],
        )
        .unwrap();
    assert!(query.sql().ends_with("ORDER BY customer.name ASC"));
}

#[test]
fn expression_tree_compiles_with_precedence() {
    let filter = Expr::col("tier")
        .eq(Expr::val("gold"))
        .or(Expr::col("tier").eq(Expr::val("silver")))
        .and(Expr::col("name").starts_with(Expr::val("A")));
    let visitor = ExpressionVisitor::new(customer_def(), &GENERIC);
    let fragment = visitor.compile(&filter).unwrap();
    assert_eq!(
        fragment.sql(),
        "(customer.tier = ? OR customer.tier = ?) AND customer.name ILIKE ?"
    );
    assert_eq!(
        fragment.args(),
        &[
            Value::from("gold"),
            Value::from("silver"),
            Value::from("A%"),
        ]
    );
}

#[test]
fn null_comparison_becomes_is_null() {
    let visitor = ExpressionVisitor::new(customer_def(), &GENERIC);
    let fragment = visitor.compile(&Expr::col("tier").eq(Expr::null())).unwrap();
    assert_eq!(fragment.sql(), "customer.tier IS NULL");
    assert!(fragment.args().is_empty());
}
