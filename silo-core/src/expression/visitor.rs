use crate::{
    BinaryOpType, Dialect, Error, Expr, Keyword, Order, Ordered, Result, SqlFragment, TableDef,
    Value,
};

/// Default batch size for `IN (...)` lists, respecting engine
/// parameter-count limits.
pub const IN_BATCH: usize = 500;

/// Compiles predicate and assignment expression trees into SQL fragments.
///
/// Member accesses resolve to `table.column` through the mapping; literals
/// bind as parameters, except NULL comparisons which rewrite to
/// `IS [NOT] NULL`.
pub struct ExpressionVisitor<'a> {
    table: &'a TableDef,
    dialect: &'a dyn Dialect,
    /// Qualify column references with the table name.
    qualify: bool,
    in_batch: usize,
}

impl<'a> ExpressionVisitor<'a> {
    pub fn new(table: &'a TableDef, dialect: &'a dyn Dialect) -> Self {
        Self {
            table,
            dialect,
            qualify: true,
            in_batch: IN_BATCH,
        }
    }

    pub fn unqualified(mut self) -> Self {
        self.qualify = false;
        self
    }

    pub fn with_in_batch(mut self, batch: usize) -> Self {
        self.in_batch = batch.max(1);
        self
    }

    /// Compiles a predicate into a WHERE-clause fragment.
    pub fn compile(&self, expr: &Expr) -> Result<SqlFragment> {
        self.emit(SqlFragment::empty(), expr)
    }

    /// Compiles an ORDER BY list.
    pub fn compile_order(&self, ordering: &[Ordered]) -> Result<SqlFragment> {
        let mut out = SqlFragment::new("ORDER BY ", [])?;
        let mut first = true;
        for ordered in ordering {
            if !first {
                out = out.append(", ", [])?;
            }
            first = false;
            out = self.emit(out, &ordered.expression)?;
            out = out.append(
                match ordered.order {
                    Order::Asc => " ASC",
                    Order::Desc => " DESC",
                },
                [],
            )?;
        }
        Ok(out)
    }

    /// Compiles an assignment list into a SET clause. Column references are
    /// never qualified inside SET.
    pub fn compile_set(&self, assignments: &[(&str, Expr)]) -> Result<SqlFragment> {
        let mut out = SqlFragment::new("SET ", [])?;
        let mut first = true;
        for (name, expr) in assignments {
            let column = self
                .table
                .column(name)
                .ok_or_else(|| self.missing_member(name))?;
            if !first {
                out = out.append(", ", [])?;
            }
            first = false;
            out = out.append(format!("{} = ", column.name()), [])?;
            out = ExpressionVisitor {
                qualify: false,
                ..*self
            }
            .emit(out, expr)?;
        }
        Ok(out)
    }

    fn missing_member(&self, path: &str) -> Error {
        Error::MissingMember {
            table: self.table.name().to_owned(),
            path: path.to_owned(),
        }
    }

    fn column_sql(&self, name: &str) -> Result<String> {
        let column = self
            .table
            .column(name)
            .ok_or_else(|| self.missing_member(name))?;
        Ok(if self.qualify {
            format!("{}.{}", self.table.name(), column.name())
        } else {
            column.name().to_owned()
        })
    }

    fn emit(&self, out: SqlFragment, expr: &Expr) -> Result<SqlFragment> {
        match expr {
            Expr::Column(name) => out.append(self.column_sql(name)?, []),
            Expr::Literal(value) if value.is_null() => out.append("NULL", []),
            Expr::Literal(value) => out.append("?", [value.clone()]),
            Expr::Binary { op, lhs, rhs } => self.emit_binary(out, *op, lhs, rhs),
            Expr::Not(inner) => {
                let out = out.append("NOT (", [])?;
                self.emit(out, inner)?.append(")", [])
            }
            Expr::Negative(inner) => {
                let out = out.append("-(", [])?;
                self.emit(out, inner)?.append(")", [])
            }
            Expr::Coalesce(lhs, rhs) => {
                let out = out.append("COALESCE(", [])?;
                let out = self.emit(out, lhs)?.append(", ", [])?;
                self.emit(out, rhs)?.append(")", [])
            }
            Expr::StartsWith(lhs, rhs) => self.emit_like(out, lhs, rhs, "", "%"),
            Expr::EndsWith(lhs, rhs) => self.emit_like(out, lhs, rhs, "%", ""),
            Expr::Contains(lhs, rhs) => self.emit_like(out, lhs, rhs, "%", "%"),
            Expr::ToLower(inner) => self.emit_wrap(out, inner, Keyword::Lower),
            Expr::ToUpper(inner) => self.emit_wrap(out, inner, Keyword::Upper),
            Expr::In(lhs, values) => self.emit_in(out, lhs, values),
            Expr::InQuery(lhs, query) => {
                let mut out = self.emit(out, lhs)?.append(" IN (", [])?;
                out = out.append(query.sql().to_owned(), query.args().iter().cloned())?;
                out.append(")", [])
            }
            Expr::Call { method, .. } => Err(Error::unsupported(format!(
                "method `{}` has no SQL translation",
                method
            ))),
        }
    }

    fn emit_binary(
        &self,
        out: SqlFragment,
        op: BinaryOpType,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<SqlFragment> {
        // Comparisons against a folded NULL constant become IS [NOT] NULL.
        if matches!(op, BinaryOpType::Equal | BinaryOpType::NotEqual) {
            let (operand, null_side) = match (lhs, rhs) {
                (operand, Expr::Literal(v)) if v.is_null() => (Some(operand), true),
                (Expr::Literal(v), operand) if v.is_null() => (Some(operand), true),
                _ => (None, false),
            };
            if null_side {
                let operand = operand.unwrap();
                let out = self.emit(out, operand)?;
                return out.append(
                    if op == BinaryOpType::Equal {
                        " IS NULL"
                    } else {
                        " IS NOT NULL"
                    },
                    [],
                );
            }
        }
        let precedence = op.precedence();
        let mut out = self.emit_parenthesized(out, lhs, lhs.precedence() < precedence)?;
        out = out.append(op.sql(), [])?;
        // Equal precedence on the right still needs parentheses unless the
        // operator is associative: `a - (b - c)` is not `a - b - c`.
        let parenthesize = rhs.precedence() < precedence
            || (rhs.precedence() == precedence && !op.associative());
        self.emit_parenthesized(out, rhs, parenthesize)
    }

    fn emit_parenthesized(
        &self,
        out: SqlFragment,
        expr: &Expr,
        parenthesize: bool,
    ) -> Result<SqlFragment> {
        if parenthesize {
            let out = out.append("(", [])?;
            self.emit(out, expr)?.append(")", [])
        } else {
            self.emit(out, expr)
        }
    }

    fn emit_like(
        &self,
        out: SqlFragment,
        lhs: &Expr,
        rhs: &Expr,
        prefix: &str,
        suffix: &str,
    ) -> Result<SqlFragment> {
        let mut out = self.emit(out, lhs)?;
        out = out.append(format!(" {} ", self.dialect.keyword(Keyword::ILike)), [])?;
        match rhs {
            Expr::Literal(Value::Varchar(Some(v))) => {
                out.append("?", [Value::from(format!("{}{}{}", prefix, v, suffix))])
            }
            other => {
                // Pattern is itself an expression; concatenate the wildcards.
                if !prefix.is_empty() {
                    out = out.append("'%' || ", [])?;
                }
                out = self.emit_parenthesized(out, other, true)?;
                if !suffix.is_empty() {
                    out = out.append(" || '%'", [])?;
                }
                Ok(out)
            }
        }
    }

    fn emit_wrap(&self, out: SqlFragment, inner: &Expr, keyword: Keyword) -> Result<SqlFragment> {
        let out = out.append(format!("{}(", self.dialect.keyword(keyword)), [])?;
        self.emit(out, inner)?.append(")", [])
    }

    fn emit_in(&self, out: SqlFragment, lhs: &Expr, values: &[Value]) -> Result<SqlFragment> {
        if values.is_empty() {
            // Membership in the empty sequence matches nothing.
            return out.append(self.dialect.keyword(Keyword::False), []);
        }
        let column = self.compile(lhs)?;
        let chunks: Vec<&[Value]> = values.chunks(self.in_batch).collect();
        let mut out = if chunks.len() > 1 {
            out.append("(", [])?
        } else {
            out
        };
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                out = out.append(" OR ", [])?;
            }
            out = out.append(column.sql().to_owned(), column.args().iter().cloned())?;
            out = out.append(" IN (", [])?;
            let mut placeholders = String::new();
            crate::util::separated_by(
                &mut placeholders,
                chunk.iter(),
                |sql, _| sql.push('?'),
                ", ",
            );
            out = out.append(placeholders, chunk.iter().cloned())?;
            out = out.append(")", [])?;
        }
        if chunks.len() > 1 {
            out = out.append(")", [])?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{patient_def, GENERIC};
    use crate::Expr;

    fn visitor() -> ExpressionVisitor<'static> {
        ExpressionVisitor::new(patient_def(), &GENERIC)
    }

    #[test]
    fn comparison_binds_parameter() {
        let fragment = visitor()
            .compile(&Expr::col("name").eq(Expr::val("smith")))
            .unwrap();
        assert_eq!(fragment.sql(), "patient.name = ?");
        assert_eq!(fragment.args(), &[Value::from("smith")]);
    }

    #[test]
    fn null_equality_rewrites_to_is_null() {
        let fragment = visitor()
            .compile(&Expr::col("deceased_time").eq(Expr::null()))
            .unwrap();
        assert_eq!(fragment.sql(), "patient.deceased_time IS NULL");
        assert!(fragment.args().is_empty());
        let fragment = visitor()
            .compile(&Expr::col("deceased_time").ne(Expr::null()))
            .unwrap();
        assert_eq!(fragment.sql(), "patient.deceased_time IS NOT NULL");
    }

    #[test]
    fn logical_combinators_parenthesize_weaker_children() {
        let predicate = Expr::col("name")
            .eq(Expr::val("smith"))
            .or(Expr::col("name").eq(Expr::val("jones")))
            .and(Expr::col("deceased_time").eq(Expr::null()));
        let fragment = visitor().compile(&predicate).unwrap();
        assert_eq!(
            fragment.sql(),
            "(patient.name = ? OR patient.name = ?) AND patient.deceased_time IS NULL"
        );
        assert_eq!(fragment.args().len(), 2);
    }

    #[test]
    fn non_associative_operators_parenthesize_equal_precedence_rhs() {
        let expression = Expr::col("version") - (Expr::col("version") - Expr::val(1));
        let fragment = visitor()
            .compile(&expression.eq(Expr::val(0)))
            .unwrap();
        assert_eq!(fragment.sql(), "patient.version - (patient.version - ?) = ?");
        let expression = Expr::col("version") * (Expr::col("version") + Expr::val(1));
        let fragment = visitor()
            .compile(&expression.gt(Expr::val(10)))
            .unwrap();
        assert_eq!(fragment.sql(), "patient.version * (patient.version + ?) > ?");
    }

    #[test]
    fn associative_operators_chain_without_parentheses() {
        let expression = Expr::col("version") + (Expr::col("version") + Expr::val(1));
        let fragment = visitor()
            .compile(&expression.eq(Expr::val(0)))
            .unwrap();
        assert_eq!(fragment.sql(), "patient.version + patient.version + ? = ?");
    }

    #[test]
    fn contains_is_case_insensitive_like() {
        let fragment = visitor()
            .compile(&Expr::col("name").contains(Expr::val("mit")))
            .unwrap();
        assert_eq!(fragment.sql(), "patient.name ILIKE ?");
        assert_eq!(fragment.args(), &[Value::from("%mit%")]);
    }

    #[test]
    fn starts_with_appends_wildcard() {
        let fragment = visitor()
            .compile(&Expr::col("name").starts_with(Expr::val("smi")))
            .unwrap();
        assert_eq!(fragment.args(), &[Value::from("smi%")]);
    }

    #[test]
    fn lower_wraps_with_dialect_function() {
        let fragment = visitor()
            .compile(&Expr::col("name").to_lower().eq(Expr::val("smith")))
            .unwrap();
        assert_eq!(fragment.sql(), "LOWER(patient.name) = ?");
    }

    #[test]
    fn in_list_batches_at_limit() {
        let values: Vec<Value> = (0..7).map(|v| Value::from(v as i32)).collect();
        let fragment = visitor()
            .with_in_batch(3)
            .compile(&Expr::col("version").in_values(values))
            .unwrap();
        assert_eq!(
            fragment.sql(),
            "(patient.version IN (?, ?, ?) OR patient.version IN (?, ?, ?) OR patient.version IN (?))"
        );
        assert_eq!(fragment.args().len(), 7);
        assert!(fragment.is_balanced());
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let fragment = visitor()
            .compile(&Expr::col("version").in_values([]))
            .unwrap();
        assert_eq!(fragment.sql(), "FALSE");
    }

    #[test]
    fn in_subquery_embeds_sql() {
        let sub = SqlFragment::new("SELECT id FROM visit WHERE status = ?", [Value::from(1_i32)])
            .unwrap();
        let fragment = visitor()
            .compile(&Expr::col("id").in_query(sub))
            .unwrap();
        assert_eq!(
            fragment.sql(),
            "patient.id IN (SELECT id FROM visit WHERE status = ?)"
        );
        assert_eq!(fragment.args().len(), 1);
    }

    #[test]
    fn unknown_member_is_reported() {
        let err = visitor()
            .compile(&Expr::col("no_such_column").eq(Expr::val(1_i32)))
            .unwrap_err();
        assert!(matches!(err, Error::MissingMember { .. }));
    }

    #[test]
    fn unknown_method_is_unsupported() {
        let err = visitor()
            .compile(&Expr::Call {
                method: "soundex".into(),
                args: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
    }

    #[test]
    fn set_clause_is_unqualified() {
        let fragment = visitor()
            .compile_set(&[("name", Expr::val("smith")), ("version", Expr::col("version"))])
            .unwrap();
        assert_eq!(fragment.sql(), "SET name = ?, version = version");
    }

    #[test]
    fn order_by_lists_directions() {
        let fragment = visitor()
            .compile_order(&[
                Ordered::asc(Expr::col("name")),
                Ordered::desc(Expr::col("version")),
            ])
            .unwrap();
        assert_eq!(fragment.sql(), "ORDER BY patient.name ASC, patient.version DESC");
    }
}
