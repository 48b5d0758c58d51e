use crate::{util::separated_by, ColumnDef, PrimaryKeyType, Result, SqlFragment, TableDef, Value};

/// ANSI-leaning SQL type for a column's value witness.
fn sql_type(witness: &Value) -> &'static str {
    match witness {
        Value::Null => "VARCHAR",
        Value::Boolean(..) => "BOOLEAN",
        Value::Int8(..) => "TINYINT",
        Value::Int16(..) => "SMALLINT",
        Value::Int32(..) => "INTEGER",
        Value::Int64(..) => "BIGINT",
        Value::UInt8(..) => "TINYINT UNSIGNED",
        Value::UInt16(..) => "SMALLINT UNSIGNED",
        Value::UInt32(..) => "INTEGER UNSIGNED",
        Value::UInt64(..) => "BIGINT UNSIGNED",
        Value::Float32(..) => "REAL",
        Value::Float64(..) => "DOUBLE PRECISION",
        Value::Decimal(..) => "DECIMAL",
        Value::Varchar(..) => "VARCHAR",
        Value::Blob(..) => "BLOB",
        Value::Date(..) => "DATE",
        Value::Time(..) => "TIME",
        Value::Timestamp(..) => "TIMESTAMP",
        Value::TimestampWithTimezone(..) => "TIMESTAMP WITH TIME ZONE",
        Value::Uuid(..) => "UUID",
    }
}

fn column_fragment(out: &mut String, column: &ColumnDef, single_key: bool) {
    out.push_str(column.name());
    out.push(' ');
    out.push_str(sql_type(&column.value));
    if column.primary_key == PrimaryKeyType::PrimaryKey && single_key {
        out.push_str(" PRIMARY KEY");
    } else if !column.nullable {
        out.push_str(" NOT NULL");
    }
    if column.unique {
        out.push_str(" UNIQUE");
    }
}

/// Emits `CREATE TABLE` for a mapping. A convenience for schema bootstrap,
/// not a migration facility.
pub fn create_table(table: &TableDef, if_not_exists: bool) -> Result<SqlFragment> {
    let mut sql = String::from("CREATE TABLE ");
    if if_not_exists {
        sql.push_str("IF NOT EXISTS ");
    }
    sql.push_str(&table.table_ref.full_name());
    sql.push_str(" (");
    let keys: Vec<&ColumnDef> = table.primary_key().collect();
    let single_key = keys.len() == 1;
    separated_by(
        &mut sql,
        &table.columns,
        |out, column| column_fragment(out, column, single_key),
        ", ",
    );
    if !single_key {
        sql.push_str(", PRIMARY KEY (");
        separated_by(&mut sql, &keys, |out, key| out.push_str(key.name()), ", ");
        sql.push(')');
    }
    sql.push(')');
    SqlFragment::new(sql, [])
}

/// Emits `DROP TABLE` for a mapping.
pub fn drop_table(table: &TableDef, if_exists: bool) -> Result<SqlFragment> {
    let mut sql = String::from("DROP TABLE ");
    if if_exists {
        sql.push_str("IF EXISTS ");
    }
    sql.push_str(&table.table_ref.full_name());
    SqlFragment::new(sql, [])
}
