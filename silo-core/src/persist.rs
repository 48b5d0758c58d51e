use crate::{
    util::separated_by, ColumnDef, DataContext, Entity, Error, Result, ReturnStyle, SqlFragment,
    TableDef, Value,
};
use log::{debug, info};
use uuid::Uuid;

/// Insert/update/delete against one context, including auto-key resolution
/// and key return.
pub struct Persister<'a> {
    context: &'a DataContext,
}

impl<'a> Persister<'a> {
    pub fn new(context: &'a DataContext) -> Self {
        Self { context }
    }

    /// Inserts the entity and resolves its generated keys.
    ///
    /// An unspecified auto-generated key is settled by the first applicable
    /// strategy: the engine generates it natively, the value is synthesized
    /// client-side (UUID columns), or the engine's key sequence is advanced
    /// explicitly. Keys come back through the statement's returned row,
    /// bound output parameters, or a re-query by primary key.
    pub fn insert<E: Entity>(&self, mut entity: E) -> Result<E> {
        let table = E::table_def();
        let features = self.context.dialect().features();
        let mut columns: Vec<(&'static str, Value)> = Vec::new();
        let mut key_values: Vec<(&'static str, Value)> = Vec::new();
        for (name, value) in entity.row_full() {
            let column = table.column(name).ok_or_else(|| Error::MissingMember {
                table: table.name().to_owned(),
                path: name.to_owned(),
            })?;
            let unspecified =
                value.is_unspecified() && (column.nullable || column.auto_generated);
            if column.is_key() && column.auto_generated && unspecified {
                if features.auto_uuid || features.auto_sequence {
                    // the engine fills the key when the column is omitted
                    continue;
                }
                let generated = if matches!(column.value, Value::Uuid(..)) {
                    Value::Uuid(Some(Uuid::new_v4()))
                } else {
                    self.context.next_sequence_value(table.name(), name)?
                };
                key_values.push((name, generated.clone()));
                columns.push((name, generated));
                continue;
            }
            if unspecified {
                continue;
            }
            let value = self.encrypted(column, value)?;
            if column.is_key() {
                key_values.push((name, value.clone()));
            }
            columns.push((name, value));
        }
        let mut sql = format!("INSERT INTO {} (", table.table_ref.full_name());
        separated_by(&mut sql, &columns, |out, (name, _)| out.push_str(name), ", ");
        sql.push_str(") VALUES (");
        separated_by(&mut sql, &columns, |out, _| out.push('?'), ", ");
        sql.push(')');
        let mut statement =
            SqlFragment::new(sql, columns.into_iter().map(|(_, value)| value))?;
        let pk_names: Vec<&str> = table.primary_key().map(ColumnDef::name).collect();
        match features.returning {
            ReturnStyle::Rows => {
                statement = statement.append(format!(" RETURNING {}", pk_names.join(", ")), [])?;
                let result = self.context.execute(&statement)?;
                if let Some(keys) = result.returned_keys {
                    entity.apply_keys(&keys)?;
                }
            }
            ReturnStyle::OutputParameters => {
                let result = self.context.execute(&statement)?;
                if let Some(keys) = result.returned_keys {
                    entity.apply_keys(&keys)?;
                }
            }
            ReturnStyle::None => {
                self.context.execute(&statement)?;
                if key_values.len() == pk_names.len() {
                    if let Some(row) = self.context.single(&self.select_by_key(
                        table,
                        &key_values,
                    )?)? {
                        entity.apply_keys(&row)?;
                    }
                } else {
                    debug!(
                        "insert into {} left its key to the engine and the dialect \
                         returns none, skipping key resolution",
                        table.name()
                    );
                }
            }
        }
        Ok(entity)
    }

    fn select_by_key(
        &self,
        table: &TableDef,
        key_values: &[(&'static str, Value)],
    ) -> Result<SqlFragment> {
        let mut sql = format!("SELECT * FROM {} WHERE ", table.table_ref.full_name());
        separated_by(
            &mut sql,
            key_values,
            |out, (name, _)| {
                out.push_str(name);
                out.push_str(" = ?");
            },
            " AND ",
        );
        SqlFragment::new(sql, key_values.iter().map(|(_, value)| value.clone()))
    }

    /// Updates the columns the caller assigned. With nothing to write this
    /// is a successful no-op, not an error.
    pub fn update<E: Entity>(&self, entity: E) -> Result<E> {
        let table = E::table_def();
        let assignments: Vec<(&'static str, Value)> = entity
            .row_dirty()
            .into_iter()
            .filter(|(name, _)| table.column(name).is_some_and(|c| !c.is_key()))
            .collect();
        if assignments.is_empty() {
            info!("no columns to update on {}, skipping statement", table.name());
            return Ok(entity);
        }
        let mut sql = format!("UPDATE {} SET ", table.table_ref.full_name());
        let mut args = Vec::with_capacity(assignments.len());
        {
            let mut parts: Vec<(&'static str, Value)> = Vec::new();
            for (name, value) in assignments {
                let column = table.column(name).ok_or_else(|| Error::MissingMember {
                    table: table.name().to_owned(),
                    path: name.to_owned(),
                })?;
                parts.push((name, self.encrypted(column, value)?));
            }
            separated_by(
                &mut sql,
                &parts,
                |out, (name, _)| {
                    out.push_str(name);
                    out.push_str(" = ?");
                },
                ", ",
            );
            args.extend(parts.into_iter().map(|(_, value)| value));
        }
        let statement = SqlFragment::new(sql, args)?.where_(self.key_predicate(table, &entity)?)?;
        self.context.execute(&statement)?;
        Ok(entity)
    }

    /// Deletes one entity by its primary key.
    pub fn delete<E: Entity>(&self, entity: &E) -> Result<u64> {
        let table = E::table_def();
        let statement = SqlFragment::new(
            format!("DELETE FROM {}", table.table_ref.full_name()),
            [],
        )?
        .where_(self.key_predicate(table, entity)?)?;
        Ok(self.context.execute(&statement)?.rows_affected)
    }

    /// Bulk delete with a caller-supplied predicate.
    pub fn delete_where(&self, table: &TableDef, predicate: SqlFragment) -> Result<u64> {
        let statement = SqlFragment::new(
            format!("DELETE FROM {}", table.table_ref.full_name()),
            [],
        )?
        .where_(predicate)?;
        Ok(self.context.execute(&statement)?.rows_affected)
    }

    fn key_predicate<E: Entity>(&self, table: &TableDef, entity: &E) -> Result<SqlFragment> {
        let keys = entity.primary_key();
        let names: Vec<&str> = table.primary_key().map(ColumnDef::name).collect();
        if keys.len() != names.len() || keys.iter().any(Value::is_unspecified) {
            return Err(Error::invalid_state(format!(
                "entity for {} does not carry a complete primary key",
                table.name()
            )));
        }
        let mut sql = String::new();
        separated_by(
            &mut sql,
            &names,
            |out, name| {
                out.push_str(name);
                out.push_str(" = ?");
            },
            " AND ",
        );
        SqlFragment::new(sql, keys)
    }

    fn encrypted(&self, column: &ColumnDef, value: Value) -> Result<Value> {
        let (Some(id), Some(provider)) = (column.encrypt_id, self.context.encryption()) else {
            return Ok(value);
        };
        let Some(mode) = provider.mode(id) else {
            return Ok(value);
        };
        provider.encrypt(mode, &value)
    }
}
