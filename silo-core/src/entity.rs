use crate::{ColumnDef, Error, PrimaryKeyType, RelationDef, Result, RowLabeled, Value};
use std::collections::HashMap;

/// Reference to a table, optionally schema qualified.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRef {
    pub name: &'static str,
    pub schema: &'static str,
}

impl TableRef {
    pub const fn new(name: &'static str) -> Self {
        Self { name, schema: "" }
    }

    pub fn full_name(&self) -> String {
        let mut result = String::new();
        if !self.schema.is_empty() {
            result.push_str(self.schema);
            result.push('.');
        }
        result.push_str(self.name);
        result
    }
}

/// Complete mapping of one model type: table identity, ordered columns,
/// primary key subset and relation traversals.
///
/// Built once per type (typically inside a `LazyLock`) and immutable for the
/// process lifetime.
#[derive(Debug)]
pub struct TableDef {
    pub table_ref: TableRef,
    pub columns: Vec<ColumnDef>,
    pub relations: Vec<RelationDef>,
    /// Property whose value identifies a polymorphic instance; guard clauses
    /// resolve through chains of these.
    pub classifier: Option<&'static str>,
    /// Column marking soft-deleted rows, excluded from guarded sub-queries
    /// unless the guard asks for them explicitly.
    pub soft_delete: Option<&'static str>,
}

impl TableDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            table_ref: TableRef::new(name),
            columns: Vec::new(),
            relations: Vec::new(),
            classifier: None,
            soft_delete: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDef>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_relations(mut self, relations: Vec<RelationDef>) -> Self {
        self.relations = relations;
        self
    }

    pub fn with_classifier(mut self, property: &'static str) -> Self {
        self.classifier = Some(property);
        self
    }

    pub fn with_soft_delete(mut self, column: &'static str) -> Self {
        self.soft_delete = Some(column);
        self
    }

    pub fn name(&self) -> &'static str {
        self.table_ref.name
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.is_key())
    }

    /// Columns carrying a foreign key whose target table must always be
    /// joined into root queries.
    pub fn always_joined(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns
            .iter()
            .filter(|c| c.always_join && c.references.is_some())
    }

    /// Checks structural invariants that hold for every mapped table.
    fn validate(&self) -> Result<()> {
        if self.primary_key().next().is_none() {
            return Err(Error::invalid_state(format!(
                "table {} declares no primary key column",
                self.name()
            )));
        }
        let single = self
            .columns
            .iter()
            .filter(|c| c.primary_key == PrimaryKeyType::PrimaryKey)
            .count();
        if single > 1 {
            return Err(Error::invalid_state(format!(
                "table {} declares more than one non-composite primary key",
                self.name()
            )));
        }
        Ok(())
    }
}

/// A model type that maps onto a table.
///
/// Implementations are static descriptor tables: the mapping is declared in
/// code, per type, with accessor methods producing and consuming rows. There
/// is no runtime reflection anywhere in the engine.
pub trait Entity: Send + Sync {
    /// Mapping metadata, created on first use and memoized.
    fn table_def() -> &'static TableDef
    where
        Self: Sized;

    /// Materializes an instance from a labeled row. Secret columns are
    /// blanked and encrypted columns decrypted by the engine before this is
    /// called.
    fn from_row(row: &RowLabeled) -> Result<Self>
    where
        Self: Sized;

    /// Every mapped column paired with its current value.
    fn row_full(&self) -> Vec<(&'static str, Value)>;

    /// Columns carrying a specified value, suitable for INSERT.
    fn row_filtered(&self) -> Vec<(&'static str, Value)> {
        self.row_full()
            .into_iter()
            .filter(|(_, v)| !v.is_unspecified())
            .collect()
    }

    /// Columns that should participate in an UPDATE's SET list: explicitly
    /// assigned by the caller, or differing from the type default.
    /// Implementations with per-field `Passive` tracking override this to
    /// return `Set` fields only.
    fn row_dirty(&self) -> Vec<(&'static str, Value)> {
        self.row_filtered()
    }

    /// Primary key values in declaration order.
    fn primary_key(&self) -> Vec<Value>;

    /// Writes engine-resolved key values back onto the instance after an
    /// insert. The default ignores them.
    fn apply_keys(&mut self, _keys: &RowLabeled) -> Result<()> {
        Ok(())
    }
}

/// Name-keyed lookup of every registered mapping, used to resolve `@cast`
/// segments and to check cross-table invariants.
///
/// Constructed once at startup and handed by reference to compilers and
/// contexts; there is no process-global mutable state.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: HashMap<&'static str, &'static TableDef>,
}

impl TableRegistry {
    pub fn builder() -> TableRegistryBuilder {
        TableRegistryBuilder {
            tables: HashMap::new(),
        }
    }

    /// Resolves a model name (as used by `@cast` segments) to its mapping.
    pub fn resolve(&self, model: &str) -> Option<&'static TableDef> {
        self.tables.get(model).copied()
    }

    /// Finds the mapping owning the given table name.
    pub fn by_table(&self, table: &str) -> Option<&'static TableDef> {
        self.tables
            .values()
            .find(|t| t.name() == table)
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static TableDef)> + '_ {
        self.tables.iter().map(|(k, v)| (*k, *v))
    }
}

pub struct TableRegistryBuilder {
    tables: HashMap<&'static str, &'static TableDef>,
}

impl TableRegistryBuilder {
    /// Registers a mapping under the model name used by `@cast` segments.
    pub fn register(mut self, model: &'static str, table: &'static TableDef) -> Self {
        self.tables.insert(model, table);
        self
    }

    /// Validates per-table and cross-table invariants and freezes the
    /// registry. Every foreign key must point at a registered table column.
    pub fn build(self) -> Result<TableRegistry> {
        for table in self.tables.values() {
            table.validate()?;
            for column in &table.columns {
                let Some(target) = column.references else {
                    continue;
                };
                let resolved = self
                    .tables
                    .values()
                    .find(|t| t.name() == target.table)
                    .and_then(|t| t.column(target.name));
                if resolved.is_none() {
                    return Err(Error::invalid_state(format!(
                        "foreign key {}.{} points at unregistered column {}.{}",
                        column.table(),
                        column.name(),
                        target.table,
                        target.name
                    )));
                }
            }
        }
        Ok(TableRegistry {
            tables: self.tables,
        })
    }
}
