use crate::Value;

/// Fully-qualified reference to a table column.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    pub name: &'static str,
    pub table: &'static str,
    pub schema: &'static str,
}

impl ColumnRef {
    pub const fn new(table: &'static str, name: &'static str) -> Self {
        Self {
            name,
            table,
            schema: "",
        }
    }
}

/// Indicates how (or if) a column participates in the primary key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryKeyType {
    /// Single-column primary key.
    PrimaryKey,
    /// Member of a composite primary key.
    PartOfPrimaryKey,
    /// Not part of the primary key.
    #[default]
    None,
}

/// Declarative specification of a table column.
#[derive(Default, Debug)]
pub struct ColumnDef {
    /// Column identity.
    pub column_ref: ColumnRef,
    /// `Value` witness describing the column type.
    pub value: Value,
    /// Nullability flag.
    pub nullable: bool,
    /// Primary key participation.
    pub primary_key: PrimaryKeyType,
    /// Key is generated at insert time when left unspecified.
    pub auto_generated: bool,
    /// Unique constraint.
    pub unique: bool,
    /// Write-only column, never populated when reading rows back.
    pub secret: bool,
    /// Value is stored as a one-way hash.
    pub hashed: bool,
    /// The foreign table this column points at is unconditionally joined
    /// into root queries.
    pub always_join: bool,
    /// Identifier handed to the encryption provider, when configured.
    pub encrypt_id: Option<&'static str>,
    /// Foreign key target column.
    pub references: Option<ColumnRef>,
}

impl ColumnDef {
    pub const fn new(table: &'static str, name: &'static str, value: Value) -> Self {
        Self {
            column_ref: ColumnRef::new(table, name),
            value,
            nullable: false,
            primary_key: PrimaryKeyType::None,
            auto_generated: false,
            unique: false,
            secret: false,
            hashed: false,
            always_join: false,
            encrypt_id: None,
            references: None,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = PrimaryKeyType::PrimaryKey;
        self
    }

    pub const fn part_of_primary_key(mut self) -> Self {
        self.primary_key = PrimaryKeyType::PartOfPrimaryKey;
        self
    }

    pub const fn auto_generated(mut self) -> Self {
        self.auto_generated = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub const fn hashed(mut self) -> Self {
        self.hashed = true;
        self
    }

    pub const fn always_join(mut self) -> Self {
        self.always_join = true;
        self
    }

    pub const fn encrypted(mut self, id: &'static str) -> Self {
        self.encrypt_id = Some(id);
        self
    }

    pub const fn references(mut self, target: ColumnRef) -> Self {
        self.references = Some(target);
        self
    }

    pub fn name(&self) -> &'static str {
        self.column_ref.name
    }

    pub fn table(&self) -> &'static str {
        self.column_ref.table
    }

    pub fn is_key(&self) -> bool {
        self.primary_key != PrimaryKeyType::None
    }
}
