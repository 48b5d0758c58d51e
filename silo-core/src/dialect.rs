use crate::{Connection, Error, Result, SqlFragment, Value};

/// Keywords whose spelling differs between engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// Case-insensitive LIKE operator.
    ILike,
    /// Lower-casing function name.
    Lower,
    /// Upper-casing function name.
    Upper,
    /// Boolean false literal.
    False,
    /// Boolean true literal.
    True,
}

/// How an engine hands back keys generated during INSERT.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStyle {
    /// `RETURNING`-style clause producing a result row.
    Rows,
    /// Keys come back through bound output parameters.
    OutputParameters,
    /// Neither; the engine re-queries by primary key after the insert.
    #[default]
    None,
}

/// Capability profile of an engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct Features {
    /// Engine generates UUID keys by itself when the column is omitted.
    pub auto_uuid: bool,
    /// Keys are drawn from a sequence the engine advances automatically.
    pub auto_sequence: bool,
    /// How generated keys are returned.
    pub returning: ReturnStyle,
    /// Sub-queries may not carry ambiguous duplicate column names; the
    /// compiler must enumerate distinct names instead of `*`.
    pub strict_subquery_columns: bool,
    /// Engine supports materialized views.
    pub materialized_views: bool,
}

/// A named filter-function extension invoked by `:name(args)operand` terms.
pub trait FilterFunction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compiles the function application on `column` into a fragment.
    fn compile(&self, column: &str, args: &[String], operand: &str) -> Result<SqlFragment>;
}

/// Engine-specific SQL dialect provider.
///
/// The core consumes this interface for keyword translation, feature flags
/// and connection creation; it never implements dialect logic itself.
pub trait Dialect: Send + Sync {
    /// Engine family name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Logical database identity. Contexts pointed at the same identity
    /// share one reader/writer lock.
    fn database(&self) -> &str;

    fn features(&self) -> Features;

    fn keyword(&self, keyword: Keyword) -> &'static str {
        match keyword {
            Keyword::ILike => "ILIKE",
            Keyword::Lower => "LOWER",
            Keyword::Upper => "UPPER",
            Keyword::False => "FALSE",
            Keyword::True => "TRUE",
        }
    }

    /// Resolves a named filter-function extension, if the engine offers it.
    fn filter_function(&self, _name: &str) -> Option<&dyn FilterFunction> {
        None
    }

    /// Opens a new connection to the database.
    fn open(&self) -> Result<Box<dyn Connection>>;

    /// Advances the key sequence for engines that require an explicit
    /// sequence-advance before INSERT.
    fn next_sequence_value(
        &self,
        _connection: &mut dyn Connection,
        table: &str,
        column: &str,
    ) -> Result<Value> {
        Err(Error::unsupported(format!(
            "dialect {} has no key sequence for {}.{}",
            self.name(),
            table,
            column
        )))
    }
}

/// Dialect with ANSI-leaning defaults, usable for SQL generation tests and
/// engines without special requirements. Carries no connection factory.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl GenericDialect {
    pub const fn new() -> Self {
        Self {}
    }
}

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn database(&self) -> &str {
        "generic"
    }

    fn features(&self) -> Features {
        Features::default()
    }

    fn open(&self) -> Result<Box<dyn Connection>> {
        Err(Error::unsupported(
            "the generic dialect does not create connections",
        ))
    }
}
