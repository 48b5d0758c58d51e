use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy of the access layer.
///
/// Every variant is surfaced to the caller immediately; nothing here is
/// retried internally. Lock and timeout failures in particular are hard
/// failures, retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation attempted on a context that was already torn down.
    #[error("the data context has been disposed")]
    Disposed,

    /// A statement exceeded its command timeout. Cancellation of the
    /// in-flight command was attempted before this was raised.
    #[error("statement exceeded its timeout of {timeout:?}")]
    Timeout { timeout: Duration },

    /// A row column was absent or could not be converted while marshalling.
    #[error("missing or unconvertible field {table}.{column}")]
    MissingField {
        table: String,
        column: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A path term referenced a property the mapping does not declare.
    #[error("no mapped member `{path}` on {table}")]
    MissingMember { table: String, path: String },

    /// A path term could not be parsed.
    #[error("malformed query term `{term}`: {reason}")]
    MalformedTerm { term: String, reason: &'static str },

    /// A single-result query matched more than one row.
    #[error("query expected at most one row but matched {matched}")]
    Cardinality { matched: u64 },

    /// The shared read lock on the database was not granted within its bound.
    #[error("read lock on database `{database}` unavailable after {waited:?}")]
    ReadLockUnavailable { database: String, waited: Duration },

    /// The exclusive write lock on the database was not granted within its bound.
    #[error("write lock on database `{database}` unavailable after {waited:?}")]
    WriteLockUnavailable { database: String, waited: Duration },

    /// The expression or method has no SQL equivalent.
    #[error("unsupported construct: {what}")]
    Unsupported { what: String },

    /// The operation would violate a fragment or result-set invariant.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    /// Opaque failure raised by the underlying engine or connection layer.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Error::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Error::Unsupported { what: what.into() }
    }

    pub fn missing_field(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::MissingField {
            table: table.into(),
            column: column.into(),
            source: None,
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend(anyhow::Error::msg(message.into()))
    }

    /// Whether this error is the command-timeout kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
