use crate::{AsValue, TableDef, Value};

/// How a relation property traverses from one mapped type to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Single related row, reached through a local foreign key.
    ToOne,
    /// Collection of related rows keyed back to this table.
    ToMany,
    /// Collection reached through an association table.
    ManyToMany {
        link: fn() -> &'static TableDef,
        link_local: &'static str,
        link_foreign: &'static str,
    },
}

/// A named traversal from a mapped type to a related mapped type, used by the
/// query compiler to discover joins and correlated sub-queries.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    /// Property name as it appears in path terms.
    pub name: &'static str,
    pub kind: RelationKind,
    /// Mapping of the related type.
    pub target: fn() -> &'static TableDef,
    /// Column on this table participating in the key pair.
    pub local: &'static str,
    /// Column on the target (or link) table participating in the key pair.
    pub foreign: &'static str,
}

impl RelationDef {
    pub fn is_collection(&self) -> bool {
        !matches!(self.kind, RelationKind::ToOne)
    }
}

/// A field value that tracks whether the caller ever assigned it.
///
/// Values materialized from a row arrive as `Loaded`; only caller
/// assignment produces `Set`. Updates include `Set` columns alone, so
/// loading an entity and immediately storing it back issues no statement.
#[derive(Debug, Default)]
pub enum Passive<T: AsValue> {
    /// Explicitly assigned by the caller.
    Set(T),
    /// Read from the database, unchanged since.
    Loaded(T),
    #[default]
    NotSet,
}

impl<T: AsValue> Passive<T> {
    /// Whether the caller explicitly assigned this field.
    pub fn is_set(&self) -> bool {
        matches!(self, Passive::Set(..))
    }

    /// Whether the field carries a value, assigned or loaded.
    pub fn is_specified(&self) -> bool {
        !matches!(self, Passive::NotSet)
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Passive::Set(v) | Passive::Loaded(v) => Some(v),
            Passive::NotSet => None,
        }
    }
}

impl<T: AsValue + PartialEq> PartialEq for Passive<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Set(lhs), Self::Set(rhs)) | (Self::Loaded(lhs), Self::Loaded(rhs)) => {
                lhs == rhs
            }
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl<T: AsValue + Clone> Clone for Passive<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Set(v) => Self::Set(v.clone()),
            Self::Loaded(v) => Self::Loaded(v.clone()),
            Self::NotSet => Self::NotSet,
        }
    }
}

impl<T: AsValue> From<T> for Passive<T> {
    fn from(value: T) -> Self {
        Self::Set(value)
    }
}

impl<T: AsValue> AsValue for Passive<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(&self) -> Value {
        match self {
            Passive::Set(v) | Passive::Loaded(v) => v.as_value(),
            Passive::NotSet => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> crate::Result<Self> {
        T::try_from_value(value).map(Passive::Loaded)
    }
}
