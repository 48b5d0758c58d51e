use crate::{Error, Result, Value};
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Two-way conversion between a mapped Rust type and [`Value`].
///
/// `as_empty_value` returns the NULL value carrying the type witness, which
/// column definitions use to describe their SQL type.
pub trait AsValue: Send + Sync {
    fn as_empty_value() -> Value
    where
        Self: Sized;
    fn as_value(&self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
}

macro_rules! impl_as_value {
    ($source:ty, $variant:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $variant(None)
            }
            fn as_value(&self) -> Value {
                $variant(Some(self.clone()))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value.try_convert(&$variant(None))? {
                    $variant(Some(v)) => Ok(v),
                    other => Err(Error::Backend(anyhow::Error::msg(format!(
                        "expected a non-null {}, found {:?}",
                        stringify!($variant),
                        other
                    )))),
                }
            }
        }
    };
}

impl_as_value!(bool, Value::Boolean);
impl_as_value!(i8, Value::Int8);
impl_as_value!(i16, Value::Int16);
impl_as_value!(i32, Value::Int32);
impl_as_value!(i64, Value::Int64);
impl_as_value!(u8, Value::UInt8);
impl_as_value!(u16, Value::UInt16);
impl_as_value!(u32, Value::UInt32);
impl_as_value!(u64, Value::UInt64);
impl_as_value!(f32, Value::Float32);
impl_as_value!(f64, Value::Float64);
impl_as_value!(Decimal, Value::Decimal);
impl_as_value!(String, Value::Varchar);
impl_as_value!(Box<[u8]>, Value::Blob);
impl_as_value!(Date, Value::Date);
impl_as_value!(Time, Value::Time);
impl_as_value!(PrimitiveDateTime, Value::Timestamp);
impl_as_value!(OffsetDateTime, Value::TimestampWithTimezone);
impl_as_value!(Uuid, Value::Uuid);

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(&self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::try_from_value(value).map(Some)
    }
}

impl<T: AsValue> AsValue for Box<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(&self) -> Value {
        (**self).as_value()
    }
    fn try_from_value(value: Value) -> Result<Self> {
        T::try_from_value(value).map(Box::new)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.to_owned()))
    }
}

macro_rules! impl_from {
    ($source:ty) => {
        impl From<$source> for Value {
            fn from(value: $source) -> Self {
                value.as_value()
            }
        }
    };
}

impl_from!(bool);
impl_from!(i8);
impl_from!(i16);
impl_from!(i32);
impl_from!(i64);
impl_from!(u8);
impl_from!(u16);
impl_from!(u32);
impl_from!(u64);
impl_from!(f32);
impl_from!(f64);
impl_from!(Decimal);
impl_from!(String);
impl_from!(Date);
impl_from!(Time);
impl_from!(PrimitiveDateTime);
impl_from!(OffsetDateTime);
impl_from!(Uuid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_through_value() {
        let v = 42_i64.as_value();
        assert_eq!(i64::try_from_value(v).unwrap(), 42);
    }

    #[test]
    fn option_none_maps_to_type_witness() {
        let v = Option::<Uuid>::None.as_value();
        assert_eq!(v, Value::Uuid(None));
        assert_eq!(Option::<Uuid>::try_from_value(v).unwrap(), None);
    }

    #[test]
    fn conversion_applies_when_variants_differ() {
        assert_eq!(i64::try_from_value(Value::Int32(Some(7))).unwrap(), 7);
    }
}
