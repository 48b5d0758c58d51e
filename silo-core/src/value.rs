use crate::{Error, Result};
use rust_decimal::Decimal;
use std::fmt::Write;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// A typed database value.
///
/// Every variant carries an `Option` payload: the `None` form doubles as the
/// type witness used by column definitions and by conversions, so a column
/// knows its SQL type even when the value is NULL.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Int8(l), Self::Int8(r)) => l == r,
            (Self::Int16(l), Self::Int16(r)) => l == r,
            (Self::Int32(l), Self::Int32(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::UInt8(l), Self::UInt8(r)) => l == r,
            (Self::UInt16(l), Self::UInt16(r)) => l == r,
            (Self::UInt32(l), Self::UInt32(r)) => l == r,
            (Self::UInt64(l), Self::UInt64(r)) => l == r,
            (Self::Float32(l), Self::Float32(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Varchar(l), Self::Varchar(r)) => l == r,
            (Self::Blob(l), Self::Blob(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::Time(l), Self::Time(r)) => l == r,
            (Self::Timestamp(l), Self::Timestamp(r)) => l == r,
            (Self::TimestampWithTimezone(l), Self::TimestampWithTimezone(r)) => l == r,
            (Self::Uuid(l), Self::Uuid(r)) => l == r,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl Value {
    pub fn same_type(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    /// Whether the value is NULL regardless of its type witness.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::UInt8(v) => v.is_none(),
            Value::UInt16(v) => v.is_none(),
            Value::UInt32(v) => v.is_none(),
            Value::UInt64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::TimestampWithTimezone(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
        }
    }

    /// Whether the value counts as "unspecified" for insert and update
    /// purposes: NULL, or equal to the type's zero/default.
    pub fn is_unspecified(&self) -> bool {
        if self.is_null() {
            return true;
        }
        match self {
            Value::Boolean(Some(v)) => !*v,
            Value::Int8(Some(v)) => *v == 0,
            Value::Int16(Some(v)) => *v == 0,
            Value::Int32(Some(v)) => *v == 0,
            Value::Int64(Some(v)) => *v == 0,
            Value::UInt8(Some(v)) => *v == 0,
            Value::UInt16(Some(v)) => *v == 0,
            Value::UInt32(Some(v)) => *v == 0,
            Value::UInt64(Some(v)) => *v == 0,
            Value::Float32(Some(v)) => *v == 0.0,
            Value::Float64(Some(v)) => *v == 0.0,
            Value::Decimal(Some(v)) => v.is_zero(),
            Value::Varchar(Some(v)) => v.is_empty(),
            Value::Blob(Some(v)) => v.is_empty(),
            Value::Uuid(Some(v)) => v.is_nil(),
            _ => false,
        }
    }

    /// Returns the NULL value carrying this value's type witness.
    pub fn as_empty(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Boolean(..) => Value::Boolean(None),
            Value::Int8(..) => Value::Int8(None),
            Value::Int16(..) => Value::Int16(None),
            Value::Int32(..) => Value::Int32(None),
            Value::Int64(..) => Value::Int64(None),
            Value::UInt8(..) => Value::UInt8(None),
            Value::UInt16(..) => Value::UInt16(None),
            Value::UInt32(..) => Value::UInt32(None),
            Value::UInt64(..) => Value::UInt64(None),
            Value::Float32(..) => Value::Float32(None),
            Value::Float64(..) => Value::Float64(None),
            Value::Decimal(..) => Value::Decimal(None),
            Value::Varchar(..) => Value::Varchar(None),
            Value::Blob(..) => Value::Blob(None),
            Value::Date(..) => Value::Date(None),
            Value::Time(..) => Value::Time(None),
            Value::Timestamp(..) => Value::Timestamp(None),
            Value::TimestampWithTimezone(..) => Value::TimestampWithTimezone(None),
            Value::Uuid(..) => Value::Uuid(None),
        }
    }

    /// Converts this value into the variant of `target`, widening numerics
    /// and parsing text representations where the conversion is lossless.
    pub fn try_convert(&self, target: &Value) -> Result<Value> {
        if self.same_type(target) {
            return Ok(self.clone());
        }
        if self.is_null() {
            return Ok(target.as_empty());
        }
        macro_rules! narrow {
            ($v:expr, $variant:path) => {
                return ((*$v).try_into())
                    .map(|v| $variant(Some(v)))
                    .map_err(|_| conversion_error(self, target))
            };
        }
        match (self, target) {
            (Value::Int8(Some(v)), _) => self.convert_integer(*v as i64, target),
            (Value::Int16(Some(v)), _) => self.convert_integer(*v as i64, target),
            (Value::Int32(Some(v)), _) => self.convert_integer(*v as i64, target),
            (Value::Int64(Some(v)), _) => self.convert_integer(*v, target),
            (Value::UInt8(Some(v)), _) => self.convert_integer(*v as i64, target),
            (Value::UInt16(Some(v)), _) => self.convert_integer(*v as i64, target),
            (Value::UInt32(Some(v)), _) => self.convert_integer(*v as i64, target),
            (Value::UInt64(Some(v)), Value::Int64(..)) => narrow!(v, Value::Int64),
            (Value::UInt64(Some(v)), Value::UInt32(..)) => narrow!(v, Value::UInt32),
            (Value::Float32(Some(v)), Value::Float64(..)) => Ok(Value::Float64(Some(*v as f64))),
            (Value::Float64(Some(v)), Value::Float32(..)) => Ok(Value::Float32(Some(*v as f32))),
            (Value::Float64(Some(v)), Value::Decimal(..)) => Decimal::try_from(*v)
                .map(|v| Value::Decimal(Some(v)))
                .map_err(|_| conversion_error(self, target)),
            (Value::Varchar(Some(v)), _) => Self::parse_text(v, target),
            (Value::Blob(Some(v)), Value::Uuid(..)) => Uuid::from_slice(v)
                .map(|v| Value::Uuid(Some(v)))
                .map_err(|_| conversion_error(self, target)),
            (Value::Uuid(Some(v)), Value::Varchar(..)) => Ok(Value::Varchar(Some(v.to_string()))),
            (Value::Uuid(Some(v)), Value::Blob(..)) => {
                Ok(Value::Blob(Some(v.as_bytes().to_vec().into())))
            }
            (Value::Timestamp(Some(v)), Value::TimestampWithTimezone(..)) => Ok(
                Value::TimestampWithTimezone(Some(v.assume_utc())),
            ),
            (Value::TimestampWithTimezone(Some(v)), Value::Timestamp(..)) => Ok(Value::Timestamp(
                Some(PrimitiveDateTime::new(v.date(), v.time())),
            )),
            (Value::Boolean(Some(v)), Value::Int32(..)) => Ok(Value::Int32(Some(*v as i32))),
            _ => Err(conversion_error(self, target)),
        }
    }

    fn convert_integer(&self, v: i64, target: &Value) -> Result<Value> {
        macro_rules! narrow {
            ($variant:path) => {
                v.try_into()
                    .map(|v| $variant(Some(v)))
                    .map_err(|_| conversion_error(self, target))
            };
        }
        match target {
            Value::Int8(..) => narrow!(Value::Int8),
            Value::Int16(..) => narrow!(Value::Int16),
            Value::Int32(..) => narrow!(Value::Int32),
            Value::Int64(..) => Ok(Value::Int64(Some(v))),
            Value::UInt8(..) => narrow!(Value::UInt8),
            Value::UInt16(..) => narrow!(Value::UInt16),
            Value::UInt32(..) => narrow!(Value::UInt32),
            Value::UInt64(..) => narrow!(Value::UInt64),
            Value::Float32(..) => Ok(Value::Float32(Some(v as f32))),
            Value::Float64(..) => Ok(Value::Float64(Some(v as f64))),
            Value::Decimal(..) => Ok(Value::Decimal(Some(Decimal::from(v)))),
            Value::Boolean(..) => Ok(Value::Boolean(Some(v != 0))),
            Value::Varchar(..) => Ok(Value::Varchar(Some(v.to_string()))),
            _ => Err(conversion_error(self, target)),
        }
    }

    fn parse_text(v: &str, target: &Value) -> Result<Value> {
        use crate::parse::Parse;
        let err = || conversion_error(&Value::Varchar(Some(v.into())), target);
        match target {
            Value::Uuid(..) => Uuid::parse_str(v)
                .map(|v| Value::Uuid(Some(v)))
                .map_err(|_| err()),
            Value::Int32(..) => v.parse().map(|v| Value::Int32(Some(v))).map_err(|_| err()),
            Value::Int64(..) => v.parse().map(|v| Value::Int64(Some(v))).map_err(|_| err()),
            Value::Float64(..) => v.parse().map(|v| Value::Float64(Some(v))).map_err(|_| err()),
            Value::Decimal(..) => v.parse().map(|v| Value::Decimal(Some(v))).map_err(|_| err()),
            Value::Boolean(..) => match v {
                "true" | "1" | "t" => Ok(Value::Boolean(Some(true))),
                "false" | "0" | "f" => Ok(Value::Boolean(Some(false))),
                _ => Err(err()),
            },
            Value::Date(..) => <Date as Parse>::parse(v)
                .map(|v| Value::Date(Some(v)))
                .map_err(|_| err()),
            Value::Time(..) => <Time as Parse>::parse(v)
                .map(|v| Value::Time(Some(v)))
                .map_err(|_| err()),
            Value::Timestamp(..) => <PrimitiveDateTime as Parse>::parse(v)
                .map(|v| Value::Timestamp(Some(v)))
                .map_err(|_| err()),
            Value::TimestampWithTimezone(..) => <OffsetDateTime as Parse>::parse(v)
                .map(|v| Value::TimestampWithTimezone(Some(v)))
                .map_err(|_| err()),
            Value::Varchar(..) => Ok(Value::Varchar(Some(v.into()))),
            _ => Err(err()),
        }
    }

    /// Renders the value as an inline SQL literal. Used for logging and for
    /// DDL defaults, never for statement parameters.
    pub fn write_literal(&self, out: &mut String) {
        macro_rules! write_integer {
            ($v:expr) => {{
                let mut buffer = itoa::Buffer::new();
                out.push_str(buffer.format($v));
            }};
        }
        macro_rules! write_float {
            ($v:expr) => {{
                let mut buffer = ryu::Buffer::new();
                out.push_str(buffer.format($v));
            }};
        }
        match self {
            v if v.is_null() => out.push_str("NULL"),
            Value::Boolean(Some(v)) => out.push_str(["false", "true"][*v as usize]),
            Value::Int8(Some(v)) => write_integer!(*v),
            Value::Int16(Some(v)) => write_integer!(*v),
            Value::Int32(Some(v)) => write_integer!(*v),
            Value::Int64(Some(v)) => write_integer!(*v),
            Value::UInt8(Some(v)) => write_integer!(*v),
            Value::UInt16(Some(v)) => write_integer!(*v),
            Value::UInt32(Some(v)) => write_integer!(*v),
            Value::UInt64(Some(v)) => write_integer!(*v),
            Value::Float32(Some(v)) => write_float!(*v),
            Value::Float64(Some(v)) => write_float!(*v),
            Value::Decimal(Some(v)) => {
                let _ = write!(out, "{}", v);
            }
            Value::Varchar(Some(v)) => Self::write_quoted(out, v),
            Value::Blob(Some(v)) => {
                out.push_str("X'");
                for b in v.iter() {
                    let _ = write!(out, "{:02X}", b);
                }
                out.push('\'');
            }
            Value::Date(Some(v)) => {
                let _ = write!(
                    out,
                    "'{:04}-{:02}-{:02}'",
                    v.year(),
                    v.month() as u8,
                    v.day()
                );
            }
            Value::Time(Some(v)) => {
                let _ = write!(out, "'{:02}:{:02}:{:02}'", v.hour(), v.minute(), v.second());
            }
            Value::Timestamp(Some(v)) => {
                let _ = write!(
                    out,
                    "'{:04}-{:02}-{:02}T{:02}:{:02}:{:02}'",
                    v.year(),
                    v.month() as u8,
                    v.day(),
                    v.hour(),
                    v.minute(),
                    v.second()
                );
            }
            Value::TimestampWithTimezone(Some(v)) => {
                let _ = write!(
                    out,
                    "'{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{:+03}:{:02}'",
                    v.year(),
                    v.month() as u8,
                    v.day(),
                    v.hour(),
                    v.minute(),
                    v.second(),
                    v.offset().whole_hours(),
                    v.offset().minutes_past_hour().abs()
                );
            }
            Value::Uuid(Some(v)) => {
                let _ = write!(out, "'{}'", v);
            }
            _ => out.push_str("NULL"),
        }
    }

    fn write_quoted(out: &mut String, value: &str) {
        out.push('\'');
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == '\'' {
                out.push_str(&value[position..i]);
                out.push_str("''");
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
        out.push('\'');
    }
}

fn conversion_error(from: &Value, to: &Value) -> Error {
    Error::Backend(anyhow::Error::msg(format!(
        "cannot convert {:?} into the type of {:?}",
        from, to
    )))
}
