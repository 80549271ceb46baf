//! # Value Module
//!
//! The closed set of scalar values that travel between the query builder and
//! the driver: bindings going in, column values coming out.
//!
//! Rust types enter through `From` conversions and leave through [`FromValue`].
//!
//! ```rust,ignore
//! use quarry::Value;
//!
//! let bindings: Vec<Value> = vec![1.into(), "active".into(), None::<i64>.into()];
//! let votes: i64 = row.try_get("votes")?;
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, temporal};

// ============================================================================
// Value Enum
// ============================================================================

/// A single bound parameter or column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Any integer column; booleans are stored as `0`/`1`.
    Int(i64),
    /// Floating-point column.
    Float(f64),
    /// Text column; also carries UUIDs and date/time values.
    Text(String),
    /// Binary column.
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer if this value is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` for `Int` and `Float`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

// ============================================================================
// Conversions Into Value
// ============================================================================

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Text(value.hyphenated().to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Text(temporal::format_datetime_utc(&value))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Text(temporal::format_naive_datetime(&value))
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Text(temporal::format_naive_date(&value))
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Value::Text(temporal::format_naive_time(&value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

// ============================================================================
// FromValue Trait
// ============================================================================

/// Typed extraction out of a [`Value`].
///
/// Integer targets reject out-of-range values instead of truncating them.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, Error>;
}

fn mismatch(expected: &str, value: &Value) -> Error {
    Error::Conversion(format!("expected {}, found {:?}", expected, value))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, Error> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Int(v) => Ok(*v),
            Value::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            Value::Text(v) => v.trim().parse().map_err(|_| mismatch("integer", value)),
            _ => Err(mismatch("integer", value)),
        }
    }
}

macro_rules! impl_from_value_narrow {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self, Error> {
                    let wide = i64::from_value(value)?;
                    <$t>::try_from(wide).map_err(|_| {
                        Error::Conversion(format!("{} is out of range for {}", wide, stringify!($t)))
                    })
                }
            }
        )*
    };
}

impl_from_value_narrow!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Int(v) => Ok(*v as f64),
            Value::Float(v) => Ok(*v),
            Value::Text(v) => v.trim().parse().map_err(|_| mismatch("float", value)),
            _ => Err(mismatch("float", value)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self, Error> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Int(v) => Ok(*v != 0),
            Value::Text(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "t" => Ok(true),
                "0" | "false" | "f" => Ok(false),
                _ => Err(mismatch("boolean", value)),
            },
            _ => Err(mismatch("boolean", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Text(v) => Ok(v.clone()),
            Value::Int(v) => Ok(v.to_string()),
            Value::Float(v) => Ok(v.to_string()),
            Value::Bytes(v) => String::from_utf8(v.clone()).map_err(|_| mismatch("utf-8 text", value)),
            Value::Null => Err(mismatch("text", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Bytes(v) => Ok(v.clone()),
            Value::Text(v) => Ok(v.as_bytes().to_vec()),
            _ => Err(mismatch("bytes", value)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Text(v) => v.parse().map_err(|e| Error::Conversion(format!("Failed to parse UUID: {}", e))),
            Value::Bytes(v) => Uuid::from_slice(v).map_err(|e| Error::Conversion(format!("Failed to parse UUID: {}", e))),
            _ => Err(mismatch("uuid", value)),
        }
    }
}

macro_rules! impl_from_value_temporal {
    ($($t:ty => $parse:path),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self, Error> {
                    match value {
                        Value::Text(v) => $parse(v),
                        _ => Err(mismatch(stringify!($t), value)),
                    }
                }
            }
        )*
    };
}

impl_from_value_temporal!(
    DateTime<Utc> => temporal::parse_datetime_utc,
    NaiveDateTime => temporal::parse_naive_datetime,
    NaiveDate => temporal::parse_naive_date,
    NaiveTime => temporal::parse_naive_time
);

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_maps_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }

    #[test]
    fn narrow_integers_reject_overflow() {
        assert!(i8::from_value(&Value::Int(300)).is_err());
        assert_eq!(u16::from_value(&Value::Int(300)).unwrap(), 300);
    }

    #[test]
    fn bool_is_stored_as_integer() {
        assert_eq!(Value::from(true), Value::Int(1));
        assert!(bool::from_value(&Value::Int(1)).unwrap());
        assert!(!bool::from_value(&Value::Text("false".into())).unwrap());
    }

    #[test]
    fn uuid_uses_hyphenated_text() {
        let id = Uuid::new_v4();
        let value = Value::from(id);
        assert_eq!(value.as_str().unwrap().len(), 36);
        assert_eq!(Uuid::from_value(&value).unwrap(), id);
    }
}
