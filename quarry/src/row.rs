//! # Row Module
//!
//! Rows come back from the driver as an ordered column → [`Value`] map. The
//! query builder never interprets them; typed structs are produced through
//! [`FromRow`] (usually derived with `#[derive(FromRow)]`).

use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::{Column as _, Row as _, ValueRef as _};

use crate::{Error, FromValue, Value};

// ============================================================================
// Row Structure
// ============================================================================

/// An ordered, dynamically keyed result row.
///
/// Also used as the input shape for `insert`/`update`, where column order
/// decides placeholder order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, replacing an existing column in place.
    ///
    /// ```rust,ignore
    /// let row = Row::new().with("name", "John").with("votes", 1);
    /// ```
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    /// Typed column access.
    ///
    /// A missing column is an `InvalidData` error; a present `NULL` decodes as
    /// `None` when `T` is an `Option`.
    pub fn try_get<T: FromValue>(&self, column: &str) -> Result<T, Error> {
        let value = self
            .get(column)
            .ok_or_else(|| Error::InvalidData(format!("column `{}` not present in row", column)))?;
        T::from_value(value)
            .map_err(|e| Error::Conversion(format!("column `{}`: {}", column, e)))
    }

    /// The value of the first column, if any.
    pub fn first_value(&self) -> Option<&Value> {
        self.columns.first().map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Decodes a driver row, keeping the driver's column order.
    pub(crate) fn from_any_row(row: &AnyRow) -> Result<Self, Error> {
        let mut columns = Vec::with_capacity(row.len());

        for (index, column) in row.columns().iter().enumerate() {
            let is_null = row
                .try_get_raw(index)
                .map_err(|e| Error::Conversion(e.to_string()))?
                .is_null();

            let value = if is_null { Value::Null } else { decode_column(row, index, column.name())? };
            columns.push((column.name().to_string(), value));
        }

        Ok(Self { columns })
    }
}

/// Tries the decodable types in order; `Any` only reports compatibility, not
/// the concrete storage class.
fn decode_column(row: &AnyRow, index: usize, name: &str) -> Result<Value, Error> {
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(Value::Int(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(Value::Float(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(Value::Text(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        return Ok(Value::Bytes(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Ok(Value::Int(i64::from(v)));
    }
    Err(Error::Conversion(format!("column `{}` has a type quarry cannot decode", name)))
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

// ============================================================================
// FromRow Trait
// ============================================================================

/// Hydrates a typed value from a [`Row`].
///
/// Typically derived:
///
/// ```rust,ignore
/// #[derive(FromRow)]
/// struct User {
///     id: i64,
///     #[orm(column = "user_name")]
///     name: String,
///     deleted_at: Option<DateTime<Utc>>,
/// }
/// ```
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, Error>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self, Error> {
        Ok(row.clone())
    }
}

macro_rules! impl_from_row_scalar {
    ($($t:ty),*) => {
        $(
            impl FromRow for $t {
                fn from_row(row: &Row) -> Result<Self, Error> {
                    let value = row
                        .first_value()
                        .ok_or_else(|| Error::invalid_data("row has no columns"))?;
                    <$t>::from_value(value)
                }
            }
        )*
    };
}

impl_from_row_scalar!(i32, i64, f64, bool, String, Value);
