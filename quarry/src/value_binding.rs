//! # Value Binding Module
//!
//! Moves [`Value`]s into `sqlx` argument buffers, in placeholder order.

use sqlx::Arguments;
use sqlx::any::AnyArguments;

use crate::{Error, Value};

// ============================================================================
// Value Binding Trait
// ============================================================================

/// Extension trait for binding quarry values to `AnyArguments`.
pub trait ValueBinder {
    /// Appends one value as the next positional parameter.
    fn bind_value(&mut self, value: Value) -> Result<(), Error>;
}

impl ValueBinder for AnyArguments<'_> {
    fn bind_value(&mut self, value: Value) -> Result<(), Error> {
        let added = match value {
            // Untyped NULL; every driver accepts a NULL text parameter.
            Value::Null => self.add(None::<String>),
            Value::Int(v) => self.add(v),
            Value::Float(v) => self.add(v),
            Value::Text(v) => self.add(v),
            Value::Bytes(v) => self.add(v),
        };
        added.map_err(|e| Error::Conversion(format!("Failed to bind value: {}", e)))
    }
}

/// Builds the argument buffer for one statement.
pub fn bind_values<'q>(values: Vec<Value>) -> Result<AnyArguments<'q>, Error> {
    let mut args = AnyArguments::default();
    for value in values {
        args.bind_value(value)?;
    }
    Ok(args)
}
