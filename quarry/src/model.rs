//! # Model Module
//!
//! The contract between the query builder and a model layer. The builder only
//! needs a model's table name, primary key and soft-delete column (for
//! `find` and `restore`) plus a way to turn an instance into an insertable
//! [`Row`].
//!
//! ## Automatic Implementation
//!
//! ```rust,ignore
//! use quarry::{FromRow, Model};
//! use chrono::{DateTime, Utc};
//!
//! #[derive(Model, FromRow)]
//! #[orm(table = "posts")]
//! struct Post {
//!     #[orm(primary_key, skip)]
//!     id: i64,
//!     title: String,
//!     #[orm(soft_delete)]
//!     deleted_at: Option<DateTime<Utc>>,
//! }
//! ```
//!
//! ## Supported ORM Attributes
//!
//! - `#[orm(table = "name")]` (struct) - Table name; defaults to the snake_case struct name
//! - `#[orm(primary_key)]` - Primary key column used by `find`
//! - `#[orm(soft_delete)]` - Column cleared by `restore`
//! - `#[orm(column = "name")]` - Column name when it differs from the field
//! - `#[orm(skip)]` - Left out of `to_row` (e.g. auto-increment keys)

use crate::Row;

// ============================================================================
// Model Trait
// ============================================================================

/// Metadata and serialization for a table-backed type.
pub trait Model {
    fn table_name() -> &'static str;

    fn primary_key() -> &'static str {
        "id"
    }

    fn soft_delete_column() -> Option<&'static str> {
        None
    }

    /// Column values for INSERT, in declaration order.
    fn to_row(&self) -> Row;
}

// ============================================================================
// Model Metadata
// ============================================================================

/// A type-erased snapshot of a model's metadata, stored on a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelMeta {
    pub table: &'static str,
    pub primary_key: &'static str,
    pub soft_delete_column: Option<&'static str>,
}

impl ModelMeta {
    pub fn of<M: Model>() -> Self {
        Self { table: M::table_name(), primary_key: M::primary_key(), soft_delete_column: M::soft_delete_column() }
    }
}
