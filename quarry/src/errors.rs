//! # Error Handling Module
//!
//! This module defines the error type shared by the query builder, the grammars
//! and the connection layer.
//!
//! ## Error Kinds
//!
//! - **Configuration**: bad DSN, unknown driver, use of a disconnected connection
//! - **QueryCompilation**: a terminal operation on a builder that cannot be compiled
//! - **Execution**: the driver rejected a statement (wraps `sqlx::Error` verbatim)
//! - **Transaction**: commit/rollback without an active transaction
//! - **TransactionCallback**: an `after_commit`/`after_rollback` callback failed
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use quarry::Error;
//!
//! match conn.table("users").where_eq("id", 1).first().await {
//!     Ok(Some(row)) => println!("{:?}", row),
//!     Ok(None) => println!("not found"),
//!     Err(Error::Execution(e)) => eprintln!("driver said: {}", e),
//!     Err(e) => eprintln!("other error: {}", e),
//! }
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// Error Enum Definition
// ============================================================================

/// The main error type for quarry operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid DSN, unknown driver, or a connection used while
    /// disconnected.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A builder reached a terminal operation in a state that cannot be
    /// compiled (no table, invalid operator).
    ///
    /// These signal programming defects and are never retried.
    #[error("Query compilation error: {0}")]
    QueryCompilation(String),

    /// The driver rejected the statement.
    ///
    /// The native error is kept untouched so its code and message survive,
    /// and it converts automatically through `?`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// match conn.table("users").insert(row).await {
    ///     Err(Error::Execution(sqlx::Error::Database(db))) => {
    ///         eprintln!("{:?}: {}", db.code(), db.message());
    ///     }
    ///     _ => {}
    /// }
    /// ```
    #[error("Execution error: {0}")]
    Execution(#[from] sqlx::Error),

    /// Commit or rollback requested with no active transaction, or a callback
    /// registered outside of one.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The first error raised by an after-commit or after-rollback callback.
    ///
    /// Raised only after every queued callback has run.
    #[error("Transaction callback failed: {0}")]
    TransactionCallback(Box<Error>),

    /// Invalid data error.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Type conversion error between [`Value`](crate::Value) and Rust types.
    #[error("Type conversion error: {0}")]
    Conversion(String),

    /// Invalid argument passed to a builder or connection method.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Convenience alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Helper Functions
// ============================================================================

impl Error {
    /// Creates a `Configuration` error from a string slice.
    pub fn configuration(msg: &str) -> Self {
        Error::Configuration(msg.to_string())
    }

    /// Creates a `QueryCompilation` error from a string slice.
    pub fn compilation(msg: &str) -> Self {
        Error::QueryCompilation(msg.to_string())
    }

    /// Creates a `Transaction` error from a string slice.
    pub fn transaction(msg: &str) -> Self {
        Error::Transaction(msg.to_string())
    }

    /// Creates an `InvalidData` error from a string slice.
    pub fn invalid_data(msg: &str) -> Self {
        Error::InvalidData(msg.to_string())
    }

    /// Creates an `InvalidArgument` error from a string slice.
    pub fn invalid_argument(msg: &str) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    /// Creates a `Conversion` error from a string slice.
    pub fn conversion(msg: &str) -> Self {
        Error::Conversion(msg.to_string())
    }

    /// Returns `true` when the error came from the database driver.
    pub fn is_execution(&self) -> bool {
        matches!(self, Error::Execution(_))
    }
}
