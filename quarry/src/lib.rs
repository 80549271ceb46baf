//! # Quarry
//!
//! A SQL query builder and connection layer over `sqlx`'s `Any` driver.
//!
//! - [`QueryBuilder`] records query intent through a fluent API
//! - [`Grammar`] implementations compile it for MySQL, SQLite and PostgreSQL
//! - [`Connection`] executes it with a prepared-statement LRU cache, nested
//!   transactions with after-commit/after-rollback callbacks, and a query log
//! - [`DatabaseManager`] keeps named connections built lazily from config
//!
//! ```rust,ignore
//! use quarry::{Connection, Direction, Row};
//!
//! let mut conn = Connection::connect("sqlite::memory:").await?;
//! conn.statement("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, votes INTEGER)").await?;
//!
//! conn.table("users").insert(Row::new().with("name", "John").with("votes", 3)).await?;
//! let top = conn.table("users").where_("votes", ">", 1).order_by("votes", Direction::Desc).first().await?;
//! ```

pub use quarry_macro::{FromRow, Model};

pub mod config;
pub mod connection;
pub mod database;
pub mod errors;
pub mod expression;
pub mod grammar;
pub mod model;
pub mod pagination;
pub mod query;
pub mod query_builder;
pub mod query_log;
pub mod row;
pub mod statement_cache;
pub mod temporal;
pub mod transaction;
pub mod value;
pub mod value_binding;

pub use config::{ConnectionConfig, DatabaseConfig};
pub use connection::{Connection, ConnectionBuilder, ConnectionInterface, run_in_transaction};
pub use database::{DatabaseManager, Drivers, Dsn};
pub use errors::{Error, Result};
pub use expression::{Expression, raw};
pub use grammar::{Grammar, MySqlGrammar, PostgresGrammar, SqliteGrammar};
pub use model::{Model, ModelMeta};
pub use pagination::{Paginated, Pagination};
pub use query::{Direction, Query};
pub use query_builder::QueryBuilder;
pub use query_log::{QueryLog, QueryLogEntry};
pub use row::{FromRow, Row};
pub use statement_cache::CacheStats;
pub use value::{FromValue, Value};
