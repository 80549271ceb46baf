//! # Connection Module
//!
//! A [`Connection`] owns one native database handle and everything stateful
//! around it: the prepared-statement cache, the transaction depth and its
//! callback queues, and the query log.
//!
//! The query builder never talks to `Connection` directly; it depends on the
//! object-safe [`ConnectionInterface`] so test doubles and any number of named
//! connections can stand in for it.
//!
//! ## Placeholders
//!
//! Grammars always emit `?`. For PostgreSQL the connection renumbers them to
//! `$1, $2, ...` (skipping quoted text) right before execution, so the SQL in
//! the query log is exactly what the server received.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use quarry::{Connection, Row};
//!
//! let mut conn = Connection::configure("sqlite::memory:").name("main").max_cache_size(50).connect().await?;
//!
//! conn.statement("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").await?;
//! conn.table("users").insert(Row::new().with("name", "John")).await?;
//!
//! conn.transaction(|c| Box::pin(async move {
//!     c.table("users").where_eq("name", "John").update(Row::new().with("name", "Jane")).await?;
//!     Ok(())
//! })).await?;
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::AnyConnection;
use sqlx::any::{AnyQueryResult, AnyRow, AnyStatement};
use sqlx::{Connection as _, Executor as _};

use crate::{
    Error, Model, QueryBuilder, Row, Value,
    database::{Drivers, Dsn},
    grammar::Grammar,
    query_log::QueryLog,
    statement_cache::{CacheStats, DEFAULT_MAX_CACHE_SIZE, StatementCache},
    transaction::{TransactionState, run_callbacks},
    value_binding::bind_values,
};

// ============================================================================
// Connection Interface
// ============================================================================

/// What the query builder needs from a connection.
///
/// `Connection` implements it for real databases; tests can implement it with
/// a recording double.
#[async_trait]
pub trait ConnectionInterface: Send {
    fn grammar(&self) -> Arc<dyn Grammar>;

    fn driver(&self) -> Drivers;

    async fn select(&mut self, sql: &str, bindings: Vec<Value>) -> Result<Vec<Row>, Error>;

    async fn select_one(&mut self, sql: &str, bindings: Vec<Value>) -> Result<Option<Row>, Error> {
        Ok(self.select(sql, bindings).await?.into_iter().next())
    }

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str, bindings: Vec<Value>) -> Result<u64, Error>;

    async fn insert(&mut self, sql: &str, bindings: Vec<Value>) -> Result<bool, Error> {
        self.execute(sql, bindings).await?;
        Ok(true)
    }

    async fn update(&mut self, sql: &str, bindings: Vec<Value>) -> Result<u64, Error> {
        self.execute(sql, bindings).await
    }

    async fn delete(&mut self, sql: &str, bindings: Vec<Value>) -> Result<u64, Error> {
        self.execute(sql, bindings).await
    }

    /// Runs an insert and returns the generated key.
    async fn insert_get_id(&mut self, sql: &str, bindings: Vec<Value>) -> Result<i64, Error>;

    /// Runs SQL without bindings or statement caching (DDL, session commands).
    async fn statement(&mut self, sql: &str) -> Result<(), Error>;

    async fn begin_transaction(&mut self) -> Result<(), Error>;

    async fn commit(&mut self) -> Result<(), Error>;

    async fn roll_back(&mut self) -> Result<(), Error>;

    fn transaction_level(&self) -> u32;
}

/// Runs `callback` between `begin_transaction` and `commit` on any connection.
///
/// An error from the callback rolls back and is returned unchanged. Errors
/// raised while rolling back on that path are logged, never returned in place
/// of the original one.
pub async fn run_in_transaction<C, T, F>(conn: &mut C, callback: F) -> Result<T, Error>
where
    C: ConnectionInterface + ?Sized,
    F: for<'c> FnOnce(&'c mut C) -> BoxFuture<'c, Result<T, Error>>,
{
    conn.begin_transaction().await?;

    match callback(&mut *conn).await {
        Ok(value) => match conn.commit().await {
            Ok(()) => Ok(value),
            // Data is committed; only a callback failed.
            Err(e @ Error::TransactionCallback(_)) => Err(e),
            Err(e) => {
                if conn.transaction_level() > 0
                    && let Err(rollback_error) = conn.roll_back().await
                {
                    log::warn!("rollback after failed commit also failed: {}", rollback_error);
                }
                Err(e)
            }
        },
        Err(e) => {
            if conn.transaction_level() > 0
                && let Err(rollback_error) = conn.roll_back().await
            {
                log::warn!("rollback after failed transaction callback failed: {}", rollback_error);
            }
            Err(e)
        }
    }
}

// ============================================================================
// Connection Builder
// ============================================================================

/// Settings collected before a connection is opened.
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    name: String,
    dsn: String,
    persistent: bool,
    options: BTreeMap<String, String>,
    max_cache_size: usize,
    query_log: Option<QueryLog>,
}

impl ConnectionBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Recorded for callers that pool connections; the handle itself is the same.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// A driver option appended to the connection URL.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options.extend(options.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn max_cache_size(mut self, size: usize) -> Self {
        self.max_cache_size = size;
        self
    }

    /// Writes to an existing (possibly shared) log instead of a private one.
    pub fn query_log(mut self, log: QueryLog) -> Self {
        self.query_log = Some(log);
        self
    }

    pub async fn connect(self) -> Result<Connection, Error> {
        let dsn = Dsn::parse(&self.dsn, &self.options)?;
        let handle = open_handle(&dsn).await?;
        log::info!("connected [{}] using the {} driver", self.name, dsn.driver());

        Ok(Connection {
            grammar: dsn.driver().grammar(),
            name: self.name,
            dsn,
            persistent: self.persistent,
            handle: Some(handle),
            statements: StatementCache::new(self.max_cache_size),
            transactions: TransactionState::default(),
            query_log: self.query_log.unwrap_or_default(),
        })
    }
}

async fn open_handle(dsn: &Dsn) -> Result<AnyConnection, Error> {
    sqlx::any::install_default_drivers();
    Ok(AnyConnection::connect(dsn.url()).await?)
}

// ============================================================================
// Connection
// ============================================================================

pub struct Connection {
    name: String,
    dsn: Dsn,
    persistent: bool,
    handle: Option<AnyConnection>,
    grammar: Arc<dyn Grammar>,
    statements: StatementCache<AnyStatement<'static>>,
    transactions: TransactionState,
    query_log: QueryLog,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("driver", &self.dsn.driver())
            .field("connected", &self.handle.is_some())
            .field("cache", &self.statements.stats())
            .field("transactions", &self.transactions)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Fetch,
    Execute,
}

enum Outcome {
    Rows(Vec<AnyRow>),
    Done(AnyQueryResult),
}

impl Connection {
    /// Starts configuring a connection for `dsn`.
    pub fn configure(dsn: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder {
            name: "default".to_string(),
            dsn: dsn.into(),
            persistent: false,
            options: BTreeMap::new(),
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            query_log: None,
        }
    }

    /// Opens a connection with default settings.
    pub async fn connect(dsn: &str) -> Result<Self, Error> {
        Self::configure(dsn).connect().await
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> Drivers {
        self.dsn.driver()
    }

    pub fn grammar(&self) -> Arc<dyn Grammar> {
        Arc::clone(&self.grammar)
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    // ========================================================================
    // Query Building
    // ========================================================================

    /// A builder targeting `table`.
    pub fn table(&mut self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder::for_connection(self).from(table)
    }

    /// A builder with no table yet.
    pub fn query(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::for_connection(self)
    }

    /// A builder targeting `M`'s table, with `M`'s key metadata attached.
    pub fn model<M: Model>(&mut self) -> QueryBuilder<'_> {
        QueryBuilder::for_connection(self).model::<M>()
    }

    // ========================================================================
    // Execution
    // ========================================================================

    pub async fn select(&mut self, sql: &str, bindings: Vec<Value>) -> Result<Vec<Row>, Error> {
        match self.run(sql, bindings, Mode::Fetch).await? {
            Outcome::Rows(rows) => rows.iter().map(Row::from_any_row).collect(),
            Outcome::Done(_) => Ok(Vec::new()),
        }
    }

    pub async fn select_one(&mut self, sql: &str, bindings: Vec<Value>) -> Result<Option<Row>, Error> {
        Ok(self.select(sql, bindings).await?.into_iter().next())
    }

    pub async fn execute(&mut self, sql: &str, bindings: Vec<Value>) -> Result<u64, Error> {
        match self.run(sql, bindings, Mode::Execute).await? {
            Outcome::Done(result) => Ok(result.rows_affected()),
            Outcome::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    pub async fn insert(&mut self, sql: &str, bindings: Vec<Value>) -> Result<bool, Error> {
        self.execute(sql, bindings).await?;
        Ok(true)
    }

    pub async fn update(&mut self, sql: &str, bindings: Vec<Value>) -> Result<u64, Error> {
        self.execute(sql, bindings).await
    }

    pub async fn delete(&mut self, sql: &str, bindings: Vec<Value>) -> Result<u64, Error> {
        self.execute(sql, bindings).await
    }

    /// Runs an insert and returns the generated key: the first column of the
    /// `RETURNING` row on SQLite and PostgreSQL, the driver's last insert id
    /// on MySQL.
    pub async fn insert_get_id(&mut self, sql: &str, bindings: Vec<Value>) -> Result<i64, Error> {
        if matches!(self.driver(), Drivers::SQLite | Drivers::Postgres) {
            let row = self
                .select_one(sql, bindings)
                .await?
                .ok_or_else(|| Error::invalid_data("insert returned no row"))?;
            return row
                .first_value()
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::invalid_data("insert returned a non-integer key"));
        }

        match self.run(sql, bindings, Mode::Execute).await? {
            Outcome::Done(result) => {
                result.last_insert_id().ok_or_else(|| Error::invalid_data("driver reported no insert id"))
            }
            Outcome::Rows(_) => Err(Error::invalid_data("driver reported no insert id")),
        }
    }

    /// Runs `sql` as-is: no bindings, no statement cache.
    pub async fn statement(&mut self, sql: &str) -> Result<(), Error> {
        let started = Instant::now();
        let handle = self.handle.as_mut().ok_or_else(|| not_connected(&self.name))?;
        handle.execute(sql).await?;
        self.record(sql, &[], started);
        Ok(())
    }

    async fn run(&mut self, sql: &str, bindings: Vec<Value>, mode: Mode) -> Result<Outcome, Error> {
        let sql: Cow<'_, str> = match self.dsn.driver() {
            Drivers::Postgres => Cow::Owned(numbered_placeholders(sql)),
            _ => Cow::Borrowed(sql),
        };

        let started = Instant::now();
        let handle = self.handle.as_mut().ok_or_else(|| not_connected(&self.name))?;
        let outcome = run_cached(handle, &mut self.statements, &sql, bindings.clone(), mode).await?;
        self.record(&sql, &bindings, started);
        Ok(outcome)
    }

    fn record(&self, sql: &str, bindings: &[Value], started: Instant) {
        let time_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::debug!("[{}] {} ({:.3} ms)", self.name, sql, time_ms);
        self.query_log.record(sql, bindings, time_ms);
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Enters a transaction level; only the outermost level issues `BEGIN`.
    pub async fn begin_transaction(&mut self) -> Result<(), Error> {
        if !self.transactions.is_active() {
            self.statement("BEGIN").await?;
        }
        self.transactions.enter();
        log::trace!("[{}] transaction level {}", self.name, self.transactions.level());
        Ok(())
    }

    /// Leaves a transaction level. The outermost commit issues `COMMIT` and
    /// then runs the after-commit callbacks in registration order.
    ///
    /// If an inner level was rolled back, the outermost commit rolls back
    /// instead and returns a `Transaction` error.
    pub async fn commit(&mut self) -> Result<(), Error> {
        if self.transactions.level() > 1 {
            self.transactions.leave("commit")?;
            return Ok(());
        }
        if !self.transactions.is_active() {
            return Err(Error::transaction("cannot commit: no active transaction"));
        }

        if self.transactions.is_rollback_only() {
            self.roll_back().await?;
            return Err(Error::transaction("transaction was rolled back by a nested rollback"));
        }

        // A failed COMMIT leaves the level in place so the caller can roll back.
        self.statement("COMMIT").await?;
        run_callbacks(self.transactions.finish_committed(), "after_commit")
    }

    /// Leaves a transaction level. The outermost rollback issues `ROLLBACK`
    /// and then runs the after-rollback callbacks in registration order.
    pub async fn roll_back(&mut self) -> Result<(), Error> {
        if self.transactions.level() > 1 {
            self.transactions.mark_rollback_only();
            self.transactions.leave("roll back")?;
            return Ok(());
        }
        if !self.transactions.is_active() {
            return Err(Error::transaction("cannot roll back: no active transaction"));
        }

        let result = self.statement("ROLLBACK").await;
        let callbacks = self.transactions.finish_rolled_back();
        match result {
            Ok(()) => run_callbacks(callbacks, "after_rollback"),
            Err(e) => {
                log::warn!("[{}] ROLLBACK failed, dropping {} after_rollback callbacks", self.name, callbacks.len());
                Err(e)
            }
        }
    }

    /// Runs `callback` inside a transaction, committing on success and rolling
    /// back on error. Nested calls share the outer transaction.
    ///
    /// ```rust,ignore
    /// let id = conn.transaction(|c| Box::pin(async move {
    ///     c.table("users").insert_get_id(Row::new().with("name", "John")).await
    /// })).await?;
    /// ```
    pub async fn transaction<T, F>(&mut self, callback: F) -> Result<T, Error>
    where
        F: for<'c> FnOnce(&'c mut Connection) -> BoxFuture<'c, Result<T, Error>>,
    {
        run_in_transaction(self, callback).await
    }

    /// Queues `callback` to run once after the outermost commit.
    pub fn after_commit<F>(&mut self, callback: F) -> Result<(), Error>
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        self.transactions.queue_after_commit(Box::new(callback))
    }

    /// Queues `callback` to run once after the outermost rollback.
    pub fn after_rollback<F>(&mut self, callback: F) -> Result<(), Error>
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        self.transactions.queue_after_rollback(Box::new(callback))
    }

    pub fn in_transaction(&self) -> bool {
        self.transactions.is_active()
    }

    pub fn transaction_level(&self) -> u32 {
        self.transactions.level()
    }

    // ========================================================================
    // Statement Cache
    // ========================================================================

    pub fn get_cache_stats(&self) -> CacheStats {
        self.statements.stats()
    }

    /// Changes the cache bound; a smaller bound evicts immediately.
    pub fn set_max_cache_size(&mut self, size: usize) {
        self.statements.set_capacity(size);
    }

    /// Empties the cache and resets its counters.
    pub fn clear_statement_cache(&mut self) {
        self.statements.clear();
    }

    // ========================================================================
    // Query Log
    // ========================================================================

    pub fn query_log(&self) -> &QueryLog {
        &self.query_log
    }

    pub fn enable_query_log(&self) {
        self.query_log.enable();
    }

    pub fn disable_query_log(&self) {
        self.query_log.disable();
    }

    pub(crate) fn use_query_log(&mut self, log: QueryLog) {
        self.query_log = log;
    }

    // ========================================================================
    // Schema Introspection
    // ========================================================================

    /// Base table names of the connected database.
    pub async fn get_tables(&mut self) -> Result<Vec<String>, Error> {
        let sql = self.grammar.compile_table_listing();
        let rows = self.select(&sql, Vec::new()).await?;
        Ok(first_column_strings(&rows))
    }

    pub async fn table_exists(&mut self, table: &str) -> Result<bool, Error> {
        Ok(self.get_tables().await?.iter().any(|name| name == table))
    }

    pub async fn get_column_listing(&mut self, table: &str) -> Result<Vec<String>, Error> {
        let (sql, bindings) = self.grammar.compile_column_listing(table);
        let rows = self.select(&sql, bindings).await?;
        Ok(first_column_strings(&rows))
    }

    pub async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, Error> {
        let columns = self.get_column_listing(table).await?;
        Ok(columns.iter().any(|name| name.eq_ignore_ascii_case(column)))
    }

    pub async fn truncate_table(&mut self, table: &str) -> Result<(), Error> {
        let sql = self.grammar.compile_truncate(table);
        self.statement(&sql).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Closes the handle. Cached statements and transaction state are dropped
    /// without firing callbacks; later calls fail until `reconnect`.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        self.statements.clear();
        if self.transactions.is_active() {
            log::warn!("[{}] disconnecting inside a transaction; it will be rolled back by the server", self.name);
        }
        self.transactions.reset();

        if let Some(handle) = self.handle.take() {
            handle.close().await?;
            log::info!("disconnected [{}]", self.name);
        }
        Ok(())
    }

    pub async fn reconnect(&mut self) -> Result<(), Error> {
        self.disconnect().await?;
        self.handle = Some(open_handle(&self.dsn).await?);
        log::info!("reconnected [{}]", self.name);
        Ok(())
    }
}

fn not_connected(name: &str) -> Error {
    Error::Configuration(format!("connection [{}] is not connected", name))
}

fn first_column_strings(rows: &[Row]) -> Vec<String> {
    rows.iter().filter_map(|row| row.first_value().and_then(Value::as_str).map(str::to_string)).collect()
}

/// Executes through the statement cache.
///
/// A statement the server rejects while preparing fails with that error, so
/// its native message survives (and a PostgreSQL transaction is not retried
/// after the failed parse aborted it). Only client-side prepare failures fall
/// back to unprepared execution.
async fn run_cached(
    handle: &mut AnyConnection,
    cache: &mut StatementCache<AnyStatement<'static>>,
    sql: &str,
    bindings: Vec<Value>,
    mode: Mode,
) -> Result<Outcome, Error> {
    let arguments = bind_values(bindings)?;

    let statement = if cache.capacity() == 0 {
        None
    } else if let Some(statement) = cache.get(sql) {
        log::trace!("statement cache hit: {}", sql);
        Some(sqlx::Statement::to_owned(statement))
    } else {
        match (&mut *handle).prepare(sql).await {
            Ok(statement) => {
                let statement = sqlx::Statement::to_owned(&statement);
                cache.insert(sql.to_string(), sqlx::Statement::to_owned(&statement));
                Some(statement)
            }
            Err(e @ sqlx::Error::Database(_)) => return Err(e.into()),
            Err(e) => {
                log::warn!("could not prepare statement, running it unprepared: {}", e);
                None
            }
        }
    };

    let outcome = match (statement, mode) {
        (Some(statement), Mode::Fetch) => {
            Outcome::Rows(sqlx::Statement::query_with(&statement, arguments).fetch_all(&mut *handle).await?)
        }
        (Some(statement), Mode::Execute) => {
            Outcome::Done(sqlx::Statement::query_with(&statement, arguments).execute(&mut *handle).await?)
        }
        (None, Mode::Fetch) => Outcome::Rows(sqlx::query_with(sql, arguments).fetch_all(&mut *handle).await?),
        (None, Mode::Execute) => Outcome::Done(sqlx::query_with(sql, arguments).execute(&mut *handle).await?),
    };

    Ok(outcome)
}

/// Rewrites `?` placeholders to `$1, $2, ...`, leaving quoted text alone.
pub(crate) fn numbered_placeholders(sql: &str) -> String {
    let mut output = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut position = 0;

    for ch in sql.chars() {
        match quote {
            Some(open) => {
                if ch == open {
                    quote = None;
                }
                output.push(ch);
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    output.push(ch);
                }
                '?' => {
                    position += 1;
                    output.push('$');
                    output.push_str(&position.to_string());
                }
                _ => output.push(ch),
            },
        }
    }

    output
}

// ============================================================================
// ConnectionInterface Implementation
// ============================================================================

#[async_trait]
impl ConnectionInterface for Connection {
    fn grammar(&self) -> Arc<dyn Grammar> {
        Connection::grammar(self)
    }

    fn driver(&self) -> Drivers {
        Connection::driver(self)
    }

    async fn select(&mut self, sql: &str, bindings: Vec<Value>) -> Result<Vec<Row>, Error> {
        Connection::select(self, sql, bindings).await
    }

    async fn execute(&mut self, sql: &str, bindings: Vec<Value>) -> Result<u64, Error> {
        Connection::execute(self, sql, bindings).await
    }

    async fn insert_get_id(&mut self, sql: &str, bindings: Vec<Value>) -> Result<i64, Error> {
        Connection::insert_get_id(self, sql, bindings).await
    }

    async fn statement(&mut self, sql: &str) -> Result<(), Error> {
        Connection::statement(self, sql).await
    }

    async fn begin_transaction(&mut self) -> Result<(), Error> {
        Connection::begin_transaction(self).await
    }

    async fn commit(&mut self) -> Result<(), Error> {
        Connection::commit(self).await
    }

    async fn roll_back(&mut self) -> Result<(), Error> {
        Connection::roll_back(self).await
    }

    fn transaction_level(&self) -> u32 {
        Connection::transaction_level(self)
    }
}
