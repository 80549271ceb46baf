//! # Query Builder Module
//!
//! A fluent builder that records query intent into a [`Query`], asks a
//! [`Grammar`] for SQL and bindings, and runs the result through a
//! [`ConnectionInterface`].
//!
//! Fluent methods consume and return the builder, so a chain reads top to
//! bottom and ends in one terminal `async` call (`get`, `first`, `count`,
//! `insert`, `update`, `delete`, ...).
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use quarry::{Direction, Row};
//!
//! let active = conn
//!     .table("users")
//!     .where_eq("status", "active")
//!     .where_nested(|q| q.where_("votes", ">", 100).or_where_eq("title", "Admin"))
//!     .order_by("created_at", Direction::Desc)
//!     .limit(10)
//!     .get()
//!     .await?;
//!
//! let affected = conn.table("users").where_eq("id", 1).update(Row::new().with("votes", 1)).await?;
//! ```
//!
//! ## Errors
//!
//! Building never fails. An invalid operator is remembered and reported by the
//! next terminal call as `QueryCompilation`, as is a missing table. Terminal
//! calls on a builder without a connection fail with `Configuration`.

use std::fmt;
use std::sync::Arc;

use heck::ToSnakeCase;

use crate::{
    ConnectionInterface, Error, Expression, FromRow, Model, Row, Value,
    grammar::Grammar,
    model::ModelMeta,
    pagination::Paginated,
    query::{
        Aggregate, AggregateFunction, Assignment, Boolean, DatePart, Direction, EagerAggregate, JoinClause,
        JoinCondition, JoinKind, Lock, Order, Query, Selectable, WhereClause, normalize_operator,
    },
};

// ============================================================================
// QueryBuilder Struct
// ============================================================================

/// A fluent SQL builder, optionally bound to a connection.
pub struct QueryBuilder<'c> {
    conn: Option<&'c mut dyn ConnectionInterface>,
    grammar: Arc<dyn Grammar>,
    query: Query,
    pending_error: Option<String>,
}

impl fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("grammar", &self.grammar)
            .field("bound", &self.conn.is_some())
            .field("query", &self.query)
            .field("pending_error", &self.pending_error)
            .finish()
    }
}

impl<'c> QueryBuilder<'c> {
    /// A detached builder: it compiles SQL but cannot execute it.
    pub fn new(grammar: Arc<dyn Grammar>) -> Self {
        Self { conn: None, grammar, query: Query::new(), pending_error: None }
    }

    /// A builder that executes on `conn`, using its grammar.
    pub fn for_connection(conn: &'c mut dyn ConnectionInterface) -> Self {
        let grammar = conn.grammar();
        Self { conn: Some(conn), grammar, query: Query::new(), pending_error: None }
    }

    /// The accumulated query state.
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn grammar(&self) -> &Arc<dyn Grammar> {
        &self.grammar
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn fail(mut self, message: String) -> Self {
        if self.pending_error.is_none() {
            self.pending_error = Some(message);
        }
        self
    }

    fn push_where(mut self, clause: WhereClause) -> Self {
        self.query.wheres.push(clause);
        self
    }

    fn push_having(mut self, clause: WhereClause) -> Self {
        self.query.havings.push(clause);
        self
    }

    /// Builds a basic comparison, turning `= NULL` / `!= NULL` into null checks.
    fn comparison(column: &str, operator: &str, value: Value, boolean: Boolean) -> Result<WhereClause, String> {
        let normalized = normalize_operator(operator).ok_or_else(|| format!("invalid operator '{}'", operator))?;

        if value.is_null() {
            match normalized.as_str() {
                "=" => return Ok(WhereClause::Null { column: column.to_string(), boolean, negated: false }),
                "!=" | "<>" => return Ok(WhereClause::Null { column: column.to_string(), boolean, negated: true }),
                _ => {}
            }
        }

        Ok(WhereClause::Basic { column: column.to_string(), operator: normalized, value, boolean })
    }

    fn add_where(self, column: &str, operator: &str, value: Value, boolean: Boolean) -> Self {
        match Self::comparison(column, operator, value, boolean) {
            Ok(clause) => self.push_where(clause),
            Err(message) => self.fail(message),
        }
    }

    fn add_having(self, column: &str, operator: &str, value: Value, boolean: Boolean) -> Self {
        match Self::comparison(column, operator, value, boolean) {
            Ok(clause) => self.push_having(clause),
            Err(message) => self.fail(message),
        }
    }

    fn add_nested<F>(self, callback: F, boolean: Boolean) -> Self
    where
        F: FnOnce(QueryBuilder<'static>) -> QueryBuilder<'static>,
    {
        let group = callback(QueryBuilder::new(Arc::clone(&self.grammar)));
        if let Some(message) = group.pending_error {
            return self.fail(message);
        }
        self.push_where(WhereClause::Nested { query: Box::new(group.query), boolean })
    }

    fn add_in<I, V>(self, column: &str, values: I, boolean: Boolean, negated: bool) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.push_where(WhereClause::In { column: column.to_string(), values, boolean, negated })
    }

    fn add_date(self, part: DatePart, column: &str, operator: &str, value: Value, boolean: Boolean) -> Self {
        let Some(operator) = normalize_operator(operator) else {
            return self.fail(format!("invalid operator '{}'", operator));
        };
        let value = self.grammar.date_binding(part, value);
        self.push_where(WhereClause::Date { part, column: column.to_string(), operator, value, boolean })
    }

    fn add_regexp(self, column: &str, pattern: Value, negated: bool) -> Self {
        match self.grammar.compile_regexp(&self.grammar.wrap(column), negated) {
            Some(sql) => self.push_where(WhereClause::Raw { sql, bindings: vec![pattern], boolean: Boolean::And }),
            None => {
                let message = format!("the {} grammar does not support regular expressions", self.grammar.name());
                self.fail(message)
            }
        }
    }

    fn add_join(mut self, kind: JoinKind, table: &str, first: &str, operator: &str, second: &str) -> Self {
        let Some(operator) = normalize_operator(operator) else {
            return self.fail(format!("invalid join operator '{}'", operator));
        };
        self.query.joins.push(JoinClause {
            kind,
            table: table.to_string(),
            on: Some(JoinCondition { first: first.to_string(), operator, second: second.to_string() }),
        });
        self
    }

    fn add_eager_aggregate(mut self, function: AggregateFunction, relation: &str, column: &str) -> Self {
        let alias = format!("{}_{}", relation.to_snake_case(), function.alias_suffix());
        self.query.eager_aggregates.insert(
            alias,
            EagerAggregate { function, relation: relation.to_string(), column: column.to_string() },
        );
        self
    }

    // ========================================================================
    // Table & Projection
    // ========================================================================

    /// Sets the target table. `"users as u"` aliases it.
    pub fn from(mut self, table: &str) -> Self {
        self.query.table = Some(table.to_string());
        self
    }

    /// Targets `M`'s table and attaches its key metadata (used by `find`,
    /// `insert_get_id` and `restore`).
    pub fn model<M: Model>(mut self) -> Self {
        let meta = ModelMeta::of::<M>();
        self.query.table = Some(meta.table.to_string());
        self.query.model = Some(meta);
        self
    }

    /// Replaces the projection.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.query.columns = columns.iter().map(|c| Selectable::Column(c.to_string())).collect();
        self
    }

    /// Appends to the projection.
    pub fn add_select(mut self, columns: &[&str]) -> Self {
        self.query.columns.extend(columns.iter().map(|c| Selectable::Column(c.to_string())));
        self
    }

    /// Appends a raw projection expression with its own bindings.
    pub fn select_raw(mut self, expression: impl Into<Expression>, bindings: Vec<Value>) -> Self {
        self.query.columns.push(Selectable::Raw(expression.into(), bindings));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    // ========================================================================
    // Where Clauses
    // ========================================================================

    /// Adds `column operator ?`, joined with AND.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// conn.table("users").where_("votes", ">", 100).get().await?;
    /// ```
    pub fn where_(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_where(column, operator, value.into(), Boolean::And)
    }

    /// Adds `column = ?`, joined with AND.
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.add_where(column, "=", value.into(), Boolean::And)
    }

    pub fn or_where(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_where(column, operator, value.into(), Boolean::Or)
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.add_where(column, "=", value.into(), Boolean::Or)
    }

    /// Adds a parenthesized group built by `callback`.
    ///
    /// ```rust,ignore
    /// conn.table("users")
    ///     .where_eq("active", 1)
    ///     .where_nested(|q| q.where_eq("role", "admin").or_where("votes", ">", 100))
    ///     .get()
    ///     .await?;
    /// // ... WHERE "active" = ? AND ("role" = ? OR "votes" > ?)
    /// ```
    pub fn where_nested<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder<'static>) -> QueryBuilder<'static>,
    {
        self.add_nested(callback, Boolean::And)
    }

    pub fn or_where_nested<F>(self, callback: F) -> Self
    where
        F: FnOnce(QueryBuilder<'static>) -> QueryBuilder<'static>,
    {
        self.add_nested(callback, Boolean::Or)
    }

    /// `column IN (...)`. An empty list matches nothing.
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.add_in(column, values, Boolean::And, false)
    }

    /// `column NOT IN (...)`. An empty list matches everything.
    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.add_in(column, values, Boolean::And, true)
    }

    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.add_in(column, values, Boolean::Or, false)
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_where(WhereClause::Null { column: column.to_string(), boolean: Boolean::And, negated: false })
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_where(WhereClause::Null { column: column.to_string(), boolean: Boolean::And, negated: true })
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.push_where(WhereClause::Null { column: column.to_string(), boolean: Boolean::Or, negated: false })
    }

    pub fn or_where_not_null(self, column: &str) -> Self {
        self.push_where(WhereClause::Null { column: column.to_string(), boolean: Boolean::Or, negated: true })
    }

    pub fn where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_where(WhereClause::Between {
            column: column.to_string(),
            low: low.into(),
            high: high.into(),
            boolean: Boolean::And,
            negated: false,
        })
    }

    pub fn or_where_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_where(WhereClause::Between {
            column: column.to_string(),
            low: low.into(),
            high: high.into(),
            boolean: Boolean::Or,
            negated: false,
        })
    }

    pub fn where_not_between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.push_where(WhereClause::Between {
            column: column.to_string(),
            low: low.into(),
            high: high.into(),
            boolean: Boolean::And,
            negated: true,
        })
    }

    pub fn where_like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.add_where(column, "like", pattern.into(), Boolean::And)
    }

    pub fn or_where_like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.add_where(column, "like", pattern.into(), Boolean::Or)
    }

    pub fn where_not_like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.add_where(column, "not like", pattern.into(), Boolean::And)
    }

    /// Compares two columns: `first operator second`.
    pub fn where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.add_column_comparison(first, operator, second, Boolean::And)
    }

    pub fn or_where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.add_column_comparison(first, operator, second, Boolean::Or)
    }

    fn add_column_comparison(self, first: &str, operator: &str, second: &str, boolean: Boolean) -> Self {
        let Some(operator) = normalize_operator(operator) else {
            return self.fail(format!("invalid operator '{}'", operator));
        };
        self.push_where(WhereClause::Column { first: first.to_string(), operator, second: second.to_string(), boolean })
    }

    /// Regular-expression match in the dialect's syntax.
    ///
    /// SQLite has no `REGEXP` function, so there the next terminal call fails
    /// with `QueryCompilation` instead of sending SQL that cannot run.
    pub fn where_regexp(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.add_regexp(column, pattern.into(), false)
    }

    pub fn where_not_regexp(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.add_regexp(column, pattern.into(), true)
    }

    /// A verbatim condition; `?` placeholders take `bindings` in order.
    pub fn where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_where(WhereClause::Raw { sql: sql.into(), bindings, boolean: Boolean::And })
    }

    pub fn or_where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_where(WhereClause::Raw { sql: sql.into(), bindings, boolean: Boolean::Or })
    }

    /// Compares the date part of a datetime column (`YYYY-MM-DD`).
    pub fn where_date(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_date(DatePart::Date, column, operator, value.into(), Boolean::And)
    }

    /// Compares the time part (`HH:MM:SS`).
    pub fn where_time(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_date(DatePart::Time, column, operator, value.into(), Boolean::And)
    }

    pub fn where_year(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_date(DatePart::Year, column, operator, value.into(), Boolean::And)
    }

    pub fn where_month(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_date(DatePart::Month, column, operator, value.into(), Boolean::And)
    }

    pub fn where_day(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_date(DatePart::Day, column, operator, value.into(), Boolean::And)
    }

    /// Applies `callback` only when `condition` holds.
    ///
    /// ```rust,ignore
    /// conn.table("users")
    ///     .when(filter.is_some(), |q| q.where_eq("role", filter.clone().unwrap_or_default()))
    ///     .get()
    ///     .await?;
    /// ```
    pub fn when<F>(self, condition: bool, callback: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition { callback(self) } else { self }
    }

    // ========================================================================
    // Joins
    // ========================================================================

    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.add_join(JoinKind::Inner, table, first, operator, second)
    }

    pub fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.add_join(JoinKind::Left, table, first, operator, second)
    }

    pub fn right_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.add_join(JoinKind::Right, table, first, operator, second)
    }

    pub fn cross_join(mut self, table: &str) -> Self {
        self.query.joins.push(JoinClause { kind: JoinKind::Cross, table: table.to_string(), on: None });
        self
    }

    // ========================================================================
    // Grouping
    // ========================================================================

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.query.groups.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn having(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_having(column, operator, value.into(), Boolean::And)
    }

    pub fn or_having(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.add_having(column, operator, value.into(), Boolean::Or)
    }

    pub fn having_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_having(WhereClause::Raw { sql: sql.into(), bindings, boolean: Boolean::And })
    }

    pub fn or_having_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.push_having(WhereClause::Raw { sql: sql.into(), bindings, boolean: Boolean::Or })
    }

    // ========================================================================
    // Ordering, Limits & Locks
    // ========================================================================

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.query.orders.push(Order::Column { column: column.to_string(), direction });
        self
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, Direction::Desc)
    }

    pub fn order_by_raw(mut self, sql: impl Into<Expression>, bindings: Vec<Value>) -> Self {
        self.query.orders.push(Order::Raw { sql: sql.into(), bindings });
        self
    }

    /// Drops every ORDER BY added so far.
    pub fn reorder(mut self) -> Self {
        self.query.orders.clear();
        self
    }

    /// Newest first by `created_at`.
    pub fn latest(self) -> Self {
        self.order_by("created_at", Direction::Desc)
    }

    pub fn latest_by(self, column: &str) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Oldest first by `created_at`.
    pub fn oldest(self) -> Self {
        self.order_by("created_at", Direction::Asc)
    }

    pub fn oldest_by(self, column: &str) -> Self {
        self.order_by(column, Direction::Asc)
    }

    pub fn in_random_order(mut self) -> Self {
        let random = Expression::new(self.grammar.random_function());
        self.query.orders.push(Order::Raw { sql: random, bindings: Vec::new() });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Alias for [`limit`](Self::limit).
    pub fn take(self, limit: u64) -> Self {
        self.limit(limit)
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Alias for [`offset`](Self::offset).
    pub fn skip(self, offset: u64) -> Self {
        self.offset(offset)
    }

    /// Limit/offset for a 1-based page. Page 0 is treated as page 1.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        self.offset(page.saturating_sub(1).saturating_mul(per_page)).limit(per_page)
    }

    pub fn lock_for_update(mut self) -> Self {
        self.query.lock = Some(Lock::Update);
        self
    }

    pub fn lock_for_shared_reading(mut self) -> Self {
        self.query.lock = Some(Lock::Shared);
        self
    }

    // ========================================================================
    // Eager Loading Hints
    // ========================================================================

    /// Records relations for the model layer to eager load. Never affects SQL.
    pub fn with(mut self, relations: &[&str]) -> Self {
        for relation in relations {
            if !self.query.eager_loads.iter().any(|r| r == relation) {
                self.query.eager_loads.push(relation.to_string());
            }
        }
        self
    }

    /// Records a `{relation}_count` eager aggregate.
    pub fn with_count(self, relation: &str) -> Self {
        self.add_eager_aggregate(AggregateFunction::Count, relation, "*")
    }

    pub fn with_sum(self, relation: &str, column: &str) -> Self {
        self.add_eager_aggregate(AggregateFunction::Sum, relation, column)
    }

    pub fn with_avg(self, relation: &str, column: &str) -> Self {
        self.add_eager_aggregate(AggregateFunction::Avg, relation, column)
    }

    pub fn with_min(self, relation: &str, column: &str) -> Self {
        self.add_eager_aggregate(AggregateFunction::Min, relation, column)
    }

    pub fn with_max(self, relation: &str, column: &str) -> Self {
        self.add_eager_aggregate(AggregateFunction::Max, relation, column)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// The SELECT this builder would run, with `?` placeholders.
    pub fn to_sql(&self) -> Result<String, Error> {
        self.ensure_compilable()?;
        Ok(self.grammar.compile_select(&self.query).0)
    }

    /// The SELECT bindings, in placeholder order.
    pub fn get_bindings(&self) -> Vec<Value> {
        self.grammar.compile_select(&self.query).1
    }

    // ========================================================================
    // Execution Helpers
    // ========================================================================

    fn ensure_compilable(&self) -> Result<(), Error> {
        if let Some(message) = &self.pending_error {
            return Err(Error::QueryCompilation(message.clone()));
        }
        self.query.table_name()?;
        Ok(())
    }

    fn connection(&mut self) -> Result<&mut (dyn ConnectionInterface + 'c), Error> {
        self.conn.as_deref_mut().ok_or_else(|| Error::configuration("query builder is not bound to a connection"))
    }

    /// Runs an aggregate over a copy of the query without ORDER BY/LIMIT/OFFSET.
    async fn aggregate(&mut self, function: AggregateFunction, column: &str) -> Result<Value, Error> {
        self.ensure_compilable()?;

        let mut query = self.query.clone();
        query.orders.clear();
        query.limit = None;
        query.offset = None;
        query.aggregate = Some(Aggregate { function, column: column.to_string() });

        let (sql, bindings) = self.grammar.compile_select(&query);
        let row = self.connection()?.select_one(&sql, bindings).await?;

        Ok(row
            .and_then(|row| row.get("aggregate").or_else(|| row.first_value()).cloned())
            .unwrap_or(Value::Null))
    }

    async fn count_rows(&mut self) -> Result<u64, Error> {
        let value = self.aggregate(AggregateFunction::Count, "*").await?;
        Ok(value.as_i64().unwrap_or(0).max(0) as u64)
    }

    fn assignments(values: Row) -> Vec<(String, Assignment)> {
        values.into_iter().map(|(column, value)| (column, Assignment::Value(value))).collect()
    }

    async fn run_update(mut self, assignments: Vec<(String, Assignment)>) -> Result<u64, Error> {
        self.ensure_compilable()?;
        if assignments.is_empty() {
            return Err(Error::invalid_argument("update requires at least one column"));
        }
        let (sql, bindings) = self.grammar.compile_update(&self.query, &assignments);
        self.connection()?.update(&sql, bindings).await
    }

    fn step_assignments(amounts: Row, decrement: bool) -> Result<Vec<(String, Assignment)>, Error> {
        amounts
            .into_iter()
            .map(|(column, amount)| {
                if !amount.is_numeric() {
                    return Err(Error::InvalidArgument(format!(
                        "non-numeric value passed to {} for column `{}`",
                        if decrement { "decrement" } else { "increment" },
                        column
                    )));
                }
                let assignment = if decrement { Assignment::Decrement(amount) } else { Assignment::Increment(amount) };
                Ok((column, assignment))
            })
            .collect()
    }

    // ========================================================================
    // Terminal Operations: Reads
    // ========================================================================

    /// Runs the SELECT and returns every row.
    pub async fn get(mut self) -> Result<Vec<Row>, Error> {
        self.ensure_compilable()?;
        let (sql, bindings) = self.grammar.compile_select(&self.query);
        self.connection()?.select(&sql, bindings).await
    }

    /// Runs the SELECT and hydrates each row as `T`.
    ///
    /// ```rust,ignore
    /// let users: Vec<User> = conn.model::<User>().where_eq("active", 1).get_as().await?;
    /// ```
    pub async fn get_as<T: FromRow>(self) -> Result<Vec<T>, Error> {
        self.get().await?.iter().map(T::from_row).collect()
    }

    /// The first row, with `LIMIT 1` applied.
    pub async fn first(self) -> Result<Option<Row>, Error> {
        Ok(self.limit(1).get().await?.into_iter().next())
    }

    pub async fn first_as<T: FromRow>(self) -> Result<Option<T>, Error> {
        self.first().await?.as_ref().map(T::from_row).transpose()
    }

    /// The row whose primary key equals `id` (the model's key, else `id`).
    pub async fn find(self, id: impl Into<Value>) -> Result<Option<Row>, Error> {
        let key = self.query.model.map(|meta| meta.primary_key).unwrap_or("id");
        self.where_eq(key, id).first().await
    }

    pub async fn find_as<T: FromRow>(self, id: impl Into<Value>) -> Result<Option<T>, Error> {
        self.find(id).await?.as_ref().map(T::from_row).transpose()
    }

    /// One column of the first row.
    pub async fn value(self, column: &str) -> Result<Option<Value>, Error> {
        let row = self.select(&[column]).first().await?;
        Ok(row.and_then(|row| row.first_value().cloned()))
    }

    /// One column of every row.
    pub async fn pluck(self, column: &str) -> Result<Vec<Value>, Error> {
        let rows = self.select(&[column]).get().await?;
        Ok(rows.iter().filter_map(|row| row.first_value().cloned()).collect())
    }

    pub async fn count(mut self) -> Result<i64, Error> {
        Ok(self.aggregate(AggregateFunction::Count, "*").await?.as_i64().unwrap_or(0))
    }

    pub async fn sum(mut self, column: &str) -> Result<Value, Error> {
        self.aggregate(AggregateFunction::Sum, column).await
    }

    pub async fn avg(mut self, column: &str) -> Result<Value, Error> {
        self.aggregate(AggregateFunction::Avg, column).await
    }

    pub async fn min(mut self, column: &str) -> Result<Value, Error> {
        self.aggregate(AggregateFunction::Min, column).await
    }

    pub async fn max(mut self, column: &str) -> Result<Value, Error> {
        self.aggregate(AggregateFunction::Max, column).await
    }

    pub async fn exists(mut self) -> Result<bool, Error> {
        self.ensure_compilable()?;
        let (sql, bindings) = self.grammar.compile_exists(&self.query);
        let row = self.connection()?.select_one(&sql, bindings).await?;
        Ok(row.and_then(|row| row.first_value().and_then(Value::as_i64)).is_some_and(|flag| flag != 0))
    }

    pub async fn doesnt_exist(self) -> Result<bool, Error> {
        Ok(!self.exists().await?)
    }

    /// One page of rows plus the total across all pages.
    pub async fn paginate(mut self, page: u64, per_page: u64) -> Result<Paginated<Row>, Error> {
        if per_page == 0 {
            return Err(Error::invalid_argument("per_page must be greater than zero"));
        }
        let page = page.max(1);
        let total = self.count_rows().await?;
        let data = self.for_page(page, per_page).get().await?;
        Ok(Paginated::new(data, total, page, per_page))
    }

    /// Whether `page` falls inside `1..=last_page`; an empty result still
    /// has one (empty) page.
    pub async fn is_page_valid(mut self, page: u64, per_page: u64) -> Result<bool, Error> {
        if per_page == 0 {
            return Ok(false);
        }
        let total = self.count_rows().await?;
        let last_page = total.div_ceil(per_page).max(1);
        Ok(page >= 1 && page <= last_page)
    }

    // ========================================================================
    // Terminal Operations: Writes
    // ========================================================================

    /// Inserts one row.
    pub async fn insert(mut self, row: Row) -> Result<bool, Error> {
        self.ensure_compilable()?;
        let (sql, bindings) = self.grammar.compile_insert(&self.query, std::slice::from_ref(&row));
        self.connection()?.insert(&sql, bindings).await
    }

    /// Inserts several rows in one statement. The first row's columns decide
    /// the column list; an empty batch is a no-op.
    pub async fn insert_many(mut self, rows: Vec<Row>) -> Result<bool, Error> {
        self.ensure_compilable()?;
        if rows.is_empty() {
            return Ok(true);
        }
        let (sql, bindings) = self.grammar.compile_insert(&self.query, &rows);
        self.connection()?.insert(&sql, bindings).await
    }

    pub async fn insert_model<M: Model>(self, model: &M) -> Result<bool, Error> {
        let builder = if self.query.table.is_none() { self.model::<M>() } else { self };
        builder.insert(model.to_row()).await
    }

    /// Inserts rows, skipping those that hit a unique constraint. Returns the
    /// number actually inserted.
    pub async fn insert_or_ignore(mut self, rows: Vec<Row>) -> Result<u64, Error> {
        self.ensure_compilable()?;
        if rows.is_empty() {
            return Ok(0);
        }
        let (sql, bindings) = self.grammar.compile_insert_or_ignore(&self.query, &rows);
        self.connection()?.execute(&sql, bindings).await
    }

    /// Inserts one row and returns its generated key.
    pub async fn insert_get_id(mut self, row: Row) -> Result<i64, Error> {
        self.ensure_compilable()?;
        let key = self.query.model.map(|meta| meta.primary_key).unwrap_or("id");
        let (sql, bindings) = self.grammar.compile_insert_get_id(&self.query, &row, key);
        self.connection()?.insert_get_id(&sql, bindings).await
    }

    /// Inserts rows, updating `update` columns of rows that conflict on
    /// `unique_by`. With no `update` columns conflicting rows are left alone.
    pub async fn upsert(mut self, rows: Vec<Row>, unique_by: &[&str], update: &[&str]) -> Result<u64, Error> {
        self.ensure_compilable()?;
        if unique_by.is_empty() {
            return Err(Error::invalid_argument("upsert requires at least one unique column"));
        }
        if rows.is_empty() {
            return Ok(0);
        }
        let (sql, bindings) = self.grammar.compile_upsert(&self.query, &rows, unique_by, update);
        self.connection()?.execute(&sql, bindings).await
    }

    /// Updates matching rows; returns the affected count.
    pub async fn update(self, values: Row) -> Result<u64, Error> {
        self.run_update(Self::assignments(values)).await
    }

    /// `column = column + amount` on matching rows.
    pub async fn increment(self, column: &str, amount: impl Into<Value>) -> Result<u64, Error> {
        self.increment_each(Row::new().with(column, amount)).await
    }

    pub async fn decrement(self, column: &str, amount: impl Into<Value>) -> Result<u64, Error> {
        self.decrement_each(Row::new().with(column, amount)).await
    }

    /// Increments several columns in a single UPDATE.
    pub async fn increment_each(self, amounts: Row) -> Result<u64, Error> {
        let assignments = Self::step_assignments(amounts, false)?;
        self.run_update(assignments).await
    }

    pub async fn decrement_each(self, amounts: Row) -> Result<u64, Error> {
        let assignments = Self::step_assignments(amounts, true)?;
        self.run_update(assignments).await
    }

    /// Deletes matching rows; returns the affected count.
    pub async fn delete(mut self) -> Result<u64, Error> {
        self.ensure_compilable()?;
        let (sql, bindings) = self.grammar.compile_delete(&self.query);
        self.connection()?.delete(&sql, bindings).await
    }

    /// Removes every row of the table, resetting identities where the
    /// dialect supports it. Ignores where clauses.
    pub async fn truncate(mut self) -> Result<(), Error> {
        self.ensure_compilable()?;
        let sql = self.grammar.compile_truncate(self.query.table_name()?);
        self.connection()?.statement(&sql).await
    }

    /// Clears the soft-delete column of matching rows. Requires a model with
    /// a soft-delete column (see [`model`](Self::model)).
    pub async fn restore(self) -> Result<u64, Error> {
        let column = self
            .query
            .model
            .and_then(|meta| meta.soft_delete_column)
            .ok_or_else(|| Error::invalid_argument("restore requires a model with a soft-delete column"))?;
        self.update(Row::new().with(column, Value::Null)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SqliteGrammar;

    fn builder() -> QueryBuilder<'static> {
        QueryBuilder::new(Arc::new(SqliteGrammar))
    }

    #[test]
    fn invalid_operator_is_deferred() {
        let query = builder().from("users").where_("id", "=;", 1);
        assert!(matches!(query.to_sql(), Err(Error::QueryCompilation(_))));
    }

    #[test]
    fn missing_table_fails_compilation() {
        assert!(matches!(builder().where_eq("id", 1).to_sql(), Err(Error::QueryCompilation(_))));
    }

    #[test]
    fn null_equality_becomes_is_null() {
        let sql = builder().from("users").where_eq("deleted_at", Value::Null).where_("name", "<>", Value::Null).to_sql();
        assert_eq!(sql.unwrap(), "SELECT * FROM \"users\" WHERE \"deleted_at\" IS NULL AND \"name\" IS NOT NULL");
    }

    #[test]
    fn eager_hints_are_recorded_without_sql() {
        let query = builder().from("users").with(&["posts", "roles", "posts"]).with_count("blogPosts");
        assert_eq!(query.query().eager_loads, vec!["posts", "roles"]);
        assert!(query.query().eager_aggregates.contains_key("blog_posts_count"));
        assert_eq!(query.to_sql().unwrap(), "SELECT * FROM \"users\"");
    }

    #[test]
    fn step_assignments_reject_text() {
        let result = QueryBuilder::step_assignments(Row::new().with("votes", "many"), false);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
