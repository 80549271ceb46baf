//! # Grammar Module
//!
//! A grammar turns a [`Query`] into dialect-specific SQL plus its ordered
//! bindings. Grammars are stateless and pure: they never fail, the builder
//! validates preconditions (table set, operators valid) before compiling.
//!
//! The trait's provided methods hold the shared compilation pipeline; each
//! dialect only overrides the hooks where its syntax differs (quoting,
//! LIMIT/OFFSET, locks, date extraction, upserts, introspection).
//!
//! ## Binding Order
//!
//! Bindings are pushed while the SQL text is emitted, so their order always
//! matches the `?` placeholders: select expressions, wheres, havings, raw
//! orders for SELECT; SET values before WHERE values for UPDATE.
//!
//! ## Example
//!
//! ```rust,ignore
//! use quarry::grammar::{Grammar, MySqlGrammar};
//!
//! let (sql, bindings) = MySqlGrammar.compile_select(&query);
//! ```

use std::fmt;

use crate::query::{
    Aggregate, AggregateFunction, Assignment, DatePart, JoinClause, Lock, Order, Query, Selectable, WhereClause,
};
use crate::{Row, Value};

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;

// ============================================================================
// Grammar Trait
// ============================================================================

/// Dialect strategy used by the query builder.
pub trait Grammar: Send + Sync + fmt::Debug {
    /// Dialect name, for logs.
    fn name(&self) -> &'static str;

    /// Identifier quote character.
    fn quote_char(&self) -> char;

    /// Expression used by `in_random_order`.
    fn random_function(&self) -> &'static str;

    /// Lock suffix for `lock_for_update`/`lock_for_shared_reading`; empty when
    /// the dialect has no row locks.
    fn compile_lock(&self, lock: Lock) -> &'static str;

    /// A date-part comparison with exactly one `?`. `column` is already wrapped.
    fn compile_date_condition(&self, part: DatePart, column: &str, operator: &str) -> String;

    /// Adjusts the value compared against a date part.
    fn date_binding(&self, _part: DatePart, value: Value) -> Value {
        value
    }

    fn compile_truncate(&self, table: &str) -> String;

    /// Lists base tables of the current database; one name per row, first column.
    fn compile_table_listing(&self) -> String;

    /// Lists the columns of `table`; one name per row, first column.
    fn compile_column_listing(&self, table: &str) -> (String, Vec<Value>);

    /// Hidden physical row id used to rewrite UPDATE/DELETE statements that
    /// carry joins or a limit. `None` when the dialect supports those natively.
    fn row_identifier(&self) -> Option<&'static str> {
        None
    }

    // ========================================================================
    // Quoting
    // ========================================================================

    /// Quotes a single identifier segment, doubling embedded quote characters.
    fn quote_identifier(&self, segment: &str) -> String {
        let quote = self.quote_char();
        let escaped = segment.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }

    /// Quotes a possibly qualified and aliased column or table reference.
    ///
    /// `users.id` becomes `"users"."id"`, `users.*` keeps the star,
    /// `name as n` becomes `"name" AS "n"`.
    fn wrap(&self, value: &str) -> String {
        let lowered = value.to_ascii_lowercase();
        if let Some(position) = lowered.find(" as ") {
            let (reference, alias) = (&value[..position], &value[position + 4..]);
            return format!("{} AS {}", self.wrap(reference.trim()), self.quote_identifier(alias.trim()));
        }

        value
            .split('.')
            .map(|segment| if segment == "*" { segment.to_string() } else { self.quote_identifier(segment) })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn wrap_table(&self, table: &str) -> String {
        self.wrap(table)
    }

    fn columnize(&self, columns: &[&str]) -> String {
        columns.iter().map(|column| self.wrap(column)).collect::<Vec<_>>().join(", ")
    }

    /// `LIMIT n OFFSET m`, either part optional.
    fn compile_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut parts = Vec::new();
        if let Some(limit) = limit {
            parts.push(format!("LIMIT {}", limit));
        }
        if let Some(offset) = offset {
            parts.push(format!("OFFSET {}", offset));
        }
        parts.join(" ")
    }

    /// A regular-expression match with one `?`. `column` is already wrapped.
    /// `None` when the dialect has no regular-expression operator.
    fn compile_regexp(&self, column: &str, negated: bool) -> Option<String> {
        Some(format!("{} {}REGEXP ?", column, if negated { "NOT " } else { "" }))
    }

    // ========================================================================
    // SELECT
    // ========================================================================

    fn compile_select(&self, query: &Query) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let sql = match &query.aggregate {
            Some(aggregate) => compile_aggregate(self, query, aggregate, &mut bindings),
            None => {
                let columns = compile_columns(self, query, &mut bindings);
                compile_select_with(self, query, &columns, &mut bindings)
            }
        };
        (sql, bindings)
    }

    fn compile_exists(&self, query: &Query) -> (String, Vec<Value>) {
        let mut inner = query.clone();
        inner.aggregate = None;
        let (select, bindings) = self.compile_select(&inner);
        (format!("SELECT EXISTS({}) AS {}", select, self.quote_identifier("exists")), bindings)
    }

    // ========================================================================
    // INSERT
    // ========================================================================

    /// Multi-row insert; the first row decides the column list, missing
    /// columns in later rows bind NULL.
    fn compile_insert(&self, query: &Query, rows: &[Row]) -> (String, Vec<Value>) {
        let table = self.wrap_table(query.table.as_deref().unwrap_or_default());

        let columns: Vec<&str> = match rows.first() {
            Some(first) if !first.is_empty() => first.columns().collect(),
            _ => return (self.compile_empty_insert(&table), Vec::new()),
        };

        let mut bindings = Vec::with_capacity(columns.len() * rows.len());
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            for column in &columns {
                bindings.push(row.get(column).cloned().unwrap_or(Value::Null));
            }
            tuples.push(format!("({})", parameterize(columns.len())));
        }

        let sql = format!("INSERT INTO {} ({}) VALUES {}", table, self.columnize(&columns), tuples.join(", "));
        (sql, bindings)
    }

    /// Insert of a row with no explicit columns; `table` is already wrapped.
    fn compile_empty_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    }

    fn compile_insert_or_ignore(&self, query: &Query, rows: &[Row]) -> (String, Vec<Value>) {
        let (sql, bindings) = self.compile_insert(query, rows);
        (format!("{} ON CONFLICT DO NOTHING", sql), bindings)
    }

    /// Insert whose generated key the connection reads back. Dialects that
    /// cannot report a last insert id append a `RETURNING` clause.
    fn compile_insert_get_id(&self, query: &Query, row: &Row, _sequence: &str) -> (String, Vec<Value>) {
        self.compile_insert(query, std::slice::from_ref(row))
    }

    /// Insert-or-update on `unique_by` conflicts. An empty `update` list
    /// keeps the existing row.
    fn compile_upsert(
        &self,
        query: &Query,
        rows: &[Row],
        unique_by: &[&str],
        update: &[&str],
    ) -> (String, Vec<Value>) {
        let (sql, bindings) = self.compile_insert(query, rows);

        if update.is_empty() {
            return (format!("{} ON CONFLICT ({}) DO NOTHING", sql, self.columnize(unique_by)), bindings);
        }

        let excluded = self.quote_identifier("excluded");
        let assignments = update
            .iter()
            .map(|column| format!("{} = {}.{}", self.wrap(column), excluded, self.wrap(column)))
            .collect::<Vec<_>>()
            .join(", ");

        (format!("{} ON CONFLICT ({}) DO UPDATE SET {}", sql, self.columnize(unique_by), assignments), bindings)
    }

    // ========================================================================
    // UPDATE / DELETE
    // ========================================================================

    fn compile_update(&self, query: &Query, values: &[(String, Assignment)]) -> (String, Vec<Value>) {
        let table_name = query.table.as_deref().unwrap_or_default();
        let table = self.wrap_table(table_name);

        let mut bindings = Vec::new();
        let assignments = compile_assignments(self, values, &mut bindings, false);

        if (!query.joins.is_empty() || query.limit.is_some())
            && let Some(row_id) = self.row_identifier()
        {
            let (subselect, sub_bindings) = compile_row_identifier_select(self, query, row_id);
            bindings.extend(sub_bindings);
            let sql = format!(
                "UPDATE {} SET {} WHERE {} IN ({})",
                table,
                assignments,
                self.quote_identifier(row_id),
                subselect
            );
            return (sql, bindings);
        }

        let mut sql = format!("UPDATE {} SET {}", table, assignments);
        let wheres = compile_wheres(self, query, &mut bindings);
        if !wheres.is_empty() {
            sql.push(' ');
            sql.push_str(&wheres);
        }
        (sql, bindings)
    }

    fn compile_delete(&self, query: &Query) -> (String, Vec<Value>) {
        let table = self.wrap_table(query.table.as_deref().unwrap_or_default());
        let mut bindings = Vec::new();

        if (!query.joins.is_empty() || query.limit.is_some())
            && let Some(row_id) = self.row_identifier()
        {
            let (subselect, sub_bindings) = compile_row_identifier_select(self, query, row_id);
            bindings.extend(sub_bindings);
            let sql = format!("DELETE FROM {} WHERE {} IN ({})", table, self.quote_identifier(row_id), subselect);
            return (sql, bindings);
        }

        let mut sql = format!("DELETE FROM {}", table);
        let wheres = compile_wheres(self, query, &mut bindings);
        if !wheres.is_empty() {
            sql.push(' ');
            sql.push_str(&wheres);
        }
        (sql, bindings)
    }
}

// ============================================================================
// Shared Compilation Helpers
// ============================================================================

/// `?, ?, ?`
pub(crate) fn parameterize(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// The name other clauses use to qualify columns of the target table: the
/// alias when the table is written as `users as u`.
pub(crate) fn table_reference(table: &str) -> &str {
    let lowered = table.to_ascii_lowercase();
    match lowered.find(" as ") {
        Some(position) => table[position + 4..].trim(),
        None => table,
    }
}

pub(crate) fn compile_columns<G: Grammar + ?Sized>(grammar: &G, query: &Query, bindings: &mut Vec<Value>) -> String {
    let columns = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query
            .columns
            .iter()
            .map(|column| match column {
                Selectable::Column(name) => grammar.wrap(name),
                Selectable::Raw(expression, raw_bindings) => {
                    bindings.extend(raw_bindings.iter().cloned());
                    expression.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    if query.distinct { format!("DISTINCT {}", columns) } else { columns }
}

/// SELECT with a precompiled projection; every clause after the projection.
pub(crate) fn compile_select_with<G: Grammar + ?Sized>(
    grammar: &G,
    query: &Query,
    columns: &str,
    bindings: &mut Vec<Value>,
) -> String {
    let mut parts = vec![
        format!("SELECT {}", columns),
        format!("FROM {}", grammar.wrap_table(query.table.as_deref().unwrap_or_default())),
    ];

    let joins = compile_joins(grammar, &query.joins);
    if !joins.is_empty() {
        parts.push(joins);
    }

    let wheres = compile_wheres(grammar, query, bindings);
    if !wheres.is_empty() {
        parts.push(wheres);
    }

    if !query.groups.is_empty() {
        let groups: Vec<&str> = query.groups.iter().map(String::as_str).collect();
        parts.push(format!("GROUP BY {}", grammar.columnize(&groups)));
    }

    let havings = compile_conditions(grammar, &query.havings, bindings);
    if !havings.is_empty() {
        parts.push(format!("HAVING {}", havings));
    }

    let orders = compile_orders(grammar, &query.orders, bindings);
    if !orders.is_empty() {
        parts.push(orders);
    }

    let limit = grammar.compile_limit_offset(query.limit, query.offset);
    if !limit.is_empty() {
        parts.push(limit);
    }

    if let Some(lock) = query.lock {
        let lock = grammar.compile_lock(lock);
        if !lock.is_empty() {
            parts.push(lock.to_string());
        }
    }

    parts.join(" ")
}

fn compile_aggregate<G: Grammar + ?Sized>(
    grammar: &G,
    query: &Query,
    aggregate: &Aggregate,
    bindings: &mut Vec<Value>,
) -> String {
    let counts_groups = aggregate.function == AggregateFunction::Count
        && (!query.groups.is_empty() || !query.havings.is_empty() || (query.distinct && aggregate.column == "*"));

    if counts_groups {
        // Grouped and DISTINCT-* counts have to count the rows of the
        // original result, not the groups' members.
        let mut inner = query.clone();
        inner.aggregate = None;
        let columns = compile_columns(grammar, &inner, bindings);
        let inner_sql = compile_select_with(grammar, &inner, &columns, bindings);
        return format!(
            "SELECT COUNT(*) AS aggregate FROM ({}) AS {}",
            inner_sql,
            grammar.quote_identifier("aggregate_table")
        );
    }

    let column = if aggregate.column == "*" { "*".to_string() } else { grammar.wrap(&aggregate.column) };
    let column = if query.distinct && aggregate.column != "*" { format!("DISTINCT {}", column) } else { column };
    let projection = format!("{}({}) AS aggregate", aggregate.function.as_sql(), column);
    compile_select_with(grammar, query, &projection, bindings)
}

pub(crate) fn compile_joins<G: Grammar + ?Sized>(grammar: &G, joins: &[JoinClause]) -> String {
    joins
        .iter()
        .map(|join| match &join.on {
            Some(on) => format!(
                "{} {} ON {} {} {}",
                join.kind.as_sql(),
                grammar.wrap_table(&join.table),
                grammar.wrap(&on.first),
                on.operator,
                grammar.wrap(&on.second)
            ),
            None => format!("{} {}", join.kind.as_sql(), grammar.wrap_table(&join.table)),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `WHERE ...`, or an empty string when the query has no conditions.
pub(crate) fn compile_wheres<G: Grammar + ?Sized>(grammar: &G, query: &Query, bindings: &mut Vec<Value>) -> String {
    let conditions = compile_conditions(grammar, &query.wheres, bindings);
    if conditions.is_empty() { conditions } else { format!("WHERE {}", conditions) }
}

/// Renders clauses in insertion order, each joined to the previous one by its
/// own boolean. The first rendered clause's boolean is dropped; empty nested
/// groups are skipped entirely.
pub(crate) fn compile_conditions<G: Grammar + ?Sized>(
    grammar: &G,
    clauses: &[WhereClause],
    bindings: &mut Vec<Value>,
) -> String {
    let mut sql = String::new();

    for clause in clauses {
        let fragment = match clause {
            WhereClause::Basic { column, operator, value, .. } => {
                bindings.push(value.clone());
                format!("{} {} ?", grammar.wrap(column), operator)
            }
            WhereClause::In { column, values, negated, .. } => {
                if values.is_empty() {
                    // IN () is invalid SQL; an empty set matches nothing.
                    if *negated { "1 = 1".to_string() } else { "0 = 1".to_string() }
                } else {
                    bindings.extend(values.iter().cloned());
                    format!(
                        "{} {}IN ({})",
                        grammar.wrap(column),
                        if *negated { "NOT " } else { "" },
                        parameterize(values.len())
                    )
                }
            }
            WhereClause::Null { column, negated, .. } => {
                format!("{} IS {}NULL", grammar.wrap(column), if *negated { "NOT " } else { "" })
            }
            WhereClause::Between { column, low, high, negated, .. } => {
                bindings.push(low.clone());
                bindings.push(high.clone());
                format!("{} {}BETWEEN ? AND ?", grammar.wrap(column), if *negated { "NOT " } else { "" })
            }
            WhereClause::Raw { sql: raw_sql, bindings: raw_bindings, .. } => {
                bindings.extend(raw_bindings.iter().cloned());
                raw_sql.clone()
            }
            WhereClause::Nested { query, .. } => {
                let inner = compile_conditions(grammar, &query.wheres, bindings);
                if inner.is_empty() {
                    continue;
                }
                format!("({})", inner)
            }
            WhereClause::Column { first, operator, second, .. } => {
                format!("{} {} {}", grammar.wrap(first), operator, grammar.wrap(second))
            }
            WhereClause::Date { part, column, operator, value, .. } => {
                bindings.push(value.clone());
                grammar.compile_date_condition(*part, &grammar.wrap(column), operator)
            }
        };

        if !sql.is_empty() {
            sql.push(' ');
            sql.push_str(clause.boolean().as_sql());
            sql.push(' ');
        }
        sql.push_str(&fragment);
    }

    sql
}

pub(crate) fn compile_orders<G: Grammar + ?Sized>(grammar: &G, orders: &[Order], bindings: &mut Vec<Value>) -> String {
    if orders.is_empty() {
        return String::new();
    }

    let orders = orders
        .iter()
        .map(|order| match order {
            Order::Column { column, direction } => format!("{} {}", grammar.wrap(column), direction.as_sql()),
            Order::Raw { sql, bindings: raw_bindings } => {
                bindings.extend(raw_bindings.iter().cloned());
                sql.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("ORDER BY {}", orders)
}

/// `a = ?, b = b + ?`. Unqualified dialects strip a `table.` prefix from
/// assigned columns.
pub(crate) fn compile_assignments<G: Grammar + ?Sized>(
    grammar: &G,
    values: &[(String, Assignment)],
    bindings: &mut Vec<Value>,
    qualified: bool,
) -> String {
    values
        .iter()
        .map(|(column, assignment)| {
            let column = if qualified { column.as_str() } else { column.rsplit('.').next().unwrap_or(column) };
            let wrapped = grammar.wrap(column);
            match assignment {
                Assignment::Value(value) => {
                    bindings.push(value.clone());
                    format!("{} = ?", wrapped)
                }
                Assignment::Increment(amount) => {
                    bindings.push(amount.clone());
                    format!("{} = {} + ?", wrapped, wrapped)
                }
                Assignment::Decrement(amount) => {
                    bindings.push(amount.clone());
                    format!("{} = {} - ?", wrapped, wrapped)
                }
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT t.rowid FROM t ... WHERE ... LIMIT n` for rewritten UPDATE/DELETE.
fn compile_row_identifier_select<G: Grammar + ?Sized>(grammar: &G, query: &Query, row_id: &str) -> (String, Vec<Value>) {
    let mut inner = query.clone();
    let reference = table_reference(query.table.as_deref().unwrap_or_default()).to_string();
    inner.columns = vec![Selectable::Column(format!("{}.{}", reference, row_id))];
    inner.aggregate = None;
    inner.lock = None;
    inner.distinct = false;

    let mut bindings = Vec::new();
    let columns = compile_columns(grammar, &inner, &mut bindings);
    let sql = compile_select_with(grammar, &inner, &columns, &mut bindings);
    (sql, bindings)
}
