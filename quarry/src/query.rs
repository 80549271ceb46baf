//! # Query State Module
//!
//! The structured intent a [`QueryBuilder`](crate::QueryBuilder) accumulates
//! and a [`Grammar`](crate::Grammar) compiles. Everything here is plain data:
//! cloning a `Query` is how aggregates and sub-selects get their own copy
//! without touching the caller's builder.
//!
//! Clause vectors are kept in insertion order; that order is emission order.

use std::collections::BTreeMap;

use crate::{Expression, Value, model::ModelMeta};

/// Operators accepted by `where_`/`having`. Compared case-insensitively.
pub const OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "<=>", "like", "like binary", "not like", "ilike", "not ilike", "&", "|",
    "^", "<<", ">>", "rlike", "not rlike", "regexp", "not regexp", "~", "~*", "!~", "!~*", "similar to",
    "not similar to",
];

/// Normalizes a user supplied operator, or `None` if it is not allowed.
pub fn normalize_operator(operator: &str) -> Option<String> {
    let lowered = operator.trim().to_ascii_lowercase();
    OPERATORS.contains(&lowered.as_str()).then(|| lowered.to_ascii_uppercase())
}

// ============================================================================
// Clause Types
// ============================================================================

/// Connector joining a clause to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

impl Boolean {
    pub fn as_sql(self) -> &'static str {
        match self {
            Boolean::And => "AND",
            Boolean::Or => "OR",
        }
    }
}

/// One projected column.
#[derive(Debug, Clone, PartialEq)]
pub enum Selectable {
    Column(String),
    Raw(Expression, Vec<Value>),
}

/// Date/time component extracted by `where_date` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Date,
    Time,
    Year,
    Month,
    Day,
}

/// A where (or having) condition.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    Basic { column: String, operator: String, value: Value, boolean: Boolean },
    In { column: String, values: Vec<Value>, boolean: Boolean, negated: bool },
    Null { column: String, boolean: Boolean, negated: bool },
    Between { column: String, low: Value, high: Value, boolean: Boolean, negated: bool },
    Raw { sql: String, bindings: Vec<Value>, boolean: Boolean },
    /// A parenthesized group compiled from an independent query's wheres.
    Nested { query: Box<Query>, boolean: Boolean },
    Column { first: String, operator: String, second: String, boolean: Boolean },
    Date { part: DatePart, column: String, operator: String, value: Value, boolean: Boolean },
}

impl WhereClause {
    pub fn boolean(&self) -> Boolean {
        match self {
            WhereClause::Basic { boolean, .. }
            | WhereClause::In { boolean, .. }
            | WhereClause::Null { boolean, .. }
            | WhereClause::Between { boolean, .. }
            | WhereClause::Raw { boolean, .. }
            | WhereClause::Nested { boolean, .. }
            | WhereClause::Column { boolean, .. }
            | WhereClause::Date { boolean, .. } => *boolean,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    pub first: String,
    pub operator: String,
    pub second: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    /// `None` only for cross joins.
    pub on: Option<JoinCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    Column { column: String, direction: Direction },
    Raw { sql: Expression, bindings: Vec<Value> },
}

/// Row-locking mode; a query carries at most one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    Update,
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_sql(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }

    /// Lowercase name used in eager aggregate aliases (`posts_count`).
    pub fn alias_suffix(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

/// Set on a cloned query when compiling `count()`/`sum()`/...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub column: String,
}

/// A relation aggregate requested through `with_count`/`with_sum`/...
///
/// Consumed by the model layer; it never reaches the compiled SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EagerAggregate {
    pub function: AggregateFunction,
    pub relation: String,
    pub column: String,
}

/// Right-hand side of an UPDATE assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `col = ?`
    Value(Value),
    /// `col = col + ?`
    Increment(Value),
    /// `col = col - ?`
    Decrement(Value),
}

// ============================================================================
// Query
// ============================================================================

/// Everything a grammar needs to compile one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub table: Option<String>,
    pub columns: Vec<Selectable>,
    pub distinct: bool,
    pub joins: Vec<JoinClause>,
    pub wheres: Vec<WhereClause>,
    pub groups: Vec<String>,
    pub havings: Vec<WhereClause>,
    pub orders: Vec<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<Lock>,
    pub aggregate: Option<Aggregate>,
    /// Relation names for eager loading, insertion ordered, no duplicates.
    pub eager_loads: Vec<String>,
    pub eager_aggregates: BTreeMap<String, EagerAggregate>,
    pub model: Option<ModelMeta>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table name, or a compilation error when none was set.
    pub fn table_name(&self) -> Result<&str, crate::Error> {
        self.table
            .as_deref()
            .ok_or_else(|| crate::Error::compilation("no table set on query builder"))
    }
}
