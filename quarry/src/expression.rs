//! Raw SQL fragments.

use std::fmt;

/// A SQL fragment inserted verbatim: no identifier quoting, no binding.
///
/// ```rust,ignore
/// use quarry::raw;
///
/// conn.table("users").select_raw("COUNT(*) AS total", vec![]).get().await?;
/// conn.table("users").order_by_raw(raw("FIELD(status, ?, ?)"), vec!["a".into(), "b".into()]).get().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expression {
    sql: String,
}

impl Expression {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

impl From<&str> for Expression {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Expression {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

/// Shorthand for [`Expression::new`].
pub fn raw(sql: impl Into<String>) -> Expression {
    Expression::new(sql)
}
