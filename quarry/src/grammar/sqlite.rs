//! SQLite dialect.

use super::Grammar;
use crate::query::{DatePart, Lock, Query};
use crate::{Row, Value};

/// SQLite grammar: `"` quoting, `RANDOM()`, no row locks, `strftime` dates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

impl Grammar for SqliteGrammar {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn random_function(&self) -> &'static str {
        "RANDOM()"
    }

    fn compile_lock(&self, _lock: Lock) -> &'static str {
        ""
    }

    /// SQLite needs a LIMIT before an OFFSET; `-1` means unbounded.
    fn compile_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, Some(offset)) => format!("LIMIT -1 OFFSET {}", offset),
            (Some(limit), Some(offset)) => format!("LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!("LIMIT {}", limit),
            (None, None) => String::new(),
        }
    }

    fn compile_date_condition(&self, part: DatePart, column: &str, operator: &str) -> String {
        let format = match part {
            DatePart::Date => "%Y-%m-%d",
            DatePart::Time => "%H:%M:%S",
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
        };
        format!("strftime('{}', {}) {} CAST(? AS TEXT)", format, column, operator)
    }

    /// `strftime('%m')` yields `"03"`, so integer months and days are padded.
    fn date_binding(&self, part: DatePart, value: Value) -> Value {
        match (part, value) {
            (DatePart::Month | DatePart::Day, Value::Int(n)) => Value::Text(format!("{:02}", n)),
            (_, value) => value,
        }
    }

    fn compile_truncate(&self, table: &str) -> String {
        format!("DELETE FROM {}", self.wrap_table(table))
    }

    fn compile_table_listing(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name".to_string()
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<Value>) {
        ("SELECT name FROM pragma_table_info(?)".to_string(), vec![Value::from(table)])
    }

    fn row_identifier(&self) -> Option<&'static str> {
        Some("rowid")
    }

    /// The `Any` driver drops SQLite's last insert rowid, so the key is read
    /// back with `RETURNING` (SQLite 3.35+).
    fn compile_insert_get_id(&self, query: &Query, row: &Row, sequence: &str) -> (String, Vec<Value>) {
        let (sql, bindings) = self.compile_insert(query, std::slice::from_ref(row));
        (format!("{} RETURNING {}", sql, self.wrap(sequence)), bindings)
    }

    /// SQLite ships without a `REGEXP` function.
    fn compile_regexp(&self, _column: &str, _negated: bool) -> Option<String> {
        None
    }
}
