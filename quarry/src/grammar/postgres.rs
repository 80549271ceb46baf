//! PostgreSQL dialect.
//!
//! Placeholders are still emitted as `?`; the connection renumbers them to
//! `$1, $2, ...` right before execution.

use super::Grammar;
use crate::query::{DatePart, Lock, Query};
use crate::{Row, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl Grammar for PostgresGrammar {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn random_function(&self) -> &'static str {
        "RANDOM()"
    }

    fn compile_lock(&self, lock: Lock) -> &'static str {
        match lock {
            Lock::Update => "FOR UPDATE",
            Lock::Shared => "FOR SHARE",
        }
    }

    fn compile_date_condition(&self, part: DatePart, column: &str, operator: &str) -> String {
        match part {
            DatePart::Date => format!("{}::date {} ?::date", column, operator),
            DatePart::Time => format!("{}::time {} ?::time", column, operator),
            DatePart::Year => format!("EXTRACT(YEAR FROM {}) {} ?", column, operator),
            DatePart::Month => format!("EXTRACT(MONTH FROM {}) {} ?", column, operator),
            DatePart::Day => format!("EXTRACT(DAY FROM {}) {} ?", column, operator),
        }
    }

    fn compile_regexp(&self, column: &str, negated: bool) -> Option<String> {
        Some(format!("{} {} ?", column, if negated { "!~" } else { "~" }))
    }

    fn compile_truncate(&self, table: &str) -> String {
        format!("TRUNCATE {} RESTART IDENTITY CASCADE", self.wrap_table(table))
    }

    fn compile_table_listing(&self) -> String {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' ORDER BY table_name"
            .to_string()
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT column_name AS name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = ? ORDER BY ordinal_position"
                .to_string(),
            vec![Value::from(table)],
        )
    }

    fn row_identifier(&self) -> Option<&'static str> {
        Some("ctid")
    }

    /// Postgres has no last-insert-id; the key comes back as a result row.
    fn compile_insert_get_id(&self, query: &Query, row: &Row, sequence: &str) -> (String, Vec<Value>) {
        let (sql, bindings) = self.compile_insert(query, std::slice::from_ref(row));
        (format!("{} RETURNING {}", sql, self.wrap(sequence)), bindings)
    }
}
