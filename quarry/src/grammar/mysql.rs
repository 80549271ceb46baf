//! MySQL dialect.
//!
//! MySQL supports joins, ORDER BY and LIMIT on UPDATE/DELETE directly, so
//! those statements are compiled natively instead of through a row-id
//! sub-select.

use super::{Grammar, compile_assignments, compile_joins, compile_orders, compile_wheres, table_reference};
use crate::query::{Assignment, DatePart, Lock, Query};
use crate::{Row, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl Grammar for MySqlGrammar {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn random_function(&self) -> &'static str {
        "RAND()"
    }

    fn compile_lock(&self, lock: Lock) -> &'static str {
        match lock {
            Lock::Update => "FOR UPDATE",
            Lock::Shared => "LOCK IN SHARE MODE",
        }
    }

    /// MySQL has no OFFSET without LIMIT; the max u64 stands for "all rows".
    fn compile_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, Some(offset)) => format!("LIMIT 18446744073709551615 OFFSET {}", offset),
            (Some(limit), Some(offset)) => format!("LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!("LIMIT {}", limit),
            (None, None) => String::new(),
        }
    }

    fn compile_date_condition(&self, part: DatePart, column: &str, operator: &str) -> String {
        let function = match part {
            DatePart::Date => "DATE",
            DatePart::Time => "TIME",
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
        };
        format!("{}({}) {} ?", function, column, operator)
    }

    fn compile_truncate(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {}", self.wrap_table(table))
    }

    fn compile_table_listing(&self) -> String {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name"
            .to_string()
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<Value>) {
        (
            "SELECT column_name AS name FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
                .to_string(),
            vec![Value::from(table)],
        )
    }

    fn compile_empty_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", table)
    }

    fn compile_insert_or_ignore(&self, query: &Query, rows: &[Row]) -> (String, Vec<Value>) {
        let (sql, bindings) = self.compile_insert(query, rows);
        (sql.replacen("INSERT INTO", "INSERT IGNORE INTO", 1), bindings)
    }

    fn compile_upsert(
        &self,
        query: &Query,
        rows: &[Row],
        _unique_by: &[&str],
        update: &[&str],
    ) -> (String, Vec<Value>) {
        if update.is_empty() {
            return self.compile_insert_or_ignore(query, rows);
        }

        let (sql, bindings) = self.compile_insert(query, rows);
        let assignments = update
            .iter()
            .map(|column| {
                let wrapped = self.wrap(column);
                format!("{} = VALUES({})", wrapped, wrapped)
            })
            .collect::<Vec<_>>()
            .join(", ");

        (format!("{} ON DUPLICATE KEY UPDATE {}", sql, assignments), bindings)
    }

    fn compile_update(&self, query: &Query, values: &[(String, Assignment)]) -> (String, Vec<Value>) {
        let mut parts = vec![format!("UPDATE {}", self.wrap_table(query.table.as_deref().unwrap_or_default()))];

        let joins = compile_joins(self, &query.joins);
        if !joins.is_empty() {
            parts.push(joins);
        }

        let mut bindings = Vec::new();
        parts.push(format!("SET {}", compile_assignments(self, values, &mut bindings, !query.joins.is_empty())));

        let wheres = compile_wheres(self, query, &mut bindings);
        if !wheres.is_empty() {
            parts.push(wheres);
        }

        // ORDER BY / LIMIT are rejected by MySQL on multi-table updates.
        if query.joins.is_empty() {
            push_order_and_limit(self, query, &mut parts, &mut bindings);
        }

        (parts.join(" "), bindings)
    }

    fn compile_delete(&self, query: &Query) -> (String, Vec<Value>) {
        let table_name = query.table.as_deref().unwrap_or_default();
        let table = self.wrap_table(table_name);
        let mut bindings = Vec::new();

        let mut parts = if query.joins.is_empty() {
            vec![format!("DELETE FROM {}", table)]
        } else {
            vec![
                format!("DELETE {} FROM {}", self.wrap(table_reference(table_name)), table),
                compile_joins(self, &query.joins),
            ]
        };

        let wheres = compile_wheres(self, query, &mut bindings);
        if !wheres.is_empty() {
            parts.push(wheres);
        }

        if query.joins.is_empty() {
            push_order_and_limit(self, query, &mut parts, &mut bindings);
        }

        (parts.join(" "), bindings)
    }
}

fn push_order_and_limit(grammar: &MySqlGrammar, query: &Query, parts: &mut Vec<String>, bindings: &mut Vec<Value>) {
    let orders = compile_orders(grammar, &query.orders, bindings);
    if !orders.is_empty() {
        parts.push(orders);
    }
    if let Some(limit) = query.limit {
        parts.push(format!("LIMIT {}", limit));
    }
}
