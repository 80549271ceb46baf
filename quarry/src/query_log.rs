//! # Query Log Module
//!
//! In-memory record of executed statements. A [`QueryLog`] is a cheap clonable
//! handle: a standalone connection owns its own log, while connections created
//! by a [`DatabaseManager`](crate::DatabaseManager) all share the manager's.
//!
//! Logging is on by default; `disable` stops recording without dropping the
//! entries already collected. Entries are appended only for statements that
//! succeeded.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::Value;

/// One executed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLogEntry {
    pub sql: String,
    pub bindings: Vec<Value>,
    /// Wall-clock execution time in milliseconds.
    pub time_ms: f64,
}

#[derive(Debug)]
struct QueryLogInner {
    enabled: bool,
    entries: Vec<QueryLogEntry>,
}

impl Default for QueryLogInner {
    fn default() -> Self {
        Self { enabled: true, entries: Vec::new() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    inner: Arc<Mutex<QueryLogInner>>,
}

impl QueryLog {
    /// A new, enabled log.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        let log = Self::new();
        log.disable();
        log
    }

    // A poisoned lock only means another thread panicked mid-push; the
    // entries are still usable.
    fn lock(&self) -> MutexGuard<'_, QueryLogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enable(&self) {
        self.lock().enabled = true;
    }

    pub fn disable(&self) {
        self.lock().enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Appends an entry if logging is enabled.
    pub fn record(&self, sql: &str, bindings: &[Value], time_ms: f64) {
        let mut inner = self.lock();
        if inner.enabled {
            inner.entries.push(QueryLogEntry { sql: sql.to_string(), bindings: bindings.to_vec(), time_ms });
        }
    }

    /// Copies the entries, oldest first.
    pub fn entries(&self) -> Vec<QueryLogEntry> {
        self.lock().entries.clone()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Whether two handles point at the same log.
    pub fn same_log(&self, other: &QueryLog) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_by_default_until_disabled() {
        let log = QueryLog::new();
        assert!(log.is_enabled());
        log.record("select ?", &[Value::Int(1)], 0.2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].bindings, vec![Value::Int(1)]);

        log.disable();
        log.record("select 1", &[], 0.1);
        assert_eq!(log.len(), 1);

        log.clear();
        assert!(log.is_empty());
        assert!(!log.is_enabled());
        assert!(!QueryLog::disabled().is_enabled());
    }

    #[test]
    fn clones_share_entries() {
        let log = QueryLog::new();
        let other = log.clone();
        other.record("select 1", &[], 1.0);
        assert_eq!(log.len(), 1);
        assert!(log.same_log(&other));
        assert!(!log.same_log(&QueryLog::new()));
    }
}
