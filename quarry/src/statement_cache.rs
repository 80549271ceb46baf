//! # Statement Cache Module
//!
//! Bounded LRU cache of prepared statements, keyed by the exact SQL text.
//! The cache is owned by a single connection, so it needs no locking; the
//! connection hands out `&mut` access while executing.
//!
//! The cache is generic over the statement type so eviction can be tested
//! without a database.
//!
//! ## Interaction with sqlx
//!
//! Through the `Any` driver a cached handle still executes by SQL text, and
//! sqlx keeps its own per-connection prepared-statement cache keyed the same
//! way. This cache therefore bounds the handles and counters the connection
//! reports, not server-side resources: evicting an entry frees nothing on
//! the server, and every miss costs one extra prepare round trip before the
//! statement runs.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

/// Default number of prepared statements kept per connection.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 100;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug)]
pub struct StatementCache<S> {
    capacity: usize,
    map: HashMap<String, S>,
    /// Least recently used at the front.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl<S> StatementCache<S> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, map: HashMap::new(), order: VecDeque::new(), hits: 0, misses: 0 }
    }

    /// Looks up `sql`, counting a hit or a miss. A hit becomes most recently used.
    pub fn get(&mut self, sql: &str) -> Option<&S> {
        if self.map.contains_key(sql) {
            self.hits += 1;
            self.touch(sql);
            self.map.get(sql)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Stores a freshly prepared statement, evicting the least recently used
    /// entries beyond capacity. With capacity 0 nothing is retained.
    pub fn insert(&mut self, sql: String, statement: S) {
        if self.map.insert(sql.clone(), statement).is_some() {
            self.touch(&sql);
        } else {
            self.order.push_back(sql);
        }
        self.evict_if_needed();
    }

    pub fn contains(&self, sql: &str) -> bool {
        self.map.contains_key(sql)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the bound, evicting immediately if the cache is over it.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.evict_if_needed();
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits, misses: self.misses, size: self.map.len(), max_size: self.capacity }
    }

    fn touch(&mut self, sql: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == sql)
            && let Some(key) = self.order.remove(pos)
        {
            self.order.push_back(key);
        }
    }

    fn evict_if_needed(&mut self) {
        if self.capacity == 0 {
            self.map.clear();
            self.order.clear();
            return;
        }

        while self.map.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
        }
    }
}

impl<S> Default for StatementCache<S> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_SIZE)
    }
}
