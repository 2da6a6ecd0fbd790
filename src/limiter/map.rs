// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-table limiter registry.
//!
//! Keyed by table name, case-sensitive as provided. Entries appear when a
//! table's limits are first seen, are resized in place on every limits
//! update, and disappear when the server stops reporting throughput.

use std::sync::Arc;

use dashmap::DashMap;

use super::simple::SimpleRateLimiter;
use super::RateLimiter;

#[derive(Clone)]
struct LimiterPair {
    read: Arc<SimpleRateLimiter>,
    write: Arc<SimpleRateLimiter>,
}

/// Concurrent map of table name to read/write limiter pair.
#[derive(Default)]
pub struct RateLimiterMap {
    map: DashMap<String, LimiterPair>,
}

impl RateLimiterMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_read_limiter(&self, table: &str) -> Option<Arc<dyn RateLimiter>> {
        self.map.get(table).map(|e| {
            let limiter: Arc<dyn RateLimiter> = e.read.clone();
            limiter
        })
    }

    #[must_use]
    pub fn get_write_limiter(&self, table: &str) -> Option<Arc<dyn RateLimiter>> {
        self.map.get(table).map(|e| {
            let limiter: Arc<dyn RateLimiter> = e.write.clone();
            limiter
        })
    }

    /// Create or resize the pair for `table`.
    ///
    /// Existing limiters are adjusted in place so handles already resolved
    /// by in-flight requests observe the new capacity, and the current
    /// utilization percentage carries over.
    pub fn update(&self, table: &str, read_units: f64, write_units: f64, duration_secs: u32) {
        if let Some(entry) = self.map.get(table) {
            entry.read.update_limit(read_units, duration_secs);
            entry.write.update_limit(write_units, duration_secs);
            return;
        }
        self.map.insert(
            table.to_owned(),
            LimiterPair {
                read: Arc::new(SimpleRateLimiter::new(read_units, duration_secs)),
                write: Arc::new(SimpleRateLimiter::new(write_units, duration_secs)),
            },
        );
    }

    pub fn remove(&self, table: &str) {
        self.map.remove(table);
    }

    /// Restore both buckets for `table` to full capacity.
    pub fn reset(&self, table: &str) {
        if let Some(entry) = self.map.get(table) {
            entry.read.reset();
            entry.write.reset();
        }
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_miss_returns_none() {
        let map = RateLimiterMap::new();
        assert!(map.get_read_limiter("users").is_none());
        assert!(map.get_write_limiter("users").is_none());
    }

    #[test]
    fn test_update_creates_pair() {
        let map = RateLimiterMap::new();
        map.update("users", 100.0, 50.0, 30);
        assert_eq!(map.get_read_limiter("users").unwrap().limit_per_second(), 100.0);
        assert_eq!(map.get_write_limiter("users").unwrap().limit_per_second(), 50.0);
    }

    #[test]
    fn test_update_resizes_existing_handles() {
        let map = RateLimiterMap::new();
        map.update("users", 100.0, 50.0, 30);
        let read = map.get_read_limiter("users").unwrap();
        map.update("users", 400.0, 200.0, 30);
        // the old handle sees the new limit
        assert_eq!(read.limit_per_second(), 400.0);
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let map = RateLimiterMap::new();
        map.update("Users", 100.0, 100.0, 30);
        assert!(map.get_read_limiter("users").is_none());
        assert!(map.get_read_limiter("Users").is_some());
    }

    #[test]
    fn test_remove_and_clear() {
        let map = RateLimiterMap::new();
        map.update("a", 1.0, 1.0, 30);
        map.update("b", 1.0, 1.0, 30);
        map.remove("a");
        assert!(map.get_read_limiter("a").is_none());
        assert_eq!(map.len(), 1);
        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_reset_restores_capacity() {
        let map = RateLimiterMap::new();
        map.update("users", 100.0, 100.0, 30);
        let read = map.get_read_limiter("users").unwrap();
        read.set_current_rate(100.0);
        map.reset("users");
        assert!(read.current_rate() <= 0.0);
    }
}
