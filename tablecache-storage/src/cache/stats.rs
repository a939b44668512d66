//! Coordinator usage counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-lifetime counters, updated atomically per operation.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot::from_counts(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.sets.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
        )
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// `hits / (hits + misses) * 100`, two decimals; 0 before any read.
    pub hit_rate_percentage: f64,
    pub total_requests: u64,
}

impl CacheStatsSnapshot {
    pub fn from_counts(hits: u64, misses: u64, sets: u64, deletes: u64) -> Self {
        let total_requests = hits + misses;
        let hit_rate_percentage = if total_requests == 0 {
            0.0
        } else {
            let rate = hits as f64 / total_requests as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        };
        Self {
            hits,
            misses,
            sets,
            deletes,
            hit_rate_percentage,
            total_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_three_of_four() {
        let counters = CacheCounters::new();
        for _ in 0..3 {
            counters.record_hit();
        }
        counters.record_miss();

        let stats = counters.snapshot();
        assert_eq!(stats.hit_rate_percentage, 75.0);
        assert_eq!(stats.total_requests, 4);
    }

    #[test]
    fn test_hit_rate_zero_without_requests() {
        let stats = CacheCounters::new().snapshot();
        assert_eq!(stats.hit_rate_percentage, 0.0);
        assert_eq!(stats.total_requests, 0);
    }

    #[test]
    fn test_hit_rate_rounds_to_two_decimals() {
        let stats = CacheStatsSnapshot::from_counts(1, 2, 0, 0);
        assert_eq!(stats.hit_rate_percentage, 33.33);
        let stats = CacheStatsSnapshot::from_counts(2, 1, 0, 0);
        assert_eq!(stats.hit_rate_percentage, 66.67);
    }

    #[test]
    fn test_deletes_accumulate() {
        let counters = CacheCounters::new();
        counters.record_deletes(1);
        counters.record_deletes(4);
        assert_eq!(counters.snapshot().deletes, 5);
    }
}
