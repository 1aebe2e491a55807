//! Engine counters for query volume and data-quality signals.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by every query an engine runs.
#[derive(Debug, Default)]
pub struct EngineStats {
    queries_total: AtomicU64,
    queries_failed: AtomicU64,
    queries_timed_out: AtomicU64,
    series_scanned: AtomicU64,
    counter_resets: AtomicU64,
    unanchored_steps: AtomicU64,
    non_monotonic_buckets: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatsSnapshot {
    pub queries_total: u64,
    pub queries_failed: u64,
    pub queries_timed_out: u64,
    pub series_scanned: u64,
    /// Cumulative values that went down and were treated as restarts
    pub counter_resets: u64,
    /// First in-window samples dropped for lack of an earlier anchor
    pub unanchored_steps: u64,
    /// Histogram steps whose bucket counts had to be clamped upward
    pub non_monotonic_buckets: u64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.queries_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_series(&self, n: usize) {
        self.series_scanned.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_resets(&self, n: usize) {
        if n > 0 {
            self.counter_resets.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub fn record_unanchored(&self) {
        self.unanchored_steps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_non_monotonic(&self) {
        self.non_monotonic_buckets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            queries_total: self.queries_total.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            queries_timed_out: self.queries_timed_out.load(Ordering::Relaxed),
            series_scanned: self.series_scanned.load(Ordering::Relaxed),
            counter_resets: self.counter_resets.load(Ordering::Relaxed),
            unanchored_steps: self.unanchored_steps.load(Ordering::Relaxed),
            non_monotonic_buckets: self.non_monotonic_buckets.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = EngineStats::new();
        stats.record_query();
        stats.record_query();
        stats.record_failure();
        stats.record_resets(0);
        stats.record_resets(3);
        stats.record_non_monotonic();

        let snap = stats.snapshot();
        assert_eq!(snap.queries_total, 2);
        assert_eq!(snap.queries_failed, 1);
        assert_eq!(snap.counter_resets, 3);
        assert_eq!(snap.non_monotonic_buckets, 1);
        assert_eq!(snap.unanchored_steps, 0);
    }
}
