//! Pool statistics
//!
//! Counters updated by workers as tasks are processed. Failures of individual
//! tasks never reach the submitter, so these counters and the log are the
//! only place they surface.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared by all workers of a pool
#[derive(Debug, Default)]
pub struct PoolStats {
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    handler_not_found: AtomicU64,
    dequeue_errors: AtomicU64,
    overran_timeout: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_not_found(&self) {
        self.handler_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeue_error(&self) {
        self.dequeue_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overran_timeout(&self) {
        self.overran_timeout.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            handler_not_found: self.handler_not_found.load(Ordering::Relaxed),
            dequeue_errors: self.dequeue_errors.load(Ordering::Relaxed),
            overran_timeout: self.overran_timeout.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`PoolStats`] at one moment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatsSnapshot {
    /// Handler returned `Ok`
    pub completed: u64,
    /// Handler returned an error
    pub failed: u64,
    /// Handler panicked
    pub panicked: u64,
    /// No handler registered for the task key
    pub handler_not_found: u64,
    /// Dequeue failed for a reason other than an empty queue
    pub dequeue_errors: u64,
    /// Handler returned after its timeout (also counted in its outcome)
    pub overran_timeout: u64,
}

impl PoolStatsSnapshot {
    /// Tasks taken off a queue and dispatched, whatever the outcome
    pub fn processed(&self) -> u64 {
        self.completed + self.failed + self.panicked + self.handler_not_found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = PoolStats::new();
        stats.record_completed();
        stats.record_completed();
        stats.record_failed();
        stats.record_panicked();
        stats.record_handler_not_found();
        stats.record_dequeue_error();
        stats.record_overran_timeout();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.panicked, 1);
        assert_eq!(snapshot.handler_not_found, 1);
        assert_eq!(snapshot.dequeue_errors, 1);
        assert_eq!(snapshot.overran_timeout, 1);
        assert_eq!(snapshot.processed(), 5);
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(PoolStats::new().snapshot(), PoolStatsSnapshot::default());
    }
}
