//! Engine statistics.
//!
//! Counters are updated by the executor as it runs and can be read at any
//! time without taking the engine lock.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = Engine::new();
//! // ... run transactions ...
//! let stats = engine.stats();
//! println!("committed: {}", stats.transactions_committed);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Transactions admitted by the scheduler.
    transactions_started: AtomicU64,
    /// Transactions whose changes were published.
    transactions_committed: AtomicU64,
    /// Transactions aborted for any reason.
    transactions_aborted: AtomicU64,
    /// Transactions aborted by the idle watchdog.
    transactions_timed_out: AtomicU64,
    /// Request operations executed.
    requests_executed: AtomicU64,
    /// Request operations that failed.
    requests_failed: AtomicU64,
    /// Cursor open and iterate operations.
    cursor_steps: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_timeout(&self) {
        self.transactions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an executed request and whether it succeeded.
    pub(crate) fn record_request(&self, succeeded: bool) {
        self.requests_executed.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_cursor_step(&self) {
        self.cursor_steps.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            transactions_timed_out: self.transactions_timed_out.load(Ordering::Relaxed),
            requests_executed: self.requests_executed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            cursor_steps: self.cursor_steps.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of engine statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Transactions admitted by the scheduler.
    pub transactions_started: u64,
    /// Transactions whose changes were published.
    pub transactions_committed: u64,
    /// Transactions aborted for any reason, timeouts included.
    pub transactions_aborted: u64,
    /// Transactions aborted by the idle watchdog.
    pub transactions_timed_out: u64,
    /// Request operations executed.
    pub requests_executed: u64,
    /// Request operations that failed.
    pub requests_failed: u64,
    /// Cursor open and iterate operations.
    pub cursor_steps: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        assert_eq!(EngineStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_operations() {
        let stats = EngineStats::new();
        stats.record_transaction_start();
        stats.record_transaction_start();
        stats.record_transaction_commit();
        stats.record_transaction_abort();
        stats.record_transaction_timeout();
        stats.record_request(true);
        stats.record_request(false);
        stats.record_cursor_step();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.transactions_started, 2);
        assert_eq!(snapshot.transactions_committed, 1);
        assert_eq!(snapshot.transactions_aborted, 1);
        assert_eq!(snapshot.transactions_timed_out, 1);
        assert_eq!(snapshot.requests_executed, 2);
        assert_eq!(snapshot.requests_failed, 1);
        assert_eq!(snapshot.cursor_steps, 1);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(StatsSnapshot::default()).unwrap();
        assert!(json.get("transactionsTimedOut").is_some());
    }
}
