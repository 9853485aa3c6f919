//! Stress tests for ShelfDB.
//!
//! These tests verify behavior under many overlapping transactions and
//! handles shared across threads.

use crate::fixtures::{collect_cursor, TestEngine};
use shelfdb_core::{
    Direction, Engine, Key, KeyRange, Outcome, StoreOptions, TransactionMode, TransactionStatus,
    Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions run.
    pub total_ops: usize,
    /// Transactions that committed.
    pub successful_ops: usize,
    /// Transactions that aborted.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Transactions per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Transactions: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Aborted: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} txn/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of transactions to run.
    pub transactions: usize,
    /// Number of threads placing transactions.
    pub threads: usize,
    /// Number of distinct records.
    pub record_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transactions: 200,
            threads: 4,
            record_count: 100,
        }
    }
}

const COUNTER_STORE: &str = "counters";

/// A database with an out-of-line keyed counter store.
pub fn counter_engine() -> TestEngine {
    TestEngine::with_store(COUNTER_STORE, StoreOptions::new())
}

fn tally(statuses: impl IntoIterator<Item = TransactionStatus>, start: Instant) -> StressTestResult {
    let (mut committed, mut aborted) = (0, 0);
    for status in statuses {
        match status {
            TransactionStatus::Committed => committed += 1,
            _ => aborted += 1,
        }
    }
    StressTestResult::new(committed, aborted, start.elapsed())
}

/// Runs read-modify-write increments of one counter, each in its own
/// transaction, all queued before the executor runs.
///
/// Read-write transactions on one store are serialized, so the counter
/// ends at `config.transactions`.
pub fn stress_serialized_increments(db: &TestEngine, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let transactions: Vec<_> = (0..config.transactions)
        .map(|_| {
            let txn = db.transaction(COUNTER_STORE, TransactionMode::ReadWrite);
            let store = txn.object_store(COUNTER_STORE).expect("Missing store");
            let writer = store.clone();
            store
                .get(Key::from(0))
                .expect("Failed to queue get")
                .on_success(move |event| {
                    let current = match event.request.result() {
                        Ok(Outcome::Value(Some(v))) => v.as_number().unwrap_or(0.0),
                        _ => 0.0,
                    };
                    writer
                        .put(Value::from(current + 1.0), Some(Key::from(0)))
                        .expect("Failed to queue put");
                });
            txn
        })
        .collect();
    db.run();
    tally(transactions.iter().map(|t| t.status()), start)
}

/// Places transactions from several threads sharing one engine, then
/// drives the executor.
pub fn stress_concurrent_writers(engine: Engine, db: &TestEngine, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let placed = Arc::new(AtomicUsize::new(0));
    let per_thread = config.transactions / config.threads.max(1);
    let record_count = config.record_count.max(1);

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let conn = db.conn.clone();
            let placed = Arc::clone(&placed);
            thread::spawn(move || {
                let mut txns = Vec::with_capacity(per_thread);
                for i in 0..per_thread {
                    let txn = conn
                        .transaction(&[COUNTER_STORE], TransactionMode::ReadWrite)
                        .expect("Failed to start transaction");
                    let key = Key::from(((t * per_thread + i) % record_count) as u32);
                    txn.object_store(COUNTER_STORE)
                        .and_then(|s| s.put(Value::from(t as u32), Some(key)))
                        .expect("Failed to queue put");
                    placed.fetch_add(1, Ordering::Relaxed);
                    txns.push(txn);
                }
                txns
            })
        })
        .collect();

    let transactions: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("Thread panicked"))
        .collect();
    assert_eq!(placed.load(Ordering::Relaxed), transactions.len());
    engine.run_until_idle().expect("Executor did not settle");
    tally(transactions.iter().map(|t| t.status()), start)
}

/// Aborts every other transaction from inside its first callback.
pub fn stress_transaction_aborts(db: &TestEngine, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let transactions: Vec<_> = (0..config.transactions)
        .map(|i| {
            let txn = db.transaction(COUNTER_STORE, TransactionMode::ReadWrite);
            let request = txn
                .object_store(COUNTER_STORE)
                .and_then(|s| s.put(Value::from(i as u32), Some(Key::from(i as u32))))
                .expect("Failed to queue put");
            if i % 2 == 1 {
                request.on_success(|event| {
                    event
                        .request
                        .transaction()
                        .abort()
                        .expect("Failed to abort");
                });
            }
            txn
        })
        .collect();
    db.run();
    tally(transactions.iter().map(|t| t.status()), start)
}

/// Scans the whole store with a cursor in both directions.
pub fn stress_cursor_scans(db: &TestEngine, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut statuses = Vec::new();
    for direction in [Direction::Next, Direction::Prev] {
        let txn = db.transaction(COUNTER_STORE, TransactionMode::ReadOnly);
        let request = txn
            .object_store(COUNTER_STORE)
            .and_then(|s| s.open_cursor(KeyRange::all(), direction))
            .expect("Failed to open cursor");
        let steps = collect_cursor(&request);
        db.run();
        assert_eq!(steps.len(), config.record_count);
        statuses.push(txn.status());
    }
    tally(statuses, start)
}
