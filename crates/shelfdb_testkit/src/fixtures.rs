//! Test fixtures and engine helpers.
//!
//! Provides convenience functions for setting up databases with a known
//! schema and for collecting what listeners observe.

use parking_lot::Mutex;
use shelfdb_core::{
    Connection, Direction, Engine, IndexOptions, Key, KeyRange, Outcome, Request, StoreOptions,
    Transaction, TransactionMode, TransactionStatus, Value,
};
use std::sync::Arc;

/// Name of the database every fixture opens.
pub const TEST_DATABASE: &str = "test";

/// An engine with one open connection.
pub struct TestEngine {
    /// The engine instance.
    pub engine: Engine,
    /// Connection to [`TEST_DATABASE`].
    pub conn: Connection,
}

impl TestEngine {
    /// Opens [`TEST_DATABASE`] at `version`, running `upgrade` inside the
    /// upgrade transaction.
    pub fn open<F>(engine: Engine, version: u64, mut upgrade: F) -> Self
    where
        F: FnMut(&Transaction) + Send + 'static,
    {
        let open = engine
            .open(TEST_DATABASE, Some(version))
            .expect("Failed to request open");
        open.on_upgrade_needed(move |event| {
            if let Some(txn) = &event.transaction {
                upgrade(txn);
            }
        });
        let conn = open.wait().expect("Failed to open database");
        Self { engine, conn }
    }

    /// A database with a single store.
    pub fn with_store(name: &str, options: StoreOptions) -> Self {
        let name = name.to_string();
        Self::open(Engine::new(), 1, move |txn| {
            txn.create_object_store(&name, &options)
                .expect("Failed to create store");
        })
    }

    /// A database with a single store and one index on it.
    pub fn with_index(store: &str, options: StoreOptions, index: &str, key_path: &str, index_options: IndexOptions) -> Self {
        let (store, index, key_path) = (store.to_string(), index.to_string(), key_path.to_string());
        Self::open(Engine::new(), 1, move |txn| {
            txn.create_object_store(&store, &options)
                .expect("Failed to create store")
                .create_index(&index, key_path.as_str(), index_options)
                .expect("Failed to create index");
        })
    }

    /// Starts a transaction over one store.
    pub fn transaction(&self, store: &str, mode: TransactionMode) -> Transaction {
        self.conn
            .transaction(&[store], mode)
            .expect("Failed to start transaction")
    }

    /// Drives the executor until nothing is left to do.
    pub fn run(&self) {
        self.engine.run_until_idle().expect("Executor did not settle");
    }

    /// Puts every value in one read-write transaction and returns the keys
    /// in order.
    pub fn put_all(&self, store: &str, values: Vec<Value>) -> Vec<Key> {
        let txn = self.transaction(store, TransactionMode::ReadWrite);
        let handle = txn.object_store(store).expect("Missing store");
        let requests: Vec<Request> = values
            .into_iter()
            .map(|value| handle.put(value, None).expect("Failed to queue put"))
            .collect();
        self.run();
        assert_eq!(txn.status(), TransactionStatus::Committed);
        requests
            .iter()
            .map(|r| {
                r.result()
                    .expect("Put failed")
                    .key()
                    .cloned()
                    .expect("Put returned no key")
            })
            .collect()
    }

    /// Reads every record of a store in key order.
    pub fn read_all(&self, store: &str) -> Vec<(Key, Value)> {
        let txn = self.transaction(store, TransactionMode::ReadOnly);
        let request = txn
            .object_store(store)
            .expect("Missing store")
            .open_cursor(KeyRange::all(), Direction::Next)
            .expect("Failed to open cursor");
        let steps = collect_cursor(&request);
        self.run();
        steps
            .take()
            .into_iter()
            .map(|s| (s.primary_key, s.value.expect("Record cursor without value")))
            .collect()
    }

    /// Counts the records of a store.
    pub fn count(&self, store: &str) -> usize {
        let txn = self.transaction(store, TransactionMode::ReadOnly);
        let request = txn
            .object_store(store)
            .expect("Missing store")
            .count(KeyRange::all())
            .expect("Failed to queue count");
        self.run();
        request
            .result()
            .expect("Count failed")
            .count()
            .expect("Count returned no number")
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Engine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// A shared list listeners can push into.
#[derive(Debug)]
pub struct Collector<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for Collector<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }
}

impl<T: Clone> Collector<T> {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item.
    pub fn push(&self, item: T) {
        self.0.lock().push(item);
    }

    /// Number of collected items.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// A copy of the collected items.
    pub fn items(&self) -> Vec<T> {
        self.0.lock().clone()
    }

    /// Removes and returns the collected items.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.0.lock())
    }
}

/// One position reported by a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorStep {
    /// Cursor key; the index key for index cursors.
    pub key: Key,
    /// Primary key of the record.
    pub primary_key: Key,
    /// Record value, `None` for key cursors.
    pub value: Option<Value>,
}

/// Walks a cursor to the end, recording every position.
pub fn collect_cursor(request: &Request) -> Collector<CursorStep> {
    walk_cursor(request, |cursor| cursor.continue_().expect("Failed to continue"))
}

/// Records every cursor position and lets `step` decide how to move on.
pub fn walk_cursor<F>(request: &Request, mut step: F) -> Collector<CursorStep>
where
    F: FnMut(&shelfdb_core::Cursor) + Send + 'static,
{
    let steps = Collector::new();
    let sink = steps.clone();
    request.on_success(move |event| {
        if let Ok(Outcome::Cursor(Some(cursor))) = event.request.result() {
            if let (Some(key), Some(primary_key)) = (cursor.key(), cursor.primary_key()) {
                sink.push(CursorStep {
                    key,
                    primary_key,
                    value: cursor.value(),
                });
            }
            step(&cursor);
        }
    });
    steps
}

/// A record with an `id` and a `tag` field.
pub fn tagged(id: impl Into<Value>, tag: &str) -> Value {
    Value::map([("id", id.into()), ("tag", Value::from(tag))])
}
