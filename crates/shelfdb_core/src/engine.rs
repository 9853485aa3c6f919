//! The engine: owner of all databases, connections and transactions.
//!
//! Engine handles are cheap to clone and share one state behind a mutex.
//! Nothing runs on its own: the caller drives the executor with
//! [`Engine::run_once`], [`Engine::run_until_idle`] or one of the `wait`
//! helpers on request handles.

use crate::config::Config;
use crate::cursor::CursorState;
use crate::database::{ConnectionState, DatabaseInfo, DatabaseState};
use crate::error::CoreResult;
use crate::factory::OpenState;
use crate::key::Key;
use crate::request::RequestState;
use crate::stats::{EngineStats, StatsSnapshot};
use crate::transaction::{Scheduler, TransactionState};
use crate::types::{ConnectionId, CursorId, IdAllocator, OpenId, RequestId, TransactionId};
use parking_lot::{Mutex, MutexGuard};
use shelfdb_codec::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Everything the engine knows, guarded by one lock.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) config: Config,
    pub(crate) stats: Arc<EngineStats>,
    pub(crate) ids: IdAllocator,
    pub(crate) databases: HashMap<String, DatabaseState>,
    pub(crate) connections: HashMap<ConnectionId, ConnectionState>,
    pub(crate) opens: HashMap<OpenId, OpenState>,
    /// Open and delete requests waiting per database, in arrival order.
    pub(crate) pending_opens: HashMap<String, VecDeque<OpenId>>,
    pub(crate) transactions: HashMap<TransactionId, TransactionState>,
    pub(crate) requests: HashMap<RequestId, RequestState>,
    pub(crate) cursors: HashMap<CursorId, CursorState>,
    pub(crate) scheduler: Scheduler,
}

impl EngineState {
    fn new(config: Config, stats: Arc<EngineStats>) -> Self {
        Self {
            config,
            stats,
            ids: IdAllocator::default(),
            databases: HashMap::new(),
            connections: HashMap::new(),
            opens: HashMap::new(),
            pending_opens: HashMap::new(),
            transactions: HashMap::new(),
            requests: HashMap::new(),
            cursors: HashMap::new(),
            scheduler: Scheduler::default(),
        }
    }
}

/// The ShelfDB engine.
///
/// # Example
///
/// ```rust,ignore
/// use shelfdb_core::{Engine, StoreOptions};
///
/// let engine = Engine::new();
/// let open = engine.open("library", Some(1))?;
/// open.on_upgrade_needed(|event| {
///     if let Some(txn) = &event.transaction {
///         txn.create_object_store("books", &StoreOptions::new().auto_increment(true)).ok();
///     }
/// });
/// let conn = open.wait()?;
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Mutex<EngineState>>,
    stats: Arc<EngineStats>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        let stats = Arc::new(EngineStats::new());
        Self {
            inner: Arc::new(Mutex::new(EngineState::new(config, Arc::clone(&stats)))),
            stats,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.lock()
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        self.lock().config.clone()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Compares two values as keys.
    ///
    /// Fails with a data error if either value is not a valid key.
    pub fn cmp(&self, a: &Value, b: &Value) -> CoreResult<Ordering> {
        crate::key::compare(a, b)
    }

    /// Converts a value into a key.
    pub fn key(&self, value: &Value) -> CoreResult<Key> {
        Key::from_value(value)
    }

    /// Names of all databases, sorted.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().databases.keys().cloned().collect();
        names.sort();
        names
    }

    /// Summary of a database's committed state.
    #[must_use]
    pub fn database_info(&self, name: &str) -> Option<DatabaseInfo> {
        self.lock().databases.get(name).map(DatabaseState::info)
    }

    /// Number of tasks waiting on the executor.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.lock().scheduler.pending_tasks()
    }
}
