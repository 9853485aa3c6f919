//! Databases, schemas and connections.
//!
//! A database is a name, a version and a [`Schema`]: the set of record
//! stores with their indexes. The authoritative schema is only replaced at
//! commit time; transactions work on views of it.

use crate::engine::{Engine, EngineState};
use crate::error::{CoreError, CoreResult};
use crate::events::{CloseEvent, ListenerId, Listeners, VersionChangeEvent};
use crate::key::KeyPath;
use crate::store::RecordStore;
use crate::transaction::{Transaction, TransactionMode, TransactionState};
use crate::types::{ConnectionId, TransactionId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A set of named record stores.
///
/// Stores are shared between the database and transaction views until a
/// view writes to one, at which point the view gets its own copy.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    stores: BTreeMap<String, Arc<RecordStore>>,
}

impl Schema {
    /// Looks up a store.
    pub fn store(&self, name: &str) -> CoreResult<&RecordStore> {
        self.stores
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| CoreError::invalid_state(format!("object store '{name}' has been deleted")))
    }

    /// Looks up a store for writing, copying it out of shared state first.
    pub fn store_mut(&mut self, name: &str) -> CoreResult<&mut RecordStore> {
        self.stores
            .get_mut(name)
            .map(Arc::make_mut)
            .ok_or_else(|| CoreError::invalid_state(format!("object store '{name}' has been deleted")))
    }

    /// Whether a store exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Store names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    /// Iterates the stores in name order.
    pub fn stores(&self) -> impl Iterator<Item = &RecordStore> {
        self.stores.values().map(Arc::as_ref)
    }

    /// Number of stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether the schema has no stores.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Adds or replaces a store.
    pub fn insert(&mut self, store: RecordStore) {
        self.stores.insert(store.name().to_string(), Arc::new(store));
    }

    /// Removes a store.
    pub fn remove(&mut self, name: &str) -> Option<RecordStore> {
        self.stores
            .remove(name)
            .map(|store| Arc::try_unwrap(store).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// A schema sharing only the named stores.
    pub(crate) fn subset(&self, names: &[String]) -> Schema {
        let stores = names
            .iter()
            .filter_map(|name| {
                self.stores
                    .get(name)
                    .map(|store| (name.clone(), Arc::clone(store)))
            })
            .collect();
        Schema { stores }
    }

    /// Copies back every store the view wrote to.
    pub(crate) fn merge_changes(&mut self, view: Schema) {
        for (name, store) in view.stores {
            let changed = self
                .stores
                .get(&name)
                .map_or(true, |current| !Arc::ptr_eq(current, &store));
            if changed {
                self.stores.insert(name, store);
            }
        }
    }

    /// Summarizes every store and index.
    #[must_use]
    pub fn describe(&self) -> Vec<StoreInfo> {
        self.stores()
            .map(|store| StoreInfo {
                name: store.name().to_string(),
                key_path: store.key_path().cloned(),
                auto_increment: store.auto_increment(),
                records: store.len(),
                next_key: store.next_key(),
                indexes: store
                    .indexes()
                    .map(|index| IndexInfo {
                        name: index.name().to_string(),
                        key_path: index.key_path().clone(),
                        unique: index.is_unique(),
                        multi_entry: index.is_multi_entry(),
                        entries: index.len(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Summary of one database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Committed version.
    pub version: u64,
    /// Open connections.
    pub connections: usize,
    /// Stores in name order.
    pub stores: Vec<StoreInfo>,
}

/// Summary of one record store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfo {
    /// Store name.
    pub name: String,
    /// In-line key path.
    pub key_path: Option<KeyPath>,
    /// Whether keys are generated.
    pub auto_increment: bool,
    /// Number of records.
    pub records: usize,
    /// Next generated key.
    pub next_key: u64,
    /// Indexes in name order.
    pub indexes: Vec<IndexInfo>,
}

/// Summary of one index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Key path the index derives keys from.
    pub key_path: KeyPath,
    /// Unique flag.
    pub unique: bool,
    /// Multi-entry flag.
    pub multi_entry: bool,
    /// Number of distinct index keys.
    pub entries: usize,
}

/// Engine-side state of a database.
#[derive(Debug)]
pub(crate) struct DatabaseState {
    pub(crate) name: String,
    pub(crate) version: u64,
    pub(crate) schema: Schema,
    pub(crate) connections: Vec<ConnectionId>,
    pub(crate) upgrading: Option<TransactionId>,
}

impl DatabaseState {
    pub(crate) fn new(name: impl Into<String>, version: u64, schema: Schema) -> Self {
        Self {
            name: name.into(),
            version,
            schema,
            connections: Vec::new(),
            upgrading: None,
        }
    }

    pub(crate) fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            name: self.name.clone(),
            version: self.version,
            connections: self.connections.len(),
            stores: self.schema.describe(),
        }
    }
}

/// Engine-side state of a connection.
#[derive(Debug)]
pub(crate) struct ConnectionState {
    pub(crate) database: String,
    pub(crate) version: u64,
    pub(crate) close_pending: bool,
    pub(crate) closed: bool,
    pub(crate) on_version_change: Listeners<VersionChangeEvent>,
    pub(crate) on_close: Listeners<CloseEvent>,
}

impl ConnectionState {
    pub(crate) fn new(database: impl Into<String>, version: u64) -> Self {
        Self {
            database: database.into(),
            version,
            close_pending: false,
            closed: false,
            on_version_change: Listeners::default(),
            on_close: Listeners::default(),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.closed && !self.close_pending
    }
}

impl EngineState {
    pub(crate) fn connection(&self, id: ConnectionId) -> CoreResult<&ConnectionState> {
        self.connections
            .get(&id)
            .ok_or_else(|| CoreError::invalid_state(format!("connection {id} does not exist")))
    }

    pub(crate) fn create_transaction(
        &mut self,
        connection: ConnectionId,
        names: Vec<String>,
        mode: TransactionMode,
    ) -> CoreResult<TransactionId> {
        let conn = self.connection(connection)?;
        if !conn.is_open() {
            return Err(CoreError::invalid_state("connection is closed"));
        }
        let db = self.databases.get(&conn.database).ok_or_else(|| {
            CoreError::invalid_state(format!("database '{}' has been deleted", conn.database))
        })?;
        if db.upgrading.is_some() {
            return Err(CoreError::invalid_state(format!(
                "database '{}' is being upgraded",
                db.name
            )));
        }
        if mode == TransactionMode::StructuralChange {
            return Err(CoreError::invalid_access(
                "structural-change transactions are only created by an upgrade",
            ));
        }
        if names.is_empty() {
            return Err(CoreError::invalid_access("transaction scope must not be empty"));
        }
        let mut scope = names;
        scope.sort();
        scope.dedup();
        if let Some(missing) = scope.iter().find(|name| !db.schema.contains(name)) {
            return Err(CoreError::store_not_found(missing));
        }

        let database = db.name.clone();
        let id = TransactionId::new(self.ids.next());
        self.transactions.insert(
            id,
            TransactionState::new(id, database, connection, mode, scope),
        );
        self.scheduler.submit(id);
        Ok(id)
    }

    /// Finalizes a close once the connection has no live transactions.
    pub(crate) fn try_finish_close(&mut self, id: ConnectionId) -> bool {
        let Some(conn) = self.connections.get(&id) else {
            return false;
        };
        if conn.closed || !conn.close_pending {
            return false;
        }
        let busy = self.scheduler.live().iter().any(|txn| {
            self.transactions
                .get(txn)
                .is_some_and(|t| t.connection == id)
        });
        if busy {
            return false;
        }
        let database = conn.database.clone();
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.closed = true;
        }
        if let Some(db) = self.databases.get_mut(&database) {
            db.connections.retain(|c| *c != id);
        }
        self.resume_opens(&database);
        true
    }
}

/// Handle to an open database connection.
///
/// # Example
///
/// ```rust,ignore
/// let conn = engine.open("library", Some(1))?.wait()?;
/// let txn = conn.transaction(&["books"], TransactionMode::ReadOnly)?;
/// let count = txn.object_store("books")?.count(KeyRange::all())?;
/// ```
#[derive(Clone)]
pub struct Connection {
    engine: Engine,
    id: ConnectionId,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

impl Connection {
    pub(crate) fn new(engine: Engine, id: ConnectionId) -> Self {
        Self { engine, id }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Name of the connected database.
    #[must_use]
    pub fn name(&self) -> String {
        self.engine
            .lock()
            .connections
            .get(&self.id)
            .map(|c| c.database.clone())
            .unwrap_or_default()
    }

    /// Database version this connection sees.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.engine
            .lock()
            .connections
            .get(&self.id)
            .map_or(0, |c| c.version)
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.engine
            .lock()
            .connections
            .get(&self.id)
            .map_or(true, |c| !c.is_open())
    }

    /// Names of the database's stores, sorted.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        let state = self.engine.lock();
        state
            .connections
            .get(&self.id)
            .and_then(|c| state.databases.get(&c.database))
            .map(|db| db.schema.names())
            .unwrap_or_default()
    }

    /// Starts a transaction over `names`.
    ///
    /// The transaction is admitted by the scheduler once no conflicting
    /// transaction is running. Structural-change transactions cannot be
    /// created here; they come from an upgrade.
    pub fn transaction<S: AsRef<str>>(
        &self,
        names: &[S],
        mode: TransactionMode,
    ) -> CoreResult<Transaction> {
        let names = names.iter().map(|n| n.as_ref().to_string()).collect();
        let mut state = self.engine.lock();
        let id = state.create_transaction(self.id, names, mode)?;
        Ok(state.transaction_handle(&self.engine, id))
    }

    /// Closes the connection.
    ///
    /// The close completes once every transaction created through this
    /// connection has finished. No new transactions can be started.
    pub fn close(&self) {
        let closed = {
            let mut state = self.engine.lock();
            let pending = match state.connections.get_mut(&self.id) {
                Some(conn) if !conn.closed => {
                    conn.close_pending = true;
                    true
                }
                _ => false,
            };
            pending && state.try_finish_close(self.id)
        };
        if closed {
            self.engine.notify_closed(self.id);
        }
    }

    /// Registers a listener for upgrade or delete requests from elsewhere.
    pub fn on_version_change<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut VersionChangeEvent) + Send + 'static,
    {
        let mut state = self.engine.lock();
        match state.connections.get_mut(&self.id) {
            Some(conn) => conn.on_version_change.add(callback),
            None => ListenerId::DETACHED,
        }
    }

    /// Registers a listener for when the close completes.
    pub fn on_close<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut CloseEvent) + Send + 'static,
    {
        let mut state = self.engine.lock();
        match state.connections.get_mut(&self.id) {
            Some(conn) => conn.on_close.add(callback),
            None => ListenerId::DETACHED,
        }
    }
}
