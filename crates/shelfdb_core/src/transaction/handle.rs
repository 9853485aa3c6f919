//! Transaction, object store and index handles.
//!
//! Handles are thin: they carry identifiers and the engine, validate each
//! call under the engine lock and place a request. Validation order is
//! fixed: an inactive transaction fails first, then a write in a read-only
//! transaction, then bad arguments.

use super::{SettledSlot, SettledTransaction, TransactionMode, TransactionStatus};
use crate::cursor::{CursorSource, CursorState, Direction};
use crate::engine::{Engine, EngineState};
use crate::error::{CoreError, CoreResult};
use crate::events::{AbortEvent, CompleteEvent, ErrorEvent, ListenerId};
use crate::index::IndexOptions;
use crate::key::{Key, KeyPath, KeyRange};
use crate::request::{Operation, Request};
use crate::store::{IndexPopulation, RecordStore, StoreOptions};
use crate::transaction::Task;
use crate::types::{CursorId, RequestId, TransactionId};
use shelfdb_codec::Value;
use std::fmt;
use tracing::{debug, warn};

impl EngineState {
    /// The store as this transaction sees it.
    pub(crate) fn store_schema(&self, txn: TransactionId, name: &str) -> CoreResult<&RecordStore> {
        let t = self.txn(txn)?;
        if !t.in_scope(name) {
            return Err(CoreError::store_not_found(name));
        }
        match &t.view {
            Some(view) => view.store(name),
            None => self
                .databases
                .get(&t.database)
                .ok_or_else(|| {
                    CoreError::invalid_state(format!("database '{}' has been deleted", t.database))
                })?
                .schema
                .store(name),
        }
    }

    fn ensure_writable(&self, txn: TransactionId) -> CoreResult<()> {
        let t = self.txn(txn)?;
        t.ensure_active()?;
        if !t.mode.can_write() {
            return Err(CoreError::read_only(format!(
                "transaction {txn} is read-only"
            )));
        }
        Ok(())
    }

    fn ensure_structural(&self, txn: TransactionId) -> CoreResult<()> {
        let t = self.txn(txn)?;
        if t.mode != TransactionMode::StructuralChange {
            return Err(CoreError::invalid_state(
                "schema changes are only allowed during an upgrade",
            ));
        }
        t.ensure_active()
    }

    fn place_read(
        &mut self,
        txn: TransactionId,
        store: &str,
        range: &KeyRange,
        operation: Operation,
    ) -> CoreResult<RequestId> {
        self.ensure_active(txn)?;
        self.store_schema(txn, store)?;
        range.validate()?;
        self.queue_request(txn, operation)
    }

    fn place_index_read(
        &mut self,
        txn: TransactionId,
        store: &str,
        index: &str,
        range: &KeyRange,
        operation: Operation,
    ) -> CoreResult<RequestId> {
        self.ensure_active(txn)?;
        self.store_schema(txn, store)?.require_index(index)?;
        range.validate()?;
        self.queue_request(txn, operation)
    }

    fn open_cursor(
        &mut self,
        txn: TransactionId,
        source: CursorSource,
        range: KeyRange,
        direction: Direction,
        key_only: bool,
    ) -> CoreResult<RequestId> {
        self.ensure_active(txn)?;
        let store = self.store_schema(txn, source.store_name())?;
        if let CursorSource::Index { index, .. } = &source {
            store.require_index(index)?;
        }
        range.validate()?;

        let id = CursorId::new(self.ids.next());
        self.cursors.insert(
            id,
            CursorState::new(id, txn, source, range, direction, key_only),
        );
        let request = self.queue_request(txn, Operation::OpenCursor { cursor: id })?;
        if let Some(cursor) = self.cursors.get_mut(&id) {
            cursor.request = Some(request);
        }
        self.txn_mut(txn)?.cursors.push(id);
        Ok(request)
    }
}

/// Handle to a transaction.
#[derive(Clone)]
pub struct Transaction {
    engine: Engine,
    id: TransactionId,
    settled: SettledSlot<SettledTransaction>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction").field("id", &self.id).finish()
    }
}

impl Transaction {
    pub(crate) fn new(
        engine: Engine,
        id: TransactionId,
        settled: SettledSlot<SettledTransaction>,
    ) -> Self {
        Self {
            engine,
            id,
            settled,
        }
    }

    /// Reads the live state, or the settled snapshot once released.
    fn inspect<T>(
        &self,
        live: impl FnOnce(&super::TransactionState) -> T,
        settled: impl FnOnce(&SettledTransaction) -> T,
        missing: T,
    ) -> T {
        {
            let state = self.engine.lock();
            if let Some(t) = state.transactions.get(&self.id) {
                return live(t);
            }
        }
        self.settled.get().map_or(missing, settled)
    }

    /// Transaction identifier.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Isolation mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.inspect(|t| t.mode, |s| s.mode, TransactionMode::ReadOnly)
    }

    /// Lifecycle state.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.inspect(|t| t.status, |s| s.status, TransactionStatus::Aborted)
    }

    /// Whether requests may be placed right now.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.engine.lock().ensure_active(self.id).is_ok()
    }

    /// The error that aborted the transaction, if any.
    #[must_use]
    pub fn error(&self) -> Option<CoreError> {
        self.inspect(|t| t.error.clone(), |s| s.error.clone(), None)
    }

    /// Names of the stores in scope, sorted.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.inspect(
            |t| match (&t.mode, &t.view) {
                (TransactionMode::StructuralChange, Some(view)) => view.names(),
                _ => t.scope.clone(),
            },
            |s| s.store_names.clone(),
            Vec::new(),
        )
    }

    /// Handle to a store in scope.
    pub fn object_store(&self, name: &str) -> CoreResult<ObjectStore> {
        let state = self.engine.lock();
        let finished = state
            .transactions
            .get(&self.id)
            .map_or(true, |t| t.is_finished());
        if finished {
            return Err(CoreError::invalid_state(format!(
                "transaction {} has finished",
                self.id
            )));
        }
        state.store_schema(self.id, name)?;
        Ok(ObjectStore {
            engine: self.engine.clone(),
            txn: self.id,
            transaction: self.clone(),
            name: name.to_string(),
        })
    }

    /// Aborts the transaction, discarding all of its changes.
    ///
    /// Fails with an invalid-state error if it already committed or aborted.
    pub fn abort(&self) -> CoreResult<()> {
        self.engine.lock().abort_now(self.id, None)
    }

    /// Creates a store. Only allowed during an upgrade.
    pub fn create_object_store(&self, name: &str, options: &StoreOptions) -> CoreResult<ObjectStore> {
        let mut state = self.engine.lock();
        state.ensure_structural(self.id)?;
        let store = RecordStore::new(name, options)?;
        let view = state
            .txn_mut(self.id)?
            .view
            .as_mut()
            .ok_or_else(|| CoreError::invalid_state("upgrade has not started"))?;
        if view.contains(name) {
            return Err(CoreError::constraint(format!(
                "object store '{name}' already exists"
            )));
        }
        view.insert(store);
        debug!(target: "shelfdb::txn", txn = %self.id, store = name, "object store created");
        Ok(ObjectStore {
            engine: self.engine.clone(),
            txn: self.id,
            transaction: self.clone(),
            name: name.to_string(),
        })
    }

    /// Drops a store and its records. Only allowed during an upgrade.
    pub fn delete_object_store(&self, name: &str) -> CoreResult<()> {
        let mut state = self.engine.lock();
        state.ensure_structural(self.id)?;
        let view = state
            .txn_mut(self.id)?
            .view
            .as_mut()
            .ok_or_else(|| CoreError::invalid_state("upgrade has not started"))?;
        view.remove(name)
            .ok_or_else(|| CoreError::store_not_found(name))?;
        debug!(target: "shelfdb::txn", txn = %self.id, store = name, "object store deleted");
        Ok(())
    }

    /// Drives the executor until the transaction commits or aborts.
    pub fn wait(&self) -> CoreResult<TransactionStatus> {
        loop {
            let status = self.status();
            if status.is_finished() {
                return Ok(status);
            }
            if !self.engine.run_once()? {
                return Err(CoreError::invalid_state(format!(
                    "transaction {} cannot make progress",
                    self.id
                )));
            }
        }
    }

    /// Registers a listener for a successful commit.
    pub fn on_complete<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut CompleteEvent) + Send + 'static,
    {
        let mut state = self.engine.lock();
        match state.transactions.get_mut(&self.id) {
            Some(t) => t.on_complete.add(callback),
            None => ListenerId::DETACHED,
        }
    }

    /// Registers a listener for an abort.
    pub fn on_abort<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut AbortEvent) + Send + 'static,
    {
        let mut state = self.engine.lock();
        match state.transactions.get_mut(&self.id) {
            Some(t) => t.on_abort.add(callback),
            None => ListenerId::DETACHED,
        }
    }

    /// Registers a listener for errors of any of this transaction's
    /// requests. It runs after the request's own error listeners.
    pub fn on_error<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut ErrorEvent) + Send + 'static,
    {
        let mut state = self.engine.lock();
        match state.transactions.get_mut(&self.id) {
            Some(t) => t.on_error.add(callback),
            None => ListenerId::DETACHED,
        }
    }

    /// Removes a listener registered on this transaction.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.engine.lock();
        match state.transactions.get_mut(&self.id) {
            Some(t) => t.on_complete.remove(id) || t.on_abort.remove(id) || t.on_error.remove(id),
            None => false,
        }
    }
}

/// Handle to a record store within a transaction.
#[derive(Clone)]
pub struct ObjectStore {
    engine: Engine,
    txn: TransactionId,
    transaction: Transaction,
    name: String,
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &self.name)
            .field("transaction", &self.txn)
            .finish()
    }
}

impl ObjectStore {
    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning transaction.
    #[must_use]
    pub fn transaction(&self) -> Transaction {
        self.transaction.clone()
    }

    fn read<T>(&self, f: impl FnOnce(&RecordStore) -> T) -> CoreResult<T> {
        let state = self.engine.lock();
        state.store_schema(self.txn, &self.name).map(f)
    }

    fn request(&self, state: &EngineState, id: RequestId) -> Request {
        state.request_handle(&self.engine, id, self.transaction.clone())
    }

    /// In-line key path, if any.
    pub fn key_path(&self) -> CoreResult<Option<KeyPath>> {
        self.read(|s| s.key_path().cloned())
    }

    /// Whether keys are generated.
    pub fn auto_increment(&self) -> CoreResult<bool> {
        self.read(RecordStore::auto_increment)
    }

    /// Index names, sorted.
    pub fn index_names(&self) -> CoreResult<Vec<String>> {
        self.read(RecordStore::index_names)
    }

    fn write(&self, value: Value, key: Option<Key>, no_overwrite: bool) -> CoreResult<Request> {
        let mut state = self.engine.lock();
        state.ensure_writable(self.txn)?;
        state
            .store_schema(self.txn, &self.name)?
            .check_write(&value, key.as_ref())?;
        let id = state.queue_request(
            self.txn,
            Operation::Put {
                store: self.name.clone(),
                value,
                key,
                no_overwrite,
            },
        )?;
        Ok(self.request(&state, id))
    }

    /// Inserts a record; fails with a constraint error if the key exists.
    ///
    /// `key` is required for stores without a key path or generator and
    /// forbidden for stores with a key path.
    pub fn add(&self, value: Value, key: Option<Key>) -> CoreResult<Request> {
        self.write(value, key, true)
    }

    /// Inserts or replaces a record.
    pub fn put(&self, value: Value, key: Option<Key>) -> CoreResult<Request> {
        self.write(value, key, false)
    }

    /// Value of the first record in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> CoreResult<Request> {
        let range = range.into();
        let operation = Operation::Get {
            store: self.name.clone(),
            range: range.clone(),
        };
        let id = self
            .engine
            .lock()
            .place_read(self.txn, &self.name, &range, operation)?;
        Ok(self.request(&self.engine.lock(), id))
    }

    /// Key of the first record in `range`.
    pub fn get_key(&self, range: impl Into<KeyRange>) -> CoreResult<Request> {
        let range = range.into();
        let operation = Operation::GetKey {
            store: self.name.clone(),
            range: range.clone(),
        };
        let id = self
            .engine
            .lock()
            .place_read(self.txn, &self.name, &range, operation)?;
        Ok(self.request(&self.engine.lock(), id))
    }

    /// Number of records in `range`.
    pub fn count(&self, range: impl Into<KeyRange>) -> CoreResult<Request> {
        let range = range.into();
        let operation = Operation::Count {
            store: self.name.clone(),
            range: range.clone(),
        };
        let id = self
            .engine
            .lock()
            .place_read(self.txn, &self.name, &range, operation)?;
        Ok(self.request(&self.engine.lock(), id))
    }

    /// Deletes every record in `range`.
    pub fn delete(&self, range: impl Into<KeyRange>) -> CoreResult<Request> {
        let range = range.into();
        let mut state = self.engine.lock();
        state.ensure_writable(self.txn)?;
        state.store_schema(self.txn, &self.name)?;
        range.validate()?;
        let id = state.queue_request(
            self.txn,
            Operation::Delete {
                store: self.name.clone(),
                range,
            },
        )?;
        Ok(self.request(&state, id))
    }

    /// Deletes every record.
    pub fn clear(&self) -> CoreResult<Request> {
        let mut state = self.engine.lock();
        state.ensure_writable(self.txn)?;
        state.store_schema(self.txn, &self.name)?;
        let id = state.queue_request(
            self.txn,
            Operation::Clear {
                store: self.name.clone(),
            },
        )?;
        Ok(self.request(&state, id))
    }

    /// Opens a cursor over the records in `range`.
    pub fn open_cursor(&self, range: impl Into<KeyRange>, direction: Direction) -> CoreResult<Request> {
        let id = self.engine.lock().open_cursor(
            self.txn,
            CursorSource::Store(self.name.clone()),
            range.into(),
            direction,
            false,
        )?;
        Ok(self.request(&self.engine.lock(), id))
    }

    /// Opens a cursor that yields keys only.
    pub fn open_key_cursor(&self, range: impl Into<KeyRange>, direction: Direction) -> CoreResult<Request> {
        let id = self.engine.lock().open_cursor(
            self.txn,
            CursorSource::Store(self.name.clone()),
            range.into(),
            direction,
            true,
        )?;
        Ok(self.request(&self.engine.lock(), id))
    }

    /// Handle to an index on this store.
    pub fn index(&self, name: &str) -> CoreResult<Index> {
        let state = self.engine.lock();
        if state.txn(self.txn)?.is_finished() {
            return Err(CoreError::invalid_state(format!(
                "transaction {} has finished",
                self.txn
            )));
        }
        state.store_schema(self.txn, &self.name)?.require_index(name)?;
        Ok(Index {
            engine: self.engine.clone(),
            txn: self.txn,
            transaction: self.transaction.clone(),
            store: self.name.clone(),
            name: name.to_string(),
        })
    }

    /// Creates an index and fills it from the existing records. Only
    /// allowed during an upgrade.
    ///
    /// If existing records violate a unique index, the call still returns
    /// the index but the upgrade is aborted with the constraint error.
    pub fn create_index(
        &self,
        name: &str,
        key_path: impl Into<KeyPath>,
        options: IndexOptions,
    ) -> CoreResult<Index> {
        let mut state = self.engine.lock();
        state.ensure_structural(self.txn)?;
        let view = state
            .txn_mut(self.txn)?
            .view
            .as_mut()
            .ok_or_else(|| CoreError::invalid_state("upgrade has not started"))?;
        let population = view
            .store_mut(&self.name)?
            .create_index(name, key_path.into(), options)?;
        if let IndexPopulation::Violated(err) = population {
            warn!(
                target: "shelfdb::txn",
                txn = %self.txn,
                store = %self.name,
                index = name,
                error = %err,
                "existing records violate new index"
            );
            state.scheduler.push(Task::Abort(self.txn, err));
        }
        Ok(Index {
            engine: self.engine.clone(),
            txn: self.txn,
            transaction: self.transaction.clone(),
            store: self.name.clone(),
            name: name.to_string(),
        })
    }

    /// Drops an index. Only allowed during an upgrade.
    pub fn delete_index(&self, name: &str) -> CoreResult<()> {
        let mut state = self.engine.lock();
        state.ensure_structural(self.txn)?;
        state
            .txn_mut(self.txn)?
            .view
            .as_mut()
            .ok_or_else(|| CoreError::invalid_state("upgrade has not started"))?
            .store_mut(&self.name)?
            .delete_index(name)
    }
}

/// Handle to an index within a transaction.
#[derive(Clone)]
pub struct Index {
    engine: Engine,
    txn: TransactionId,
    transaction: Transaction,
    store: String,
    name: String,
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("store", &self.store)
            .field("name", &self.name)
            .finish()
    }
}

impl Index {
    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the indexed store.
    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store
    }

    fn read<T>(&self, f: impl FnOnce(&crate::index::SecondaryIndex) -> T) -> CoreResult<T> {
        let state = self.engine.lock();
        let store = state.store_schema(self.txn, &self.store)?;
        store.require_index(&self.name).map(f)
    }

    /// Key path the index derives keys from.
    pub fn key_path(&self) -> CoreResult<KeyPath> {
        self.read(|i| i.key_path().clone())
    }

    /// Whether index keys must be unique.
    pub fn is_unique(&self) -> CoreResult<bool> {
        self.read(|i| i.is_unique())
    }

    /// Whether array values index each element.
    pub fn is_multi_entry(&self) -> CoreResult<bool> {
        self.read(|i| i.is_multi_entry())
    }

    fn place(&self, range: KeyRange, operation: Operation) -> CoreResult<Request> {
        let id = self
            .engine
            .lock()
            .place_index_read(self.txn, &self.store, &self.name, &range, operation)?;
        Ok(self
            .engine
            .lock()
            .request_handle(&self.engine, id, self.transaction.clone()))
    }

    /// Value of the record behind the first index key in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> CoreResult<Request> {
        let range = range.into();
        self.place(
            range.clone(),
            Operation::IndexGet {
                store: self.store.clone(),
                index: self.name.clone(),
                range,
            },
        )
    }

    /// Primary key of the record behind the first index key in `range`.
    pub fn get_key(&self, range: impl Into<KeyRange>) -> CoreResult<Request> {
        let range = range.into();
        self.place(
            range.clone(),
            Operation::IndexGetKey {
                store: self.store.clone(),
                index: self.name.clone(),
                range,
            },
        )
    }

    /// Number of index references in `range`.
    pub fn count(&self, range: impl Into<KeyRange>) -> CoreResult<Request> {
        let range = range.into();
        self.place(
            range.clone(),
            Operation::IndexCount {
                store: self.store.clone(),
                index: self.name.clone(),
                range,
            },
        )
    }

    fn cursor(&self, range: KeyRange, direction: Direction, key_only: bool) -> CoreResult<Request> {
        let id = self.engine.lock().open_cursor(
            self.txn,
            CursorSource::Index {
                store: self.store.clone(),
                index: self.name.clone(),
            },
            range,
            direction,
            key_only,
        )?;
        Ok(self
            .engine
            .lock()
            .request_handle(&self.engine, id, self.transaction.clone()))
    }

    /// Opens a cursor over the index in key order.
    pub fn open_cursor(&self, range: impl Into<KeyRange>, direction: Direction) -> CoreResult<Request> {
        self.cursor(range.into(), direction, false)
    }

    /// Opens a cursor yielding index keys and primary keys only.
    pub fn open_key_cursor(&self, range: impl Into<KeyRange>, direction: Direction) -> CoreResult<Request> {
        self.cursor(range.into(), direction, true)
    }
}
