//! Opening, upgrading and deleting databases.
//!
//! Open and delete requests are queued per database and processed one at
//! a time. A request that needs exclusive access (an upgrade or a delete)
//! first asks every other connection to close, reports itself blocked if
//! any stay open, and resumes when the last one closes.

use crate::database::{Connection, ConnectionState, DatabaseState, Schema};
use crate::engine::{Engine, EngineState};
use crate::error::{CoreError, CoreResult};
use crate::events::{CloseEvent, ListenerId, Listeners, OpenEvent, VersionChangeEvent};
use crate::transaction::{TransactionMode, TransactionState};
use crate::types::{ConnectionId, OpenId, TransactionId};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenKind {
    /// Open, at the given version or the current one.
    Open(Option<u64>),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenPhase {
    Queued,
    /// Other connections were asked to close.
    Notified,
    /// Reported blocked; waiting for closes.
    Blocked,
    Upgrading,
    Done,
}

/// Engine-side state of an open or delete request.
#[derive(Debug)]
pub(crate) struct OpenState {
    pub(crate) database: String,
    pub(crate) kind: OpenKind,
    pub(crate) phase: OpenPhase,
    pub(crate) old_version: u64,
    pub(crate) new_version: Option<u64>,
    /// The database did not exist before this request.
    pub(crate) created: bool,
    pub(crate) connection: Option<ConnectionId>,
    pub(crate) transaction: Option<TransactionId>,
    pub(crate) result: Option<CoreResult<Option<ConnectionId>>>,
    pub(crate) on_upgrade_needed: Listeners<OpenEvent>,
    pub(crate) on_blocked: Listeners<OpenEvent>,
    pub(crate) on_success: Listeners<OpenEvent>,
    pub(crate) on_error: Listeners<OpenEvent>,
}

impl OpenState {
    fn new(database: String, kind: OpenKind) -> Self {
        Self {
            database,
            kind,
            phase: OpenPhase::Queued,
            old_version: 0,
            new_version: None,
            created: false,
            connection: None,
            transaction: None,
            result: None,
            on_upgrade_needed: Listeners::default(),
            on_blocked: Listeners::default(),
            on_success: Listeners::default(),
            on_error: Listeners::default(),
        }
    }

    fn settle(&mut self, result: CoreResult<Option<ConnectionId>>) {
        self.phase = OpenPhase::Done;
        self.result = Some(result);
    }
}

/// What processing an open request decided.
enum OpenStep {
    Wait,
    Notify {
        connections: Vec<ConnectionId>,
        old_version: u64,
        new_version: Option<u64>,
    },
    Blocked,
    Upgrade,
    Settled,
}

fn open_upgrade_needed(state: &mut EngineState, id: OpenId) -> Option<&mut Listeners<OpenEvent>> {
    state.opens.get_mut(&id).map(|o| &mut o.on_upgrade_needed)
}

fn open_blocked(state: &mut EngineState, id: OpenId) -> Option<&mut Listeners<OpenEvent>> {
    state.opens.get_mut(&id).map(|o| &mut o.on_blocked)
}

fn open_success(state: &mut EngineState, id: OpenId) -> Option<&mut Listeners<OpenEvent>> {
    state.opens.get_mut(&id).map(|o| &mut o.on_success)
}

fn open_error(state: &mut EngineState, id: OpenId) -> Option<&mut Listeners<OpenEvent>> {
    state.opens.get_mut(&id).map(|o| &mut o.on_error)
}

fn connection_version_change(
    state: &mut EngineState,
    id: ConnectionId,
) -> Option<&mut Listeners<VersionChangeEvent>> {
    state.connections.get_mut(&id).map(|c| &mut c.on_version_change)
}

fn connection_close(state: &mut EngineState, id: ConnectionId) -> Option<&mut Listeners<CloseEvent>> {
    state.connections.get_mut(&id).map(|c| &mut c.on_close)
}

impl EngineState {
    fn enqueue_open(&mut self, database: &str, kind: OpenKind) -> OpenId {
        let id = OpenId::new(self.ids.next());
        self.opens
            .insert(id, OpenState::new(database.to_string(), kind));
        let queue = self.pending_opens.entry(database.to_string()).or_default();
        queue.push_back(id);
        if queue.len() == 1 {
            self.scheduler.push(crate::transaction::Task::Open(id));
        }
        id
    }

    /// Reschedules the open or delete request at the head of a database's
    /// queue.
    pub(crate) fn resume_opens(&mut self, database: &str) {
        if let Some(head) = self.pending_opens.get(database).and_then(|q| q.front()) {
            self.scheduler.push(crate::transaction::Task::Open(*head));
        }
    }

    fn open_step(&mut self, id: OpenId) -> OpenStep {
        let Some(open) = self.opens.get(&id) else {
            return OpenStep::Wait;
        };
        if !matches!(
            open.phase,
            OpenPhase::Queued | OpenPhase::Notified | OpenPhase::Blocked
        ) {
            return OpenStep::Wait;
        }
        let database = open.database.clone();
        let kind = open.kind;
        let at_head = self
            .pending_opens
            .get(&database)
            .and_then(|q| q.front())
            .is_some_and(|head| *head == id);
        if !at_head {
            return OpenStep::Wait;
        }
        match kind {
            OpenKind::Open(version) => self.open_database_step(id, &database, version),
            OpenKind::Delete => self.delete_database_step(id, &database),
        }
    }

    fn open_database_step(&mut self, id: OpenId, name: &str, version: Option<u64>) -> OpenStep {
        let created = !self.databases.contains_key(name);
        if created {
            self.databases
                .insert(name.to_string(), DatabaseState::new(name, 0, Schema::default()));
            debug!(target: "shelfdb::open", database = name, "database created");
        }
        let (current, others) = match self.databases.get(name) {
            Some(db) => (db.version, db.connections.clone()),
            None => return OpenStep::Wait,
        };
        let requested = version.unwrap_or(current.max(1));
        let Some(open) = self.opens.get_mut(&id) else {
            return OpenStep::Wait;
        };
        open.created |= created;
        open.old_version = current;
        open.new_version = Some(requested);

        if requested < current {
            warn!(target: "shelfdb::open", database = name, requested, current, "version is lower than current");
            open.settle(Err(CoreError::Version { requested, current }));
            return OpenStep::Settled;
        }
        if requested == current {
            let conn = ConnectionId::new(self.ids.next());
            if let Some(open) = self.opens.get_mut(&id) {
                open.connection = Some(conn);
                open.settle(Ok(Some(conn)));
            }
            self.connections
                .insert(conn, ConnectionState::new(name, current));
            if let Some(db) = self.databases.get_mut(name) {
                db.connections.push(conn);
            }
            debug!(target: "shelfdb::open", database = name, connection = %conn, version = current, "connection opened");
            return OpenStep::Settled;
        }
        if others.is_empty() {
            self.begin_upgrade(id, name, current, requested);
            return OpenStep::Upgrade;
        }
        self.wait_for_closes(id, others, current, Some(requested))
    }

    fn delete_database_step(&mut self, id: OpenId, name: &str) -> OpenStep {
        let Some(db) = self.databases.get(name) else {
            if let Some(open) = self.opens.get_mut(&id) {
                open.settle(Ok(None));
            }
            return OpenStep::Settled;
        };
        let (current, others) = (db.version, db.connections.clone());
        if let Some(open) = self.opens.get_mut(&id) {
            open.old_version = current;
        }
        if others.is_empty() {
            self.databases.remove(name);
            info!(target: "shelfdb::open", database = name, version = current, "database deleted");
            if let Some(open) = self.opens.get_mut(&id) {
                open.settle(Ok(None));
            }
            return OpenStep::Settled;
        }
        self.wait_for_closes(id, others, current, None)
    }

    fn wait_for_closes(
        &mut self,
        id: OpenId,
        others: Vec<ConnectionId>,
        old_version: u64,
        new_version: Option<u64>,
    ) -> OpenStep {
        let Some(open) = self.opens.get_mut(&id) else {
            return OpenStep::Wait;
        };
        match open.phase {
            OpenPhase::Queued => {
                open.phase = OpenPhase::Notified;
                let connections = others
                    .into_iter()
                    .filter(|c| self.connections.get(c).is_some_and(ConnectionState::is_open))
                    .collect();
                OpenStep::Notify {
                    connections,
                    old_version,
                    new_version,
                }
            }
            OpenPhase::Notified => {
                open.phase = OpenPhase::Blocked;
                info!(
                    target: "shelfdb::open",
                    database = %open.database,
                    open_connections = others.len(),
                    "request blocked by open connections"
                );
                OpenStep::Blocked
            }
            _ => OpenStep::Wait,
        }
    }

    fn begin_upgrade(&mut self, id: OpenId, name: &str, current: u64, requested: u64) {
        let conn = ConnectionId::new(self.ids.next());
        let txn = TransactionId::new(self.ids.next());
        let Some(db) = self.databases.get_mut(name) else {
            return;
        };
        db.connections.push(conn);
        db.upgrading = Some(txn);
        let scope = db.schema.names();

        self.connections
            .insert(conn, ConnectionState::new(name, requested));
        let mut state = TransactionState::new(
            txn,
            name.to_string(),
            conn,
            TransactionMode::StructuralChange,
            scope,
        );
        state.upgrade = Some(id);
        state.old_version = current;
        state.new_version = requested;
        self.transactions.insert(txn, state);
        self.scheduler.submit(txn);

        if let Some(open) = self.opens.get_mut(&id) {
            open.phase = OpenPhase::Upgrading;
            open.connection = Some(conn);
            open.transaction = Some(txn);
        }
        info!(
            target: "shelfdb::open",
            database = name,
            old_version = current,
            new_version = requested,
            txn = %txn,
            "upgrade started"
        );
    }

    /// Takes a settled request off its database queue and lets the next
    /// one run.
    fn release_open(&mut self, id: OpenId) {
        let Some(open) = self.opens.get_mut(&id) else {
            return;
        };
        open.on_upgrade_needed = Listeners::default();
        open.on_blocked = Listeners::default();
        open.on_success = Listeners::default();
        open.on_error = Listeners::default();
        let database = open.database.clone();
        if let Some(queue) = self.pending_opens.get_mut(&database) {
            queue.retain(|o| *o != id);
            if queue.is_empty() {
                self.pending_opens.remove(&database);
            }
        }
        self.resume_opens(&database);
    }
}

impl Engine {
    /// Opens a database, creating it if missing.
    ///
    /// With `None` the database opens at its current version, or version 1
    /// if it is new. A version higher than the current one runs an upgrade:
    /// listen with [`OpenRequest::on_upgrade_needed`] to create stores and
    /// indexes. Version 0 is a data error.
    pub fn open(&self, name: &str, version: Option<u64>) -> CoreResult<OpenRequest> {
        if version == Some(0) {
            return Err(CoreError::data("database version must be positive"));
        }
        let id = self.lock().enqueue_open(name, OpenKind::Open(version));
        Ok(OpenRequest {
            engine: self.clone(),
            id,
        })
    }

    /// Deletes a database once every connection to it has closed.
    ///
    /// Deleting a missing database succeeds.
    pub fn delete_database(&self, name: &str) -> DeleteRequest {
        let id = self.lock().enqueue_open(name, OpenKind::Delete);
        DeleteRequest {
            inner: OpenRequest {
                engine: self.clone(),
                id,
            },
        }
    }

    pub(crate) fn process_open(&self, id: OpenId) {
        let step = self.lock().open_step(id);
        match step {
            OpenStep::Wait | OpenStep::Upgrade => {}
            OpenStep::Notify {
                connections,
                old_version,
                new_version,
            } => {
                for conn in connections {
                    let mut event = VersionChangeEvent {
                        connection: Connection::new(self.clone(), conn),
                        old_version,
                        new_version,
                    };
                    self.dispatch(conn, connection_version_change, &mut event);
                }
                self.lock().scheduler.push(crate::transaction::Task::Open(id));
            }
            OpenStep::Blocked => {
                let mut event = self.open_event(id, None, None);
                self.dispatch(id, open_blocked, &mut event);
            }
            OpenStep::Settled => self.settle_open(id),
        }
    }

    fn open_event(
        &self,
        id: OpenId,
        connection: Option<ConnectionId>,
        transaction: Option<TransactionId>,
    ) -> OpenEvent {
        let (old_version, new_version, error, transaction) = {
            let state = self.lock();
            let transaction = transaction.map(|t| state.transaction_handle(self, t));
            match state.opens.get(&id) {
                Some(open) => (
                    open.old_version,
                    open.new_version,
                    open.result.as_ref().and_then(|r| r.as_ref().err().cloned()),
                    transaction,
                ),
                None => (0, None, None, transaction),
            }
        };
        OpenEvent {
            request: OpenRequest {
                engine: self.clone(),
                id,
            },
            old_version,
            new_version,
            connection: connection.map(|c| Connection::new(self.clone(), c)),
            transaction,
            error,
        }
    }

    /// Delivers a settled request's outcome and moves its queue along.
    fn settle_open(&self, id: OpenId) {
        let result = self
            .lock()
            .opens
            .get(&id)
            .and_then(|o| o.result.clone());
        match result {
            Some(Ok(connection)) => {
                let mut event = self.open_event(id, connection, None);
                self.dispatch(id, open_success, &mut event);
            }
            Some(Err(_)) => {
                let mut event = self.open_event(id, None, None);
                self.dispatch(id, open_error, &mut event);
            }
            None => return,
        }
        self.lock().release_open(id);
    }

    /// Runs the upgrade callback once the upgrade transaction is admitted.
    pub(crate) fn run_upgrade(&self, id: OpenId) {
        let (txn, conn) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(open) = state.opens.get(&id) else {
                return;
            };
            let (Some(txn), Some(conn)) = (open.transaction, open.connection) else {
                return;
            };
            let Some(t) = state.transactions.get_mut(&txn) else {
                return;
            };
            if t.is_finished() {
                return;
            }
            t.started_work = true;
            t.active = true;
            (txn, conn)
        };

        let mut event = self.open_event(id, Some(conn), Some(txn));
        self.dispatch(id, open_upgrade_needed, &mut event);

        let mut state = self.lock();
        if let Some(t) = state.transactions.get_mut(&txn) {
            t.active = false;
        }
        state.advance(txn);
    }

    /// Settles an open request after its upgrade committed or aborted.
    pub(crate) fn finish_upgrade(&self, id: OpenId, failure: Option<CoreError>) {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(open) = state.opens.get_mut(&id) else {
                return;
            };
            let database = open.database.clone();
            match failure {
                None => {
                    open.settle(Ok(open.connection));
                    info!(target: "shelfdb::open", database = %database, version = ?open.new_version, "upgrade committed");
                }
                Some(reason) => {
                    warn!(target: "shelfdb::open", database = %database, error = %reason, "upgrade aborted");
                    open.settle(Err(CoreError::abort(format!(
                        "upgrade of '{database}' was aborted: {reason}"
                    ))));
                    let created = open.created;
                    if let Some(conn) = open.connection.and_then(|c| state.connections.get_mut(&c)) {
                        conn.close_pending = true;
                    }
                    let discard = match state.databases.get_mut(&database) {
                        Some(db) => {
                            db.upgrading = None;
                            created && db.version == 0
                        }
                        None => false,
                    };
                    if discard {
                        state.databases.remove(&database);
                    }
                }
            }
        }
        self.settle_open(id);
    }

    /// Delivers close notifications for a connection that finished closing.
    pub(crate) fn notify_closed(&self, id: ConnectionId) {
        debug!(target: "shelfdb::open", connection = %id, "connection closed");
        let mut event = CloseEvent {
            connection: Connection::new(self.clone(), id),
        };
        self.dispatch(id, connection_close, &mut event);
    }
}

/// Handle to a pending open.
#[derive(Clone)]
pub struct OpenRequest {
    engine: Engine,
    id: OpenId,
}

impl fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRequest").field("id", &self.id).finish()
    }
}

macro_rules! open_listener {
    ($(#[$meta:meta])* $method:ident, $field:ident) => {
        $(#[$meta])*
        pub fn $method<F>(&self, callback: F) -> ListenerId
        where
            F: FnMut(&mut OpenEvent) + Send + 'static,
        {
            let mut state = self.engine.lock();
            match state.opens.get_mut(&self.id) {
                Some(open) => open.$field.add(callback),
                None => ListenerId::DETACHED,
            }
        }
    };
}

impl OpenRequest {
    /// Request identifier.
    #[must_use]
    pub fn id(&self) -> OpenId {
        self.id
    }

    /// Name of the database being opened.
    #[must_use]
    pub fn database_name(&self) -> String {
        self.engine
            .lock()
            .opens
            .get(&self.id)
            .map(|o| o.database.clone())
            .unwrap_or_default()
    }

    /// Whether the request has settled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.engine
            .lock()
            .opens
            .get(&self.id)
            .is_some_and(|o| o.result.is_some())
    }

    /// The error, if the request failed.
    #[must_use]
    pub fn error(&self) -> Option<CoreError> {
        self.engine
            .lock()
            .opens
            .get(&self.id)
            .and_then(|o| o.result.as_ref())
            .and_then(|r| r.as_ref().err().cloned())
    }

    fn outcome(&self) -> CoreResult<Option<ConnectionId>> {
        let state = self.engine.lock();
        let open = state
            .opens
            .get(&self.id)
            .ok_or_else(|| CoreError::invalid_state(format!("open request {} does not exist", self.id)))?;
        match &open.result {
            Some(result) => result.clone(),
            None => Err(CoreError::invalid_state(format!(
                "open request {} has not finished",
                self.id
            ))),
        }
    }

    /// The opened connection.
    ///
    /// Fails with an invalid-state error while the request is pending.
    pub fn result(&self) -> CoreResult<Connection> {
        match self.outcome()? {
            Some(conn) => Ok(Connection::new(self.engine.clone(), conn)),
            None => Err(CoreError::invalid_state("a delete request has no connection")),
        }
    }

    fn drive(&self) -> CoreResult<()> {
        while !self.is_done() {
            if !self.engine.run_once()? {
                return Err(CoreError::invalid_state(format!(
                    "open request {} cannot make progress",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Drives the executor until the request settles.
    ///
    /// A request blocked by connections that never close cannot make
    /// progress and fails with an invalid-state error.
    pub fn wait(&self) -> CoreResult<Connection> {
        self.drive()?;
        self.result()
    }

    open_listener!(
        /// Registers the upgrade callback. It runs inside the upgrade
        /// transaction, which `event.transaction` carries.
        on_upgrade_needed,
        on_upgrade_needed
    );

    open_listener!(
        /// Registers a listener for when other connections stay open.
        on_blocked,
        on_blocked
    );

    open_listener!(
        /// Registers a listener for a successful open.
        on_success,
        on_success
    );

    open_listener!(
        /// Registers a listener for a failed open.
        on_error,
        on_error
    );
}

/// Handle to a pending database deletion.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    inner: OpenRequest,
}

impl DeleteRequest {
    /// Whether the deletion has settled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    /// The version the database had, or 0 if it did not exist.
    pub fn result(&self) -> CoreResult<u64> {
        self.inner.outcome()?;
        let state = self.inner.engine.lock();
        Ok(state.opens.get(&self.inner.id).map_or(0, |o| o.old_version))
    }

    /// Drives the executor until the deletion settles.
    pub fn wait(&self) -> CoreResult<u64> {
        self.inner.drive()?;
        self.result()
    }

    /// Registers a listener for when connections stay open.
    pub fn on_blocked<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut OpenEvent) + Send + 'static,
    {
        self.inner.on_blocked(callback)
    }

    /// Registers a listener for a completed deletion.
    pub fn on_success<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut OpenEvent) + Send + 'static,
    {
        self.inner.on_success(callback)
    }
}
