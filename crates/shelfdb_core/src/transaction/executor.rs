//! The executor: runs tasks from the scheduler queue.
//!
//! All state changes happen under the engine lock. Listener callbacks are
//! detached from the state, invoked with the lock released, then
//! reattached, so callbacks can freely call back into the engine.

use super::{
    SettledTransaction, Task, Transaction, TransactionMode, TransactionState, TransactionStatus,
};
use crate::engine::{Engine, EngineState};
use crate::error::{CoreError, CoreResult};
use crate::events::{AbortEvent, CompleteEvent, ErrorEvent, Listeners, SuccessEvent};
use crate::request::{Operation, Request, RequestPhase, RequestState};
use crate::types::{RequestId, TransactionId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Picks a listener list out of the engine state.
pub(crate) type Selector<K, E> = for<'a> fn(&'a mut EngineState, K) -> Option<&'a mut Listeners<E>>;

fn request_success(state: &mut EngineState, id: RequestId) -> Option<&mut Listeners<SuccessEvent>> {
    state.requests.get_mut(&id).map(|r| &mut r.on_success)
}

fn request_error(state: &mut EngineState, id: RequestId) -> Option<&mut Listeners<ErrorEvent>> {
    state.requests.get_mut(&id).map(|r| &mut r.on_error)
}

fn transaction_error(state: &mut EngineState, id: TransactionId) -> Option<&mut Listeners<ErrorEvent>> {
    state.transactions.get_mut(&id).map(|t| &mut t.on_error)
}

fn transaction_complete(
    state: &mut EngineState,
    id: TransactionId,
) -> Option<&mut Listeners<CompleteEvent>> {
    state.transactions.get_mut(&id).map(|t| &mut t.on_complete)
}

fn transaction_abort(state: &mut EngineState, id: TransactionId) -> Option<&mut Listeners<AbortEvent>> {
    state.transactions.get_mut(&id).map(|t| &mut t.on_abort)
}

fn released(id: TransactionId) -> CoreError {
    CoreError::transaction_inactive(format!("transaction {id} has finished"))
}

impl EngineState {
    /// A live transaction. Ids are only handed out by the engine, so a
    /// missing one has finished and been released.
    pub(crate) fn txn(&self, id: TransactionId) -> CoreResult<&TransactionState> {
        self.transactions.get(&id).ok_or_else(|| released(id))
    }

    pub(crate) fn txn_mut(&mut self, id: TransactionId) -> CoreResult<&mut TransactionState> {
        self.transactions.get_mut(&id).ok_or_else(|| released(id))
    }

    /// A handle sharing the transaction's settled slot.
    pub(crate) fn transaction_handle(&self, engine: &Engine, id: TransactionId) -> Transaction {
        let settled = self
            .transactions
            .get(&id)
            .map(|t| Arc::clone(&t.settled))
            .unwrap_or_default();
        Transaction::new(engine.clone(), id, settled)
    }

    /// A handle sharing the request's settled slot.
    pub(crate) fn request_handle(
        &self,
        engine: &Engine,
        id: RequestId,
        transaction: Transaction,
    ) -> Request {
        let settled = self
            .requests
            .get(&id)
            .map(|r| Arc::clone(&r.settled))
            .unwrap_or_default();
        Request::new(engine.clone(), id, transaction, settled)
    }

    pub(crate) fn request(&self, id: RequestId) -> CoreResult<&RequestState> {
        self.requests
            .get(&id)
            .ok_or_else(|| CoreError::invalid_state(format!("request {id} does not exist")))
    }

    pub(crate) fn ensure_active(&self, id: TransactionId) -> CoreResult<()> {
        self.txn(id)?.ensure_active()
    }

    /// Places a request at the back of a transaction's queue.
    pub(crate) fn queue_request(
        &mut self,
        txn: TransactionId,
        operation: Operation,
    ) -> CoreResult<RequestId> {
        self.ensure_active(txn)?;
        let id = RequestId::new(self.ids.next());
        self.requests
            .insert(id, RequestState::new(id, txn, operation));
        let t = self.txn_mut(txn)?;
        t.requests.push(id);
        t.ready.push_back(id);
        self.pump(txn);
        Ok(id)
    }

    /// Re-queues a finished request with a new operation.
    pub(crate) fn recycle_request(&mut self, id: RequestId, operation: Operation) -> CoreResult<()> {
        let request = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| CoreError::invalid_state(format!("request {id} does not exist")))?;
        let txn = request.transaction;
        request.recycle(operation)?;
        self.txn_mut(txn)?.ready.push_back(id);
        self.pump(txn);
        Ok(())
    }

    /// Schedules the next ready request when nothing is in flight.
    pub(crate) fn pump(&mut self, id: TransactionId) {
        let Some(txn) = self.transactions.get_mut(&id) else {
            return;
        };
        if txn.status != TransactionStatus::Running || txn.in_flight.is_some() {
            return;
        }
        let Some(next) = txn.ready.pop_front() else {
            return;
        };
        txn.in_flight = Some(next);
        txn.started_work = true;
        txn.commit_scheduled = false;
        txn.idle_ticks = 0;
        if let Some(request) = self.requests.get_mut(&next) {
            request.phase = RequestPhase::Pending;
        }
        self.scheduler.push(Task::Execute(next));
    }

    /// After a request settles: run the next one, or commit once drained.
    pub(crate) fn advance(&mut self, id: TransactionId) {
        let Some(txn) = self.transactions.get_mut(&id) else {
            return;
        };
        if txn.status != TransactionStatus::Running || txn.in_flight.is_some() {
            return;
        }
        if !txn.ready.is_empty() {
            self.pump(id);
            return;
        }
        if txn.started_work && !txn.commit_scheduled {
            txn.commit_scheduled = true;
            self.scheduler.push(Task::Commit(id));
        }
    }

    /// Starts every waiting transaction the scheduler now admits.
    pub(crate) fn admit_pending(&mut self) {
        for id in self.scheduler.admissible(&self.transactions) {
            self.start(id);
        }
    }

    fn start(&mut self, id: TransactionId) {
        let Some(txn) = self.transactions.get(&id) else {
            return;
        };
        let view = self
            .databases
            .get(&txn.database)
            .map(|db| match txn.mode {
                TransactionMode::StructuralChange => db.schema.clone(),
                _ => db.schema.subset(&txn.scope),
            })
            .unwrap_or_default();

        self.scheduler.mark_running(id);
        self.stats.record_transaction_start();
        let Some(txn) = self.transactions.get_mut(&id) else {
            return;
        };
        txn.status = TransactionStatus::Running;
        txn.view = Some(view);
        info!(
            target: "shelfdb::scheduler",
            txn = %id,
            database = %txn.database,
            mode = %txn.mode,
            scope = ?txn.scope,
            "transaction admitted"
        );
        match txn.upgrade {
            Some(open) => self.scheduler.push(Task::Upgrade(open)),
            None => self.pump(id),
        }
    }

    /// Aborts a transaction immediately.
    ///
    /// Every request that has not finished is rejected with an abort error;
    /// notifications follow on a later executor turn.
    pub(crate) fn abort_now(&mut self, id: TransactionId, error: Option<CoreError>) -> CoreResult<()> {
        let txn = self.transactions.get_mut(&id).ok_or_else(|| {
            CoreError::invalid_state(format!("transaction {id} has already finished"))
        })?;
        if txn.is_finished() {
            return Err(CoreError::invalid_state(format!(
                "transaction {id} has already finished"
            )));
        }
        txn.status = TransactionStatus::Aborted;
        txn.active = false;
        txn.error = error.clone();
        txn.view = None;
        txn.ready.clear();
        txn.in_flight = None;
        txn.commit_scheduled = false;

        let mut rejected = Vec::new();
        for request_id in &txn.requests {
            if let Some(request) = self.requests.get_mut(request_id) {
                if !request.is_done() {
                    request.resolve(Err(CoreError::abort(format!(
                        "transaction {id} was aborted"
                    ))));
                    rejected.push(*request_id);
                }
            }
        }
        txn.rejected = rejected;

        self.stats.record_transaction_abort();
        if matches!(error, Some(CoreError::Timeout { .. })) {
            self.stats.record_transaction_timeout();
        }
        match &error {
            Some(err) => info!(target: "shelfdb::txn", txn = %id, reason = %err, "transaction aborted"),
            None => info!(target: "shelfdb::txn", txn = %id, "transaction aborted by caller"),
        }
        self.scheduler.push(Task::AbortNotify(id));
        Ok(())
    }

    /// Counts an idle turn for every running transaction that has had
    /// nothing to do since it started, aborting those past the grace window.
    ///
    /// Returns whether any transaction was idle.
    pub(crate) fn tick_idle(&mut self) -> bool {
        let idle: Vec<TransactionId> = self
            .scheduler
            .running()
            .filter(|id| self.transactions.get(id).is_some_and(TransactionState::is_idle))
            .collect();
        let limit = self.config.idle_timeout_ticks;
        for id in &idle {
            let expired = self.transactions.get_mut(id).is_some_and(|txn| {
                txn.idle_ticks += 1;
                txn.idle_ticks >= limit
            });
            if expired {
                warn!(target: "shelfdb::txn", txn = %id, ticks = limit, "idle transaction timed out");
                let timeout = CoreError::timeout(format!(
                    "transaction {id} placed no request within {limit} idle turns"
                ));
                // Cannot fail: the transaction is running.
                let _ = self.abort_now(*id, Some(timeout));
            }
        }
        !idle.is_empty()
    }

    /// Forgets a finished transaction along with its requests and cursors.
    ///
    /// Handles keep working from the settled snapshots; listeners that can
    /// no longer fire are dropped with the state.
    fn release(&mut self, id: TransactionId) -> Option<TransactionState> {
        let txn = self.transactions.remove(&id)?;
        for request in &txn.requests {
            if let Some(request) = self.requests.remove(request) {
                request.settle();
            }
        }
        for cursor in &txn.cursors {
            self.cursors.remove(cursor);
        }
        let store_names = match (txn.mode, txn.status) {
            (TransactionMode::StructuralChange, TransactionStatus::Committed) => self
                .databases
                .get(&txn.database)
                .map_or_else(|| txn.scope.clone(), |db| db.schema.names()),
            _ => txn.scope.clone(),
        };
        let _ = txn.settled.set(SettledTransaction {
            mode: txn.mode,
            status: txn.status,
            error: txn.error.clone(),
            store_names,
        });
        Some(txn)
    }
}

impl Engine {
    /// Runs one task, or one idle turn when the queue is empty.
    ///
    /// Returns whether anything happened.
    pub fn run_once(&self) -> CoreResult<bool> {
        let task = {
            let mut state = self.lock();
            match state.scheduler.pop() {
                Some(task) => task,
                None => return Ok(state.tick_idle()),
            }
        };
        self.process(task);
        Ok(true)
    }

    /// Runs until there is nothing left to do.
    ///
    /// Returns the number of turns taken. Fails with an invalid-state error
    /// if the configured turn budget is exhausted first.
    pub fn run_until_idle(&self) -> CoreResult<u64> {
        let budget = self.lock().config.max_turns_per_run;
        let mut turns = 0;
        while self.run_once()? {
            turns += 1;
            if turns >= budget {
                return Err(CoreError::invalid_state(format!(
                    "executor did not settle within {budget} turns"
                )));
            }
        }
        Ok(turns)
    }

    fn process(&self, task: Task) {
        match task {
            Task::Submit(_) => self.lock().admit_pending(),
            Task::Execute(id) => self.execute(id),
            Task::Notify(id) => self.notify(id),
            Task::Commit(id) => self.commit(id),
            Task::Abort(id, error) => {
                // Already finished transactions have nothing left to abort.
                let _ = self.lock().abort_now(id, Some(error));
            }
            Task::AbortNotify(id) => self.abort_notify(id),
            Task::Upgrade(open) => self.run_upgrade(open),
            Task::Open(open) => self.process_open(open),
        }
    }

    /// Invokes a listener list with the engine lock released.
    pub(crate) fn dispatch<K: Copy, E>(&self, key: K, select: Selector<K, E>, event: &mut E) {
        let mut taken = {
            let mut state = self.lock();
            match select(&mut state, key) {
                Some(listeners) => listeners.take(),
                None => return,
            }
        };
        taken.emit(event);
        let mut state = self.lock();
        if let Some(listeners) = select(&mut state, key) {
            listeners.restore(taken);
        }
    }

    fn execute(&self, id: RequestId) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(request) = state.requests.get_mut(&id) else {
            return;
        };
        if request.phase != RequestPhase::Pending {
            return;
        }
        let Some(txn) = state.transactions.get_mut(&request.transaction) else {
            return;
        };
        if txn.status != TransactionStatus::Running {
            return;
        }

        request.phase = RequestPhase::Active;
        let result = match txn.view.as_mut() {
            Some(view) => request.operation.run(
                view,
                &mut state.cursors,
                state.config.key_generator_limit,
            ),
            None => Err(CoreError::invalid_state(format!(
                "transaction {} has no view",
                txn.id
            ))),
        };

        state.stats.record_request(result.is_ok());
        if request.operation.is_cursor_step() {
            state.stats.record_cursor_step();
        }
        match &result {
            Ok(_) => debug!(target: "shelfdb::request", request = %id, txn = %txn.id, "request succeeded"),
            Err(err) => debug!(target: "shelfdb::request", request = %id, txn = %txn.id, error = %err, "request failed"),
        }
        request.resolve(result);
        state.scheduler.push(Task::Notify(id));
    }

    fn notify(&self, id: RequestId) {
        let (txn_id, error) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(request) = state.requests.get_mut(&id) else {
                return;
            };
            let Some(txn) = state.transactions.get_mut(&request.transaction) else {
                return;
            };
            if txn.status != TransactionStatus::Running || !request.is_done() {
                return;
            }
            request.dispatching = true;
            txn.active = true;
            (txn.id, request.error.clone())
        };

        let (request, transaction) = {
            let state = self.lock();
            let transaction = state.transaction_handle(self, txn_id);
            (state.request_handle(self, id, transaction.clone()), transaction)
        };
        let mut abort_with = None;
        match error {
            None => {
                let mut event = SuccessEvent { request };
                self.dispatch(id, request_success, &mut event);
            }
            Some(error) => {
                let mut event = ErrorEvent::new(Some(request), transaction, error.clone());
                self.dispatch(id, request_error, &mut event);
                self.dispatch(txn_id, transaction_error, &mut event);
                if !event.default_prevented() {
                    abort_with = Some(error);
                }
            }
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(request) = state.requests.get_mut(&id) {
            request.dispatching = false;
            if request.phase == RequestPhase::Repeat {
                request.phase = RequestPhase::Idle;
            }
        }
        if let Some(txn) = state.transactions.get_mut(&txn_id) {
            txn.active = false;
            if txn.in_flight == Some(id) {
                txn.in_flight = None;
            }
        }
        if let Some(error) = abort_with {
            // A listener may already have aborted the transaction.
            let _ = state.abort_now(txn_id, Some(error));
            return;
        }
        state.advance(txn_id);
    }

    fn commit(&self, id: TransactionId) {
        let upgrade = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(txn) = state.transactions.get_mut(&id) else {
                return;
            };
            if txn.status != TransactionStatus::Running || !txn.commit_scheduled {
                return;
            }
            if txn.in_flight.is_some() || !txn.ready.is_empty() {
                txn.commit_scheduled = false;
                state.pump(id);
                return;
            }
            txn.status = TransactionStatus::Committed;
            txn.active = false;
            let view = txn.view.take();
            if let (Some(view), Some(db)) = (view, state.databases.get_mut(&txn.database)) {
                match txn.mode {
                    TransactionMode::StructuralChange => {
                        db.schema = view;
                        db.version = txn.new_version;
                        db.upgrading = None;
                    }
                    TransactionMode::ReadWrite => db.schema.merge_changes(view),
                    TransactionMode::ReadOnly => {}
                }
            }
            if txn.mode == TransactionMode::StructuralChange {
                if let Some(conn) = state.connections.get_mut(&txn.connection) {
                    conn.version = txn.new_version;
                }
            }
            state.stats.record_transaction_commit();
            info!(
                target: "shelfdb::txn",
                txn = %id,
                mode = %txn.mode,
                requests = txn.requests.len(),
                "transaction committed"
            );
            txn.upgrade
        };

        let transaction = self.lock().transaction_handle(self, id);
        let mut event = CompleteEvent { transaction };
        self.dispatch(id, transaction_complete, &mut event);
        if let Some(open) = upgrade {
            self.finish_upgrade(open, None);
        }
        self.finish(id);
    }

    fn abort_notify(&self, id: TransactionId) {
        let (rejected, error, upgrade) = {
            let mut state = self.lock();
            let Some(txn) = state.transactions.get_mut(&id) else {
                return;
            };
            (std::mem::take(&mut txn.rejected), txn.error.clone(), txn.upgrade)
        };

        for request_id in rejected {
            let reason = self
                .lock()
                .requests
                .get(&request_id)
                .and_then(|r| r.error.clone())
                .unwrap_or_else(|| CoreError::abort(format!("transaction {id} was aborted")));
            let (request, transaction) = {
                let state = self.lock();
                let transaction = state.transaction_handle(self, id);
                (state.request_handle(self, request_id, transaction.clone()), transaction)
            };
            let mut event = ErrorEvent::new(Some(request), transaction, reason);
            self.dispatch(request_id, request_error, &mut event);
            self.dispatch(id, transaction_error, &mut event);
        }

        let transaction = self.lock().transaction_handle(self, id);
        let mut event = AbortEvent {
            transaction,
            error: error.clone(),
        };
        self.dispatch(id, transaction_abort, &mut event);
        if let Some(open) = upgrade {
            let reason = error.unwrap_or_else(|| CoreError::abort("upgrade transaction was aborted"));
            self.finish_upgrade(open, Some(reason));
        }
        self.finish(id);
    }

    /// Releases a finished transaction and lets waiting work proceed.
    fn finish(&self, id: TransactionId) {
        let closed = {
            let mut state = self.lock();
            state.scheduler.finish(id);
            let connection = state.release(id).map(|t| t.connection);
            debug!(target: "shelfdb::scheduler", txn = %id, "transaction released");
            state.admit_pending();
            connection.filter(|conn| state.try_finish_close(*conn))
        };
        if let Some(conn) = closed {
            self.notify_closed(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::key::{Key, KeyRange};
    use crate::store::StoreOptions;
    use crate::transaction::{TransactionMode, TransactionStatus};
    use crate::{Config, Direction, Engine, Outcome};
    use shelfdb_codec::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn engine_with_store(config: Config) -> (Engine, crate::Connection) {
        let engine = Engine::with_config(config);
        let open = engine.open("db", Some(1)).unwrap();
        open.on_upgrade_needed(|event| {
            if let Some(txn) = &event.transaction {
                txn.create_object_store("s", &StoreOptions::new().auto_increment(true))
                    .unwrap();
            }
        });
        let conn = open.wait().unwrap();
        (engine, conn)
    }

    #[test]
    fn requests_run_in_order_and_commit() {
        let (engine, conn) = engine_with_store(Config::default());
        let txn = conn.transaction(&["s"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("s").unwrap();
        let first = store.add(Value::empty_map(), None).unwrap();
        let second = store.add(Value::empty_map(), None).unwrap();
        let count = store.count(KeyRange::all()).unwrap();

        engine.run_until_idle().unwrap();
        assert_eq!(first.result().unwrap().key(), Some(&Key::from(1)));
        assert_eq!(second.result().unwrap().key(), Some(&Key::from(2)));
        assert_eq!(count.result().unwrap().count(), Some(2));
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }

    #[test]
    fn inactive_outside_callbacks() {
        let (engine, conn) = engine_with_store(Config::default());
        let txn = conn.transaction(&["s"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("s").unwrap();
        let request = store.add(Value::empty_map(), None).unwrap();

        let chained = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&chained);
        let in_callback = store.clone();
        request.on_success(move |_| {
            *slot.lock().unwrap() = Some(in_callback.count(KeyRange::all()));
        });

        while chained.lock().unwrap().is_none() {
            assert!(engine.run_once().unwrap());
        }
        let err = store.add(Value::empty_map(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionInactive);

        engine.run_until_idle().unwrap();
        let count = chained.lock().unwrap().take().unwrap().unwrap();
        assert_eq!(count.result().unwrap().count(), Some(1));
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }

    #[test]
    fn unhandled_error_aborts_and_rolls_back() {
        let (engine, conn) = engine_with_store(Config::default());
        let txn = conn.transaction(&["s"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("s").unwrap();
        store.add(Value::empty_map(), Some(Key::from(1))).unwrap();
        let duplicate = store.add(Value::empty_map(), Some(Key::from(1))).unwrap();
        let after = store.count(KeyRange::all()).unwrap();

        let aborted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&aborted);
        txn.on_abort(move |event| {
            assert_eq!(event.error.as_ref().map(|e| e.kind()), Some(ErrorKind::Constraint));
            flag.store(true, Ordering::SeqCst);
        });

        engine.run_until_idle().unwrap();
        assert!(aborted.load(Ordering::SeqCst));
        assert_eq!(duplicate.error().map(|e| e.kind()), Some(ErrorKind::Constraint));
        assert_eq!(after.error().map(|e| e.kind()), Some(ErrorKind::Abort));

        let check = conn.transaction(&["s"], TransactionMode::ReadOnly).unwrap();
        let count = check.object_store("s").unwrap().count(KeyRange::all()).unwrap();
        assert_eq!(count.wait().unwrap().count(), Some(0));
    }

    #[test]
    fn prevented_error_keeps_transaction_alive() {
        let (engine, conn) = engine_with_store(Config::default());
        let txn = conn.transaction(&["s"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("s").unwrap();
        store.add(Value::empty_map(), Some(Key::from(1))).unwrap();
        let duplicate = store.add(Value::empty_map(), Some(Key::from(1))).unwrap();
        duplicate.on_error(|event| event.prevent_default());

        engine.run_until_idle().unwrap();
        assert_eq!(txn.status(), TransactionStatus::Committed);
    }

    #[test]
    fn empty_transaction_times_out() {
        let (engine, conn) = engine_with_store(Config::default().idle_timeout_ticks(3));
        let txn = conn.transaction(&["s"], TransactionMode::ReadOnly).unwrap();
        engine.run_until_idle().unwrap();
        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(txn.error().map(|e| e.kind()), Some(ErrorKind::Timeout));
        assert_eq!(engine.stats().transactions_timed_out, 1);
    }

    #[test]
    fn turn_budget_is_enforced() {
        let (engine, conn) = engine_with_store(Config::default().max_turns_per_run(2));
        let txn = conn.transaction(&["s"], TransactionMode::ReadWrite).unwrap();
        txn.object_store("s")
            .unwrap()
            .add(Value::empty_map(), None)
            .unwrap();
        let err = engine.run_until_idle().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn finished_transactions_are_released() {
        let (engine, conn) = engine_with_store(Config::default());
        let mut last = None;
        for _ in 0..200 {
            let txn = conn.transaction(&["s"], TransactionMode::ReadWrite).unwrap();
            let store = txn.object_store("s").unwrap();
            let add = store.add(Value::empty_map(), None).unwrap();
            let cursor = store.open_cursor(KeyRange::all(), Direction::Next).unwrap();
            last = Some((txn, add, cursor));
        }
        engine.run_until_idle().unwrap();

        {
            let state = engine.lock();
            assert!(state.transactions.is_empty());
            assert!(state.requests.is_empty());
            assert!(state.cursors.is_empty());
        }

        let (txn, add, cursor) = last.unwrap();
        assert_eq!(txn.status(), TransactionStatus::Committed);
        assert_eq!(txn.mode(), TransactionMode::ReadWrite);
        assert_eq!(txn.object_store_names(), vec!["s".to_string()]);
        assert!(!txn.is_active());
        assert_eq!(add.result().unwrap().key(), Some(&Key::from(200)));
        assert!(add.is_done());
        assert_eq!(add.transaction().status(), TransactionStatus::Committed);
        assert!(matches!(cursor.result().unwrap(), Outcome::Cursor(Some(_))));

        let err = txn.object_store("s").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(txn.abort().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn released_requests_keep_their_errors() {
        let (engine, conn) = engine_with_store(Config::default());
        let txn = conn.transaction(&["s"], TransactionMode::ReadWrite).unwrap();
        let store = txn.object_store("s").unwrap();
        store.add(Value::empty_map(), Some(Key::from(1))).unwrap();
        let duplicate = store.add(Value::empty_map(), Some(Key::from(1))).unwrap();

        engine.run_until_idle().unwrap();
        assert!(engine.lock().requests.is_empty());
        assert_eq!(txn.status(), TransactionStatus::Aborted);
        assert_eq!(txn.error().map(|e| e.kind()), Some(ErrorKind::Constraint));
        assert_eq!(duplicate.error().map(|e| e.kind()), Some(ErrorKind::Constraint));
        assert_eq!(duplicate.result().unwrap_err().kind(), ErrorKind::Constraint);
    }

    #[test]
    fn removing_abort_listener_keeps_complete_listener() {
        let (engine, conn) = engine_with_store(Config::default());
        let txn = conn.transaction(&["s"], TransactionMode::ReadWrite).unwrap();
        txn.object_store("s")
            .unwrap()
            .add(Value::empty_map(), None)
            .unwrap();

        let completed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&completed);
        let complete_id = txn.on_complete(move |_| flag.store(true, Ordering::SeqCst));
        let abort_id = txn.on_abort(|_| panic!("aborted"));
        assert_ne!(complete_id, abort_id);
        assert!(txn.remove_listener(abort_id));
        assert!(!txn.remove_listener(abort_id));

        engine.run_until_idle().unwrap();
        assert_eq!(txn.status(), TransactionStatus::Committed);
        assert!(completed.load(Ordering::SeqCst));
    }
}
