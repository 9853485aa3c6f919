//! Requests: the asynchronous unit of work.
//!
//! Every store, index and cursor operation returns a [`Request`]. The
//! operation itself runs later, on the engine's executor, against the
//! owning transaction's private view. A request moves through
//! `Idle -> Pending -> Active -> Done`; cursor steps recycle a done request
//! back to `Idle` (via `Repeat` while its own listeners are running) so one
//! request represents a whole iteration.

use crate::cursor::{Cursor, CursorState};
use crate::database::Schema;
use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use crate::events::{ErrorEvent, ListenerId, Listeners, SuccessEvent};
use crate::key::{Key, KeyRange};
use crate::transaction::{SettledSlot, Transaction};
use crate::types::{CursorId, RequestId, TransactionId};
use shelfdb_codec::Value;
use std::collections::HashMap;
use std::fmt;

/// Lifecycle phase of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Queued, waiting for its turn in the transaction.
    Idle,
    /// Scheduled on the executor.
    Pending,
    /// Running.
    Active,
    /// Finished with a result or an error.
    Done,
    /// Recycled while its own listeners were running.
    Repeat,
}

/// A storage operation bound to a request.
#[derive(Debug, Clone)]
pub(crate) enum Operation {
    Put {
        store: String,
        value: Value,
        key: Option<Key>,
        no_overwrite: bool,
    },
    Get {
        store: String,
        range: KeyRange,
    },
    GetKey {
        store: String,
        range: KeyRange,
    },
    Delete {
        store: String,
        range: KeyRange,
    },
    Clear {
        store: String,
    },
    Count {
        store: String,
        range: KeyRange,
    },
    IndexGet {
        store: String,
        index: String,
        range: KeyRange,
    },
    IndexGetKey {
        store: String,
        index: String,
        range: KeyRange,
    },
    IndexCount {
        store: String,
        index: String,
        range: KeyRange,
    },
    OpenCursor {
        cursor: CursorId,
    },
    IterateCursor {
        cursor: CursorId,
        target: Option<Key>,
        count: u32,
    },
}

impl Operation {
    pub(crate) fn is_cursor_step(&self) -> bool {
        matches!(
            self,
            Operation::OpenCursor { .. } | Operation::IterateCursor { .. }
        )
    }

    /// Runs the operation against a transaction view.
    pub(crate) fn run(
        &self,
        view: &mut Schema,
        cursors: &mut HashMap<CursorId, CursorState>,
        key_limit: u64,
    ) -> CoreResult<RequestOutput> {
        match self {
            Operation::Put {
                store,
                value,
                key,
                no_overwrite,
            } => view
                .store_mut(store)?
                .put(value.clone(), key.clone(), *no_overwrite, key_limit)
                .map(|key| RequestOutput::Key(Some(key))),
            Operation::Get { store, range } => Ok(RequestOutput::Value(
                view.store(store)?.get(range).map(|r| r.value.clone()),
            )),
            Operation::GetKey { store, range } => Ok(RequestOutput::Key(
                view.store(store)?.get(range).map(|r| r.key.clone()),
            )),
            Operation::Delete { store, range } => {
                view.store_mut(store)?.delete(range);
                Ok(RequestOutput::Undefined)
            }
            Operation::Clear { store } => {
                view.store_mut(store)?.clear();
                Ok(RequestOutput::Undefined)
            }
            Operation::Count { store, range } => {
                Ok(RequestOutput::Count(view.store(store)?.count(range)))
            }
            Operation::IndexGet {
                store,
                index,
                range,
            } => {
                let records = view.store(store)?;
                let value = records
                    .require_index(index)?
                    .get(range)
                    .and_then(|primary| records.find(primary))
                    .map(|r| r.value.clone());
                Ok(RequestOutput::Value(value))
            }
            Operation::IndexGetKey {
                store,
                index,
                range,
            } => {
                let primary = view.store(store)?.require_index(index)?.get(range).cloned();
                Ok(RequestOutput::Key(primary))
            }
            Operation::IndexCount {
                store,
                index,
                range,
            } => Ok(RequestOutput::Count(
                view.store(store)?.require_index(index)?.count(range),
            )),
            Operation::OpenCursor { cursor } => {
                iterate(view, cursors, *cursor, None, 1)
            }
            Operation::IterateCursor {
                cursor,
                target,
                count,
            } => iterate(view, cursors, *cursor, target.as_ref(), *count),
        }
    }
}

fn iterate(
    view: &Schema,
    cursors: &mut HashMap<CursorId, CursorState>,
    id: CursorId,
    target: Option<&Key>,
    count: u32,
) -> CoreResult<RequestOutput> {
    let cursor = cursors
        .get_mut(&id)
        .ok_or_else(|| CoreError::invalid_state(format!("cursor {id} no longer exists")))?;
    let positioned = cursor.iterate(view, target, count)?;
    Ok(RequestOutput::Cursor(positioned.then_some(id)))
}

/// Raw result stored on a finished request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RequestOutput {
    Undefined,
    Key(Option<Key>),
    Value(Option<Value>),
    Count(usize),
    Cursor(Option<CursorId>),
}

/// Final result of a request, kept by its handles once the engine has
/// released the owning transaction.
#[derive(Debug, Clone)]
pub(crate) struct SettledRequest {
    pub(crate) output: Option<RequestOutput>,
    pub(crate) error: Option<CoreError>,
}

/// Engine-side state of a request.
#[derive(Debug)]
pub(crate) struct RequestState {
    pub(crate) id: RequestId,
    pub(crate) transaction: TransactionId,
    pub(crate) operation: Operation,
    pub(crate) phase: RequestPhase,
    pub(crate) dispatching: bool,
    pub(crate) output: Option<RequestOutput>,
    pub(crate) error: Option<CoreError>,
    pub(crate) on_success: Listeners<SuccessEvent>,
    pub(crate) on_error: Listeners<ErrorEvent>,
    pub(crate) settled: SettledSlot<SettledRequest>,
}

impl RequestState {
    pub(crate) fn new(id: RequestId, transaction: TransactionId, operation: Operation) -> Self {
        Self {
            id,
            transaction,
            operation,
            phase: RequestPhase::Idle,
            dispatching: false,
            output: None,
            error: None,
            on_success: Listeners::default(),
            on_error: Listeners::default(),
            settled: SettledSlot::default(),
        }
    }

    /// Hands the result over to the request's handles.
    pub(crate) fn settle(self) {
        let _ = self.settled.set(SettledRequest {
            output: self.output,
            error: self.error,
        });
    }

    pub(crate) fn is_done(&self) -> bool {
        self.phase == RequestPhase::Done
    }

    pub(crate) fn resolve(&mut self, result: CoreResult<RequestOutput>) {
        self.phase = RequestPhase::Done;
        match result {
            Ok(output) => {
                self.output = Some(output);
                self.error = None;
            }
            Err(err) => {
                self.output = None;
                self.error = Some(err);
            }
        }
    }

    /// Binds a new operation to a finished request.
    pub(crate) fn recycle(&mut self, operation: Operation) -> CoreResult<()> {
        if !self.is_done() {
            return Err(CoreError::invalid_state(format!(
                "request {} is still running",
                self.id
            )));
        }
        self.operation = operation;
        self.output = None;
        self.error = None;
        self.phase = if self.dispatching {
            RequestPhase::Repeat
        } else {
            RequestPhase::Idle
        };
        Ok(())
    }
}

/// Result of a finished request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The operation has no result (delete, clear).
    Undefined,
    /// A key, or `None` if nothing matched.
    Key(Option<Key>),
    /// A value, or `None` if nothing matched.
    Value(Option<Value>),
    /// A record count.
    Count(usize),
    /// A positioned cursor, or `None` once iteration ran off its range.
    Cursor(Option<Cursor>),
}

impl Outcome {
    /// The key, for key results.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        match self {
            Outcome::Key(key) => key.as_ref(),
            _ => None,
        }
    }

    /// The value, for value results.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Value(value) => value.as_ref(),
            _ => None,
        }
    }

    /// The count, for count results.
    #[must_use]
    pub fn count(&self) -> Option<usize> {
        match self {
            Outcome::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// The cursor, for cursor results.
    #[must_use]
    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            Outcome::Cursor(cursor) => cursor.as_ref(),
            _ => None,
        }
    }
}

/// Handle to a request.
#[derive(Clone)]
pub struct Request {
    engine: Engine,
    id: RequestId,
    transaction: Transaction,
    settled: SettledSlot<SettledRequest>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request").field("id", &self.id).finish()
    }
}

impl Request {
    pub(crate) fn new(
        engine: Engine,
        id: RequestId,
        transaction: Transaction,
        settled: SettledSlot<SettledRequest>,
    ) -> Self {
        Self {
            engine,
            id,
            transaction,
            settled,
        }
    }

    /// Request identifier.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> RequestPhase {
        self.engine
            .lock()
            .requests
            .get(&self.id)
            .map_or(RequestPhase::Done, |r| r.phase)
    }

    /// Whether the request has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase() == RequestPhase::Done
    }

    /// The owning transaction.
    #[must_use]
    pub fn transaction(&self) -> Transaction {
        self.transaction.clone()
    }

    /// The error, if the request failed.
    #[must_use]
    pub fn error(&self) -> Option<CoreError> {
        let live = self
            .engine
            .lock()
            .requests
            .get(&self.id)
            .map(|r| r.error.clone());
        match live {
            Some(error) => error,
            None => self.settled.get().and_then(|s| s.error.clone()),
        }
    }

    /// The result of a finished request.
    ///
    /// Fails with an invalid-state error while the request is still
    /// outstanding, and with the request's own error if it failed.
    pub fn result(&self) -> CoreResult<Outcome> {
        let live = {
            let state = self.engine.lock();
            state.requests.get(&self.id).map(|request| {
                if !request.is_done() {
                    return Err(CoreError::invalid_state(format!(
                        "request {} has not finished",
                        self.id
                    )));
                }
                match &request.error {
                    Some(err) => Err(err.clone()),
                    None => Ok(request.output.clone().unwrap_or(RequestOutput::Undefined)),
                }
            })
        };
        // Released requests leave their result in the shared slot.
        let output = match live {
            Some(result) => result?,
            None => match self.settled.get() {
                Some(settled) => settled_output(settled)?,
                None => {
                    return Err(CoreError::invalid_state(format!(
                        "request {} does not exist",
                        self.id
                    )))
                }
            },
        };
        Ok(match output {
            RequestOutput::Undefined => Outcome::Undefined,
            RequestOutput::Key(key) => Outcome::Key(key),
            RequestOutput::Value(value) => Outcome::Value(value),
            RequestOutput::Count(n) => Outcome::Count(n),
            RequestOutput::Cursor(cursor) => {
                Outcome::Cursor(cursor.map(|id| Cursor::new(self.engine.clone(), id)))
            }
        })
    }

    /// Drives the executor until this request finishes, then returns its
    /// result.
    pub fn wait(&self) -> CoreResult<Outcome> {
        while !self.is_done() {
            if !self.engine.run_once()? {
                return Err(CoreError::invalid_state(format!(
                    "request {} cannot make progress",
                    self.id
                )));
            }
        }
        self.result()
    }

    /// Registers a success listener.
    pub fn on_success<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut SuccessEvent) + Send + 'static,
    {
        let mut state = self.engine.lock();
        match state.requests.get_mut(&self.id) {
            Some(request) => request.on_success.add(callback),
            None => ListenerId::DETACHED,
        }
    }

    /// Registers an error listener.
    ///
    /// Call [`ErrorEvent::prevent_default`] to keep the transaction alive.
    pub fn on_error<F>(&self, callback: F) -> ListenerId
    where
        F: FnMut(&mut ErrorEvent) + Send + 'static,
    {
        let mut state = self.engine.lock();
        match state.requests.get_mut(&self.id) {
            Some(request) => request.on_error.add(callback),
            None => ListenerId::DETACHED,
        }
    }
}

fn settled_output(settled: &SettledRequest) -> CoreResult<RequestOutput> {
    match &settled.error {
        Some(err) => Err(err.clone()),
        None => Ok(settled.output.clone().unwrap_or(RequestOutput::Undefined)),
    }
}
