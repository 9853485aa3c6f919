//! Typed notification channels.
//!
//! Every component that reports progress exposes one [`Listeners`] list per
//! event kind. Listeners fire in registration order and always run with the
//! engine lock released, so a callback may queue further requests, step a
//! cursor or abort its transaction.

use crate::database::Connection;
use crate::error::CoreError;
use crate::factory::OpenRequest;
use crate::request::Request;
use crate::transaction::Transaction;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle returned when registering a listener; pass it back to remove it.
///
/// Ids are unique across every listener list in the process, so an id
/// only ever matches the callback it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Returned when the target no longer exists; removing it is a no-op.
    pub const DETACHED: ListenerId = ListenerId(0);

    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type Callback<E> = Box<dyn FnMut(&mut E) + Send>;

/// An ordered list of callbacks for one event kind.
pub struct Listeners<E> {
    entries: Vec<(ListenerId, Callback<E>)>,
    dispatching: Vec<ListenerId>,
    removed: Vec<ListenerId>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            dispatching: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.entries.len())
            .field("dispatching", &self.dispatching.len())
            .finish()
    }
}

impl<E> Listeners<E> {
    /// Registers a callback.
    pub fn add<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&mut E) + Send + 'static,
    {
        let id = ListenerId::next();
        self.entries.push((id, Box::new(callback)));
        id
    }

    /// Removes a callback. Returns false if it is not registered here.
    ///
    /// A listener removed while its list is being dispatched is dropped once
    /// the dispatch finishes.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        if let Some(pos) = self.entries.iter().position(|(entry, _)| *entry == id) {
            self.entries.remove(pos);
            return true;
        }
        if self.dispatching.contains(&id) {
            if !self.removed.contains(&id) {
                self.removed.push(id);
            }
            return true;
        }
        false
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no callbacks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invokes every callback in order.
    pub fn emit(&mut self, event: &mut E) {
        for (_, callback) in &mut self.entries {
            callback(event);
        }
    }

    /// Detaches the callbacks for dispatch outside the engine lock.
    pub(crate) fn take(&mut self) -> Self {
        let entries = std::mem::take(&mut self.entries);
        self.dispatching.extend(entries.iter().map(|(id, _)| *id));
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Reattaches callbacks detached by [`take`](Self::take), ahead of any
    /// registered during dispatch.
    pub(crate) fn restore(&mut self, mut taken: Self) {
        let removed = &self.removed;
        taken.entries.retain(|(id, _)| !removed.contains(id));
        for (id, _) in &taken.entries {
            self.dispatching.retain(|d| d != id);
        }
        self.dispatching.retain(|d| !self.removed.contains(d));
        self.removed.clear();
        taken.entries.append(&mut self.entries);
        self.entries = taken.entries;
    }
}

/// A request finished successfully.
#[derive(Debug, Clone)]
pub struct SuccessEvent {
    /// The finished request; read its result with [`Request::result`].
    pub request: Request,
}

/// A request failed, or a transaction is about to abort because of one.
///
/// Unless a listener calls [`prevent_default`](Self::prevent_default) the
/// owning transaction aborts with `error`.
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    /// The failed request, if the error came from one.
    pub request: Option<Request>,
    /// The owning transaction.
    pub transaction: Transaction,
    /// The failure.
    pub error: CoreError,
    default_prevented: bool,
}

impl ErrorEvent {
    pub(crate) fn new(request: Option<Request>, transaction: Transaction, error: CoreError) -> Self {
        Self {
            request,
            transaction,
            error,
            default_prevented: false,
        }
    }

    /// Keeps the transaction alive despite the error.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Whether a listener suppressed the abort.
    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// A transaction committed.
#[derive(Debug, Clone)]
pub struct CompleteEvent {
    /// The committed transaction.
    pub transaction: Transaction,
}

/// A transaction aborted.
#[derive(Debug, Clone)]
pub struct AbortEvent {
    /// The aborted transaction.
    pub transaction: Transaction,
    /// Why it aborted; `None` for an explicit [`Transaction::abort`].
    pub error: Option<CoreError>,
}

/// Another party wants to upgrade or delete the database.
///
/// The receiving connection should close so the change can proceed.
#[derive(Debug, Clone)]
pub struct VersionChangeEvent {
    /// The connection being asked to close.
    pub connection: Connection,
    /// Its current version.
    pub old_version: u64,
    /// The requested version, `None` for a delete.
    pub new_version: Option<u64>,
}

/// A connection finished closing.
#[derive(Debug, Clone)]
pub struct CloseEvent {
    /// The closed connection.
    pub connection: Connection,
}

/// Progress of an open or delete request.
#[derive(Debug, Clone)]
pub struct OpenEvent {
    /// The request reporting progress.
    pub request: OpenRequest,
    /// Database version before the request.
    pub old_version: u64,
    /// Target version, `None` for a delete.
    pub new_version: Option<u64>,
    /// The new connection, when one exists.
    pub connection: Option<Connection>,
    /// The upgrade transaction, for upgrade-needed events.
    pub transaction: Option<Transaction>,
    /// The failure, for error events.
    pub error: Option<CoreError>,
}
