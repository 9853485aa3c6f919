//! Transaction state.

use super::{TransactionMode, TransactionStatus};
use crate::database::Schema;
use crate::error::{CoreError, CoreResult};
use crate::events::{AbortEvent, CompleteEvent, ErrorEvent, Listeners};
use crate::types::{ConnectionId, CursorId, OpenId, RequestId, TransactionId};
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

/// What a transaction handle can still report once the engine has
/// released the transaction.
#[derive(Debug, Clone)]
pub(crate) struct SettledTransaction {
    pub(crate) mode: TransactionMode,
    pub(crate) status: TransactionStatus,
    pub(crate) error: Option<CoreError>,
    pub(crate) store_names: Vec<String>,
}

/// Shared between the engine state and every handle of one transaction.
pub(crate) type SettledSlot<T> = Arc<OnceLock<T>>;

/// Engine-side state of a transaction.
///
/// The `active` flag gates request placement. It is set from creation until
/// the first request notification has been delivered, and again while any
/// of the transaction's own callbacks run. Outside those windows new
/// requests fail with a transaction-inactive error.
#[derive(Debug)]
pub(crate) struct TransactionState {
    pub(crate) id: TransactionId,
    pub(crate) database: String,
    pub(crate) connection: ConnectionId,
    pub(crate) mode: TransactionMode,
    /// Sorted, distinct store names.
    pub(crate) scope: Vec<String>,
    pub(crate) status: TransactionStatus,
    pub(crate) active: bool,
    pub(crate) error: Option<CoreError>,
    /// Every request ever placed, in order.
    pub(crate) requests: Vec<RequestId>,
    /// Requests waiting to execute.
    pub(crate) ready: VecDeque<RequestId>,
    pub(crate) in_flight: Option<RequestId>,
    /// Private view, present while running.
    pub(crate) view: Option<Schema>,
    /// Set once a request or an upgrade callback has run.
    pub(crate) started_work: bool,
    pub(crate) idle_ticks: u32,
    pub(crate) commit_scheduled: bool,
    /// Requests rejected by an abort, still to be notified.
    pub(crate) rejected: Vec<RequestId>,
    pub(crate) cursors: Vec<CursorId>,
    /// Open request this transaction upgrades for.
    pub(crate) upgrade: Option<OpenId>,
    pub(crate) old_version: u64,
    pub(crate) new_version: u64,
    pub(crate) on_complete: Listeners<CompleteEvent>,
    pub(crate) on_abort: Listeners<AbortEvent>,
    pub(crate) on_error: Listeners<ErrorEvent>,
    /// Filled when the transaction is released.
    pub(crate) settled: SettledSlot<SettledTransaction>,
}

impl TransactionState {
    pub(crate) fn new(
        id: TransactionId,
        database: String,
        connection: ConnectionId,
        mode: TransactionMode,
        scope: Vec<String>,
    ) -> Self {
        Self {
            id,
            database,
            connection,
            mode,
            scope,
            status: TransactionStatus::Idle,
            active: true,
            error: None,
            requests: Vec::new(),
            ready: VecDeque::new(),
            in_flight: None,
            view: None,
            started_work: false,
            idle_ticks: 0,
            commit_scheduled: false,
            rejected: Vec::new(),
            cursors: Vec::new(),
            upgrade: None,
            old_version: 0,
            new_version: 0,
            on_complete: Listeners::default(),
            on_abort: Listeners::default(),
            on_error: Listeners::default(),
            settled: SettledSlot::default(),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Whether `name` may be accessed by this transaction.
    pub(crate) fn in_scope(&self, name: &str) -> bool {
        match self.mode {
            TransactionMode::StructuralChange => {
                self.view.as_ref().map_or(true, |view| view.contains(name))
            }
            _ => self.scope.binary_search_by(|s| s.as_str().cmp(name)).is_ok(),
        }
    }

    /// Fails unless requests may be placed right now.
    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        if self.is_finished() {
            return Err(CoreError::transaction_inactive(format!(
                "transaction {} has finished",
                self.id
            )));
        }
        if !self.active {
            return Err(CoreError::transaction_inactive(format!(
                "transaction {} is not active outside its callbacks",
                self.id
            )));
        }
        Ok(())
    }

    /// Whether this running transaction prevents `other` from starting.
    pub(crate) fn blocks(&self, other: &TransactionState) -> bool {
        if self.database != other.database {
            return false;
        }
        use TransactionMode::{ReadOnly, StructuralChange};
        match (self.mode, other.mode) {
            (StructuralChange, _) | (_, StructuralChange) => true,
            (ReadOnly, ReadOnly) => false,
            _ => self.overlaps(other),
        }
    }

    fn overlaps(&self, other: &TransactionState) -> bool {
        let (mut a, mut b) = (self.scope.iter().peekable(), other.scope.iter().peekable());
        while let (Some(x), Some(y)) = (a.peek(), b.peek()) {
            match x.cmp(y) {
                std::cmp::Ordering::Less => {
                    a.next();
                }
                std::cmp::Ordering::Greater => {
                    b.next();
                }
                std::cmp::Ordering::Equal => return true,
            }
        }
        false
    }

    /// Whether the idle watchdog applies: running, no work yet, nothing
    /// queued.
    pub(crate) fn is_idle(&self) -> bool {
        self.status == TransactionStatus::Running
            && !self.started_work
            && !self.commit_scheduled
            && self.in_flight.is_none()
            && self.ready.is_empty()
    }
}
