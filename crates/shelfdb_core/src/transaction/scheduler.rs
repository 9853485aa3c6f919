//! Admission control and the executor task queue.

use super::{TransactionState, TransactionStatus};
use crate::error::CoreError;
use crate::types::{OpenId, RequestId, TransactionId};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// A unit of work for the executor.
///
/// Tasks run strictly in queue order, one at a time, on whichever thread
/// drives the engine.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Task {
    /// Re-evaluate admission after a transaction was created.
    Submit(TransactionId),
    /// Run a request's operation.
    Execute(RequestId),
    /// Deliver a finished request's result to its listeners.
    Notify(RequestId),
    /// Publish a drained transaction.
    Commit(TransactionId),
    /// Abort raised outside a request, such as a failed index build.
    Abort(TransactionId, CoreError),
    /// Deliver abort notifications and release the transaction.
    AbortNotify(TransactionId),
    /// Run the upgrade callback of an open request.
    Upgrade(OpenId),
    /// Process the open or delete request at the head of its database queue.
    Open(OpenId),
}

/// Decides which transactions may run and owns the task queue.
///
/// Live transactions are kept in submission order. Whenever one finishes,
/// every waiting transaction is re-checked in that order and each one that
/// no running transaction blocks is started. A waiting transaction never
/// blocks a later one, so a steady stream of readers can starve a writer.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    tasks: VecDeque<Task>,
    live: Vec<TransactionId>,
    running: BTreeSet<TransactionId>,
}

impl Scheduler {
    pub(crate) fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub(crate) fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub(crate) fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Registers a new transaction and queues its admission check.
    pub(crate) fn submit(&mut self, id: TransactionId) {
        self.live.push(id);
        self.tasks.push_back(Task::Submit(id));
    }

    /// Live (waiting or running) transactions in submission order.
    pub(crate) fn live(&self) -> &[TransactionId] {
        &self.live
    }

    pub(crate) fn running(&self) -> impl Iterator<Item = TransactionId> + '_ {
        self.running.iter().copied()
    }

    pub(crate) fn is_running(&self, id: TransactionId) -> bool {
        self.running.contains(&id)
    }

    /// Waiting transactions that may start now, in submission order.
    ///
    /// Each admitted candidate counts as running for the candidates after
    /// it.
    pub(crate) fn admissible(
        &self,
        transactions: &HashMap<TransactionId, TransactionState>,
    ) -> Vec<TransactionId> {
        let mut running: Vec<&TransactionState> = self
            .running
            .iter()
            .filter_map(|id| transactions.get(id))
            .collect();
        let mut admitted = Vec::new();
        for id in &self.live {
            let Some(candidate) = transactions.get(id) else {
                continue;
            };
            if candidate.status != TransactionStatus::Idle {
                continue;
            }
            if running.iter().all(|r| !r.blocks(candidate)) {
                running.push(candidate);
                admitted.push(*id);
            }
        }
        admitted
    }

    pub(crate) fn mark_running(&mut self, id: TransactionId) {
        self.running.insert(id);
    }

    /// Forgets a finished transaction.
    pub(crate) fn finish(&mut self, id: TransactionId) {
        self.live.retain(|t| *t != id);
        self.running.remove(&id);
    }
}
