//! Transactions and their scheduling.
//!
//! A transaction groups requests against a fixed scope of stores:
//! - **ReadOnly** transactions run alongside each other and alongside
//!   writers on other stores
//! - **ReadWrite** transactions exclude every other transaction that shares
//!   one of their stores
//! - **StructuralChange** transactions exclude everything else on the
//!   database and may create or drop stores and indexes
//!
//! Each transaction works on a private view taken when it is admitted.
//! Commit publishes the view; abort discards it, which rolls back record
//! writes and structural changes alike.

mod executor;
mod handle;
mod scheduler;
mod state;

pub use handle::{Index, ObjectStore, Transaction};
pub(crate) use scheduler::{Scheduler, Task};
pub(crate) use state::{SettledSlot, SettledTransaction, TransactionState};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Isolation mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and record writes.
    ReadWrite,
    /// Exclusive access including store and index creation. Only upgrades
    /// run in this mode.
    #[serde(rename = "versionchange")]
    StructuralChange,
}

impl TransactionMode {
    /// The mode's name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransactionMode::ReadOnly => "readonly",
            TransactionMode::ReadWrite => "readwrite",
            TransactionMode::StructuralChange => "versionchange",
        }
    }

    /// Whether records may be written.
    #[must_use]
    pub const fn can_write(self) -> bool {
        !matches!(self, TransactionMode::ReadOnly)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readonly" => Ok(TransactionMode::ReadOnly),
            "readwrite" => Ok(TransactionMode::ReadWrite),
            "versionchange" => Ok(TransactionMode::StructuralChange),
            other => Err(CoreError::invalid_access(format!(
                "'{other}' is not a transaction mode"
            ))),
        }
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Waiting for admission.
    Idle,
    /// Admitted; requests execute.
    Running,
    /// Changes published.
    Committed,
    /// Changes discarded.
    Aborted,
}

impl TransactionStatus {
    /// Whether the transaction has committed or aborted.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Aborted)
    }
}
