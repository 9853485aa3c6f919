//! # ShelfDB Core
//!
//! Transactional in-memory record engine for ShelfDB.
//!
//! This crate provides:
//! - Databases with versioned schemas and an upgrade protocol
//! - Object stores with in-line or out-of-line keys and key generators
//! - Secondary indexes, including unique and multi-entry indexes
//! - Scoped transactions with snapshot isolation and rollback
//! - Cursors over stores and indexes
//! - A single-threaded task executor driven by the caller
//! - Declarative bootstrap of seeded databases
//!
//! Every operation is asynchronous in the request sense: it returns a
//! handle immediately and completes when the executor runs. Call
//! [`Engine::run_until_idle`] or a `wait` helper to drive it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bootstrap;
mod config;
mod cursor;
mod database;
mod engine;
mod error;
mod events;
mod factory;
mod index;
mod key;
mod request;
mod stats;
mod store;
mod transaction;
mod types;

pub use bootstrap::{
    BootstrapEvent, BootstrapReport, DatabaseDefinition, IndexDefinition, NoSeedLoader,
    SeedLoader, StoreDefinition,
};
pub use config::{Config, DEFAULT_KEY_GENERATOR_LIMIT};
pub use cursor::{Cursor, CursorSource, Direction};
pub use database::{Connection, DatabaseInfo, IndexInfo, Schema, StoreInfo};
pub use engine::Engine;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use events::{
    AbortEvent, CloseEvent, CompleteEvent, ErrorEvent, ListenerId, Listeners, OpenEvent,
    SuccessEvent, VersionChangeEvent,
};
pub use factory::{DeleteRequest, OpenRequest};
pub use index::{IndexEntry, IndexOptions, SecondaryIndex};
pub use key::{Key, KeyPath, KeyRange};
pub use request::{Outcome, Request, RequestPhase};
pub use stats::{EngineStats, StatsSnapshot};
pub use store::{IndexPopulation, Record, RecordStore, StoreOptions};
pub use transaction::{Index, ObjectStore, Transaction, TransactionMode, TransactionStatus};
pub use types::{ConnectionId, CursorId, OpenId, RequestId, TransactionId};

pub use shelfdb_codec::Value;
