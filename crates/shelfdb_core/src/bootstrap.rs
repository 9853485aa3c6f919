//! Declarative database bootstrap.
//!
//! A [`DatabaseDefinition`] lists stores with their key options, indexes
//! and seed records. Bootstrapping builds the whole database in one step:
//! every store is created, seeded, then indexed. Failures are reported per
//! store in a [`BootstrapReport`] instead of failing the call; a fully
//! successful bootstrap reports a single `Ready` event.
//!
//! ```json
//! {
//!   "version": 1,
//!   "stores": [
//!     {
//!       "name": "characters",
//!       "keyOptions": { "keyPath": "name" },
//!       "indexes": [{ "name": "parents", "keyPath": "parent", "multiEntry": true }],
//!       "seedData": [{ "name": "Bart", "parent": ["Homer", "Marge"] }]
//!     }
//!   ]
//! }
//! ```

use crate::database::{DatabaseState, Schema};
use crate::engine::Engine;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexOptions;
use crate::key::KeyPath;
use crate::store::{IndexPopulation, RecordStore, StoreOptions};
use serde::{Deserialize, Serialize};
use shelfdb_codec::Value;
use tracing::{info, warn};

fn default_version() -> u64 {
    1
}

fn default_unique() -> bool {
    true
}

/// A database to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseDefinition {
    /// Version the database starts at.
    #[serde(default = "default_version")]
    pub version: u64,
    /// Stores in creation order.
    #[serde(default)]
    pub stores: Vec<StoreDefinition>,
}

impl Default for DatabaseDefinition {
    fn default() -> Self {
        Self {
            version: default_version(),
            stores: Vec::new(),
        }
    }
}

impl DatabaseDefinition {
    /// Parses a definition from JSON text.
    pub fn from_json_str(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::data(format!("invalid database definition: {e}")))
    }
}

/// One store of a [`DatabaseDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDefinition {
    /// Store name.
    pub name: String,
    /// Key path and generator settings.
    #[serde(default)]
    pub key_options: StoreOptions,
    /// Indexes, built after the seed records are loaded.
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    /// In-line seed records. Takes precedence over `seed_url`.
    #[serde(default)]
    pub seed_data: Option<Vec<Value>>,
    /// Location handed to the [`SeedLoader`].
    #[serde(default)]
    pub seed_url: Option<String>,
    /// Reject seed records with duplicate keys instead of overwriting.
    #[serde(default = "default_unique")]
    pub unique: bool,
}

impl StoreDefinition {
    /// A store with no indexes or seed records.
    #[must_use]
    pub fn new(name: impl Into<String>, key_options: StoreOptions) -> Self {
        Self {
            name: name.into(),
            key_options,
            indexes: Vec::new(),
            seed_data: None,
            seed_url: None,
            unique: true,
        }
    }
}

/// One index of a [`StoreDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Key path the index derives keys from.
    pub key_path: KeyPath,
    /// At most one record per index key.
    #[serde(default)]
    pub unique: bool,
    /// Index each element of array values.
    #[serde(default)]
    pub multi_entry: bool,
}

/// Fetches seed records for a store from a `seed_url`.
pub trait SeedLoader {
    /// Loads the records behind `url`.
    fn load(&self, url: &str) -> CoreResult<Vec<Value>>;
}

/// A loader that supports no locations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSeedLoader;

impl SeedLoader for NoSeedLoader {
    fn load(&self, url: &str) -> CoreResult<Vec<Value>> {
        Err(CoreError::not_supported(format!(
            "no seed loader is configured for '{url}'"
        )))
    }
}

/// Outcome notification of a bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapEvent {
    /// Every store was created, seeded and indexed.
    Ready {
        /// Database name.
        database: String,
        /// Database version.
        version: u64,
    },
    /// A store or one of its indexes failed.
    Error {
        /// Store name.
        store: String,
        /// Index name, when an index failed.
        index: Option<String>,
        /// The failure.
        error: CoreError,
    },
}

/// Everything that happened during a bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapReport {
    /// Database name.
    pub database: String,
    /// Events in the order they occurred.
    pub events: Vec<BootstrapEvent>,
}

impl BootstrapReport {
    /// Whether the database was built without errors.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, BootstrapEvent::Ready { .. }))
    }

    /// The error events.
    pub fn errors(&self) -> impl Iterator<Item = &BootstrapEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, BootstrapEvent::Error { .. }))
    }
}

fn build_store(
    definition: &StoreDefinition,
    loader: &dyn SeedLoader,
    key_limit: u64,
    events: &mut Vec<BootstrapEvent>,
) -> CoreResult<RecordStore> {
    let mut store = RecordStore::new(&definition.name, &definition.key_options)?;

    let seed = match (&definition.seed_data, &definition.seed_url) {
        (Some(data), _) => Ok(data.clone()),
        (None, Some(url)) => loader.load(url),
        (None, None) => Ok(Vec::new()),
    };
    let loaded = seed.and_then(|records| {
        let count = records.len();
        for record in records {
            store.put(record, None, definition.unique, key_limit)?;
        }
        Ok(count)
    });
    match loaded {
        Ok(count) => {
            info!(target: "shelfdb::bootstrap", store = %definition.name, records = count, "store seeded");
        }
        Err(error) => {
            warn!(target: "shelfdb::bootstrap", store = %definition.name, error = %error, "seeding failed; store cleared");
            store.clear();
            events.push(BootstrapEvent::Error {
                store: definition.name.clone(),
                index: None,
                error,
            });
        }
    }

    for index in &definition.indexes {
        let options = IndexOptions::new()
            .unique(index.unique)
            .multi_entry(index.multi_entry);
        let failure = match store.create_index(&index.name, index.key_path.clone(), options) {
            Ok(IndexPopulation::Complete) => None,
            Ok(IndexPopulation::Violated(error)) => {
                store.delete_index(&index.name)?;
                Some(error)
            }
            Err(error) => Some(error),
        };
        if let Some(error) = failure {
            warn!(target: "shelfdb::bootstrap", store = %definition.name, index = %index.name, error = %error, "index creation failed");
            events.push(BootstrapEvent::Error {
                store: definition.name.clone(),
                index: Some(index.name.clone()),
                error,
            });
        }
    }
    Ok(store)
}

impl Engine {
    /// Builds a database from a definition.
    ///
    /// Stores with a `seed_url` fail with a not-supported error; use
    /// [`bootstrap_with`](Self::bootstrap_with) to supply a loader.
    pub fn bootstrap(&self, name: &str, definition: &DatabaseDefinition) -> CoreResult<BootstrapReport> {
        self.bootstrap_with(name, definition, &NoSeedLoader)
    }

    /// Builds a database from a definition, loading `seed_url` records
    /// through `loader`.
    ///
    /// Fails if the database already exists or the version is 0. Problems
    /// with individual stores are reported, not returned.
    pub fn bootstrap_with(
        &self,
        name: &str,
        definition: &DatabaseDefinition,
        loader: &dyn SeedLoader,
    ) -> CoreResult<BootstrapReport> {
        if definition.version == 0 {
            return Err(CoreError::data("database version must be positive"));
        }
        let key_limit = {
            let state = self.lock();
            if state.databases.contains_key(name) {
                return Err(CoreError::invalid_state(format!(
                    "database '{name}' already exists"
                )));
            }
            state.config.key_generator_limit
        };

        let mut schema = Schema::default();
        let mut events = Vec::new();
        for store in &definition.stores {
            if schema.contains(&store.name) {
                events.push(BootstrapEvent::Error {
                    store: store.name.clone(),
                    index: None,
                    error: CoreError::constraint(format!(
                        "object store '{}' is defined twice",
                        store.name
                    )),
                });
                continue;
            }
            match build_store(store, loader, key_limit, &mut events) {
                Ok(built) => schema.insert(built),
                Err(error) => events.push(BootstrapEvent::Error {
                    store: store.name.clone(),
                    index: None,
                    error,
                }),
            }
        }

        let failed = events.len();
        if failed == 0 {
            events.push(BootstrapEvent::Ready {
                database: name.to_string(),
                version: definition.version,
            });
        }

        let mut state = self.lock();
        if state.databases.contains_key(name) {
            return Err(CoreError::invalid_state(format!(
                "database '{name}' already exists"
            )));
        }
        state.databases.insert(
            name.to_string(),
            DatabaseState::new(name, definition.version, schema),
        );
        info!(
            target: "shelfdb::bootstrap",
            database = name,
            version = definition.version,
            stores = definition.stores.len(),
            failed,
            "database bootstrapped"
        );
        Ok(BootstrapReport {
            database: name.to_string(),
            events,
        })
    }
}
