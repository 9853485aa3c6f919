//! Record stores.
//!
//! A record store is an ordered sequence of `(key, value)` records plus the
//! secondary indexes maintained over it. Records are kept strictly
//! ascending by key with no duplicates; every lookup goes through the
//! binary-search locator.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexOptions, SecondaryIndex};
use crate::key::{get_range, search, Key, KeyPath, KeyRange, Keyed};
use serde::{Deserialize, Serialize};
use shelfdb_codec::Value;
use std::collections::BTreeMap;

/// A stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Primary key.
    pub key: Key,
    /// Stored value.
    pub value: Value,
}

impl Keyed for Record {
    fn key(&self) -> &Key {
        &self.key
    }
}

/// Options for creating a record store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreOptions {
    /// In-line key path. `None` means keys are supplied by the caller.
    pub key_path: Option<KeyPath>,
    /// Generate integer keys when none is supplied.
    pub auto_increment: bool,
}

impl StoreOptions {
    /// Creates default options (out-of-line keys, no generator).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the in-line key path.
    #[must_use]
    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    /// Enables or disables the key generator.
    #[must_use]
    pub const fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

/// Outcome of building a new index against existing records.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexPopulation {
    /// Every record was indexed.
    Complete,
    /// A record violated the index constraint; the index was left empty.
    Violated(CoreError),
}

/// An ordered collection of records and its indexes.
#[derive(Debug, Clone)]
pub struct RecordStore {
    name: String,
    key_path: Option<KeyPath>,
    auto_increment: bool,
    next_key: u64,
    records: Vec<Record>,
    indexes: BTreeMap<String, SecondaryIndex>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>, options: &StoreOptions) -> CoreResult<Self> {
        if let Some(path) = &options.key_path {
            path.validate()?;
            if options.auto_increment && (path.is_empty_path() || path.is_compound()) {
                return Err(CoreError::invalid_access(
                    "a key generator requires a non-empty, non-compound key path",
                ));
            }
        }
        Ok(Self {
            name: name.into(),
            key_path: options.key_path.clone(),
            auto_increment: options.auto_increment,
            next_key: 1,
            records: Vec::new(),
            indexes: BTreeMap::new(),
        })
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// In-line key path, if any.
    #[must_use]
    pub fn key_path(&self) -> Option<&KeyPath> {
        self.key_path.as_ref()
    }

    /// Whether the store generates keys.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// The options this store was created with.
    #[must_use]
    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            key_path: self.key_path.clone(),
            auto_increment: self.auto_increment,
        }
    }

    /// The next key the generator would hand out.
    #[must_use]
    pub fn next_key(&self) -> u64 {
        self.next_key
    }

    /// All records in key order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Names of the store's indexes, sorted.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.indexes.get(name)
    }

    /// Looks up an index by name, failing with not-found.
    pub fn require_index(&self, name: &str) -> CoreResult<&SecondaryIndex> {
        self.index(name)
            .ok_or_else(|| CoreError::index_not_found(&self.name, name))
    }

    /// Iterates the store's indexes.
    pub fn indexes(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.indexes.values()
    }

    /// Finds the record with exactly this key.
    #[must_use]
    pub fn find(&self, key: &Key) -> Option<&Record> {
        search(&self.records, key).matched(&self.records)
    }

    /// Validates a write before it is queued.
    ///
    /// Catches everything decidable without touching records: in-line
    /// stores must not be given a key, out-of-line stores without a
    /// generator must be, and a value that will receive a generated key
    /// must have room for it.
    pub fn check_write(&self, value: &Value, key: Option<&Key>) -> CoreResult<()> {
        match (&self.key_path, key) {
            (Some(_), Some(_)) => Err(CoreError::data(format!(
                "store '{}' uses in-line keys; a key must not be supplied",
                self.name
            ))),
            (Some(path), None) => match path.extract_key(value)? {
                Some(_) => Ok(()),
                None if self.auto_increment => {
                    if path.can_inject(value) {
                        Ok(())
                    } else {
                        Err(CoreError::data(format!(
                            "generated key cannot be stored at key path {path}"
                        )))
                    }
                }
                None => Err(CoreError::data(format!(
                    "value has no key at key path {path}"
                ))),
            },
            (None, Some(key)) => key.validate(),
            (None, None) if self.auto_increment => Ok(()),
            (None, None) => Err(CoreError::data(format!(
                "store '{}' uses out-of-line keys and has no key generator; a key is required",
                self.name
            ))),
        }
    }

    /// Inserts or replaces a record.
    ///
    /// With `no_overwrite` an existing key is a constraint error. Every
    /// index is checked before anything is modified, so a failure leaves
    /// the store exactly as it was.
    pub fn put(
        &mut self,
        mut value: Value,
        key: Option<Key>,
        no_overwrite: bool,
        generator_limit: u64,
    ) -> CoreResult<Key> {
        self.check_write(&value, key.as_ref())?;

        let mut following = None;
        let key = match (&self.key_path, key) {
            (Some(path), _) => match path.extract_key(&value)? {
                Some(found) => found,
                None => {
                    let (next, after) = self.generate_key(generator_limit)?;
                    path.inject(&mut value, &next)?;
                    following = Some(after);
                    next
                }
            },
            (None, Some(key)) => key,
            (None, None) => {
                let (next, after) = self.generate_key(generator_limit)?;
                following = Some(after);
                next
            }
        };

        let loc = search(&self.records, &key);
        if loc.exact.is_some() && no_overwrite {
            return Err(CoreError::constraint(format!(
                "key {key} already exists in store '{}'",
                self.name
            )));
        }

        let mut staged = Vec::with_capacity(self.indexes.len());
        for (name, index) in &self.indexes {
            staged.push((name.clone(), index.check_record(&key, &value)?));
        }

        match loc.exact {
            Some(i) => {
                let old = std::mem::replace(&mut self.records[i].value, value);
                for index in self.indexes.values_mut() {
                    index.remove_record(&key, &old);
                }
            }
            None => self.records.insert(
                loc.first_greater,
                Record {
                    key: key.clone(),
                    value,
                },
            ),
        }
        for (name, keys) in staged {
            if let Some(index) = self.indexes.get_mut(&name) {
                index.insert_keys(&key, keys);
            }
        }

        if let Some(after) = following {
            self.next_key = after;
        } else if self.auto_increment {
            self.advance_generator(&key);
        }
        Ok(key)
    }

    /// First record in `range`.
    #[must_use]
    pub fn get(&self, range: &KeyRange) -> Option<&Record> {
        get_range(&self.records, range).matched(&self.records)
    }

    /// Deletes every record in `range` and its index entries.
    ///
    /// Returns the number of records removed.
    pub fn delete(&mut self, range: &KeyRange) -> usize {
        let loc = get_range(&self.records, range);
        let removed: Vec<Record> = self.records.drain(loc.indices()).collect();
        for record in &removed {
            for index in self.indexes.values_mut() {
                index.remove_record(&record.key, &record.value);
            }
        }
        removed.len()
    }

    /// Removes all records and index entries.
    pub fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    /// Number of records in `range`.
    #[must_use]
    pub fn count(&self, range: &KeyRange) -> usize {
        get_range(&self.records, range).count()
    }

    /// Creates an index and populates it from existing records.
    ///
    /// A duplicate name fails immediately. A constraint violation during
    /// population does not fail the call: the index is kept but cleared and
    /// the violation is returned so the caller can abort its transaction.
    pub fn create_index(
        &mut self,
        name: &str,
        key_path: KeyPath,
        options: IndexOptions,
    ) -> CoreResult<IndexPopulation> {
        if self.indexes.contains_key(name) {
            return Err(CoreError::constraint(format!(
                "index '{name}' already exists on store '{}'",
                self.name
            )));
        }
        let mut index = SecondaryIndex::new(name, self.name.clone(), key_path, options)?;
        let mut population = IndexPopulation::Complete;
        for record in &self.records {
            if let Err(err) = index.add_record(&record.key, &record.value) {
                index.clear();
                population = IndexPopulation::Violated(err);
                break;
            }
        }
        self.indexes.insert(name.to_string(), index);
        Ok(population)
    }

    /// Drops an index.
    pub fn delete_index(&mut self, name: &str) -> CoreResult<()> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CoreError::index_not_found(&self.name, name))
    }

    /// The next generated key and the generator value that follows it.
    fn generate_key(&self, limit: u64) -> CoreResult<(Key, u64)> {
        let after = self.next_key.checked_add(1).filter(|_| self.next_key <= limit);
        let Some(after) = after else {
            return Err(CoreError::constraint(format!(
                "key generator for store '{}' is exhausted",
                self.name
            )));
        };
        #[allow(clippy::cast_precision_loss)]
        Ok((Key::Number(self.next_key as f64), after))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn advance_generator(&mut self, key: &Key) {
        if let Some(n) = key.as_number() {
            if n >= self.next_key as f64 {
                let floor = n.floor();
                self.next_key = if floor >= u64::MAX as f64 {
                    u64::MAX
                } else {
                    floor as u64 + 1
                };
            }
        }
    }
}
