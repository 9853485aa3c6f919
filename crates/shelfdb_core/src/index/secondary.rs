//! Secondary index over a record store.

use crate::error::{CoreError, CoreResult};
use crate::key::{get_range, search, Key, KeyPath, KeyRange, Keyed};
use serde::{Deserialize, Serialize};
use shelfdb_codec::Value;

/// Options for creating an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexOptions {
    /// At most one record per index key.
    pub unique: bool,
    /// Array values produce one entry per distinct element.
    pub multi_entry: bool,
}

impl IndexOptions {
    /// Creates default options (not unique, not multi-entry).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the unique flag.
    #[must_use]
    pub const fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets the multi-entry flag.
    #[must_use]
    pub const fn multi_entry(mut self, multi_entry: bool) -> Self {
        self.multi_entry = multi_entry;
        self
    }
}

/// One index key and the primary keys of every record carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// The index key.
    pub key: Key,
    /// Primary keys of owning records, ascending and distinct.
    pub owners: Vec<Key>,
}

impl Keyed for IndexEntry {
    fn key(&self) -> &Key {
        &self.key
    }
}

/// An ordered sequence of `(index key, owner keys)` entries derived from
/// a record store.
///
/// The index never owns records; owners are primary keys back into the
/// store. Entries whose owner set becomes empty are removed.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    name: String,
    store: String,
    key_path: KeyPath,
    unique: bool,
    multi_entry: bool,
    entries: Vec<IndexEntry>,
}

impl SecondaryIndex {
    /// Creates an empty index.
    ///
    /// Compound key paths cannot be combined with `multi_entry`.
    pub fn new(
        name: impl Into<String>,
        store: impl Into<String>,
        key_path: KeyPath,
        options: IndexOptions,
    ) -> CoreResult<Self> {
        key_path.validate()?;
        if options.multi_entry && key_path.is_compound() {
            return Err(CoreError::invalid_access(
                "a multi-entry index cannot use a compound key path",
            ));
        }
        Ok(Self {
            name: name.into(),
            store: store.into(),
            key_path,
            unique: options.unique,
            multi_entry: options.multi_entry,
            entries: Vec::new(),
        })
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the store this index belongs to.
    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store
    }

    /// Key path the index keys are derived from.
    #[must_use]
    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    /// Whether the index is unique.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the index is multi-entry.
    #[must_use]
    pub fn is_multi_entry(&self) -> bool {
        self.multi_entry
    }

    /// The options this index was created with.
    #[must_use]
    pub fn options(&self) -> IndexOptions {
        IndexOptions {
            unique: self.unique,
            multi_entry: self.multi_entry,
        }
    }

    /// All entries in index-key order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of distinct index keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Derives the index keys for a stored value, ascending and distinct.
    ///
    /// A value whose key path does not resolve to a valid key is simply not
    /// indexed. For multi-entry indexes invalid array elements are skipped.
    #[must_use]
    pub fn index_keys(&self, value: &Value) -> Vec<Key> {
        let Some(found) = self.key_path.evaluate(value) else {
            return Vec::new();
        };
        match (&found, self.multi_entry) {
            (Value::Array(items), true) => {
                let mut keys: Vec<Key> = items
                    .iter()
                    .filter_map(|item| Key::from_value(item).ok())
                    .collect();
                keys.sort();
                keys.dedup();
                keys
            }
            _ => Key::from_value(&found).map(|k| vec![k]).unwrap_or_default(),
        }
    }

    /// Derives index keys for a record and checks them against `unique`.
    ///
    /// Keys owned only by `primary` itself do not conflict, so a record can
    /// be checked before it overwrites its previous version.
    pub fn check_record(&self, primary: &Key, value: &Value) -> CoreResult<Vec<Key>> {
        let keys = self.index_keys(value);
        if self.unique {
            for key in &keys {
                if let Some(entry) = search(&self.entries, key).matched(&self.entries) {
                    if entry.owners.iter().any(|owner| owner != primary) {
                        return Err(CoreError::constraint(format!(
                            "index '{}' already contains key {key}",
                            self.name
                        )));
                    }
                }
            }
        }
        Ok(keys)
    }

    /// Adds a store record to the index.
    pub fn add_record(&mut self, primary: &Key, value: &Value) -> CoreResult<()> {
        let keys = self.check_record(primary, value)?;
        self.insert_keys(primary, keys);
        Ok(())
    }

    /// Inserts already checked keys for `primary`.
    pub(crate) fn insert_keys(&mut self, primary: &Key, keys: Vec<Key>) {
        for key in keys {
            let loc = search(&self.entries, &key);
            match loc.exact {
                Some(i) => {
                    let owners = &mut self.entries[i].owners;
                    let at = owners.partition_point(|o| o < primary);
                    if owners.get(at) != Some(primary) {
                        owners.insert(at, primary.clone());
                    }
                }
                None => self.entries.insert(
                    loc.first_greater,
                    IndexEntry {
                        key,
                        owners: vec![primary.clone()],
                    },
                ),
            }
        }
    }

    /// Removes a store record's back-references from the index.
    pub fn remove_record(&mut self, primary: &Key, value: &Value) {
        for key in self.index_keys(value) {
            let Some(i) = search(&self.entries, &key).exact else {
                continue;
            };
            let owners = &mut self.entries[i].owners;
            let at = owners.partition_point(|o| o < primary);
            if owners.get(at) == Some(primary) {
                owners.remove(at);
            }
            if owners.is_empty() {
                self.entries.remove(i);
            }
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Primary key of the first record whose index key lies in `range`.
    #[must_use]
    pub fn get(&self, range: &KeyRange) -> Option<&Key> {
        get_range(&self.entries, range)
            .matched(&self.entries)
            .and_then(|entry| entry.owners.first())
    }

    /// Number of records referenced by entries in `range`.
    #[must_use]
    pub fn count(&self, range: &KeyRange) -> usize {
        let loc = get_range(&self.entries, range);
        self.entries[loc.indices()]
            .iter()
            .map(|entry| entry.owners.len())
            .sum()
    }

    /// Whether any entry still references `primary`.
    #[must_use]
    pub fn references(&self, primary: &Key) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.owners.binary_search(primary).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn doc(name: &str, tags: &[&str]) -> Value {
        Value::map([
            ("name", Value::from(name)),
            ("tags", Value::from(tags.to_vec())),
        ])
    }

    fn by_name(unique: bool) -> SecondaryIndex {
        SecondaryIndex::new(
            "by_name",
            "people",
            KeyPath::from("name"),
            IndexOptions::new().unique(unique),
        )
        .unwrap()
    }

    #[test]
    fn groups_owners_under_one_key() {
        let mut index = by_name(false);
        index.add_record(&Key::from(2), &doc("a", &[])).unwrap();
        index.add_record(&Key::from(1), &doc("a", &[])).unwrap();
        index.add_record(&Key::from(3), &doc("b", &[])).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.entries()[0].owners, vec![Key::from(1), Key::from(2)]);
        assert_eq!(index.count(&KeyRange::only("a")), 2);
        assert_eq!(index.count(&KeyRange::all()), 3);
        assert_eq!(index.get(&KeyRange::only("a")), Some(&Key::from(1)));
    }

    #[test]
    fn unique_rejects_second_owner() {
        let mut index = by_name(true);
        index.add_record(&Key::from(1), &doc("a", &[])).unwrap();

        let err = index.add_record(&Key::from(2), &doc("a", &[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
        assert_eq!(index.count(&KeyRange::only("a")), 1);

        // The same record may be re-checked against its own entry.
        assert!(index.check_record(&Key::from(1), &doc("a", &[])).is_ok());
    }

    #[test]
    fn multi_entry_indexes_each_distinct_element() {
        let mut index = SecondaryIndex::new(
            "by_tag",
            "people",
            KeyPath::from("tags"),
            IndexOptions::new().multi_entry(true),
        )
        .unwrap();
        index
            .add_record(&Key::from(1), &doc("a", &["x", "y", "x"]))
            .unwrap();
        index.add_record(&Key::from(2), &doc("b", &["y"])).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.count(&KeyRange::only("x")), 1);
        assert_eq!(index.count(&KeyRange::only("y")), 2);
    }

    #[test]
    fn non_multi_entry_array_is_one_key() {
        let mut index = SecondaryIndex::new(
            "by_tags",
            "people",
            KeyPath::from("tags"),
            IndexOptions::new(),
        )
        .unwrap();
        index.add_record(&Key::from(1), &doc("a", &["x", "y"])).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries()[0].key, Key::from(vec!["x", "y"]));
    }

    #[test]
    fn unresolvable_values_are_not_indexed() {
        let mut index = by_name(false);
        index
            .add_record(&Key::from(1), &Value::map([("other", Value::from(1))]))
            .unwrap();
        index
            .add_record(&Key::from(2), &Value::map([("name", Value::Null)]))
            .unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn remove_drops_empty_entries() {
        let mut index = by_name(false);
        index.add_record(&Key::from(1), &doc("a", &[])).unwrap();
        index.add_record(&Key::from(2), &doc("a", &[])).unwrap();

        index.remove_record(&Key::from(1), &doc("a", &[]));
        assert_eq!(index.entries()[0].owners, vec![Key::from(2)]);
        assert!(!index.references(&Key::from(1)));

        index.remove_record(&Key::from(2), &doc("a", &[]));
        assert!(index.is_empty());
    }

    #[test]
    fn compound_multi_entry_is_rejected() {
        let err = SecondaryIndex::new(
            "bad",
            "people",
            KeyPath::from(vec!["a", "b"]),
            IndexOptions::new().multi_entry(true),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAccess);
    }
}
