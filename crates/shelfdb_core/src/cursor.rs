//! Cursors over stores and indexes.
//!
//! A cursor never holds a position index into its sequence. It remembers
//! the key (and primary key) it last landed on and re-resolves that through
//! the locator on every step, so records inserted or deleted underneath it
//! never leave it dangling.

use crate::database::Schema;
use crate::engine::{Engine, EngineState};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexEntry;
use crate::key::{range_boundary, search, Boundary, Key, KeyRange, Keyed};
use crate::request::{Operation, Request};
use crate::store::Record;
use crate::transaction::TransactionMode;
use crate::types::{CursorId, RequestId, TransactionId};
use serde::{Deserialize, Serialize};
use shelfdb_codec::Value;
use std::fmt;
use std::str::FromStr;

/// Iteration direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending, visiting every record.
    #[default]
    Next,
    /// Ascending, visiting each index key once.
    NextUnique,
    /// Descending, visiting every record.
    Prev,
    /// Descending, visiting each index key once.
    PrevUnique,
}

impl Direction {
    /// Whether keys ascend.
    #[must_use]
    pub const fn is_forward(self) -> bool {
        matches!(self, Direction::Next | Direction::NextUnique)
    }

    /// Whether duplicate index keys are skipped.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        matches!(self, Direction::NextUnique | Direction::PrevUnique)
    }

    /// The direction's name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Next => "next",
            Direction::NextUnique => "nextunique",
            Direction::Prev => "prev",
            Direction::PrevUnique => "prevunique",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Direction::Next),
            "nextunique" => Ok(Direction::NextUnique),
            "prev" => Ok(Direction::Prev),
            "prevunique" => Ok(Direction::PrevUnique),
            other => Err(CoreError::invalid_access(format!(
                "'{other}' is not a cursor direction"
            ))),
        }
    }
}

/// What a cursor iterates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorSource {
    /// A record store.
    Store(String),
    /// An index of a record store.
    Index {
        /// Owning store.
        store: String,
        /// Index name.
        index: String,
    },
}

impl CursorSource {
    /// Name of the store the cursor reads from.
    #[must_use]
    pub fn store_name(&self) -> &str {
        match self {
            CursorSource::Store(store) | CursorSource::Index { store, .. } => store,
        }
    }
}

/// Where a cursor currently is.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Position {
    Unbound,
    At { key: Key, primary_key: Key },
    Exhausted,
}

/// A key-ordered entry a cursor can step through.
///
/// Records own exactly one primary key (their own); index entries own every
/// record carrying their index key.
pub(crate) trait Entry: Keyed {
    fn owners(&self) -> &[Key];
}

impl Entry for Record {
    fn owners(&self) -> &[Key] {
        std::slice::from_ref(&self.key)
    }
}

impl Entry for IndexEntry {
    fn owners(&self) -> &[Key] {
        &self.owners
    }
}

fn landing<T: Entry>(entry: &T, direction: Direction) -> Option<(Key, Key)> {
    let owners = entry.owners();
    let owner = if direction.is_forward() || direction.is_unique() {
        owners.first()
    } else {
        owners.last()
    };
    owner.map(|primary| (entry.key().clone(), primary.clone()))
}

fn first_in_range<T: Entry>(seq: &[T], range: &KeyRange, direction: Direction) -> Option<(Key, Key)> {
    let start = range.lower().map_or(0, |key| {
        range_boundary(seq, key, Boundary::Lower, range.lower_open())
    });
    let end = range.upper().map_or(seq.len(), |key| {
        range_boundary(seq, key, Boundary::Upper, range.upper_open())
    });
    if start >= end {
        return None;
    }
    let entry = if direction.is_forward() {
        &seq[start]
    } else {
        &seq[end - 1]
    };
    landing(entry, direction)
}

fn step_from<T: Entry>(seq: &[T], key: &Key, primary: &Key, direction: Direction) -> Option<(Key, Key)> {
    if !direction.is_unique() {
        if let Some(entry) = search(seq, key).matched(seq) {
            let owners = entry.owners();
            let sibling = if direction.is_forward() {
                owners.get(owners.partition_point(|o| o <= primary))
            } else {
                owners
                    .partition_point(|o| o < primary)
                    .checked_sub(1)
                    .and_then(|i| owners.get(i))
            };
            if let Some(owner) = sibling {
                return Some((entry.key().clone(), owner.clone()));
            }
        }
    }
    if direction.is_forward() {
        let next = range_boundary(seq, key, Boundary::Lower, true);
        seq.get(next).and_then(|entry| landing(entry, direction))
    } else {
        let prev = range_boundary(seq, key, Boundary::Upper, true);
        prev.checked_sub(1)
            .and_then(|i| seq.get(i))
            .and_then(|entry| landing(entry, direction))
    }
}

fn seek<T: Entry>(seq: &[T], target: &Key, direction: Direction) -> Option<(Key, Key)> {
    if direction.is_forward() {
        let at = range_boundary(seq, target, Boundary::Lower, false);
        seq.get(at).and_then(|entry| landing(entry, direction))
    } else {
        let end = range_boundary(seq, target, Boundary::Upper, false);
        end.checked_sub(1)
            .and_then(|i| seq.get(i))
            .and_then(|entry| landing(entry, direction))
    }
}

/// Computes the position after one step.
pub(crate) fn step<T: Entry>(
    seq: &[T],
    range: &KeyRange,
    direction: Direction,
    position: &Position,
    target: Option<&Key>,
) -> Position {
    let found = match position {
        Position::Exhausted => return Position::Exhausted,
        Position::Unbound => first_in_range(seq, range, direction),
        Position::At { key, primary_key } => match target {
            Some(target) => seek(seq, target, direction),
            None => step_from(seq, key, primary_key, direction),
        },
    };
    match found {
        Some((key, primary_key)) if range.contains(&key) => Position::At { key, primary_key },
        _ => Position::Exhausted,
    }
}

/// Engine-side state of a cursor.
#[derive(Debug)]
pub(crate) struct CursorState {
    pub(crate) id: CursorId,
    pub(crate) transaction: TransactionId,
    pub(crate) request: Option<RequestId>,
    pub(crate) source: CursorSource,
    pub(crate) range: KeyRange,
    pub(crate) direction: Direction,
    pub(crate) key_only: bool,
    pub(crate) position: Position,
    pub(crate) value: Option<Value>,
}

impl CursorState {
    pub(crate) fn new(
        id: CursorId,
        transaction: TransactionId,
        source: CursorSource,
        range: KeyRange,
        direction: Direction,
        key_only: bool,
    ) -> Self {
        Self {
            id,
            transaction,
            request: None,
            source,
            range,
            direction,
            key_only,
            position: Position::Unbound,
            value: None,
        }
    }

    pub(crate) fn current(&self) -> Option<(&Key, &Key)> {
        match &self.position {
            Position::At { key, primary_key } => Some((key, primary_key)),
            _ => None,
        }
    }

    /// Steps `count` times and loads the value under the new position.
    ///
    /// Returns whether the cursor is positioned on a record.
    pub(crate) fn iterate(&mut self, view: &Schema, target: Option<&Key>, count: u32) -> CoreResult<bool> {
        let store = view.store(self.source.store_name())?;
        let mut remaining = count.max(1);
        let mut target = target;
        while remaining > 0 && self.position != Position::Exhausted {
            self.position = match &self.source {
                CursorSource::Store(_) => step(
                    store.records(),
                    &self.range,
                    self.direction,
                    &self.position,
                    target,
                ),
                CursorSource::Index { index, .. } => step(
                    store.require_index(index)?.entries(),
                    &self.range,
                    self.direction,
                    &self.position,
                    target,
                ),
            };
            target = None;
            remaining -= 1;
        }

        self.value = match (&self.position, self.key_only) {
            (Position::At { primary_key, .. }, false) => {
                store.find(primary_key).map(|record| record.value.clone())
            }
            _ => None,
        };
        Ok(self.current().is_some())
    }
}

impl EngineState {
    pub(crate) fn cursor(&self, id: CursorId) -> CoreResult<&CursorState> {
        self.cursors
            .get(&id)
            .ok_or_else(|| CoreError::invalid_state(format!("cursor {id} no longer exists")))
    }

    /// Validates a continue/advance and recycles the cursor's request.
    fn iterate_cursor(&mut self, id: CursorId, target: Option<Key>, count: u32) -> CoreResult<()> {
        let cursor = self.cursor(id)?;
        let txn = cursor.transaction;
        self.ensure_active(txn)?;

        let request = cursor
            .request
            .ok_or_else(|| CoreError::invalid_state("cursor has not been opened"))?;
        if !self.request(request)?.is_done() {
            return Err(CoreError::invalid_state(
                "cursor is already iterating; wait for the current step",
            ));
        }
        if let (Some(target), Some((current, _))) = (&target, cursor.current()) {
            target.validate()?;
            let ahead = if cursor.direction.is_forward() {
                target > current
            } else {
                target < current
            };
            if !ahead {
                return Err(CoreError::data(format!(
                    "continue target {target} is not past the current key {current} in direction {}",
                    cursor.direction
                )));
            }
        }

        self.recycle_request(
            request,
            Operation::IterateCursor {
                cursor: id,
                target,
                count,
            },
        )
    }

    fn cursor_write(&mut self, id: CursorId, value: Option<Value>) -> CoreResult<RequestId> {
        let cursor = self.cursor(id)?;
        let txn_id = cursor.transaction;
        self.ensure_active(txn_id)?;
        if self.txn(txn_id)?.mode == TransactionMode::ReadOnly {
            return Err(CoreError::read_only("cannot modify records through a read-only transaction"));
        }
        if cursor.key_only {
            return Err(CoreError::invalid_state("a key cursor cannot modify records"));
        }
        let Some((_, primary)) = cursor.current() else {
            return Err(CoreError::invalid_state("cursor is not positioned on a record"));
        };
        let primary = primary.clone();
        let store_name = cursor.source.store_name().to_string();

        let operation = match value {
            None => Operation::Delete {
                store: store_name,
                range: KeyRange::only(primary),
            },
            Some(value) => {
                let store = self.store_schema(txn_id, &store_name)?;
                let key = match store.key_path() {
                    Some(path) => {
                        if path.extract_key(&value)?.as_ref() != Some(&primary) {
                            return Err(CoreError::data(
                                "cursor update must not change the record's primary key",
                            ));
                        }
                        None
                    }
                    None => Some(primary),
                };
                Operation::Put {
                    store: store_name,
                    value,
                    key,
                    no_overwrite: false,
                }
            }
        };
        self.queue_request(txn_id, operation)
    }
}

/// Handle to a cursor.
///
/// Cursor handles are delivered through a request result. Stepping
/// recycles that same request; listen on it to receive each new position.
#[derive(Clone)]
pub struct Cursor {
    engine: Engine,
    id: CursorId,
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").field("id", &self.id).finish()
    }
}

impl Cursor {
    pub(crate) fn new(engine: Engine, id: CursorId) -> Self {
        Self { engine, id }
    }

    fn read<T>(&self, f: impl FnOnce(&CursorState) -> T) -> Option<T> {
        self.engine.lock().cursors.get(&self.id).map(f)
    }

    /// Cursor identifier.
    #[must_use]
    pub fn id(&self) -> CursorId {
        self.id
    }

    /// Key at the current position: the index key for index cursors.
    #[must_use]
    pub fn key(&self) -> Option<Key> {
        self.read(|c| c.current().map(|(key, _)| key.clone())).flatten()
    }

    /// Primary key of the record at the current position.
    #[must_use]
    pub fn primary_key(&self) -> Option<Key> {
        self.read(|c| c.current().map(|(_, primary)| primary.clone()))
            .flatten()
    }

    /// Value of the record at the current position. Always `None` for key
    /// cursors.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        self.read(|c| c.value.clone()).flatten()
    }

    /// Iteration direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.read(|c| c.direction).unwrap_or_default()
    }

    /// What the cursor iterates.
    #[must_use]
    pub fn source(&self) -> Option<CursorSource> {
        self.read(|c| c.source.clone())
    }

    /// Whether this cursor only yields keys.
    #[must_use]
    pub fn is_key_cursor(&self) -> bool {
        self.read(|c| c.key_only).unwrap_or(false)
    }

    /// The request that reports each step.
    pub fn request(&self) -> CoreResult<Request> {
        let state = self.engine.lock();
        let cursor = state.cursor(self.id)?;
        let id = cursor
            .request
            .ok_or_else(|| CoreError::invalid_state("cursor has not been opened"))?;
        let transaction = state.transaction_handle(&self.engine, cursor.transaction);
        Ok(state.request_handle(&self.engine, id, transaction))
    }

    /// Moves one step in the cursor's direction.
    ///
    /// Continuing an exhausted cursor is allowed and reports no value again.
    pub fn continue_(&self) -> CoreResult<()> {
        self.engine.lock().iterate_cursor(self.id, None, 1)
    }

    /// Moves to the first entry at or past `key` in the cursor's direction.
    ///
    /// `key` must lie strictly ahead of the current key, otherwise this is a
    /// data error.
    pub fn continue_to(&self, key: impl Into<Key>) -> CoreResult<()> {
        self.engine.lock().iterate_cursor(self.id, Some(key.into()), 1)
    }

    /// Moves `count` steps, skipping the intermediate records.
    pub fn advance(&self, count: u32) -> CoreResult<()> {
        if count == 0 {
            return Err(CoreError::invalid_access("advance count must be positive"));
        }
        self.engine.lock().iterate_cursor(self.id, None, count)
    }

    /// Replaces the record at the current position.
    ///
    /// The new value must keep the same primary key.
    pub fn update(&self, value: Value) -> CoreResult<Request> {
        let mut state = self.engine.lock();
        let id = state.cursor_write(self.id, Some(value))?;
        let txn = state.cursor(self.id)?.transaction;
        let transaction = state.transaction_handle(&self.engine, txn);
        Ok(state.request_handle(&self.engine, id, transaction))
    }

    /// Deletes the record at the current position.
    pub fn delete(&self) -> CoreResult<Request> {
        let mut state = self.engine.lock();
        let id = state.cursor_write(self.id, None)?;
        let txn = state.cursor(self.id)?.transaction;
        let transaction = state.transaction_handle(&self.engine, txn);
        Ok(state.request_handle(&self.engine, id, transaction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(keys: &[i32]) -> Vec<Record> {
        keys.iter()
            .map(|&k| Record {
                key: Key::from(k),
                value: Value::from(k),
            })
            .collect()
    }

    fn entries(spec: &[(&str, &[i32])]) -> Vec<IndexEntry> {
        spec.iter()
            .map(|(key, owners)| IndexEntry {
                key: Key::from(*key),
                owners: owners.iter().map(|&o| Key::from(o)).collect(),
            })
            .collect()
    }

    fn walk<T: Entry>(seq: &[T], range: &KeyRange, direction: Direction) -> Vec<(Key, Key)> {
        let mut position = Position::Unbound;
        let mut seen = Vec::new();
        loop {
            position = step(seq, range, direction, &position, None);
            match &position {
                Position::At { key, primary_key } => seen.push((key.clone(), primary_key.clone())),
                _ => return seen,
            }
        }
    }

    fn keys(seen: &[(Key, Key)]) -> Vec<Key> {
        seen.iter().map(|(k, _)| k.clone()).collect()
    }

    #[test]
    fn forward_and_backward_over_records() {
        let seq = records(&[1, 2, 3, 4]);
        let forward = walk(&seq, &KeyRange::all(), Direction::Next);
        assert_eq!(keys(&forward), (1..=4).map(Key::from).collect::<Vec<_>>());

        let backward = walk(&seq, &KeyRange::all(), Direction::Prev);
        assert_eq!(keys(&backward), (1..=4).rev().map(Key::from).collect::<Vec<_>>());
    }

    #[test]
    fn range_bounds_the_walk() {
        let seq = records(&[1, 2, 3, 4, 5, 6]);
        let range = KeyRange::bound(2, 5, false, true).unwrap();
        assert_eq!(
            keys(&walk(&seq, &range, Direction::Next)),
            vec![Key::from(2), Key::from(3), Key::from(4)]
        );
        assert_eq!(
            keys(&walk(&seq, &range, Direction::Prev)),
            vec![Key::from(4), Key::from(3), Key::from(2)]
        );
    }

    #[test]
    fn empty_range_exhausts_immediately() {
        let seq = records(&[1, 2]);
        let range = KeyRange::lower_bound(5, false);
        assert!(walk(&seq, &range, Direction::Next).is_empty());
        assert_eq!(
            step(&seq, &range, Direction::Next, &Position::Exhausted, None),
            Position::Exhausted
        );
    }

    #[test]
    fn index_walk_visits_duplicates() {
        let seq = entries(&[("a", &[1, 2][..]), ("b", &[3][..])]);
        let forward = walk(&seq, &KeyRange::all(), Direction::Next);
        assert_eq!(
            forward,
            vec![
                (Key::from("a"), Key::from(1)),
                (Key::from("a"), Key::from(2)),
                (Key::from("b"), Key::from(3)),
            ]
        );

        let backward = walk(&seq, &KeyRange::all(), Direction::Prev);
        assert_eq!(
            backward,
            vec![
                (Key::from("b"), Key::from(3)),
                (Key::from("a"), Key::from(2)),
                (Key::from("a"), Key::from(1)),
            ]
        );
    }

    #[test]
    fn unique_directions_skip_duplicates() {
        let seq = entries(&[("a", &[1, 2][..]), ("b", &[3, 4][..])]);
        assert_eq!(
            walk(&seq, &KeyRange::all(), Direction::NextUnique),
            vec![(Key::from("a"), Key::from(1)), (Key::from("b"), Key::from(3))]
        );
        assert_eq!(
            walk(&seq, &KeyRange::all(), Direction::PrevUnique),
            vec![(Key::from("b"), Key::from(3)), (Key::from("a"), Key::from(1))]
        );
    }

    #[test]
    fn seek_lands_at_or_past_target() {
        let seq = records(&[1, 3, 5, 7]);
        let at_one = Position::At {
            key: Key::from(1),
            primary_key: Key::from(1),
        };
        assert_eq!(
            step(&seq, &KeyRange::all(), Direction::Next, &at_one, Some(&Key::from(4))),
            Position::At {
                key: Key::from(5),
                primary_key: Key::from(5)
            }
        );

        let at_seven = Position::At {
            key: Key::from(7),
            primary_key: Key::from(7),
        };
        assert_eq!(
            step(&seq, &KeyRange::all(), Direction::Prev, &at_seven, Some(&Key::from(4))),
            Position::At {
                key: Key::from(3),
                primary_key: Key::from(3)
            }
        );
    }

    #[test]
    fn position_survives_deletion_of_current_record() {
        let mut seq = records(&[1, 2, 3, 4]);
        let at_two = Position::At {
            key: Key::from(2),
            primary_key: Key::from(2),
        };
        seq.remove(1);
        assert_eq!(
            step(&seq, &KeyRange::all(), Direction::Next, &at_two, None),
            Position::At {
                key: Key::from(3),
                primary_key: Key::from(3)
            }
        );
    }

    #[test]
    fn direction_parses_and_displays() {
        assert_eq!("prevunique".parse::<Direction>().unwrap(), Direction::PrevUnique);
        assert_eq!(Direction::NextUnique.to_string(), "nextunique");
        assert!("sideways".parse::<Direction>().is_err());
    }
}
