//! Secondary indexes.
//!
//! An index is an ordered list of `(index key, owner keys)` entries that
//! is maintained together with its record store:
//! - Keys are derived from stored values through a key path
//! - `unique` indexes allow at most one owner per key
//! - `multi_entry` indexes create one entry per distinct array element
//!
//! Indexes are created and dropped only inside a structural-change
//! transaction.

mod secondary;

pub use secondary::{IndexEntry, IndexOptions, SecondaryIndex};
