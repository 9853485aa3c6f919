//! Binary-search location in key-ordered sequences.
//!
//! These are pure functions; record stores, indexes and cursors all use
//! them as the single source of ordering truth.

use super::{Key, KeyRange};
use std::ops::Range;

/// An element of a key-ordered sequence.
pub trait Keyed {
    /// Returns the key the sequence is ordered by.
    fn key(&self) -> &Key;
}

impl Keyed for Key {
    fn key(&self) -> &Key {
        self
    }
}

/// Result of a search or range lookup.
///
/// A locator brackets a contiguous run of matching positions:
/// everything before `start()` is less than the match, everything from
/// `first_greater` onward is greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    /// Index of the last element ordered before the match, if any.
    pub last_less: Option<usize>,
    /// Index of the first matching element, if anything matched.
    pub exact: Option<usize>,
    /// Index of the first element ordered after the match.
    pub first_greater: usize,
}

impl Locator {
    /// Index where the matching run starts (or would start).
    #[must_use]
    pub fn start(&self) -> usize {
        self.last_less.map_or(0, |i| i + 1)
    }

    /// Number of matching elements.
    #[must_use]
    pub fn count(&self) -> usize {
        self.first_greater.saturating_sub(self.start())
    }

    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exact.is_none()
    }

    /// Positions of all matching elements.
    #[must_use]
    pub fn indices(&self) -> Range<usize> {
        match self.exact {
            Some(first) => first..self.first_greater,
            None => self.first_greater..self.first_greater,
        }
    }

    /// The first matching element of `seq`.
    pub fn matched<'a, T>(&self, seq: &'a [T]) -> Option<&'a T> {
        self.exact.and_then(|i| seq.get(i))
    }

    /// The last matching element of `seq`.
    pub fn last_matched<'a, T>(&self, seq: &'a [T]) -> Option<&'a T> {
        self.exact?;
        self.first_greater.checked_sub(1).and_then(|i| seq.get(i))
    }

    fn empty_at(position: usize) -> Self {
        Self {
            last_less: position.checked_sub(1),
            exact: None,
            first_greater: position,
        }
    }
}

/// Which end of a range a boundary search computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// First position inside the range.
    Lower,
    /// One past the last position inside the range.
    Upper,
}

/// Locates `key` in an ascending sequence in O(log n).
pub fn search<T: Keyed>(seq: &[T], key: &Key) -> Locator {
    let idx = seq.partition_point(|e| e.key() < key);
    match seq.get(idx) {
        Some(e) if e.key() == key => Locator {
            last_less: idx.checked_sub(1),
            exact: Some(idx),
            first_greater: idx + 1,
        },
        _ => Locator::empty_at(idx),
    }
}

/// Computes one end of a range over an ascending sequence.
///
/// For [`Boundary::Lower`] the result is the first index whose key lies
/// above `key` (or at it, when `open` is false). For [`Boundary::Upper`]
/// it is one past the last index whose key lies below `key` (or at it).
pub fn range_boundary<T: Keyed>(seq: &[T], key: &Key, which: Boundary, open: bool) -> usize {
    match (which, open) {
        (Boundary::Lower, false) | (Boundary::Upper, true) => {
            seq.partition_point(|e| e.key() < key)
        }
        (Boundary::Lower, true) | (Boundary::Upper, false) => {
            seq.partition_point(|e| e.key() <= key)
        }
    }
}

/// Locates every element of an ascending sequence that lies in `range`.
pub fn get_range<T: Keyed>(seq: &[T], range: &KeyRange) -> Locator {
    let start = range.lower().map_or(0, |key| {
        range_boundary(seq, key, Boundary::Lower, range.lower_open())
    });
    let end = range.upper().map_or(seq.len(), |key| {
        range_boundary(seq, key, Boundary::Upper, range.upper_open())
    });

    if end <= start {
        return Locator::empty_at(start);
    }
    Locator {
        last_less: start.checked_sub(1),
        exact: Some(start),
        first_greater: end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[i32]) -> Vec<Key> {
        values.iter().map(|v| Key::from(*v)).collect()
    }

    #[test]
    fn search_hit() {
        let seq = keys(&[1, 3, 5, 7]);
        let loc = search(&seq, &Key::from(5));
        assert_eq!(loc.exact, Some(2));
        assert_eq!(loc.last_less, Some(1));
        assert_eq!(loc.first_greater, 3);
        assert_eq!(loc.count(), 1);
        assert_eq!(loc.matched(&seq), Some(&Key::from(5)));
    }

    #[test]
    fn search_miss() {
        let seq = keys(&[1, 3, 5, 7]);
        let loc = search(&seq, &Key::from(4));
        assert_eq!(loc.exact, None);
        assert_eq!(loc.last_less, Some(1));
        assert_eq!(loc.first_greater, 2);
        assert_eq!(loc.count(), 0);

        let before = search(&seq, &Key::from(0));
        assert_eq!(before.last_less, None);
        assert_eq!(before.first_greater, 0);

        let after = search(&seq, &Key::from(9));
        assert_eq!(after.first_greater, 4);
    }

    #[test]
    fn search_empty_sequence() {
        let seq: Vec<Key> = Vec::new();
        let loc = search(&seq, &Key::from(1));
        assert!(loc.is_empty());
        assert_eq!(loc.count(), 0);
    }

    #[test]
    fn boundaries() {
        let seq = keys(&[1, 2, 2, 3]);
        let two = Key::from(2);
        assert_eq!(range_boundary(&seq, &two, Boundary::Lower, false), 1);
        assert_eq!(range_boundary(&seq, &two, Boundary::Lower, true), 3);
        assert_eq!(range_boundary(&seq, &two, Boundary::Upper, false), 3);
        assert_eq!(range_boundary(&seq, &two, Boundary::Upper, true), 1);
    }

    #[test]
    fn bound_range_half_open() {
        let seq = keys(&[1, 2, 3, 4, 5, 6]);
        let range = KeyRange::bound(2, 5, false, true).unwrap();
        let loc = get_range(&seq, &range);
        assert_eq!(loc.count(), 3);
        let matched: Vec<_> = loc.indices().map(|i| seq[i].clone()).collect();
        assert_eq!(matched, keys(&[2, 3, 4]));
        assert_eq!(loc.last_matched(&seq), Some(&Key::from(4)));
    }

    #[test]
    fn unbounded_range_matches_everything() {
        let seq = keys(&[1, 2, 3]);
        let loc = get_range(&seq, &KeyRange::all());
        assert_eq!(loc.count(), 3);
        assert_eq!(loc.exact, Some(0));
    }

    #[test]
    fn range_beyond_sequence_is_empty() {
        let seq = keys(&[1, 2, 3]);
        let loc = get_range(&seq, &KeyRange::lower_bound(10, false));
        assert!(loc.is_empty());
        assert_eq!(loc.count(), 0);
        assert_eq!(loc.indices().len(), 0);

        let loc = get_range(&seq, &KeyRange::upper_bound(1, true));
        assert!(loc.is_empty());
    }

    #[test]
    fn only_range_matches_single_key() {
        let seq = keys(&[1, 2, 3]);
        let loc = get_range(&seq, &KeyRange::only(2));
        assert_eq!(loc.count(), 1);
        assert_eq!(loc.matched(&seq), Some(&Key::from(2)));
    }
}
