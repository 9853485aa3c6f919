//! Key ranges.

use super::Key;
use crate::error::{CoreError, CoreResult};
use std::cmp::Ordering;

/// An interval over keys, open or closed at each end.
///
/// Ranges are immutable once constructed. A missing bound is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// A range that contains every key.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A range containing exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// A range with only a lower bound.
    pub fn lower_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(key.into()),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    /// A range with only an upper bound.
    pub fn upper_bound(key: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(key.into()),
            lower_open: false,
            upper_open: open,
        }
    }

    /// A range with both bounds.
    ///
    /// Fails with a data error if `lower` is greater than `upper`, or if
    /// they are equal and either end is open.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CoreResult<Self> {
        let lower = lower.into();
        let upper = upper.into();
        match lower.cmp(&upper) {
            Ordering::Greater => {
                return Err(CoreError::data(format!(
                    "lower bound {lower} is greater than upper bound {upper}"
                )))
            }
            Ordering::Equal if lower_open || upper_open => {
                return Err(CoreError::data(format!(
                    "range with equal bounds {lower} cannot be open"
                )))
            }
            _ => {}
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// The lower bound, if any.
    #[must_use]
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// The upper bound, if any.
    #[must_use]
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound excludes its key.
    #[must_use]
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound excludes its key.
    #[must_use]
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// Whether the range has no bounds at all.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Whether `key` lies inside the range.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        let above_lower = match &self.lower {
            None => true,
            Some(lower) => match key.cmp(lower) {
                Ordering::Greater => true,
                Ordering::Equal => !self.lower_open,
                Ordering::Less => false,
            },
        };
        let below_upper = match &self.upper {
            None => true,
            Some(upper) => match key.cmp(upper) {
                Ordering::Less => true,
                Ordering::Equal => !self.upper_open,
                Ordering::Greater => false,
            },
        };
        above_lower && below_upper
    }

    /// Checks that both bounds are valid keys.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(lower) = &self.lower {
            lower.validate()?;
        }
        if let Some(upper) = &self.upper {
            upper.validate()?;
        }
        Ok(())
    }
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        KeyRange::only(key)
    }
}

impl From<&Key> for KeyRange {
    fn from(key: &Key) -> Self {
        KeyRange::only(key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contains_its_key() {
        let range = KeyRange::only("a");
        assert!(range.contains(&Key::from("a")));
        assert!(!range.contains(&Key::from("b")));
    }

    #[test]
    fn open_bounds_exclude_endpoints() {
        let range = KeyRange::bound(2, 5, true, true).unwrap();
        assert!(!range.contains(&Key::from(2)));
        assert!(range.contains(&Key::from(3)));
        assert!(!range.contains(&Key::from(5)));
    }

    #[test]
    fn half_bounded() {
        let lower = KeyRange::lower_bound(10, false);
        assert!(lower.contains(&Key::from(10)));
        assert!(lower.contains(&Key::from("text")));
        assert!(!lower.contains(&Key::from(9)));

        let upper = KeyRange::upper_bound(10, true);
        assert!(upper.contains(&Key::from(-1)));
        assert!(!upper.contains(&Key::from(10)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = KeyRange::bound(5, 2, false, false).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn equal_open_bounds_are_rejected() {
        assert!(KeyRange::bound(3, 3, false, false).is_ok());
        assert!(KeyRange::bound(3, 3, true, false).is_err());
        assert!(KeyRange::bound(3, 3, false, true).is_err());
    }

    #[test]
    fn all_is_unbounded() {
        let range = KeyRange::all();
        assert!(range.is_unbounded());
        assert!(range.contains(&Key::from(vec![1])));
    }

    #[test]
    fn validate_rejects_nan_bounds() {
        assert!(KeyRange::only(f64::NAN).validate().is_err());
        assert!(KeyRange::only(1.5).validate().is_ok());
    }
}
