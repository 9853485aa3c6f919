//! Keys, key paths, key ranges and binary-search location.
//!
//! Keys are totally ordered across types:
//! `Number < Date < String < Array`. Within a type the natural order
//! applies; arrays compare element by element with a shorter prefix
//! ordering first.

mod locator;
mod path;
mod range;

pub use locator::{get_range, range_boundary, search, Boundary, Keyed, Locator};
pub use path::KeyPath;
pub use range::KeyRange;

use crate::error::{CoreError, CoreResult};
use shelfdb_codec::Value;
use std::cmp::Ordering;
use std::fmt;

/// A record or index key.
#[derive(Debug, Clone)]
pub enum Key {
    /// Double precision number. NaN is never a valid key.
    Number(f64),
    /// Timestamp in milliseconds since the Unix epoch.
    Date(i64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of keys.
    Array(Vec<Key>),
}

impl Key {
    /// Converts a document value into a key.
    ///
    /// Null, booleans, maps, NaN and arrays containing any of those are not
    /// valid keys and fail with a data error.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        match value {
            Value::Number(n) if n.is_nan() => Err(CoreError::data("NaN is not a valid key")),
            Value::Number(n) => Ok(Key::Number(*n)),
            Value::Date(ms) => Ok(Key::Date(*ms)),
            Value::Text(s) => Ok(Key::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<CoreResult<Vec<_>>>()
                .map(Key::Array),
            other => Err(CoreError::data(format!(
                "a {} value is not a valid key",
                other.type_name()
            ))),
        }
    }

    /// Converts this key back into a document value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => Value::Number(*n),
            Key::Date(ms) => Value::Date(*ms),
            Key::String(s) => Value::Text(s.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// Checks that the key holds no NaN anywhere.
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            Key::Number(n) if n.is_nan() => Err(CoreError::data("NaN is not a valid key")),
            Key::Array(items) => items.iter().try_for_each(Key::validate),
            _ => Ok(()),
        }
    }

    /// Returns the number if this is a number key.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string if this is a string key.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::String(s) => Some(s),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Date(_) => 1,
            Key::String(_) => 2,
            Key::Array(_) => 3,
        }
    }
}

/// Compares two document values as keys.
///
/// Fails with a data error if either value is not a valid key.
pub fn compare(a: &Value, b: &Value) -> CoreResult<Ordering> {
    let a = Key::from_value(a)?;
    let b = Key::from_value(b)?;
    Ok(a.cmp(&b))
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Key::Date(a), Key::Date(b)) => a.cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.iter().cmp(b.iter()),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::Date(ms) => write!(f, "date({ms})"),
            Key::String(s) => write!(f, "{s:?}"),
            Key::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::Number(n)
    }
}

impl From<i64> for Key {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Key::Number(n as f64)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(f64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl<T: Into<Key>> From<Vec<T>> for Key {
    fn from(items: Vec<T>) -> Self {
        Key::Array(items.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<&Value> for Key {
    type Error = CoreError;

    fn try_from(value: &Value) -> CoreResult<Self> {
        Key::from_value(value)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        key.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_order() {
        let number = Key::from(1_000_000);
        let date = Key::Date(0);
        let string = Key::from("");
        let array = Key::Array(vec![]);

        assert!(number < date);
        assert!(date < string);
        assert!(string < array);
    }

    #[test]
    fn composite_is_greater_than_any_string() {
        let list = Key::from(vec![1, 2]);
        assert!(list > Key::from("a"));
        assert!(list > Key::from("\u{10FFFF}"));
    }

    #[test]
    fn arrays_compare_elementwise() {
        assert!(Key::from(vec![1, 2]) < Key::from(vec![1, 3]));
        assert!(Key::from(vec![1]) < Key::from(vec![1, 0]));
        assert!(Key::from(vec![2]) > Key::from(vec![1, 9, 9]));
        assert_eq!(Key::from(vec![1, 2]), Key::from(vec![1, 2]));
    }

    #[test]
    fn zero_signs_are_equal() {
        assert_eq!(Key::Number(0.0), Key::Number(-0.0));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Key::from_value(&Value::Null).is_err());
        assert!(Key::from_value(&Value::Bool(true)).is_err());
        assert!(Key::from_value(&Value::Number(f64::NAN)).is_err());
        assert!(Key::from_value(&Value::empty_map()).is_err());
        assert!(Key::from_value(&Value::from(vec![Value::Null])).is_err());

        let err = Key::from_value(&Value::Bool(false)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn value_conversion_preserves_structure() {
        let value = Value::Array(vec![Value::from("a"), Value::Date(5), Value::from(2)]);
        let key = Key::from_value(&value).unwrap();
        assert_eq!(key.to_value(), value);
    }

    #[test]
    fn compare_raw_values() {
        assert_eq!(
            compare(&Value::from(1), &Value::from(2)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare(&Value::from(vec![1, 2]), &Value::from("a")).unwrap(),
            Ordering::Greater
        );
        assert!(compare(&Value::Null, &Value::from(1)).is_err());
    }

    #[test]
    fn validate_detects_nested_nan() {
        assert!(Key::from(vec![Key::Number(f64::NAN)]).validate().is_err());
        assert!(Key::from(vec![1, 2]).validate().is_ok());
    }

    #[test]
    fn display() {
        assert_eq!(Key::from(vec![Key::from(1), Key::from("x")]).to_string(), "[1, \"x\"]");
        assert_eq!(Key::Date(10).to_string(), "date(10)");
    }
}
