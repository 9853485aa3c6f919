//! Key paths: how a key is derived from a stored value.

use super::Key;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use shelfdb_codec::Value;
use std::fmt;

/// A dotted accessor, or a list of them, naming where a key lives inside
/// a value.
///
/// The empty path `""` denotes the value itself. A compound path yields an
/// array key with one element per member path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// A single dotted path such as `"address.city"`.
    Single(String),
    /// Several paths whose values form an array key.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Checks the path syntax.
    ///
    /// Each dot-separated segment must be an identifier. Compound paths must
    /// not be empty.
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            KeyPath::Single(path) => validate_path(path),
            KeyPath::Compound(paths) if paths.is_empty() => {
                Err(CoreError::invalid_access("compound key path must not be empty"))
            }
            KeyPath::Compound(paths) => paths.iter().try_for_each(|p| validate_path(p)),
        }
    }

    /// Whether this is a compound path.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(self, KeyPath::Compound(_))
    }

    /// Whether this is the empty path.
    #[must_use]
    pub fn is_empty_path(&self) -> bool {
        matches!(self, KeyPath::Single(p) if p.is_empty())
    }

    /// Evaluates the path against a value.
    ///
    /// Returns `None` if any segment is missing.
    #[must_use]
    pub fn evaluate(&self, value: &Value) -> Option<Value> {
        match self {
            KeyPath::Single(path) => evaluate_path(value, path),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|p| evaluate_path(value, p))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Extracts a key from a value.
    ///
    /// `Ok(None)` means the path does not resolve; a resolved value that is
    /// not a valid key is a data error.
    pub fn extract_key(&self, value: &Value) -> CoreResult<Option<Key>> {
        match self.evaluate(value) {
            None => Ok(None),
            Some(found) => Key::from_value(&found)
                .map(Some)
                .map_err(|_| CoreError::data(format!("value at key path {self} is not a valid key"))),
        }
    }

    /// Whether [`inject`](Self::inject) would succeed on this value.
    #[must_use]
    pub fn can_inject(&self, value: &Value) -> bool {
        let KeyPath::Single(path) = self else {
            return false;
        };
        if path.is_empty() {
            return false;
        }
        let segments: Vec<&str> = path.split('.').collect();
        let mut current = value;
        for segment in &segments[..segments.len() - 1] {
            match current {
                Value::Map(fields) => match fields.get(*segment) {
                    Some(next) => current = next,
                    None => return true,
                },
                _ => return false,
            }
        }
        matches!(current, Value::Map(_))
    }

    /// Writes `key` into `value` at this path, creating intermediate maps.
    pub fn inject(&self, value: &mut Value, key: &Key) -> CoreResult<()> {
        if !self.can_inject(value) {
            return Err(CoreError::data(format!(
                "cannot write generated key at key path {self}"
            )));
        }
        let KeyPath::Single(path) = self else {
            return Err(CoreError::data("cannot inject into a compound key path"));
        };
        let mut current = value;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Value::Map(fields) = current else {
                return Err(CoreError::data(format!(
                    "cannot write generated key at key path {self}"
                )));
            };
            if segments.peek().is_none() {
                fields.insert(segment.to_string(), key.to_value());
                return Ok(());
            }
            current = fields
                .entry(segment.to_string())
                .or_insert_with(Value::empty_map);
        }
        Ok(())
    }
}

fn validate_path(path: &str) -> CoreResult<()> {
    if path.is_empty() {
        return Ok(());
    }
    for segment in path.split('.') {
        let mut chars = segment.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$');
        if !valid_start || !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
            return Err(CoreError::invalid_access(format!(
                "'{path}' is not a valid key path"
            )));
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn evaluate_path(value: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let mut current = value;
    let mut length = None;
    for segment in path.split('.') {
        if length.is_some() {
            return None;
        }
        match current {
            Value::Map(fields) => current = fields.get(segment)?,
            Value::Text(s) if segment == "length" => length = Some(s.chars().count() as f64),
            Value::Array(items) if segment == "length" => length = Some(items.len() as f64),
            _ => return None,
        }
    }
    Some(length.map_or_else(|| current.clone(), Value::Number))
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "'{path}'"),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::Single(path)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(paths: Vec<&str>) -> Self {
        KeyPath::Compound(paths.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(paths: Vec<String>) -> Self {
        KeyPath::Compound(paths)
    }
}
