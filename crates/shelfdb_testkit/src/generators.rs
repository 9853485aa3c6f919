//! Property-based test generators using proptest.
//!
//! Provides strategies for generating keys, records and operation
//! sequences that stay within what the engine accepts.

use proptest::prelude::*;
use shelfdb_core::{Key, Value};

/// Strategy for generating valid scalar keys.
pub fn scalar_key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        (-1.0e9f64..1.0e9).prop_map(Key::Number),
        (-1_000i32..1_000).prop_map(Key::from),
        (0i64..4_000_000_000_000).prop_map(Key::Date),
        "[a-z]{0,6}".prop_map(Key::String),
    ]
}

/// Strategy for generating valid keys, arrays included.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    scalar_key_strategy().prop_recursive(2, 8, 3, |inner| {
        prop::collection::vec(inner, 0..3).prop_map(Key::Array)
    })
}

/// Strategy for generating valid store and index names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating small integer record ids.
pub fn record_id_strategy() -> impl Strategy<Value = i32> {
    0i32..64
}

/// Strategy for generating a record `{ id, tag }` with a tag drawn from a
/// small alphabet so that index keys collide.
pub fn tagged_record_strategy() -> impl Strategy<Value = (i32, String)> {
    (record_id_strategy(), "[abc]")
}

/// Builds the value for a generated tagged record.
pub fn tagged_value(id: i32, tag: &str) -> Value {
    Value::map([("id", Value::from(id)), ("tag", Value::from(tag))])
}

/// Operations against a store with in-line `id` keys.
#[derive(Debug, Clone)]
pub enum RecordOperation {
    /// Put a record.
    Put {
        /// Record id.
        id: i32,
        /// Indexed tag.
        tag: String,
    },
    /// Add a record; fails if the id exists.
    Add {
        /// Record id.
        id: i32,
        /// Indexed tag.
        tag: String,
    },
    /// Delete a range of ids.
    Delete {
        /// Lowest id, inclusive.
        from: i32,
        /// Highest id, inclusive.
        to: i32,
    },
    /// Clear the store.
    Clear,
}

/// Strategy for generating record operations.
pub fn record_operation_strategy() -> impl Strategy<Value = RecordOperation> {
    prop_oneof![
        4 => tagged_record_strategy().prop_map(|(id, tag)| RecordOperation::Put { id, tag }),
        2 => tagged_record_strategy().prop_map(|(id, tag)| RecordOperation::Add { id, tag }),
        2 => (record_id_strategy(), 0i32..8)
            .prop_map(|(from, len)| RecordOperation::Delete { from, to: from + len }),
        1 => Just(RecordOperation::Clear),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<RecordOperation>> {
    prop::collection::vec(record_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfdb_core::Engine;
    use std::cmp::Ordering;

    fn rank(key: &Key) -> u8 {
        match key {
            Key::Number(_) => 0,
            Key::Date(_) => 1,
            Key::String(_) => 2,
            Key::Array(_) => 3,
        }
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_keys_are_valid(key in key_strategy()) {
            prop_assert!(key.validate().is_ok());
            prop_assert_eq!(Key::from_value(&key.to_value()).unwrap(), key);
        }

        #[test]
        fn key_order_is_antisymmetric(a in key_strategy(), b in key_strategy()) {
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        #[test]
        fn key_order_is_transitive(a in key_strategy(), b in key_strategy(), c in key_strategy()) {
            let mut keys = [a, b, c];
            keys.sort();
            prop_assert!(keys[0] <= keys[2]);
            prop_assert!(keys[0] <= keys[1] && keys[1] <= keys[2]);
        }

        #[test]
        fn types_order_before_values(a in key_strategy(), b in key_strategy()) {
            if rank(&a) != rank(&b) {
                prop_assert_eq!(a.cmp(&b), rank(&a).cmp(&rank(&b)));
            }
        }

        #[test]
        fn engine_cmp_matches_key_order(a in key_strategy(), b in key_strategy()) {
            let engine = Engine::new();
            let ordering = engine.cmp(&a.to_value(), &b.to_value()).unwrap();
            prop_assert_eq!(ordering, a.cmp(&b));
            prop_assert_eq!(engine.cmp(&a.to_value(), &a.to_value()).unwrap(), Ordering::Equal);
        }

        #[test]
        fn store_name_is_valid(name in store_name_strategy()) {
            let first = name.chars().next();
            prop_assert!(first.map_or(false, |c| c.is_ascii_alphabetic()));
        }

        #[test]
        fn delete_ranges_are_ordered(op in record_operation_strategy()) {
            if let RecordOperation::Delete { from, to } = op {
                prop_assert!(from <= to);
            }
        }
    }
}
