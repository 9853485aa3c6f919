//! # ShelfDB Codec
//!
//! Document values for ShelfDB.
//!
//! This crate provides the dynamic [`Value`] type stored in record stores
//! and its conversion to and from JSON:
//! - Maps have sorted string fields
//! - Numbers are doubles
//! - Timestamps travel as `{"$date": <ms>}` wrappers
//!
//! ## Usage
//!
//! ```
//! use shelfdb_codec::{from_json_str, to_json_string, Value};
//!
//! let value = from_json_str(r#"{"name": "Marge", "born": {"$date": 0}}"#).unwrap();
//! assert_eq!(value.get("born"), Some(&Value::Date(0)));
//!
//! let text = to_json_string(&value).unwrap();
//! assert_eq!(text, r#"{"born":{"$date":0},"name":"Marge"}"#);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod json;
mod value;

pub use error::{CodecError, CodecResult};
pub use json::{from_json, from_json_str, to_json, to_json_string, to_json_string_pretty, DATE_FIELD};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-1_000_000i64..1_000_000).prop_map(Value::from),
            any::<i64>().prop_map(Value::Date),
            "[a-z]{0,8}".prop_map(Value::Text),
        ]
    }

    fn document() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn json_text_preserves_documents(value in document()) {
            let text = to_json_string(&value).unwrap();
            let parsed = from_json_str(&text).unwrap();
            prop_assert_eq!(parsed, value);
        }
    }
}
