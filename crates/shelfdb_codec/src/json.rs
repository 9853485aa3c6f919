//! JSON conversion for document values.
//!
//! JSON has no timestamp type, so dates travel as a single-field wrapper
//! object `{"$date": <milliseconds>}`. Every other JSON shape maps onto
//! the matching [`Value`] variant; all numbers become doubles.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

/// Field name of the timestamp wrapper object.
pub const DATE_FIELD: &str = "$date";

/// Largest magnitude at which every integer is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Converts a parsed JSON tree into a document value.
pub fn from_json(json: JsonValue) -> CodecResult<Value> {
    Ok(match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => Value::Number(number_to_f64(&n)?),
        JsonValue::String(s) => Value::Text(s),
        JsonValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_json)
                .collect::<CodecResult<Vec<_>>>()?,
        ),
        JsonValue::Object(fields) => {
            if fields.len() == 1 {
                if let Some(stamp) = fields.get(DATE_FIELD) {
                    return date_from_json(stamp);
                }
            }
            let mut map = std::collections::BTreeMap::new();
            for (name, field) in fields {
                map.insert(name, from_json(field)?);
            }
            Value::Map(map)
        }
    })
}

/// Converts a document value into a JSON tree.
///
/// Non-finite numbers have no JSON form and are written as `null`.
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::Date(ms) => {
            let mut wrapper = JsonMap::new();
            wrapper.insert(DATE_FIELD.to_string(), JsonValue::from(*ms));
            JsonValue::Object(wrapper)
        }
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Array(items) => JsonValue::Array(items.iter().map(to_json).collect()),
        Value::Map(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, field)| (name.clone(), to_json(field)))
                .collect(),
        ),
    }
}

/// Parses JSON text into a document value.
pub fn from_json_str(text: &str) -> CodecResult<Value> {
    let json: JsonValue = serde_json::from_str(text)?;
    from_json(json)
}

/// Writes a document value as compact JSON text.
pub fn to_json_string(value: &Value) -> CodecResult<String> {
    serde_json::to_string(&to_json(value)).map_err(|e| CodecError::encoding_failed(e.to_string()))
}

/// Writes a document value as indented JSON text.
pub fn to_json_string_pretty(value: &Value) -> CodecResult<String> {
    serde_json::to_string_pretty(&to_json(value))
        .map_err(|e| CodecError::encoding_failed(e.to_string()))
}

fn number_to_f64(n: &JsonNumber) -> CodecResult<f64> {
    n.as_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| CodecError::NumberOutOfRange {
            literal: n.to_string(),
        })
}

#[allow(clippy::cast_possible_truncation)]
fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        JsonValue::from(n as i64)
    } else {
        JsonNumber::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn date_from_json(stamp: &JsonValue) -> CodecResult<Value> {
    if let Some(ms) = stamp.as_i64() {
        return Ok(Value::Date(ms));
    }
    match stamp.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Ok(Value::Date(f as i64)),
        _ => Err(CodecError::invalid_date(format!(
            "expected integer milliseconds, got {stamp}"
        ))),
    }
}

impl TryFrom<JsonValue> for Value {
    type Error = CodecError;

    fn try_from(json: JsonValue) -> CodecResult<Self> {
        from_json(json)
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        to_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_document() {
        let value = from_json(json!({
            "name": "Homer",
            "age": 39,
            "children": ["Bart", "Lisa"],
            "address": {"city": "Springfield"}
        }))
        .unwrap();

        assert_eq!(value.get("name"), Some(&Value::from("Homer")));
        assert_eq!(value.get("age"), Some(&Value::Number(39.0)));
        assert_eq!(
            value.get("address").and_then(|a| a.get("city")),
            Some(&Value::from("Springfield"))
        );
        assert_eq!(value.get("children").and_then(Value::as_array).map(<[Value]>::len), Some(2));
    }

    #[test]
    fn date_wrapper_is_recognized() {
        let value = from_json(json!({"$date": 1_700_000_000_000_i64})).unwrap();
        assert_eq!(value, Value::Date(1_700_000_000_000));

        let back = to_json(&value);
        assert_eq!(back, json!({"$date": 1_700_000_000_000_i64}));
    }

    #[test]
    fn date_wrapper_with_extra_fields_is_a_map() {
        let value = from_json(json!({"$date": 1, "tz": "UTC"})).unwrap();
        assert!(value.as_map().is_some());
    }

    #[test]
    fn invalid_date_wrapper_is_rejected() {
        let err = from_json(json!({"$date": "yesterday"})).unwrap_err();
        assert!(matches!(err, CodecError::InvalidDate { .. }));
    }

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(to_json(&Value::Number(3.0)), json!(3));
        assert_eq!(to_json(&Value::Number(2.5)), json!(2.5));
        assert_eq!(to_json(&Value::Number(f64::NAN)), JsonValue::Null);
    }

    #[test]
    fn text_round_trip_through_serde() {
        let value: Value = serde_json::from_str(r#"{"k": [1, "two", null, true]}"#).unwrap();
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"k":[1,"two",null,true]}"#);
    }

    #[test]
    fn malformed_text_is_an_error() {
        let err = from_json_str("{not json").unwrap_err();
        assert!(matches!(err, CodecError::InvalidJson { .. }));
    }
}
