//! Dynamic value helpers.
//!
//! Values are plain `serde_json::Value`s built with `preserve_order`, so map
//! keys keep their insertion order. Copies are owned clones.

use serde_json::Value;

/// Key/value map threaded through one compose run.
pub type State = serde_json::Map<String, Value>;

/// Truthiness used by loop conditions.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Short type name for error payloads.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Take the map out of an object value.
pub fn into_state(value: Value) -> Option<State> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Read a string field, treating blank strings as missing.
pub fn non_blank_str<'a>(map: &'a State, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Returns true when the value is a step definition (an object with a non-blank `call`).
pub fn is_step_definition(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|map| map.get("call"))
        .and_then(Value::as_str)
        .map(|call| !call.trim().is_empty())
        .unwrap_or(false)
}
