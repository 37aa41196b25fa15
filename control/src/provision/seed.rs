//! Seed document coercion
//!
//! Seed payloads are plain JSON; typed markers are normalized before insert
//! so the admin surface receives them in extended-JSON form: objects with a
//! single `$oid` or `$date` key pass through, and bare strings that parse
//! as RFC 3339 dates are promoted to `$date` markers.

use chrono::DateTime;
use serde_json::{json, Map, Value};

/// Recursively coerce one seed document
pub fn coerce_document(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            if is_typed_marker(map) {
                return value.clone();
            }
            let coerced: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), coerce_document(v)))
                .collect();
            Value::Object(coerced)
        }
        Value::Array(items) => Value::Array(items.iter().map(coerce_document).collect()),
        Value::String(s) => {
            if DateTime::parse_from_rfc3339(s).is_ok() {
                json!({ "$date": s })
            } else {
                value.clone()
            }
        }
        _ => value.clone(),
    }
}

fn is_typed_marker(map: &Map<String, Value>) -> bool {
    map.len() == 1 && (map.contains_key("$oid") || map.contains_key("$date"))
}
