use chrono::{DateTime, Utc};
use serde_json::Value;

/// Opaque key/value document (parameters, step config, results, log details)
pub type JsonMap = serde_json::Map<String, Value>;

/// Wall-clock instant used for every entity timestamp
pub type Timestamp = DateTime<Utc>;

/// Build a [`JsonMap`] from a `json!` object literal; non-objects yield an empty map
pub fn json_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

/// Look up a string field in a map
#[inline]
pub fn str_field<'a>(map: &'a JsonMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}
