//! Field extractors for DataWedge results.
//!
//! A value of the wrong shape is reported as absent, so a later well-formed
//! reply can still fill the field.

use serde_json::Value;

/// DataWedge status is normally a string. Older releases wrap it in a bundle;
/// take the first string found inside.
pub fn datawedge_status(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Object(map) => map
            .values()
            .find(|v| v.is_string())
            .cloned(),
        _ => None,
    }
}

/// Scanner enumeration must be a list.
pub fn scanner_list(value: &Value) -> Option<Value> {
    value.is_array().then(|| value.clone())
}

/// Any string value.
pub fn string(value: &Value) -> Option<Value> {
    value.is_string().then(|| value.clone())
}

/// Any object value.
pub fn bundle(value: &Value) -> Option<Value> {
    value.is_object().then(|| value.clone())
}
