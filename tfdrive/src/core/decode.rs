//! Decoding terraform's `output -json` documents.
//!
//! For a single key terraform prints `{"value": ...}`; for all outputs it prints
//! `{"<key>": {"value": ...}, ...}`. Decoding is strict: malformed JSON or an
//! unexpected shape is an error, never a partial result.

use std::collections::BTreeMap;

use serde_json::{Map, Value as Json};

use crate::error::DecodeError;

/// Decode `{"value": [...]}` into the stringified list elements.
pub fn decode_list(key: &str, raw: &str) -> Result<Vec<String>, DecodeError> {
    match value_field(key, raw)? {
        Json::Array(items) => Ok(items.iter().map(stringify).collect()),
        other => Err(wrong_shape(key, "list", &other)),
    }
}

/// Decode `{"value": {...}}` into a flat map of stringified members.
pub fn decode_map(key: &str, raw: &str) -> Result<BTreeMap<String, String>, DecodeError> {
    match value_field(key, raw)? {
        Json::Object(members) => Ok(members.iter().map(|(k, v)| (k.clone(), stringify(v))).collect()),
        other => Err(wrong_shape(key, "map", &other)),
    }
}

/// Decode the all-outputs document, keeping `keys` or every key when `keys` is `None`.
///
/// A requested key that is absent or lacks a `value` fails the whole decode.
pub fn decode_keys(
    raw: &str,
    keys: Option<&[String]>,
) -> Result<BTreeMap<String, Json>, DecodeError> {
    let mut outputs: BTreeMap<String, Map<String, Json>> = serde_json::from_str(raw)?;

    let wanted: Vec<String> = match keys {
        Some(keys) => keys.to_vec(),
        None => outputs.keys().cloned().collect(),
    };

    let mut result = BTreeMap::new();
    for key in wanted {
        let value = outputs
            .get_mut(&key)
            .and_then(|wrapper| wrapper.remove("value"))
            .ok_or_else(|| DecodeError::MissingValue { key: key.clone() })?;
        result.insert(key, value);
    }
    Ok(result)
}

/// Render a JSON value the way list and map members are reported: strings as-is,
/// everything else as compact JSON.
pub fn stringify(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_field(key: &str, raw: &str) -> Result<Json, DecodeError> {
    let mut document: Map<String, Json> = serde_json::from_str(raw)?;
    document
        .remove("value")
        .ok_or_else(|| DecodeError::MissingValue {
            key: key.to_string(),
        })
}

fn wrong_shape(key: &str, expected: &'static str, value: &Json) -> DecodeError {
    DecodeError::WrongShape {
        key: key.to_string(),
        expected,
        value: value.to_string(),
    }
}
