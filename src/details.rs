//! Decoding of the `details` payload attached to every order.
//!
//! Upstream writers have stored `details` in three shapes over time:
//!
//! - a JSON object or array (the intended form);
//! - a JSON document serialized into a string;
//! - a string that was spread into an object one character per key
//!   (`{"0": "{", "1": "\"", ...}`).
//!
//! [`decode_details`] repairs the last two. A repair that fails yields a
//! [`DecodeError`] carrying the value the caller should fall back to, so the
//! order still flows through consolidation with whatever is left.

use serde_json::{Map, Value};
use thiserror::Error;

/// The payload as stored, before any repair.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDetails {
    Missing,
    Json(Value),
    JsonString(String),
    IndexedCharMap(Map<String, Value>),
}

impl RawDetails {
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::String(s) => Self::JsonString(s.clone()),
            Value::Object(map) if map.contains_key("0") => Self::IndexedCharMap(map.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

/// The payload after repair.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Details {
    Object(Map<String, Value>),
    List(Vec<Value>),
    #[default]
    Unusable,
}

impl Details {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(map),
            Value::Array(items) => Self::List(items),
            _ => Self::Unusable,
        }
    }

    /// Field lookup; lists and unusable payloads have no fields.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn is_unusable(&self) -> bool {
        matches!(self, Self::Unusable)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("details string is not valid JSON: {source}")]
    JsonString {
        #[source]
        source: serde_json::Error,
    },
    #[error("indexed character map does not reassemble into JSON: {source}")]
    IndexedCharMap {
        #[source]
        source: serde_json::Error,
        original: Map<String, Value>,
    },
}

impl DecodeError {
    /// What to keep using once the error has been reported: nothing for a
    /// broken string, the untouched map for a broken character split.
    pub fn fallback(self) -> Details {
        match self {
            Self::JsonString { .. } => Details::Unusable,
            Self::IndexedCharMap { original, .. } => Details::Object(original),
        }
    }
}

/// Repair and classify a raw payload.
///
/// A JSON string is decoded once. If that yields (or the payload already is)
/// an object with a `"0"` key, its values are concatenated in property order
/// and decoded again.
pub fn decode_details(raw: RawDetails) -> Result<Details, DecodeError> {
    let value = match raw {
        RawDetails::Missing => return Ok(Details::Unusable),
        RawDetails::Json(value) => return Ok(Details::from_value(value)),
        RawDetails::IndexedCharMap(map) => return reassemble(map),
        RawDetails::JsonString(text) => serde_json::from_str::<Value>(&text)
            .map_err(|source| DecodeError::JsonString { source })?,
    };

    match value {
        Value::Object(map) if map.contains_key("0") => reassemble(map),
        other => Ok(Details::from_value(other)),
    }
}

fn reassemble(map: Map<String, Value>) -> Result<Details, DecodeError> {
    let joined: String = ordered_values(&map).map(fragment).collect();
    match serde_json::from_str::<Value>(&joined) {
        Ok(value) => Ok(Details::from_value(value)),
        Err(source) => Err(DecodeError::IndexedCharMap {
            source,
            original: map,
        }),
    }
}

fn fragment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Values of `map` in JavaScript property order: integer-like keys ascending
/// by numeric value, then the remaining keys in insertion order.
pub fn ordered_values(map: &Map<String, Value>) -> impl Iterator<Item = &Value> {
    let mut indexed: Vec<(u32, &Value)> = Vec::new();
    let mut named: Vec<&Value> = Vec::new();
    for (key, value) in map {
        match array_index(key) {
            Some(index) => indexed.push((index, value)),
            None => named.push(value),
        }
    }
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, v)| v).chain(named)
}

fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|n| *n != u32::MAX)
}
