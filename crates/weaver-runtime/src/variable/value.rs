//! Value helpers shared by the resolver and the validators.

use serde_json::{Map, Value};

/// Conventional field names holding a node's main content, highest priority first.
pub const PRIMARY_KEYS: &[&str] = &["result", "output", "content", "text", "response", "data"];

/// Returns whether a value carries no content.
///
/// Null, whitespace-only strings and empty containers are blank.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Renders a value for substitution into text.
///
/// Strings are inserted raw, null becomes the empty string and everything
/// else is compact JSON.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extracts the primary content of an output map.
///
/// Tries [`PRIMARY_KEYS`] in order, then the first non-blank string field,
/// then the serialized map. Returns `None` when no key holds a non-blank value.
pub fn primary_content(data: &Map<String, Value>) -> Option<String> {
    if let Some(value) = PRIMARY_KEYS
        .iter()
        .filter_map(|key| data.get(*key))
        .find(|value| !is_blank(value))
    {
        return Some(format_value(value));
    }

    if let Some(text) = data
        .values()
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
    {
        return Some(text.to_owned());
    }

    if data.values().any(|value| !is_blank(value)) {
        return Some(Value::Object(data.clone()).to_string());
    }

    None
}

/// Walks a dot path through objects and arrays.
///
/// Numeric segments index arrays; every other segment is an object key.
pub fn lookup_path<'a, S: AsRef<str>>(value: &'a Value, segments: &[S]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment.as_ref()),
            Value::Array(items) => segment
                .as_ref()
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        })
}

/// Splits a path such as `items[0].url` into `["items", "0", "url"]`.
pub fn split_path(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect()
}
