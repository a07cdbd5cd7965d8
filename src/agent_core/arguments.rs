//! Schema-guided argument extraction from the raw request text.
//!
//! For each property a tool's input schema declares, look for `name: value`
//! or `name=value` in the request and bind the value token as a string.
//! Best-effort only: a tool may still reject an incomplete argument set.

use serde_json::{Map, Value};

/// Extract `name: token` / `name=token` bindings for every property in
/// `schema.properties`.
///
/// Names match case-insensitively and must start at a word boundary, so
/// `filepath: x` does not bind `path`. The token is the next run of
/// non-whitespace characters, kept verbatim.
pub fn extract_args_from_prompt(text: &str, schema: &Value) -> Map<String, Value> {
    let mut args = Map::new();
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return args;
    };

    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let haystack = text.to_ascii_lowercase();
    for name in properties.keys() {
        if let Some(value) = find_binding(text, &haystack, name) {
            args.insert(name.clone(), Value::String(value));
        }
    }
    args
}

/// Fill properties missing from `args` with bindings found in `text`.
/// Existing values are never overwritten.
pub fn backfill_args(args: &mut Map<String, Value>, text: &str, schema: &Value) {
    for (name, value) in extract_args_from_prompt(text, schema) {
        if !args.contains_key(&name) {
            tracing::debug!(param = %name, "back-filled argument from request text");
            args.insert(name, value);
        }
    }
}

fn find_binding(text: &str, haystack: &str, name: &str) -> Option<String> {
    let needle = name.to_ascii_lowercase();
    if needle.is_empty() {
        return None;
    }

    let mut from = 0;
    while let Some(offset) = haystack[from..].find(&needle) {
        let start = from + offset;
        let end = start + needle.len();
        from = end;

        if !at_word_start(haystack, start) {
            continue;
        }
        let rest = text[end..].trim_start();
        let Some(rest) = rest.strip_prefix(':').or_else(|| rest.strip_prefix('=')) else {
            continue;
        };
        let token: &str = rest
            .trim_start()
            .split(char::is_whitespace)
            .next()
            .unwrap_or("");
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    None
}

fn at_word_start(haystack: &str, idx: usize) -> bool {
    haystack[..idx]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
}
