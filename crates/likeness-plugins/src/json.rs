//! Helpers for third-party JSON whose shape is not guaranteed.

use serde_json::Value;

/// Returns the `data` envelope when present and non-null, otherwise the value itself.
pub fn unwrap_data(value: &Value) -> &Value {
    match value.get("data") {
        Some(inner) if !inner.is_null() => inner,
        _ => value,
    }
}

/// First non-empty string found at any of the JSON pointers, in order.
pub fn first_str(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| {
        value
            .pointer(p)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Like [`first_str`] but also accepts numbers, rendered without quotes.
pub fn first_scalar(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match value.pointer(p) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Extracts the JSON body from model output that may be wrapped in markdown fences.
pub fn strip_code_fences(text: &str) -> String {
    let inner = fenced_block(text, "```json").or_else(|| fenced_block(text, "```"));
    inner
        .unwrap_or(text)
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}
