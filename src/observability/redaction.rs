//! Recursive PII redaction over event attributes, grounded on the teacher's
//! `guardrails.rs::scan_for_keywords` recursive `Value` walk.

use once_cell::sync::Lazy;
use serde_json::Value;

const SENSITIVE_SUBSTRINGS: &[&str] = &[
    "secret",
    "token",
    "password",
    "api_key",
    "credential",
    "auth",
    "authorization",
    "bearer",
];

static SENTINEL: Lazy<Value> = Lazy::new(|| Value::String("[REDACTED]".to_string()));

fn key_is_sensitive(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

/// Walk `value` structure-preservingly; any object key whose lowercased name
/// contains a sensitive substring has its value replaced by the sentinel.
/// Key names remain visible.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                if key_is_sensitive(key) {
                    redacted.insert(key.clone(), SENTINEL.clone());
                } else {
                    redacted.insert(key.clone(), redact(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
