use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::AppResult;

const REDACTED: &str = "[REDACTED]";

/// Masks personal fields (lead and agent names, contact details) before a
/// payload leaves the process.
pub fn redact_sensitive_data(data: &JsonValue) -> AppResult<JsonValue> {
    Ok(redact_value(data))
}

fn redact_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let redacted: JsonMap<String, JsonValue> = map
                .iter()
                .map(|(key, val)| {
                    let next = if is_sensitive_field(key) {
                        redact_scalar(val)
                    } else {
                        redact_value(val)
                    };
                    (key.clone(), next)
                })
                .collect();
            JsonValue::Object(redacted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(redact_value).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(field_name: &str) -> bool {
    let lower = field_name.to_lowercase();
    matches!(
        lower.as_str(),
        "name"
            | "firstname"
            | "lastname"
            | "fullname"
            | "agent"
            | "leadid"
            | "email"
            | "phone"
            | "notes"
    )
}

fn redact_scalar(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(text) if !text.is_empty() => JsonValue::String(REDACTED.to_string()),
        _ => value.clone(),
    }
}
