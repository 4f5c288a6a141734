use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use serde_json::{Number, Value as JsonValue};
use sha2::{Digest, Sha256};

/// Deterministic hash of a JSON summary, used as the insight cache key.
///
/// Floats are rounded to two decimals and strings are trimmed and
/// lower-cased first, so summaries that render the same hash the same.
pub fn semantic_hash(summary: &JsonValue, model: &str) -> String {
    let normalized = normalize(summary);
    let mut hasher = Sha256::new();
    hasher.update(model.trim().as_bytes());
    hasher.update(b"\n");
    if let Ok(serialized) = serde_json::to_vec(&normalized) {
        hasher.update(&serialized);
    }
    STANDARD_NO_PAD.encode(hasher.finalize())
}

fn normalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(key, val)| (key.clone(), normalize(val)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(normalize).collect()),
        JsonValue::String(text) => JsonValue::String(text.trim().to_lowercase()),
        JsonValue::Number(number) if number.is_f64() => number
            .as_f64()
            .map(|float| (float * 100.0).round() / 100.0)
            .and_then(Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}
