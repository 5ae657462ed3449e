//! Deterministic request fingerprints.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use devbridge_protocols::RequestSpec;

/// Cache key of a logical request: `<operation>:<sha256 hex>`.
///
/// The operation prefix keeps keys of one operation groupable for
/// invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized operation prefix.
    pub fn operation(&self) -> &str {
        self.0.split_once(':').map(|(op, _)| op).unwrap_or("")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fingerprint `operation` applied to `spec`.
///
/// Case and whitespace differences in the operation, the prompt and string
/// context values do not change the result. Context key order never matters.
/// `spec.options` is not part of the fingerprint.
pub fn fingerprint(operation: &str, spec: &RequestSpec) -> Fingerprint {
    let operation = normalize_operation(operation);

    let mut hasher = Sha256::new();
    update_field(&mut hasher, &operation);
    update_field(&mut hasher, &normalize_text(&spec.prompt));

    // BTreeMap iterates in key order.
    for (key, value) in &spec.context {
        update_field(&mut hasher, key.trim());
        update_field(&mut hasher, &normalize_value(value));
    }

    Fingerprint(format!("{}:{}", operation, hex::encode(hasher.finalize())))
}

/// Length-prefixed so no field can spill into the next.
fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

pub(crate) fn normalize_operation(operation: &str) -> String {
    operation.trim().to_lowercase()
}

/// Lowercase and collapse every whitespace run to a single space.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", normalize_text(s)),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(normalize_value).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, normalize_value(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        other => other.to_string(),
    }
}
