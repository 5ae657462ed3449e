//! Request payload supplied by the context collaborator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input of a logical AI operation.
///
/// The coordinator treats this as opaque apart from what the fingerprint
/// needs: the prompt and the context fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Prompt or primary content.
    pub prompt: String,

    /// Structured context (active file, selection, language, ...).
    #[serde(default)]
    pub context: BTreeMap<String, Value>,

    /// Provider hints that do not change the meaning of the request
    /// (temperature, model preference). Excluded from the fingerprint.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

impl RequestSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}
