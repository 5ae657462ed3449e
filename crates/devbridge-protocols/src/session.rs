//! Session delta wire type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Origin;

/// A versioned update of one session field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDelta {
    pub session_id: String,
    pub field: String,
    pub value: Value,
    pub version: u64,
    pub writer: Origin,
}

impl SessionDelta {
    pub fn new(
        session_id: impl Into<String>,
        field: impl Into<String>,
        value: Value,
        version: u64,
        writer: Origin,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            field: field.into(),
            value,
            version,
            writer,
        }
    }
}
