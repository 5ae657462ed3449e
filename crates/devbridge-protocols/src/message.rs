//! Bridge wire message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation identifier.
pub type MessageId = String;

/// Message kind, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Expects exactly one `response` carrying the same id.
    Request,
    /// Answers an outstanding `request`.
    Response,
    /// Fire-and-forget notification.
    Event,
}

/// Side of the bridge that produced a message.
///
/// `Local` is the browser-agent side, `Remote` the dev-tool backend. Both
/// processes agree on this labelling, which makes it usable as an absolute
/// tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    /// Fixed tie-break rank. Higher wins.
    pub fn priority(self) -> u8 {
        match self {
            Origin::Local => 1,
            Origin::Remote => 0,
        }
    }

    /// The other side.
    pub fn peer(self) -> Self {
        match self {
            Origin::Local => Origin::Remote,
            Origin::Remote => Origin::Local,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Remote => "remote",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message exchanged over the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub created_at: i64,
    #[serde(rename = "source")]
    pub origin: Origin,
}

impl BridgeMessage {
    fn new(
        id: MessageId,
        kind: MessageKind,
        action: impl Into<String>,
        payload: Value,
        origin: Origin,
    ) -> Self {
        Self {
            id,
            kind,
            action: action.into(),
            payload,
            created_at: chrono::Utc::now().timestamp_millis(),
            origin,
        }
    }

    /// Create a request. The id is normally allocated by the correlation store.
    pub fn request(id: MessageId, action: impl Into<String>, payload: Value, origin: Origin) -> Self {
        Self::new(id, MessageKind::Request, action, payload, origin)
    }

    /// Create the response to `request`, reusing its id and action.
    pub fn response_to(request: &BridgeMessage, envelope: ResponseEnvelope, origin: Origin) -> Self {
        let payload = serde_json::to_value(envelope).unwrap_or(Value::Null);
        Self::new(
            request.id.clone(),
            MessageKind::Response,
            request.action.clone(),
            payload,
            origin,
        )
    }

    /// Create an event with a fresh id.
    pub fn event(action: impl Into<String>, payload: Value, origin: Origin) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            MessageKind::Event,
            action,
            payload,
            origin,
        )
    }

    pub fn is_request(&self) -> bool {
        self.kind == MessageKind::Request
    }

    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }

    pub fn is_event(&self) -> bool {
        self.kind == MessageKind::Event
    }

    /// Interpret the payload of a `response` message.
    pub fn envelope(&self) -> Result<ResponseEnvelope, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload carried by every `response` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteFault>,
}

impl ResponseEnvelope {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result,
            error: None,
        }
    }

    pub fn failure(error: RemoteFault) -> Self {
        Self {
            ok: false,
            result: Value::Null,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, RemoteFault> {
        match (self.ok, self.error) {
            (true, _) => Ok(self.result),
            (false, Some(fault)) => Err(fault),
            (false, None) => Err(RemoteFault::new(
                RemoteFault::HANDLER_ERROR,
                "response flagged as failed without error detail",
            )),
        }
    }
}

/// Error reported by the peer in a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFault {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteFault {
    pub const UNSUPPORTED_ACTION: &'static str = "UNSUPPORTED_ACTION";
    pub const HANDLER_ERROR: &'static str = "HANDLER_ERROR";
    pub const INVALID_PAYLOAD: &'static str = "INVALID_PAYLOAD";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn unsupported_action(action: &str) -> Self {
        Self::new(
            Self::UNSUPPORTED_ACTION,
            format!("no handler registered for action '{}'", action),
        )
    }

    pub fn handler_failed(message: impl Into<String>) -> Self {
        Self::new(Self::HANDLER_ERROR, message)
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PAYLOAD, message)
    }

    pub fn is_unsupported_action(&self) -> bool {
        self.code == Self::UNSUPPORTED_ACTION
    }
}

impl std::fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
