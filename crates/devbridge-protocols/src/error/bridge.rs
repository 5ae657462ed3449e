//! Message bridge errors.

use serde_json::Value;
use thiserror::Error;

use crate::message::RemoteFault;

/// Errors surfaced to callers of the message bridge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Request '{action}' timed out after {timeout_ms} ms")]
    Timeout { action: String, timeout_ms: u64 },

    #[error("Remote error [{code}]: {message}")]
    RemoteError {
        code: String,
        message: String,
        data: Option<Value>,
    },

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

impl BridgeError {
    /// Map a fault reported by the peer for `action`.
    pub fn from_fault(action: &str, fault: RemoteFault) -> Self {
        if fault.is_unsupported_action() {
            BridgeError::UnsupportedAction(action.to_string())
        } else {
            BridgeError::RemoteError {
                code: fault.code,
                message: fault.message,
                data: fault.data,
            }
        }
    }

    /// Convert back into a fault suitable for a response envelope.
    pub fn to_fault(&self) -> RemoteFault {
        match self {
            BridgeError::RemoteError { code, message, data } => RemoteFault {
                code: code.clone(),
                message: message.clone(),
                data: data.clone(),
            },
            BridgeError::UnsupportedAction(action) => RemoteFault::unsupported_action(action),
            other => RemoteFault::handler_failed(other.to_string()),
        }
    }

    pub fn is_channel_unavailable(&self) -> bool {
        matches!(self, BridgeError::ChannelUnavailable(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}
