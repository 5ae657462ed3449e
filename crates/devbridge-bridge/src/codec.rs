//! JSON text codec for bridge messages.

use bytes::Bytes;

use devbridge_protocols::{BridgeError, BridgeMessage};

/// Serialize a message into one frame.
pub fn encode(message: &BridgeMessage) -> Result<Bytes, BridgeError> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| BridgeError::Codec(format!("failed to encode '{}': {}", message.action, e)))
}

/// Parse one frame.
pub fn decode(frame: &[u8]) -> Result<BridgeMessage, BridgeError> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| BridgeError::Codec(format!("frame is not UTF-8: {}", e)))?;
    let message: BridgeMessage = serde_json::from_str(text)
        .map_err(|e| BridgeError::Codec(format!("invalid message: {}", e)))?;

    if message.id.is_empty() {
        return Err(BridgeError::Codec("message id is empty".to_string()));
    }
    if message.action.is_empty() {
        return Err(BridgeError::Codec("message action is empty".to_string()));
    }
    Ok(message)
}
