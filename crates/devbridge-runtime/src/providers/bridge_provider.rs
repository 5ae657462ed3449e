//! Provider served by the bridge peer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use devbridge_bridge::MessageBridge;
use devbridge_protocols::{actions, AiProvider, BridgeError, ProviderError, RequestSpec};

/// Forwards an operation as a bridge request and returns the peer's result.
pub struct BridgeProvider {
    name: String,
    bridge: Arc<MessageBridge>,
    action: String,
    operations: Vec<String>,
}

impl BridgeProvider {
    pub fn new(name: impl Into<String>, bridge: Arc<MessageBridge>) -> Self {
        Self {
            name: name.into(),
            bridge,
            action: actions::AI_CALL.to_string(),
            operations: Vec::new(),
        }
    }

    /// Use `action` instead of `ai.call`.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Restrict to `operations`. An empty list supports everything.
    pub fn with_operations(mut self, operations: Vec<String>) -> Self {
        self.operations = operations;
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

#[async_trait]
impl AiProvider for BridgeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, operation: &str) -> bool {
        self.operations.is_empty() || self.operations.iter().any(|op| op == operation)
    }

    async fn call(
        &self,
        operation: &str,
        spec: &RequestSpec,
        deadline: Duration,
    ) -> Result<Value, ProviderError> {
        let payload = json!({
            "operation": operation,
            "prompt": spec.prompt,
            "context": spec.context,
            "options": spec.options,
        });

        debug!("{} forwarding {} as {}", self.name, operation, self.action);
        self.bridge
            .send_with_timeout(&self.action, payload, deadline)
            .await
            .map_err(to_provider_error)
    }
}

fn to_provider_error(error: BridgeError) -> ProviderError {
    match error {
        BridgeError::ChannelUnavailable(reason) => ProviderError::Network(reason),
        BridgeError::Timeout { timeout_ms, .. } => ProviderError::Timeout(timeout_ms),
        BridgeError::RemoteError { code, message, .. } => {
            ProviderError::Remote(format!("[{}] {}", code, message))
        }
        BridgeError::UnsupportedAction(action) => ProviderError::Unsupported(action),
        BridgeError::Cancelled(reason) => ProviderError::Network(format!("cancelled: {}", reason)),
        BridgeError::Codec(reason) => ProviderError::Remote(format!("bad response: {}", reason)),
    }
}
