//! AI provider trait definition.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::RequestSpec;
use crate::error::ProviderError;

/// Capability set of an AI provider client.
///
/// The coordinator depends only on this trait, never on a concrete provider.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Returns the provider name, unique within a registry.
    fn name(&self) -> &str;

    /// Whether this provider can perform `operation`.
    fn supports(&self, operation: &str) -> bool {
        let _ = operation;
        true
    }

    /// Perform `operation` within `deadline`.
    async fn call(
        &self,
        operation: &str,
        spec: &RequestSpec,
        deadline: Duration,
    ) -> Result<Value, ProviderError>;
}
