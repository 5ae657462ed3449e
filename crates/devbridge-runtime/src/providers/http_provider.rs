//! Provider behind an external HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use devbridge_protocols::{AiProvider, ProviderError, RequestSpec};

/// Posts `{operation, prompt, context, options}` as JSON and reads the
/// `result` field of the reply, or the whole body when it has none.
pub struct HttpProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    operations: Vec<String>,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: None,
            operations: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Send `key` as a bearer token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Restrict to `operations`. An empty list supports everything.
    pub fn with_operations(mut self, operations: Vec<String>) -> Self {
        self.operations = operations;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_request(
        &self,
        body: &Value,
        deadline: Duration,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .timeout(deadline)
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(deadline.as_millis() as u64)
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = retry_after_seconds(&response);
            let text = response.text().await.unwrap_or_default();
            return Err(match ProviderError::from_api_response(status, text) {
                ProviderError::RateLimited { .. } => ProviderError::RateLimited {
                    retry_after_seconds: retry_after.unwrap_or(0),
                },
                other => other,
            });
        }

        Ok(response)
    }
}

fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl AiProvider for HttpProvider {
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
        let body = json!({
            "operation": operation,
            "prompt": spec.prompt,
            "context": spec.context,
            "options": spec.options,
        });

        debug!("{} posting {} to {}", self.name, operation, self.endpoint);
        let response = self.send_request(&body, deadline).await?;
        let mut reply: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(match reply.get_mut("result") {
            Some(result) => result.take(),
            None => reply,
        })
    }
}

#[cfg(test)]
#[path = "http_provider_tests.rs"]
mod tests;
