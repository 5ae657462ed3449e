//! Request coordinator.
//!
//! Turns one logical operation into a sequence of provider attempts:
//! cache lookup, candidate ordering from the registry, bounded attempts with
//! exponential backoff between them, and fallback across providers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devbridge_core::{fingerprint, ProviderRegistry, ResponseCache};
use devbridge_protocols::{ProviderError, RequestSpec};

use crate::error::{CoordinatorError, ProviderFailure};
use crate::retry::{is_retryable, RetryConfig};

/// How successful results are cached.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub enabled: bool,
    pub default_ttl: Duration,
    /// Per-operation ttl, keyed by operation name.
    pub ttl_overrides: HashMap<String, Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(300),
            ttl_overrides: HashMap::new(),
        }
    }
}

impl CachePolicy {
    pub fn ttl_for(&self, operation: &str) -> Duration {
        self.ttl_overrides
            .get(operation)
            .copied()
            .unwrap_or(self.default_ttl)
    }
}

/// Executes AI operations against the registered providers.
pub struct RequestCoordinator {
    registry: Arc<ProviderRegistry>,
    cache: Arc<ResponseCache>,
    retry: RetryConfig,
    cache_policy: CachePolicy,
}

impl RequestCoordinator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        cache: Arc<ResponseCache>,
        retry: RetryConfig,
        cache_policy: CachePolicy,
    ) -> Self {
        Self {
            registry,
            cache,
            retry,
            cache_policy,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Perform `operation`, serving from cache when possible.
    pub async fn execute(
        &self,
        operation: &str,
        spec: &RequestSpec,
    ) -> Result<Value, CoordinatorError> {
        self.run(operation, spec).await
    }

    /// Like [`execute`](Self::execute), abandoning the in-flight attempt and
    /// any pending backoff once `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        operation: &str,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<Value, CoordinatorError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Operation {} cancelled", operation);
                Err(CoordinatorError::Cancelled(operation.to_string()))
            }
            result = self.run(operation, spec) => result,
        }
    }

    async fn run(&self, operation: &str, spec: &RequestSpec) -> Result<Value, CoordinatorError> {
        let key = fingerprint(operation, spec);

        if self.cache_policy.enabled {
            if let Some(value) = self.cache.get(key.as_str()) {
                debug!("Serving {} from cache", operation);
                return Ok(value);
            }
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut failures: Vec<ProviderFailure> = Vec::new();
        let mut excluded: HashSet<String> = HashSet::new();
        let mut attempt = 0u32;

        'passes: loop {
            let candidates: Vec<_> = self
                .registry
                .candidates(operation)
                .into_iter()
                .filter(|p| !excluded.contains(p.name()))
                .collect();

            if candidates.is_empty() {
                break;
            }

            for provider in candidates {
                if attempt >= max_attempts {
                    break 'passes;
                }
                attempt += 1;

                let delay = self
                    .retry
                    .delay_after(attempt, failures.last().map(|f| &f.error));
                if !delay.is_zero() {
                    debug!("Backing off {:?} before attempt {}", delay, attempt);
                    tokio::time::sleep(delay).await;
                }

                let name = provider.name().to_string();
                debug!(
                    "Attempt {}/{} for {} via {}",
                    attempt, max_attempts, operation, name
                );

                let timeout = self.retry.attempt_timeout;
                let outcome =
                    match tokio::time::timeout(timeout, provider.call(operation, spec, timeout))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ProviderError::Timeout(timeout.as_millis() as u64)),
                    };

                match outcome {
                    Ok(value) => {
                        self.registry.report_outcome(&name, true);
                        if self.cache_policy.enabled {
                            self.cache.put(
                                key.as_str(),
                                value.clone(),
                                self.cache_policy.ttl_for(operation),
                            );
                        }
                        info!(
                            "Operation {} completed by {} on attempt {}",
                            operation, name, attempt
                        );
                        return Ok(value);
                    }
                    Err(error) => {
                        self.registry.report_outcome(&name, false);
                        if is_retryable(&error) {
                            warn!(
                                "Provider {} failed {} (attempt {}/{}): {}",
                                name, operation, attempt, max_attempts, error
                            );
                        } else {
                            warn!(
                                "Provider {} cannot serve {}: {}; skipping it",
                                name, operation, error
                            );
                            excluded.insert(name.clone());
                        }
                        failures.push(ProviderFailure {
                            provider: name,
                            attempt,
                            error,
                        });
                    }
                }
            }
        }

        if failures.is_empty() {
            warn!("No provider supports {}", operation);
            return Err(CoordinatorError::NoProviders(operation.to_string()));
        }

        Err(CoordinatorError::AllProvidersExhausted {
            operation: operation.to_string(),
            failures,
        })
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
