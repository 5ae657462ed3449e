//! Registry of AI providers.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use devbridge_protocols::AiProvider;

use super::health::{ProviderDescriptor, ProviderHealth};
use crate::error::RegistryError;

struct Registered {
    provider: Arc<dyn AiProvider>,
    descriptor: ProviderDescriptor,
}

/// Registry for AI providers and their health.
///
/// Health is only changed through [`report_outcome`](Self::report_outcome),
/// which the request coordinator calls after every attempt.
pub struct ProviderRegistry {
    providers: DashMap<String, Registered>,
    unavailable_threshold: u32,
}

impl ProviderRegistry {
    /// Create a registry that marks a provider unavailable after
    /// `unavailable_threshold` consecutive failures.
    pub fn new(unavailable_threshold: u32) -> Self {
        Self {
            providers: DashMap::new(),
            unavailable_threshold: unavailable_threshold.max(1),
        }
    }

    pub fn unavailable_threshold(&self) -> u32 {
        self.unavailable_threshold
    }

    /// Register a provider with a priority rank (lower is preferred).
    pub fn register(
        &self,
        provider: Arc<dyn AiProvider>,
        priority: u32,
    ) -> Result<(), RegistryError> {
        let name = provider.name().to_string();

        if self.providers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }

        info!("Registered provider {} (priority {})", name, priority);
        self.providers.insert(
            name.clone(),
            Registered {
                provider,
                descriptor: ProviderDescriptor::new(name, priority),
            },
        );
        Ok(())
    }

    /// Unregister a provider.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.providers
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        Ok(())
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn AiProvider>> {
        self.providers.get(name).map(|r| r.provider.clone())
    }

    pub fn descriptor(&self, name: &str) -> Option<ProviderDescriptor> {
        self.providers.get(name).map(|r| r.descriptor.clone())
    }

    /// List all provider names.
    pub fn list_ids(&self) -> Vec<String> {
        self.providers.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers able to perform `operation`, in the order they should be
    /// tried: healthy by priority, then degraded by priority. Unavailable
    /// providers are left out unless nothing else remains, in which case
    /// every supporting provider is returned by priority.
    pub fn candidates(&self, operation: &str) -> Vec<Arc<dyn AiProvider>> {
        let mut supporting: Vec<(ProviderDescriptor, Arc<dyn AiProvider>)> = self
            .providers
            .iter()
            .filter(|r| r.provider.supports(operation))
            .map(|r| (r.descriptor.clone(), r.provider.clone()))
            .collect();

        let all_unavailable = supporting
            .iter()
            .all(|(d, _)| d.health == ProviderHealth::Unavailable);

        if all_unavailable {
            if !supporting.is_empty() {
                debug!(
                    "All providers for {} are unavailable, trying them anyway",
                    operation
                );
            }
            supporting.sort_by(|(a, _), (b, _)| {
                a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name))
            });
        } else {
            supporting.retain(|(d, _)| d.health != ProviderHealth::Unavailable);
            supporting.sort_by(|(a, _), (b, _)| {
                a.health
                    .rank()
                    .cmp(&b.health.rank())
                    .then_with(|| a.priority.cmp(&b.priority))
                    .then_with(|| a.name.cmp(&b.name))
            });
        }

        supporting.into_iter().map(|(_, p)| p).collect()
    }

    /// Record the outcome of an attempt. Returns the new health, or `None`
    /// if the provider is not registered.
    pub fn report_outcome(&self, name: &str, success: bool) -> Option<ProviderHealth> {
        let mut entry = self.providers.get_mut(name)?;
        let before = entry.descriptor.health;
        entry.descriptor.record(success, self.unavailable_threshold);
        let after = entry.descriptor.health;

        if before != after {
            match after {
                ProviderHealth::Unavailable => warn!(
                    "Provider {} is unavailable after {} consecutive failures",
                    name, entry.descriptor.consecutive_failures
                ),
                _ => info!("Provider {} health {:?} -> {:?}", name, before, after),
            }
        }
        Some(after)
    }

    /// Descriptors of every provider, by priority.
    pub fn snapshot(&self) -> Vec<ProviderDescriptor> {
        let mut all: Vec<ProviderDescriptor> =
            self.providers.iter().map(|r| r.descriptor.clone()).collect();
        all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        all
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
