//! Provider registration and coordinator settings derived from config.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use devbridge_bridge::MessageBridge;
use devbridge_config::{Config, CoordinatorConfig, ProviderConfig, ProviderKind};
use devbridge_core::ProviderRegistry;
use devbridge_protocols::AiProvider;
use devbridge_runtime::{BridgeProvider, CachePolicy, HttpProvider, RetryConfig};

pub(crate) fn retry_config(config: &CoordinatorConfig) -> RetryConfig {
    RetryConfig {
        max_attempts: config.max_attempts,
        base_delay: config.base_delay(),
        max_delay: config.max_delay(),
        attempt_timeout: config.attempt_timeout(),
    }
}

pub(crate) fn cache_policy(config: &Config) -> CachePolicy {
    CachePolicy {
        enabled: config.cache.enabled,
        default_ttl: Duration::from_secs(config.coordinator.default_ttl_secs),
        ttl_overrides: config
            .coordinator
            .ttl_secs
            .iter()
            .map(|(op, secs)| (op.clone(), Duration::from_secs(*secs)))
            .collect(),
    }
}

/// Build a client for one configured provider.
fn build_provider(
    name: &str,
    config: &ProviderConfig,
    bridge: &Arc<MessageBridge>,
) -> Option<Arc<dyn AiProvider>> {
    match config.kind {
        ProviderKind::Http => {
            let Some(endpoint) = &config.endpoint else {
                warn!("Provider {} has no endpoint, skipping", name);
                return None;
            };
            let mut provider = HttpProvider::new(name, endpoint.clone())
                .with_operations(config.operations.clone());
            if let Some(key) = &config.api_key {
                provider = provider.with_api_key(key.clone());
            }
            Some(Arc::new(provider))
        }
        ProviderKind::Bridge => {
            let mut provider = BridgeProvider::new(name, bridge.clone())
                .with_operations(config.operations.clone());
            if let Some(action) = &config.action {
                provider = provider.with_action(action.clone());
            }
            Some(Arc::new(provider))
        }
    }
}

/// Register every configured provider. Returns how many were registered.
pub(crate) fn register_providers(
    registry: &ProviderRegistry,
    providers: &HashMap<String, ProviderConfig>,
    bridge: &Arc<MessageBridge>,
) -> usize {
    let mut names: Vec<&String> = providers.keys().collect();
    names.sort();

    let mut registered = 0;
    for name in names {
        let config = &providers[name];
        let Some(provider) = build_provider(name, config, bridge) else {
            continue;
        };
        match registry.register(provider, config.priority) {
            Ok(()) => registered += 1,
            Err(e) => warn!("Failed to register provider {}: {}", name, e),
        }
    }

    info!("{} provider(s) registered", registered);
    registered
}
