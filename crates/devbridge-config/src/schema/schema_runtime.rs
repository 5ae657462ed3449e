//! Coordinator, cache, provider, session and logging configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::default_true;

/// Request coordinator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Time budget of a single provider attempt.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Maximum provider calls per `execute`, across all passes.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Per-operation cache ttl overrides.
    #[serde(default)]
    pub ttl_secs: HashMap<String, u64>,
}

impl CoordinatorConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Cache ttl for `operation`.
    pub fn ttl_for(&self, operation: &str) -> Duration {
        let secs = self
            .ttl_secs
            .get(operation)
            .copied()
            .unwrap_or(self.default_ttl_secs);
        Duration::from_secs(secs)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout_ms(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            default_ttl_secs: default_ttl_secs(),
            ttl_secs: HashMap::new(),
        }
    }
}

fn default_attempt_timeout_ms() -> u64 {
    20_000
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_ttl_secs() -> u64 {
    300
}

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_sweep_secs")]
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sweep_interval_secs: default_cache_sweep_secs(),
        }
    }
}

fn default_cache_sweep_secs() -> u64 {
    60
}

/// Provider registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Consecutive failures after which a provider is unavailable.
    #[serde(default = "default_unavailable_threshold")]
    pub unavailable_threshold: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            unavailable_threshold: default_unavailable_threshold(),
        }
    }
}

fn default_unavailable_threshold() -> u32 {
    3
}

/// How a provider is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// External HTTP endpoint.
    #[default]
    Http,
    /// Forwarded to the peer over the message bridge.
    Bridge,
}

/// Provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Lower ranks are tried first.
    #[serde(default)]
    pub priority: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Bridge action used by `bridge` providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Operations this provider handles. Empty means all.
    #[serde(default)]
    pub operations: Vec<String>,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_id")]
    pub id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id: default_session_id(),
        }
    }
}

fn default_session_id() -> String {
    "default".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory. Defaults to `~/.devbridge/logs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".devbridge").join("logs"))
                .unwrap_or_else(|| PathBuf::from(".devbridge/logs"))
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
