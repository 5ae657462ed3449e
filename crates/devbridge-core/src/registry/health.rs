//! Provider health state machine.

use serde::{Deserialize, Serialize};

/// Health of a provider as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHealth {
    Healthy,
    Degraded,
    Unavailable,
}

impl ProviderHealth {
    /// Rank used when ordering candidates. Lower is preferred.
    pub(crate) fn rank(self) -> u8 {
        match self {
            ProviderHealth::Healthy => 0,
            ProviderHealth::Degraded => 1,
            ProviderHealth::Unavailable => 2,
        }
    }
}

/// Registry view of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    /// Lower values are tried first.
    pub priority: u32,
    pub health: ProviderHealth,
    pub consecutive_failures: u32,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            health: ProviderHealth::Healthy,
            consecutive_failures: 0,
        }
    }

    /// Apply one reported outcome.
    ///
    /// Success always returns to healthy. A failure degrades a healthy
    /// provider and makes it unavailable once `threshold` consecutive
    /// failures have accumulated.
    pub fn record(&mut self, success: bool, threshold: u32) {
        if success {
            self.health = ProviderHealth::Healthy;
            self.consecutive_failures = 0;
            return;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.health = if self.consecutive_failures >= threshold.max(1) {
            ProviderHealth::Unavailable
        } else {
            ProviderHealth::Degraded
        };
    }
}
