//! Attempt budget and backoff schedule for the coordinator.

use std::time::Duration;

use devbridge_core::backoff_delay;
use devbridge_protocols::ProviderError;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts across all passes over the candidate list.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Bound on one provider call.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(20),
        }
    }
}

impl RetryConfig {
    /// Delay before the 1-based `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.base_delay, self.max_delay)
    }

    /// Delay before `attempt` given the error of the previous one.
    ///
    /// A rate-limit hint stretches the delay, still capped by `max_delay`.
    pub fn delay_after(&self, attempt: u32, previous: Option<&ProviderError>) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        match previous {
            Some(ProviderError::RateLimited {
                retry_after_seconds,
            }) if *retry_after_seconds > 0 => delay
                .max(Duration::from_secs(*retry_after_seconds))
                .min(self.max_delay),
            _ => delay,
        }
    }
}

/// Check if an error is worth another attempt.
pub fn is_retryable(error: &ProviderError) -> bool {
    error.is_transient()
}
