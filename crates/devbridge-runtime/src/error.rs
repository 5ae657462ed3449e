//! Coordinator and session errors.

use std::fmt;

use thiserror::Error;

use devbridge_protocols::ProviderError;

/// One failed attempt, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub attempt: u32,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.attempt, self.provider, self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    #[error("No provider supports operation '{0}'")]
    NoProviders(String),

    #[error(
        "All providers exhausted for '{operation}' after {} attempts: {}",
        .failures.len(),
        summarize(.failures)
    )]
    AllProvidersExhausted {
        operation: String,
        failures: Vec<ProviderFailure>,
    },

    #[error("Operation '{0}' cancelled")]
    Cancelled(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Version space of {session_id}.{field} is exhausted")]
    VersionExhausted { session_id: String, field: String },
}

impl CoordinatorError {
    /// Names of the providers that were attempted, in attempt order.
    pub fn attempted_providers(&self) -> Vec<&str> {
        match self {
            CoordinatorError::AllProvidersExhausted { failures, .. } => {
                failures.iter().map(|f| f.provider.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn summarize(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
