//! AI provider errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_seconds} seconds")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote provider error: {0}")]
    Remote(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),
}

impl ProviderError {
    /// Classify an HTTP error response.
    pub fn from_api_response(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ProviderError::AuthenticationFailed(message),
            429 => ProviderError::RateLimited {
                retry_after_seconds: 0,
            },
            400 | 404 | 413 | 422 => ProviderError::InvalidRequest(message),
            _ => ProviderError::ApiError { status, message },
        }
    }

    /// Transient errors may clear on retry; everything else is permanent
    /// and only escalated.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. }
            | ProviderError::Network(_)
            | ProviderError::Remote(_)
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => is_transient_status(*status),
            ProviderError::AuthenticationFailed(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::Unsupported(_) => false,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
