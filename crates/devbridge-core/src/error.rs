//! Core error types.

use thiserror::Error;

/// Provider registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Provider already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Provider not found: {0}")]
    NotFound(String),
}

/// Cache validation failures. Only ever logged; a failed entry reads as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache entry '{fingerprint}' is corrupt: {reason}")]
    Corrupt { fingerprint: String, reason: String },
}
