//! Provider registry and health tracking.

mod health;
mod provider;

pub use health::{ProviderDescriptor, ProviderHealth};
pub use provider::ProviderRegistry;
