//! # devbridge Core
//!
//! Shared in-process state of one side of the bridge.
//!
//! ## Components
//!
//! - [`CorrelationStore`] - In-flight requests awaiting their response
//! - [`ProviderRegistry`] - Configured AI providers with health state
//! - [`ResponseCache`] - Fingerprint-keyed memo of AI responses
//! - [`backoff_delay`] - Retry schedule shared by the coordinator and reconnects
//! - [`Clock`] - Time source, swappable for a [`ManualClock`] in tests
//!
//! Every structure here is constructed once per process and shared by `Arc`.

pub mod backoff;
pub mod cache;
pub mod clock;
pub mod correlation;
pub mod error;
pub mod registry;

pub use backoff::{backoff_delay, total_backoff};
pub use cache::{fingerprint, CacheStats, Fingerprint, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use correlation::{CorrelationStore, PendingHandle, Settlement};
pub use error::{CacheError, RegistryError};
pub use registry::{ProviderDescriptor, ProviderHealth, ProviderRegistry};
