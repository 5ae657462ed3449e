//! # devbridge Runtime
//!
//! Request coordination on top of the bridge and the core registries.
//!
//! - [`RequestCoordinator`] - cache lookup, provider fallback, retry with backoff
//! - [`SessionSynchronizer`] - last-writer-wins session fields shared over the bridge
//! - [`providers`] - [`BridgeProvider`] and [`HttpProvider`] clients

pub mod coordinator;
pub mod error;
pub mod providers;
pub mod retry;
pub mod session;

pub use coordinator::{CachePolicy, RequestCoordinator};
pub use error::{CoordinatorError, ProviderFailure, SessionError};
pub use providers::{BridgeProvider, HttpProvider};
pub use retry::{is_retryable, RetryConfig};
pub use session::{FieldState, SessionRecord, SessionSynchronizer};
