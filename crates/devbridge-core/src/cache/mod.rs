//! Response cache keyed by request fingerprint.

mod fingerprint;
mod store;

pub use fingerprint::{fingerprint, Fingerprint};
pub use store::{CacheStats, ResponseCache};
