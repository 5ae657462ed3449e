//! Error types for the devbridge protocol layer.

mod bridge;
mod provider;
mod transport;

pub use bridge::*;
pub use provider::*;
pub use transport::*;
