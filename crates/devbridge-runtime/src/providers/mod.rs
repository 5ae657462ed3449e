//! AI provider clients.
//!
//! [`BridgeProvider`] forwards calls to the peer over the message bridge;
//! [`HttpProvider`] posts them to an external HTTP endpoint.

mod bridge_provider;
mod http_provider;

pub use bridge_provider::BridgeProvider;
pub use http_provider::HttpProvider;
