//! # devbridge Protocols
//!
//! Wire types and capability traits shared by every devbridge crate.
//! Contains only definitions, no implementations.
//!
//! ## Core Traits
//!
//! - [`Transport`] - Duplex channel carrying framed bridge messages
//! - [`AiProvider`] - Client able to perform a logical AI operation
//!
//! ## Wire Types
//!
//! - [`BridgeMessage`] - The `{id, type, action, payload, timestamp, source}` record
//! - [`ResponseEnvelope`] - Payload shape of every `response` message
//! - [`SessionDelta`] - Versioned field update exchanged between sessions

pub mod actions;
pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod transport;

pub use error::{BridgeError, ProviderError, TransportError};
pub use message::{BridgeMessage, MessageId, MessageKind, Origin, RemoteFault, ResponseEnvelope};
pub use provider::{AiProvider, RequestSpec};
pub use session::SessionDelta;
pub use transport::{Transport, TransportEvent, TransportSink};
