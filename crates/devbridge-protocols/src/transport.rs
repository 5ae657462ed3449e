//! Transport adapter trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Notifications a transport delivers to its bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The channel is (again) usable.
    Connected,
    /// One complete inbound frame.
    Frame(Bytes),
    /// The channel dropped.
    Disconnected { reason: String },
}

/// Receiving side registered through [`Transport::on_message`].
pub type TransportSink = mpsc::UnboundedSender<TransportEvent>;

/// Capability set of a duplex channel.
///
/// The bridge treats every adapter implementing this trait interchangeably.
/// Frames written on one transport arrive in write order.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the transport ID used in logs.
    fn id(&self) -> &str;

    /// Open the channel. Emits [`TransportEvent::Connected`] on success.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the channel. Emits [`TransportEvent::Disconnected`] if it was open.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Whether frames can currently be written.
    fn is_connected(&self) -> bool;

    /// Register the sink receiving inbound frames and connection changes.
    /// A later registration replaces the earlier one.
    fn on_message(&self, sink: TransportSink);

    /// Write one complete frame.
    async fn write(&self, frame: Bytes) -> Result<(), TransportError>;
}
