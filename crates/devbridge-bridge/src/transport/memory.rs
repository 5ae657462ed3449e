//! In-process transport pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use devbridge_protocols::{Transport, TransportError, TransportEvent, TransportSink};

use super::sink::SinkSlot;

struct Link {
    connected: AtomicBool,
    ends: [SinkSlot; 2],
}

/// One end of an in-process duplex channel.
///
/// Both ends share a single connection state: connecting or disconnecting
/// either end does so for both, and both observe the event.
pub struct MemoryTransport {
    id: String,
    side: usize,
    link: Arc<Link>,
}

impl MemoryTransport {
    /// Create two connected-on-demand ends.
    pub fn pair() -> (Self, Self) {
        let link = Arc::new(Link {
            connected: AtomicBool::new(false),
            ends: [SinkSlot::default(), SinkSlot::default()],
        });
        (
            Self {
                id: "memory-a".to_string(),
                side: 0,
                link: link.clone(),
            },
            Self {
                id: "memory-b".to_string(),
                side: 1,
                link,
            },
        )
    }

    fn broadcast(&self, event: TransportEvent) {
        for end in &self.link.ends {
            end.emit(event.clone());
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if !self.link.connected.swap(true, Ordering::SeqCst) {
            debug!("{} connected", self.id);
            self.broadcast(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.link.connected.swap(false, Ordering::SeqCst) {
            debug!("{} disconnected", self.id);
            self.broadcast(TransportEvent::Disconnected {
                reason: format!("{} disconnected", self.id),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }

    fn on_message(&self, sink: TransportSink) {
        self.link.ends[self.side].set(sink);
    }

    async fn write(&self, frame: Bytes) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let peer = &self.link.ends[1 - self.side];
        if peer.emit(TransportEvent::Frame(frame)) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}
