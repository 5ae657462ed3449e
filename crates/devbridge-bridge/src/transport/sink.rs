//! Registered receiver of transport events.

use parking_lot::Mutex;

use devbridge_protocols::{TransportEvent, TransportSink};

#[derive(Default)]
pub(crate) struct SinkSlot(Mutex<Option<TransportSink>>);

impl SinkSlot {
    pub(crate) fn set(&self, sink: TransportSink) {
        *self.0.lock() = Some(sink);
    }

    /// Deliver `event`. Returns false when nobody is listening.
    pub(crate) fn emit(&self, event: TransportEvent) -> bool {
        match self.0.lock().as_ref() {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }
}
