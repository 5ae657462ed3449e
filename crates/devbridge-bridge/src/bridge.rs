//! Message bridge.
//!
//! Inbound traffic is consumed by a single loop per attached transport.
//! Responses settle their correlation entry inline; requests and events are
//! handed to spawned tasks so a slow handler never holds up dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use devbridge_core::{CorrelationStore, PendingHandle};
use devbridge_protocols::actions;
use devbridge_protocols::{
    BridgeError, BridgeMessage, MessageKind, Origin, RemoteFault, ResponseEnvelope, Transport,
    TransportEvent,
};

use crate::codec;
use crate::handler::MessageHandler;

#[derive(Clone)]
struct Subscription {
    id: u64,
    handler: Arc<dyn MessageHandler>,
}

/// Returned by [`MessageBridge::subscribe`].
#[derive(Debug)]
pub struct SubscriptionHandle {
    action: String,
    id: u64,
    bridge: Weak<MessageBridge>,
}

impl SubscriptionHandle {
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Remove the handler. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.bridge.upgrade() {
            Some(bridge) => bridge.unsubscribe(&self.action, self.id),
            None => false,
        }
    }
}

/// Request/response and event layer over a [`Transport`].
pub struct MessageBridge {
    origin: Origin,
    store: Arc<CorrelationStore>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    next_subscription: AtomicU64,
    attachment: Mutex<Option<CancellationToken>>,
    disconnect_requested: AtomicBool,
}

impl std::fmt::Debug for MessageBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBridge")
            .field("origin", &self.origin)
            .field("pending", &self.store.len())
            .finish()
    }
}

impl MessageBridge {
    pub fn new(origin: Origin, request_timeout: Duration) -> Self {
        Self::with_store(origin, Arc::new(CorrelationStore::new(request_timeout)))
    }

    pub fn with_store(origin: Origin, store: Arc<CorrelationStore>) -> Self {
        Self {
            origin,
            store,
            transport: RwLock::new(None),
            subscriptions: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            attachment: Mutex::new(None),
            disconnect_requested: AtomicBool::new(false),
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// Make `transport` the active channel and start consuming its events.
    ///
    /// Replaces any previously attached transport.
    pub fn attach(self: &Arc<Self>, transport: Arc<dyn Transport>) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.on_message(tx);

        let token = CancellationToken::new();
        if let Some(previous) = self.attachment.lock().replace(token.clone()) {
            previous.cancel();
        }
        info!("Attached transport {}", transport.id());
        *self.transport.write() = Some(transport);

        tokio::spawn(run_inbound(Arc::downgrade(self), rx, token))
    }

    /// Open the attached transport.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        let transport = self.attached()?;
        transport
            .connect()
            .await
            .map_err(|e| BridgeError::ChannelUnavailable(e.to_string()))
    }

    /// Close the attached transport. Pending requests fail with
    /// `ChannelUnavailable` once the transport reports the disconnect.
    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        let transport = self.attached()?;
        self.disconnect_requested.store(true, Ordering::SeqCst);
        transport
            .disconnect()
            .await
            .map_err(|e| BridgeError::ChannelUnavailable(e.to_string()))
    }

    /// Stop consuming transport events and fail everything pending.
    pub fn shutdown(&self) {
        if let Some(token) = self.attachment.lock().take() {
            token.cancel();
        }
        let failed = self
            .store
            .fail_all(BridgeError::ChannelUnavailable("bridge shut down".to_string()));
        debug!("Bridge shut down, {} pending requests failed", failed);
    }

    pub fn is_connected(&self) -> bool {
        self.transport
            .read()
            .as_ref()
            .is_some_and(|t| t.is_connected())
    }

    pub fn pending_count(&self) -> usize {
        self.store.len()
    }

    /// Send a request and wait for the peer's response.
    pub async fn send(&self, action: &str, payload: Value) -> Result<Value, BridgeError> {
        self.send_with_timeout(action, payload, self.store.default_timeout())
            .await
    }

    pub async fn send_with_timeout(
        &self,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        self.start_request(action, payload, timeout).await?.wait().await
    }

    /// Write a request and return its pending handle without waiting.
    ///
    /// The handle's id can be passed to [`cancel`](Self::cancel).
    pub async fn start_request(
        &self,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<PendingHandle, BridgeError> {
        let transport = self.active()?;
        let (id, handle) = self.store.register_with_timeout(action, timeout);
        let message = BridgeMessage::request(id.clone(), action, payload, self.origin);
        let frame = codec::encode(&message)?;

        debug!("-> request {} ({})", id, action);
        if let Err(e) = transport.write(frame).await {
            warn!("Failed to write request {} ({}): {}", id, action, e);
            self.store
                .reject(&id, BridgeError::ChannelUnavailable(e.to_string()));
        }
        Ok(handle)
    }

    /// Reject a pending request with `Cancelled`. The peer is not told.
    pub fn cancel(&self, id: &str) -> bool {
        self.store.cancel(id)
    }

    /// Fire-and-forget event.
    pub async fn emit(&self, action: &str, payload: Value) -> Result<(), BridgeError> {
        let message = BridgeMessage::event(action, payload, self.origin);
        debug!("-> event {} ({})", message.id, action);
        self.write_message(&message).await
    }

    /// Register `handler` for inbound requests and events of `action`.
    ///
    /// Handlers of one action run in registration order. For a request, the
    /// first handler's result becomes the response.
    pub fn subscribe(
        self: &Arc<Self>,
        action: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> SubscriptionHandle {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .write()
            .entry(action.to_string())
            .or_default()
            .push(Subscription { id, handler });
        trace!("Subscribed handler {} to {}", id, action);

        SubscriptionHandle {
            action: action.to_string(),
            id,
            bridge: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, action: &str, id: u64) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let Some(list) = subscriptions.get_mut(action) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() < before;
        if list.is_empty() {
            subscriptions.remove(action);
        }
        removed
    }

    pub fn handler_count(&self, action: &str) -> usize {
        self.subscriptions.read().get(action).map_or(0, Vec::len)
    }

    fn handlers_for(&self, action: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.subscriptions
            .read()
            .get(action)
            .map(|list| list.iter().map(|s| s.handler.clone()).collect())
            .unwrap_or_default()
    }

    fn attached(&self) -> Result<Arc<dyn Transport>, BridgeError> {
        self.transport
            .read()
            .clone()
            .ok_or_else(|| BridgeError::ChannelUnavailable("no transport attached".to_string()))
    }

    fn active(&self) -> Result<Arc<dyn Transport>, BridgeError> {
        let transport = self.attached()?;
        if !transport.is_connected() {
            return Err(BridgeError::ChannelUnavailable(format!(
                "transport {} is not connected",
                transport.id()
            )));
        }
        Ok(transport)
    }

    async fn write_message(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let transport = self.active()?;
        let frame = codec::encode(message)?;
        transport
            .write(frame)
            .await
            .map_err(|e| BridgeError::ChannelUnavailable(e.to_string()))
    }

    fn on_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => match codec::decode(&frame) {
                Ok(message) => self.dispatch(message),
                Err(e) => warn!("Dropping malformed frame: {}", e),
            },
            TransportEvent::Connected => {
                info!("Bridge connected");
                self.notify_local(actions::CONNECTED, json!({}));
            }
            TransportEvent::Disconnected { reason } => {
                let failed = self
                    .store
                    .fail_all(BridgeError::ChannelUnavailable(reason.clone()));
                let requested = self.disconnect_requested.swap(false, Ordering::SeqCst);
                info!(
                    "Bridge disconnected ({}), {} pending requests failed",
                    reason, failed
                );
                self.notify_local(
                    actions::DISCONNECTED,
                    json!({ "reason": reason, "requested": requested, "failed": failed }),
                );
            }
        }
    }

    fn dispatch(self: &Arc<Self>, message: BridgeMessage) {
        trace!(
            "<- {:?} {} ({}) from {}",
            message.kind,
            message.id,
            message.action,
            message.origin
        );

        match message.kind {
            MessageKind::Response => self.settle_response(message),
            MessageKind::Request if actions::is_local_only(&message.action) => {
                warn!("Refusing peer request for reserved action {}", message.action);
                let envelope =
                    ResponseEnvelope::failure(RemoteFault::unsupported_action(&message.action));
                let bridge = Arc::clone(self);
                tokio::spawn(async move { bridge.reply(&message, envelope).await });
            }
            MessageKind::Event if actions::is_local_only(&message.action) => {
                warn!("Ignoring peer event for reserved action {}", message.action);
            }
            MessageKind::Request => {
                let bridge = Arc::clone(self);
                tokio::spawn(async move { bridge.answer(message).await });
            }
            MessageKind::Event => self.fan_out(message),
        }
    }

    fn settle_response(&self, message: BridgeMessage) {
        let settled = match message.envelope() {
            Ok(envelope) => match envelope.into_result() {
                Ok(value) => self.store.resolve(&message.id, value),
                Err(fault) => self
                    .store
                    .reject(&message.id, BridgeError::from_fault(&message.action, fault)),
            },
            Err(e) => self.store.reject(
                &message.id,
                BridgeError::Codec(format!("malformed response envelope: {}", e)),
            ),
        };

        if !settled {
            warn!(
                "Dropping response {} ({}): no pending request",
                message.id, message.action
            );
        }
    }

    async fn answer(self: Arc<Self>, request: BridgeMessage) {
        let handlers = self.handlers_for(&request.action);

        let envelope = match handlers.split_first() {
            None => {
                debug!("No handler for request {} ({})", request.id, request.action);
                ResponseEnvelope::failure(RemoteFault::unsupported_action(&request.action))
            }
            Some((first, rest)) => {
                let reply = first.handle(&request).await;
                for handler in rest {
                    if let Err(fault) = handler.handle(&request).await {
                        debug!("Secondary handler for {} failed: {}", request.action, fault);
                    }
                }
                match reply {
                    Ok(result) => ResponseEnvelope::success(result),
                    Err(fault) => ResponseEnvelope::failure(fault),
                }
            }
        };

        self.reply(&request, envelope).await;
    }

    async fn reply(&self, request: &BridgeMessage, envelope: ResponseEnvelope) {
        let response = BridgeMessage::response_to(request, envelope, self.origin);
        if let Err(e) = self.write_message(&response).await {
            warn!(
                "Failed to answer request {} ({}): {}",
                request.id, request.action, e
            );
        }
    }

    fn fan_out(&self, event: BridgeMessage) {
        let handlers = self.handlers_for(&event.action);
        if handlers.is_empty() {
            trace!("No subscribers for event {}", event.action);
            return;
        }

        tokio::spawn(async move {
            for handler in handlers {
                if let Err(fault) = handler.handle(&event).await {
                    warn!("Handler for event {} failed: {}", event.action, fault);
                }
            }
        });
    }

    /// Deliver a bridge-originated event to local subscribers only.
    fn notify_local(&self, action: &str, payload: Value) {
        self.fan_out(BridgeMessage::event(action, payload, self.origin));
    }
}

async fn run_inbound(
    bridge: Weak<MessageBridge>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(bridge) = bridge.upgrade() else {
            break;
        };
        bridge.on_transport_event(event);
    }
    debug!("Inbound loop stopped");
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
