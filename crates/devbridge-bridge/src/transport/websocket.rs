//! WebSocket server transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use devbridge_protocols::{Transport, TransportError, TransportEvent, TransportSink};

use super::sink::SinkSlot;

struct Peer {
    id: u64,
    outbound: mpsc::Sender<String>,
    close: CancellationToken,
}

struct WsState {
    id: String,
    sink: SinkSlot,
    peer: Mutex<Option<Peer>>,
    next_peer: AtomicU64,
}

impl WsState {
    fn is_connected(&self) -> bool {
        self.peer.lock().is_some()
    }
}

struct ServerHandle {
    shutdown: CancellationToken,
    addr: SocketAddr,
}

/// WebSocket server carrying one message per text frame.
///
/// Only one peer is served at a time; a newly connecting peer replaces the
/// current one, which is reported as a disconnect followed by a connect.
pub struct WebSocketTransport {
    host: String,
    port: u16,
    path: String,
    state: Arc<WsState>,
    server: Mutex<Option<ServerHandle>>,
}

impl WebSocketTransport {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            state: Arc::new(WsState {
                id: format!("websocket-{}:{}", host, port),
                sink: SinkSlot::default(),
                peer: Mutex::new(None),
                next_peer: AtomicU64::new(1),
            }),
            host,
            port,
            path: path.into(),
            server: Mutex::new(None),
        }
    }

    /// Address the server is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(|s| s.addr)
    }

    pub fn is_listening(&self) -> bool {
        self.server.lock().is_some()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn id(&self) -> &str {
        &self.state.id
    }

    /// Start listening. The transport counts as connected once a peer
    /// attaches.
    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_listening() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to bind {}: {}", addr, e)))?;
        let local = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let router = create_router(self.state.clone(), &self.path);
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!("WebSocket server error: {}", e);
            }
        });

        *self.server.lock() = Some(ServerHandle {
            shutdown,
            addr: local,
        });
        info!("WebSocket transport listening on ws://{}{}", local, self.path);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(server) = self.server.lock().take() {
            server.shutdown.cancel();
        }

        let peer = self.state.peer.lock().take();
        if let Some(peer) = peer {
            peer.close.cancel();
            self.state.sink.emit(TransportEvent::Disconnected {
                reason: "disconnected locally".to_string(),
            });
        }
        debug!("WebSocket transport stopped");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    fn on_message(&self, sink: TransportSink) {
        self.state.sink.set(sink);
    }

    async fn write(&self, frame: Bytes) -> Result<(), TransportError> {
        let text = String::from_utf8(frame.to_vec())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let outbound = self
            .state
            .peer
            .lock()
            .as_ref()
            .map(|p| p.outbound.clone())
            .ok_or(TransportError::NotConnected)?;
        outbound.send(text).await.map_err(|_| TransportError::Closed)
    }
}

fn create_router(state: Arc<WsState>, path: &str) -> Router {
    Router::new()
        .route(path, get(ws_handler))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn health_check(State(state): State<Arc<WsState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "transport": state.id,
        "connected": state.is_connected(),
    }))
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let peer_id = state.next_peer.fetch_add(1, Ordering::SeqCst);
    let (outbound, mut outbound_rx) = mpsc::channel::<String>(64);
    let close = CancellationToken::new();

    let previous = state.peer.lock().replace(Peer {
        id: peer_id,
        outbound,
        close: close.clone(),
    });
    if let Some(previous) = previous {
        info!("Peer {} replaced by peer {}", previous.id, peer_id);
        previous.close.cancel();
        state.sink.emit(TransportEvent::Disconnected {
            reason: "replaced by a newer peer".to_string(),
        });
    }
    state.sink.emit(TransportEvent::Connected);
    info!("WebSocket peer {} connected", peer_id);

    let (mut ws_tx, mut ws_rx) = socket.split();

    let reason = loop {
        tokio::select! {
            _ = close.cancelled() => break None,

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break Some(format!("send failed: {}", e));
                }
            }

            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    state.sink.emit(TransportEvent::Frame(Bytes::copy_from_slice(
                        text.as_str().as_bytes(),
                    )));
                }
                Some(Ok(Message::Binary(data))) => {
                    state.sink.emit(TransportEvent::Frame(data));
                }
                Some(Ok(Message::Close(_))) | None => {
                    break Some("peer closed the connection".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(format!("websocket error: {}", e)),
            }
        }
    };

    if let Err(e) = ws_tx.close().await {
        debug!("Closing peer {} socket: {}", peer_id, e);
    }

    // A replaced or locally closed peer has already been reported.
    let was_current = {
        let mut current = state.peer.lock();
        if current.as_ref().map(|p| p.id) == Some(peer_id) {
            current.take();
            true
        } else {
            false
        }
    };
    if was_current {
        let reason = reason.unwrap_or_else(|| "closed".to_string());
        warn!("WebSocket peer {} disconnected: {}", peer_id, reason);
        state.sink.emit(TransportEvent::Disconnected { reason });
    }
}

#[cfg(test)]
#[path = "websocket_tests.rs"]
mod tests;
