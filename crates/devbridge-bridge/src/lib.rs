//! # devbridge Bridge
//!
//! Turns a duplex [`Transport`](devbridge_protocols::Transport) into awaitable
//! requests and a subscribable event stream.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use devbridge_bridge::{MemoryTransport, MessageBridge};
//!
//! let (left, right) = MemoryTransport::pair();
//! let bridge = Arc::new(MessageBridge::new(Origin::Remote, Duration::from_secs(30)));
//! bridge.attach(Arc::new(left));
//! bridge.connect().await?;
//! let reply = bridge.send("generateCode", json!({"prompt": "..."})).await?;
//! ```

mod bridge;
pub mod codec;
mod handler;
pub mod reconnect;
pub mod transport;

pub use bridge::{MessageBridge, SubscriptionHandle};
pub use handler::{handler_fn, HandlerResult, MessageHandler};
pub use reconnect::{spawn_reconnect, ReconnectPolicy};
pub use transport::{MemoryTransport, NativeTransport, WebSocketTransport, MAX_FRAME_LEN};
