//! Transport adapters.
//!
//! - [`MemoryTransport`] - In-process pair, used for embedding and tests
//! - [`NativeTransport`] - Length-prefixed JSON over stdio or a child process
//! - [`WebSocketTransport`] - WebSocket server accepting a single peer

mod memory;
mod native;
mod sink;
mod websocket;

pub use memory::MemoryTransport;
pub use native::{NativeTransport, MAX_FRAME_LEN};
pub use websocket::WebSocketTransport;
