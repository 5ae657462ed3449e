//! Well-known action names.
//!
//! Actions prefixed with `bridge.` are synthesized locally by the bridge and
//! never travel over the wire.

/// Raised locally when a transport (re)connects.
pub const CONNECTED: &str = "bridge.connected";

/// Raised locally when a transport drops.
pub const DISCONNECTED: &str = "bridge.disconnected";

/// Session field delta broadcast.
pub const SESSION_DELTA: &str = "session.delta";

/// Provider call forwarded to the peer.
pub const AI_CALL: &str = "ai.call";

/// Full coordinated AI operation (cache, fallback, retry).
pub const AI_EXECUTE: &str = "ai.execute";

/// Liveness probe.
pub const PING: &str = "ping";

/// Cache, registry and bridge status.
pub const STATUS: &str = "status";

/// Drop cached responses for an operation.
pub const CACHE_INVALIDATE: &str = "cache.invalidate";

/// Returns true for actions the bridge raises itself.
pub fn is_local_only(action: &str) -> bool {
    action.starts_with("bridge.")
}
