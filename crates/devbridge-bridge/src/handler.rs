//! Inbound message handlers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use devbridge_protocols::{BridgeMessage, RemoteFault};

/// What a handler produces. For requests it becomes the response envelope;
/// for events it is discarded.
pub type HandlerResult = Result<Value, RemoteFault>;

/// Handler for inbound requests and events of one action.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &BridgeMessage) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(BridgeMessage) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, message: &BridgeMessage) -> HandlerResult {
        (self.0)(message.clone()).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(BridgeMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
