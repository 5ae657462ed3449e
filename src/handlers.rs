//! Built-in request handlers served over the bridge.

use std::sync::{Arc, Weak};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use devbridge_bridge::{handler_fn, MessageBridge, SubscriptionHandle};
use devbridge_protocols::{actions, RemoteFault, RequestSpec};
use devbridge_runtime::{CoordinatorError, RequestCoordinator, SessionSynchronizer};

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    operation: String,
    #[serde(flatten)]
    spec: RequestSpec,
}

#[derive(Debug, Default, Deserialize)]
struct InvalidateRequest {
    operation: Option<String>,
}

fn coordinator_fault(error: CoordinatorError) -> RemoteFault {
    match &error {
        CoordinatorError::NoProviders(_) => RemoteFault::new("NO_PROVIDERS", error.to_string()),
        CoordinatorError::Cancelled(_) => RemoteFault::new("CANCELLED", error.to_string()),
        CoordinatorError::AllProvidersExhausted {
            operation,
            failures,
        } => {
            let failures: Vec<Value> = failures
                .iter()
                .map(|f| {
                    json!({
                        "provider": f.provider,
                        "attempt": f.attempt,
                        "error": f.error.to_string(),
                        "transient": f.error.is_transient(),
                    })
                })
                .collect();
            RemoteFault::new("PROVIDERS_EXHAUSTED", error.to_string())
                .with_data(json!({ "operation": operation, "failures": failures }))
        }
    }
}

/// Subscribe `ping`, `status`, `ai.execute` and `cache.invalidate`.
///
/// Handlers hold weak references to the bridge and the session synchronizer,
/// both of which own the bridge's handler table.
pub(crate) fn register_handlers(
    bridge: &Arc<MessageBridge>,
    coordinator: Arc<RequestCoordinator>,
    sessions: &Arc<SessionSynchronizer>,
) -> Vec<SubscriptionHandle> {
    let mut handles = Vec::new();

    handles.push(bridge.subscribe(
        actions::PING,
        handler_fn(|_| async move {
            Ok(json!({
                "pong": true,
                "timestamp": chrono::Utc::now().timestamp_millis(),
            }))
        }),
    ));

    let status_bridge: Weak<MessageBridge> = Arc::downgrade(bridge);
    let status_sessions: Weak<SessionSynchronizer> = Arc::downgrade(sessions);
    let status_coordinator = coordinator.clone();
    handles.push(bridge.subscribe(
        actions::STATUS,
        handler_fn(move |_| {
            let bridge = status_bridge.upgrade();
            let session = status_sessions.upgrade().map(|s| s.active_session());
            let coordinator = status_coordinator.clone();
            async move {
                Ok(json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "connected": bridge.as_ref().is_some_and(|b| b.is_connected()),
                    "pending": bridge.as_ref().map_or(0, |b| b.pending_count()),
                    "session": session,
                    "cache": coordinator.cache().stats(),
                    "providers": coordinator.registry().snapshot(),
                }))
            }
        }),
    ));

    let execute_coordinator = coordinator.clone();
    handles.push(bridge.subscribe(
        actions::AI_EXECUTE,
        handler_fn(move |message| {
            let coordinator = execute_coordinator.clone();
            async move {
                let request: ExecuteRequest = serde_json::from_value(message.payload)
                    .map_err(|e| RemoteFault::invalid_payload(e.to_string()))?;
                debug!("ai.execute {} ({})", request.operation, message.id);
                coordinator
                    .execute(&request.operation, &request.spec)
                    .await
                    .map_err(coordinator_fault)
            }
        }),
    ));

    handles.push(bridge.subscribe(
        actions::CACHE_INVALIDATE,
        handler_fn(move |message| {
            let coordinator = coordinator.clone();
            async move {
                let request: InvalidateRequest = if message.payload.is_null() {
                    InvalidateRequest::default()
                } else {
                    serde_json::from_value(message.payload)
                        .map_err(|e| RemoteFault::invalid_payload(e.to_string()))?
                };
                let removed = match &request.operation {
                    Some(operation) => coordinator.cache().invalidate_operation(operation),
                    None => coordinator.cache().invalidate(|_, _| true),
                };
                info!(
                    "Invalidated {} cache entries ({})",
                    removed,
                    request.operation.as_deref().unwrap_or("all")
                );
                Ok(json!({ "removed": removed }))
            }
        }),
    ));

    handles
}
