//! Coordinator driving providers on the far side of a bridge.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use devbridge_bridge::{handler_fn, MemoryTransport, MessageBridge};
use devbridge_core::{ProviderHealth, ProviderRegistry, ResponseCache};
use devbridge_protocols::{actions, Origin, ProviderError, RemoteFault, RequestSpec};
use devbridge_runtime::{
    BridgeProvider, CachePolicy, CoordinatorError, HttpProvider, RequestCoordinator, RetryConfig,
};

const WAIT: Duration = Duration::from_secs(5);

async fn linked_pair() -> (Arc<MessageBridge>, Arc<MessageBridge>) {
    let (left, right) = MemoryTransport::pair();
    let browser = Arc::new(MessageBridge::new(Origin::Local, WAIT));
    let backend = Arc::new(MessageBridge::new(Origin::Remote, WAIT));
    browser.attach(Arc::new(left));
    backend.attach(Arc::new(right));
    browser.connect().await.unwrap();
    (browser, backend)
}

fn retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        attempt_timeout: Duration::from_secs(2),
    }
}

fn coordinator(registry: Arc<ProviderRegistry>, max_attempts: u32) -> RequestCoordinator {
    RequestCoordinator::new(
        registry,
        Arc::new(ResponseCache::new()),
        retry(max_attempts),
        CachePolicy::default(),
    )
}

#[tokio::test]
async fn test_execute_through_bridge_provider() {
    let (browser, backend) = linked_pair().await;
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    browser.subscribe(
        actions::AI_CALL,
        handler_fn(move |message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let op = message.payload["operation"].as_str().unwrap_or_default().to_string();
                let prompt = message.payload["prompt"].as_str().unwrap_or_default().to_string();
                Ok(json!({ "operation": op, "code": format!("// {}", prompt) }))
            }
        }),
    );

    let registry = Arc::new(ProviderRegistry::new(3));
    registry
        .register(Arc::new(BridgeProvider::new("browser", backend.clone())), 0)
        .unwrap();
    let coord = coordinator(registry, 3);
    let spec = RequestSpec::new("sum a list").with_context("language", "rust");

    let value = coord.execute("generateCode", &spec).await.unwrap();
    assert_eq!(value["operation"], "generateCode");
    assert_eq!(value["code"], "// sum a list");

    // Second call is served from cache.
    coord.execute("generateCode", &spec).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.pending_count(), 0);
}

#[tokio::test]
async fn test_unsupported_peer_falls_back_to_http() {
    let (_browser, backend) = linked_pair().await;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "from http"})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = Arc::new(ProviderRegistry::new(3));
    registry
        .register(Arc::new(BridgeProvider::new("browser", backend)), 0)
        .unwrap();
    registry
        .register(Arc::new(HttpProvider::new("cloud", server.uri())), 1)
        .unwrap();
    let coord = coordinator(registry.clone(), 4);

    let value = coord
        .execute("explainCode", &RequestSpec::new("what is this"))
        .await
        .unwrap();
    assert_eq!(value, json!("from http"));
    assert_eq!(
        registry.descriptor("browser").unwrap().health,
        ProviderHealth::Degraded
    );
}

#[tokio::test]
async fn test_remote_fault_is_retried() {
    let (browser, backend) = linked_pair().await;
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    browser.subscribe(
        actions::AI_CALL,
        handler_fn(move |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RemoteFault::new("MODEL_BUSY", "try again"))
                } else {
                    Ok(json!("second time lucky"))
                }
            }
        }),
    );

    let registry = Arc::new(ProviderRegistry::new(3));
    registry
        .register(Arc::new(BridgeProvider::new("browser", backend)), 0)
        .unwrap();
    let coord = coordinator(registry, 3);

    let value = coord
        .execute("generateCode", &RequestSpec::new("x"))
        .await
        .unwrap();
    assert_eq!(value, json!("second time lucky"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_disconnected_peer_exhausts() {
    let (browser, backend) = linked_pair().await;
    browser.disconnect().await.unwrap();

    let registry = Arc::new(ProviderRegistry::new(3));
    registry
        .register(Arc::new(BridgeProvider::new("browser", backend)), 0)
        .unwrap();
    let coord = coordinator(registry.clone(), 3);

    let err = coord
        .execute("generateCode", &RequestSpec::new("x"))
        .await
        .unwrap_err();
    match err {
        CoordinatorError::AllProvidersExhausted { failures, .. } => {
            assert_eq!(failures.len(), 3);
            assert!(failures
                .iter()
                .all(|f| matches!(f.error, ProviderError::Network(_))));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(
        registry.descriptor("browser").unwrap().health,
        ProviderHealth::Unavailable
    );
}

#[tokio::test]
async fn test_cancel_releases_pending_request() {
    let (browser, backend) = linked_pair().await;
    browser.subscribe(
        actions::AI_CALL,
        handler_fn(|_| async {
            std::future::pending::<()>().await;
            Ok(json!(null))
        }),
    );

    let registry = Arc::new(ProviderRegistry::new(3));
    registry
        .register(Arc::new(BridgeProvider::new("browser", backend.clone())), 0)
        .unwrap();
    let coord = coordinator(registry, 1);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let watched = backend.clone();
    tokio::spawn(async move {
        while watched.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        trigger.cancel();
    });

    let started = Instant::now();
    let err = coord
        .execute_with_cancel("generateCode", &RequestSpec::new("x"), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, CoordinatorError::Cancelled("generateCode".into()));
    assert_eq!(backend.pending_count(), 0);
    assert!(started.elapsed() < Duration::from_secs(1));
}
