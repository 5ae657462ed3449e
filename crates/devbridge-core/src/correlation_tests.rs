use super::*;
use crate::clock::ManualClock;
use serde_json::json;

fn store(timeout_ms: u64) -> Arc<CorrelationStore> {
    Arc::new(CorrelationStore::new(Duration::from_millis(timeout_ms)))
}

#[tokio::test]
async fn test_resolve_delivers_value() {
    let store = store(1_000);
    let (id, handle) = store.register("generateCode");
    assert!(store.contains(&id));
    assert_eq!(handle.id(), id);

    assert!(store.resolve(&id, json!({"code": "fn main() {}"})));
    assert_eq!(handle.wait().await.unwrap(), json!({"code": "fn main() {}"}));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_reject_delivers_error() {
    let store = store(1_000);
    let (id, handle) = store.register("save");
    store.reject(&id, BridgeError::UnsupportedAction("save".to_string()));
    assert_eq!(
        handle.wait().await,
        Err(BridgeError::UnsupportedAction("save".to_string()))
    );
}

#[tokio::test]
async fn test_settle_unknown_id_is_noop() {
    let store = store(1_000);
    assert!(!store.resolve("missing", json!(1)));
    assert!(!store.reject("missing", BridgeError::Cancelled("x".to_string())));
    assert!(!store.expire("missing"));
    assert!(!store.cancel("missing"));
}

#[tokio::test]
async fn test_first_settlement_wins() {
    let store = store(1_000);
    let (id, handle) = store.register("explain");
    assert!(store.resolve(&id, json!("first")));
    assert!(!store.reject(&id, BridgeError::Cancelled("explain".to_string())));
    assert!(!store.expire(&id));
    assert!(!store.resolve(&id, json!("second")));
    assert_eq!(handle.wait().await.unwrap(), json!("first"));
}

#[tokio::test(start_paused = true)]
async fn test_handle_times_out_exactly_once() {
    let store = store(500);
    let (id, handle) = store.register("slow");

    let waiter = tokio::spawn(handle.wait());
    tokio::time::advance(Duration::from_millis(501)).await;
    let result = waiter.await.unwrap();

    assert_eq!(
        result,
        Err(BridgeError::Timeout {
            action: "slow".to_string(),
            timeout_ms: 500
        })
    );
    // Entry is gone; late responses are ignored.
    assert!(!store.contains(&id));
    assert!(!store.resolve(&id, json!("late")));
}

#[tokio::test(start_paused = true)]
async fn test_response_before_deadline_wins_over_timeout() {
    let store = store(500);
    let (id, handle) = store.register("fast");
    tokio::time::advance(Duration::from_millis(499)).await;
    store.resolve(&id, json!("ok"));
    tokio::time::advance(Duration::from_millis(10)).await;
    assert_eq!(handle.wait().await.unwrap(), json!("ok"));
}

#[tokio::test]
async fn test_sweep_expires_due_entries() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(CorrelationStore::with_clock(
        Duration::from_secs(10),
        clock.clone(),
    ));
    let (short_id, short) = store.register_with_timeout("short", Duration::from_secs(1));
    let (long_id, _long) = store.register("long");

    assert_eq!(store.sweep_expired(), 0);
    clock.advance(Duration::from_secs(1));
    assert_eq!(store.sweep_expired(), 1);

    assert!(!store.contains(&short_id));
    assert!(store.contains(&long_id));
    assert!(short.wait().await.unwrap_err().is_timeout());
    // A second sweep does not settle again.
    assert_eq!(store.sweep_expired(), 0);
}

#[tokio::test]
async fn test_fail_all_rejects_everything() {
    let store = store(10_000);
    let (_, a) = store.register("a");
    let (_, b) = store.register("b");
    let failed = store.fail_all(BridgeError::ChannelUnavailable("disconnected".to_string()));
    assert_eq!(failed, 2);
    assert!(store.is_empty());
    assert!(a.wait().await.unwrap_err().is_channel_unavailable());
    assert!(b.wait().await.unwrap_err().is_channel_unavailable());
}

#[tokio::test]
async fn test_cancel_rejects_with_cancelled() {
    let store = store(10_000);
    let (id, handle) = store.register("generateCode");
    assert!(store.cancel(&id));
    assert_eq!(
        handle.wait().await,
        Err(BridgeError::Cancelled("generateCode".to_string()))
    );
}

#[tokio::test]
async fn test_dropping_handle_removes_entry() {
    let store = store(10_000);
    let (id, handle) = store.register("abandoned");
    assert_eq!(store.len(), 1);
    drop(handle);
    assert!(!store.contains(&id));
    assert!(!store.resolve(&id, json!(null)));
}

#[tokio::test]
async fn test_ids_are_unique() {
    let store = store(10_000);
    let handles: Vec<_> = (0..100).map(|_| store.register("bulk")).collect();
    let ids: std::collections::HashSet<_> = handles.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(ids.len(), 100);
    assert_eq!(store.len(), 100);
    assert_eq!(store.action_of(&handles[0].0).as_deref(), Some("bulk"));
}

#[tokio::test(start_paused = true)]
async fn test_spawn_sweeper_stops_on_cancel() {
    let store = store(200);
    let (id, _handle) = store.register("swept");
    let shutdown = CancellationToken::new();
    let task = store.clone().spawn_sweeper(Duration::from_millis(50), shutdown.clone());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!store.contains(&id));

    shutdown.cancel();
    task.await.unwrap();
}
