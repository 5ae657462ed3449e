use super::*;
use crate::handler::handler_fn;
use crate::transport::MemoryTransport;
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(5);

/// A bridge on one end of a memory pair, the raw other end driven by the test.
async fn bridge_with_raw_peer() -> (
    Arc<MessageBridge>,
    MemoryTransport,
    UnboundedReceiver<TransportEvent>,
) {
    let (ours, theirs) = MemoryTransport::pair();
    let bridge = Arc::new(MessageBridge::new(Origin::Remote, Duration::from_secs(5)));
    bridge.attach(Arc::new(ours));
    let (tx, rx) = mpsc::unbounded_channel();
    theirs.on_message(tx);
    bridge.connect().await.unwrap();
    (bridge, theirs, rx)
}

async fn next_message(rx: &mut UnboundedReceiver<TransportEvent>) -> BridgeMessage {
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("transport closed");
        if let TransportEvent::Frame(frame) = event {
            return codec::decode(&frame).unwrap();
        }
    }
}

async fn write_raw(peer: &MemoryTransport, message: &BridgeMessage) {
    peer.write(codec::encode(message).unwrap()).await.unwrap();
}

async fn wait_for_pending(bridge: &MessageBridge, count: usize) {
    tokio::time::timeout(WAIT, async {
        while bridge.pending_count() != count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("pending count never reached");
}

#[tokio::test]
async fn test_send_without_transport() {
    let bridge = MessageBridge::new(Origin::Remote, Duration::from_secs(1));
    let err = bridge.send("ping", json!({})).await.unwrap_err();
    assert!(err.is_channel_unavailable());
    assert!(!bridge.is_connected());
}

#[tokio::test]
async fn test_send_before_connect() {
    let (ours, _theirs) = MemoryTransport::pair();
    let bridge = Arc::new(MessageBridge::new(Origin::Remote, Duration::from_secs(1)));
    bridge.attach(Arc::new(ours));
    let err = bridge.send("ping", json!({})).await.unwrap_err();
    assert!(err.is_channel_unavailable());
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_emit_before_connect() {
    let (ours, _theirs) = MemoryTransport::pair();
    let bridge = Arc::new(MessageBridge::new(Origin::Remote, Duration::from_secs(1)));
    bridge.attach(Arc::new(ours));
    assert!(bridge.emit("tick", json!(1)).await.unwrap_err().is_channel_unavailable());
}

#[tokio::test]
async fn test_send_resolves_with_result() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;

    let sender = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.send("generateCode", json!({"prompt": "x"})).await })
    };

    let request = next_message(&mut rx).await;
    assert_eq!(request.kind, MessageKind::Request);
    assert_eq!(request.action, "generateCode");
    assert_eq!(request.origin, Origin::Remote);

    let response = BridgeMessage::response_to(
        &request,
        ResponseEnvelope::success(json!({"code": "fn x() {}"})),
        Origin::Local,
    );
    write_raw(&peer, &response).await;

    assert_eq!(sender.await.unwrap().unwrap(), json!({"code": "fn x() {}"}));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_error_response_maps_to_remote_error() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    let sender = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.send("save", json!({})).await })
    };

    let request = next_message(&mut rx).await;
    let fault = RemoteFault::new("DISK_FULL", "no space left").with_data(json!({"free": 0}));
    write_raw(
        &peer,
        &BridgeMessage::response_to(&request, ResponseEnvelope::failure(fault), Origin::Local),
    )
    .await;

    assert_eq!(
        sender.await.unwrap(),
        Err(BridgeError::RemoteError {
            code: "DISK_FULL".to_string(),
            message: "no space left".to_string(),
            data: Some(json!({"free": 0})),
        })
    );
}

#[tokio::test]
async fn test_unsupported_response_maps_to_unsupported_action() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    let sender = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.send("frobnicate", json!({})).await })
    };

    let request = next_message(&mut rx).await;
    write_raw(
        &peer,
        &BridgeMessage::response_to(
            &request,
            ResponseEnvelope::failure(RemoteFault::unsupported_action("frobnicate")),
            Origin::Local,
        ),
    )
    .await;

    assert_eq!(
        sender.await.unwrap(),
        Err(BridgeError::UnsupportedAction("frobnicate".to_string()))
    );
}

#[tokio::test]
async fn test_malformed_envelope_rejects_with_codec_error() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    let sender = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.send("x", json!({})).await })
    };

    let request = next_message(&mut rx).await;
    let mut response = BridgeMessage::response_to(
        &request,
        ResponseEnvelope::success(json!(null)),
        Origin::Local,
    );
    response.payload = json!("not an envelope");
    write_raw(&peer, &response).await;

    assert!(matches!(sender.await.unwrap(), Err(BridgeError::Codec(_))));
}

#[tokio::test]
async fn test_request_and_response_with_same_id_are_not_cross_matched() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    bridge.subscribe(
        "echo",
        handler_fn(|message| async move { Ok(message.payload) }),
    );

    let sender = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.send("generateCode", json!({})).await })
    };
    let outbound = next_message(&mut rx).await;

    // The peer issues its own request reusing our outstanding id.
    let inbound = BridgeMessage::request(
        outbound.id.clone(),
        "echo",
        json!({"from": "peer"}),
        Origin::Local,
    );
    write_raw(&peer, &inbound).await;

    let reply = next_message(&mut rx).await;
    assert_eq!(reply.kind, MessageKind::Response);
    assert_eq!(reply.id, outbound.id);
    assert_eq!(reply.envelope().unwrap().result, json!({"from": "peer"}));

    // Our request is still pending, untouched by the inbound request.
    assert_eq!(bridge.pending_count(), 1);
    assert!(!sender.is_finished());

    write_raw(
        &peer,
        &BridgeMessage::response_to(&outbound, ResponseEnvelope::success(json!("done")), Origin::Local),
    )
    .await;
    assert_eq!(sender.await.unwrap().unwrap(), json!("done"));
}

#[tokio::test]
async fn test_unknown_action_gets_unsupported_response() {
    let (_bridge, peer, mut rx) = bridge_with_raw_peer().await;
    let request = BridgeMessage::request("r-1".to_string(), "nope", json!({}), Origin::Local);
    write_raw(&peer, &request).await;

    let reply = next_message(&mut rx).await;
    assert_eq!(reply.id, "r-1");
    assert_eq!(reply.kind, MessageKind::Response);
    let envelope = reply.envelope().unwrap();
    assert!(!envelope.ok);
    assert!(envelope.error.unwrap().is_unsupported_action());
}

#[tokio::test]
async fn test_handler_error_becomes_error_response() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    bridge.subscribe(
        "explode",
        handler_fn(|_| async move { Err(RemoteFault::handler_failed("boom")) }),
    );
    write_raw(
        &peer,
        &BridgeMessage::request("r-2".to_string(), "explode", json!({}), Origin::Local),
    )
    .await;

    let envelope = next_message(&mut rx).await.envelope().unwrap();
    let fault = envelope.error.unwrap();
    assert_eq!(fault.code, RemoteFault::HANDLER_ERROR);
    assert_eq!(fault.message, "boom");
}

#[tokio::test]
async fn test_first_handler_replies_all_run_in_order() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    for label in ["first", "second", "third"] {
        let seen_tx = seen_tx.clone();
        bridge.subscribe(
            "multi",
            handler_fn(move |_| {
                let seen_tx = seen_tx.clone();
                async move {
                    let _ = seen_tx.send(label);
                    Ok(json!(label))
                }
            }),
        );
    }
    assert_eq!(bridge.handler_count("multi"), 3);

    write_raw(
        &peer,
        &BridgeMessage::request("r-3".to_string(), "multi", json!({}), Origin::Local),
    )
    .await;

    let reply = next_message(&mut rx).await;
    assert_eq!(reply.envelope().unwrap().result, json!("first"));
    for expected in ["first", "second", "third"] {
        assert_eq!(seen_rx.recv().await, Some(expected));
    }
}

#[tokio::test]
async fn test_events_fan_out_without_reply() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    for _ in 0..2 {
        let seen_tx = seen_tx.clone();
        bridge.subscribe(
            "tab.changed",
            handler_fn(move |message| {
                let seen_tx = seen_tx.clone();
                async move {
                    let _ = seen_tx.send(message.payload);
                    Ok(Value::Null)
                }
            }),
        );
    }

    write_raw(&peer, &BridgeMessage::event("tab.changed", json!(7), Origin::Local)).await;
    assert_eq!(seen_rx.recv().await, Some(json!(7)));
    assert_eq!(seen_rx.recv().await, Some(json!(7)));

    // Nothing was written back; the only frame we see is the next emit.
    bridge.emit("marker", json!(null)).await.unwrap();
    assert_eq!(next_message(&mut rx).await.action, "marker");
}

#[tokio::test]
async fn test_unsubscribe() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    let handle = bridge.subscribe("echo", handler_fn(|m| async move { Ok(m.payload) }));
    assert_eq!(handle.action(), "echo");
    assert!(handle.unsubscribe());
    assert_eq!(bridge.handler_count("echo"), 0);

    write_raw(
        &peer,
        &BridgeMessage::request("r-4".to_string(), "echo", json!(1), Origin::Local),
    )
    .await;
    let envelope = next_message(&mut rx).await.envelope().unwrap();
    assert!(envelope.error.unwrap().is_unsupported_action());
}

#[tokio::test]
async fn test_unmatched_response_is_dropped() {
    let (bridge, peer, _rx) = bridge_with_raw_peer().await;
    let stray = BridgeMessage::request("ghost".to_string(), "x", json!({}), Origin::Local);
    write_raw(
        &peer,
        &BridgeMessage::response_to(&stray, ResponseEnvelope::success(json!(1)), Origin::Local),
    )
    .await;
    tokio::task::yield_now().await;
    assert_eq!(bridge.pending_count(), 0);
    assert!(bridge.is_connected());
}

#[tokio::test]
async fn test_peer_cannot_raise_reserved_events() {
    let (bridge, peer, _rx) = bridge_with_raw_peer().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    bridge.subscribe(
        actions::DISCONNECTED,
        handler_fn(move |_| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(());
                Ok(Value::Null)
            }
        }),
    );

    write_raw(
        &peer,
        &BridgeMessage::event(actions::DISCONNECTED, json!({}), Origin::Local),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(seen_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_reserved_request_gets_error_reply() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    bridge.subscribe(
        actions::CONNECTED,
        handler_fn(|_| async { Ok(json!("should not run")) }),
    );

    write_raw(
        &peer,
        &BridgeMessage::request("r-res".to_string(), actions::CONNECTED, json!({}), Origin::Local),
    )
    .await;
    let reply = next_message(&mut rx).await;
    assert_eq!(reply.id, "r-res");
    assert_eq!(reply.kind, MessageKind::Response);
    let envelope = reply.envelope().unwrap();
    assert!(!envelope.ok);
    assert!(envelope.error.unwrap().is_unsupported_action());
}

#[tokio::test]
async fn test_cancel_pending_request() {
    let (bridge, _peer, mut rx) = bridge_with_raw_peer().await;
    let handle = bridge
        .start_request("generateCode", json!({}), Duration::from_secs(30))
        .await
        .unwrap();
    let request = next_message(&mut rx).await;
    assert_eq!(handle.id(), request.id);

    assert!(bridge.cancel(handle.id()));
    assert_eq!(
        handle.wait().await,
        Err(BridgeError::Cancelled("generateCode".to_string()))
    );
    assert!(!bridge.cancel(&request.id));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_settles_once() {
    let (bridge, peer, mut rx) = bridge_with_raw_peer().await;
    let sender = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            bridge
                .send_with_timeout("slow", json!({}), Duration::from_millis(200))
                .await
        })
    };
    let request = next_message(&mut rx).await;

    tokio::time::advance(Duration::from_millis(201)).await;
    assert_eq!(
        sender.await.unwrap(),
        Err(BridgeError::Timeout {
            action: "slow".to_string(),
            timeout_ms: 200
        })
    );
    assert_eq!(bridge.pending_count(), 0);

    // A late response finds nothing to settle.
    write_raw(
        &peer,
        &BridgeMessage::response_to(&request, ResponseEnvelope::success(json!(1)), Origin::Local),
    )
    .await;
    tokio::task::yield_now().await;
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn test_disconnect_rejects_pending_and_notifies() {
    let (bridge, _peer, mut rx) = bridge_with_raw_peer().await;
    let (note_tx, mut note_rx) = mpsc::unbounded_channel();
    bridge.subscribe(
        actions::DISCONNECTED,
        handler_fn(move |message| {
            let note_tx = note_tx.clone();
            async move {
                let _ = note_tx.send(message.payload);
                Ok(Value::Null)
            }
        }),
    );

    let first = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.send("a", json!({})).await })
    };
    let second = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.send("b", json!({})).await })
    };
    next_message(&mut rx).await;
    next_message(&mut rx).await;
    wait_for_pending(&bridge, 2).await;

    bridge.disconnect().await.unwrap();

    assert!(first.await.unwrap().unwrap_err().is_channel_unavailable());
    assert!(second.await.unwrap().unwrap_err().is_channel_unavailable());
    let note = tokio::time::timeout(WAIT, note_rx.recv()).await.unwrap().unwrap();
    assert_eq!(note["requested"], true);
    assert_eq!(note["failed"], 2);

    // New sends fail until reconnection.
    assert!(bridge.send("c", json!({})).await.unwrap_err().is_channel_unavailable());
}

#[tokio::test]
async fn test_connected_event_on_reconnect() {
    let (bridge, peer, _rx) = bridge_with_raw_peer().await;
    let (note_tx, mut note_rx) = mpsc::unbounded_channel();
    bridge.subscribe(
        actions::CONNECTED,
        handler_fn(move |message| {
            let note_tx = note_tx.clone();
            async move {
                let _ = note_tx.send(message.action);
                Ok(Value::Null)
            }
        }),
    );

    peer.disconnect().await.unwrap();
    peer.connect().await.unwrap();

    let action = tokio::time::timeout(WAIT, note_rx.recv()).await.unwrap().unwrap();
    assert_eq!(action, actions::CONNECTED);
    assert!(bridge.is_connected());
}

#[tokio::test]
async fn test_shutdown_fails_pending() {
    let (bridge, _peer, mut rx) = bridge_with_raw_peer().await;
    let handle = bridge
        .start_request("x", json!({}), Duration::from_secs(30))
        .await
        .unwrap();
    next_message(&mut rx).await;
    bridge.shutdown();
    assert!(handle.wait().await.unwrap_err().is_channel_unavailable());
}
