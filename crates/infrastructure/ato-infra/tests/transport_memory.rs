use std::sync::Arc;
use std::time::Duration;

use ato_core::{EventType, InboundFrame};
use ato_infra::connector::{MemoryConnector, MemoryListener, MemoryPeer};
use ato_infra::{ConnectionState, Notification, Transport, TransportConfig, TransportError};
use serde_json::{json, Map};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn config(reconnect_ms: u64, timeout_ms: u64) -> TransportConfig {
    TransportConfig {
        request_timeout: Duration::from_millis(timeout_ms),
        reconnect_base_delay: Duration::from_millis(reconnect_ms),
        reconnect_max_delay: Duration::from_millis(reconnect_ms),
        broadcast_capacity: 16,
    }
}

struct Harness {
    transport: Transport,
    notifications: mpsc::UnboundedReceiver<Notification>,
    listener: MemoryListener,
    shutdown: CancellationToken,
    run: tokio::task::JoinHandle<()>,
}

fn start(cfg: TransportConfig) -> Harness {
    let (transport, notifications) = Transport::new(cfg);
    start_with(transport, notifications)
}

fn start_with(
    transport: Transport,
    notifications: mpsc::UnboundedReceiver<Notification>,
) -> Harness {
    let (connector, listener) = MemoryConnector::pair();
    let shutdown = CancellationToken::new();
    let t = transport.clone();
    let s = shutdown.clone();
    let run = tokio::spawn(async move { t.run(Arc::new(connector), s).await });
    Harness {
        transport,
        notifications,
        listener,
        shutdown,
        run,
    }
}

async fn wait_for_state(transport: &Transport, want: ConnectionState) {
    let mut rx = transport.watch_state();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want))
        .await
        .expect("state change timed out")
        .expect("state channel closed");
}

async fn next_request(peer: &mut MemoryPeer) -> (String, String) {
    let frame = peer.recv().await.expect("client hung up");
    assert_eq!(frame["type"], "request");
    (
        frame["id"].as_str().unwrap().to_string(),
        frame["action"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn actions_sent_before_connect_flush_in_order() {
    let (transport, notifications) = Transport::new(config(20, 1_000));
    transport.send_action("first", Map::new());
    transport.send_action("second", Map::new());
    transport.send_action("third", Map::new());
    assert_eq!(transport.queued_frames(), 3);

    let mut h = start_with(transport, notifications);
    let mut peer = h.listener.accept().await.unwrap();

    for expected in ["first", "second", "third"] {
        let frame = peer.recv().await.unwrap();
        assert_eq!(frame["type"], "action");
        assert_eq!(frame["action"], expected);
    }
    assert_eq!(h.transport.queued_frames(), 0);

    h.shutdown.cancel();
    h.run.await.unwrap();
}

#[tokio::test]
async fn response_resolves_matching_request() {
    let mut h = start(config(20, 1_000));
    let mut peer = h.listener.accept().await.unwrap();

    let t = h.transport.clone();
    let call = tokio::spawn(async move {
        let mut params = Map::new();
        params.insert("projectRoot".into(), json!("/p"));
        t.send_with_response("bom.get", params).await
    });

    let (id, action) = next_request(&mut peer).await;
    assert_eq!(action, "bom.get");
    peer.respond(&id, json!({"components": []}));

    assert_eq!(call.await.unwrap().unwrap(), json!({"components": []}));
    assert_eq!(h.transport.pending_requests(), 0);

    h.shutdown.cancel();
    h.run.await.unwrap();
}

#[tokio::test]
async fn backend_error_rejects_with_its_message() {
    let mut h = start(config(20, 1_000));
    let mut peer = h.listener.accept().await.unwrap();

    let t = h.transport.clone();
    let call = tokio::spawn(async move {
        t.send_with_response("exportManufacturingFiles", Map::new())
            .await
    });
    let (id, _) = next_request(&mut peer).await;
    peer.respond_error(&id, "disk full");

    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err, TransportError::Backend("disk full".into()));
    assert_eq!(err.to_string(), "disk full");

    h.shutdown.cancel();
    h.run.await.unwrap();
}

#[tokio::test]
async fn connection_loss_rejects_pending_and_refuses_new_requests() {
    let mut h = start(config(300, 5_000));
    let mut peer = h.listener.accept().await.unwrap();
    wait_for_state(&h.transport, ConnectionState::Open).await;

    let t = h.transport.clone();
    let in_flight =
        tokio::spawn(async move { t.send_with_response("projects.list", Map::new()).await });
    let _ = next_request(&mut peer).await;

    drop(peer);
    assert_eq!(
        in_flight.await.unwrap(),
        Err(TransportError::ConnectionLost)
    );

    wait_for_state(&h.transport, ConnectionState::Lost).await;
    let refused = h
        .transport
        .send_with_response("bom.get", Map::new())
        .await;
    assert_eq!(refused, Err(TransportError::ConnectionLost));
    assert_eq!(h.transport.pending_requests(), 0);

    h.shutdown.cancel();
    h.run.await.unwrap();
}

#[tokio::test]
async fn actions_queued_while_lost_survive_reconnect_in_order() {
    let mut h = start(config(100, 5_000));
    let peer = h.listener.accept().await.unwrap();
    wait_for_state(&h.transport, ConnectionState::Open).await;

    drop(peer);
    wait_for_state(&h.transport, ConnectionState::Lost).await;

    h.transport.send_action("build", Map::new());
    h.transport.send_action("openFile", Map::new());

    let mut peer = h.listener.accept().await.unwrap();
    assert_eq!(peer.recv().await.unwrap()["action"], "build");
    assert_eq!(peer.recv().await.unwrap()["action"], "openFile");

    h.shutdown.cancel();
    h.run.await.unwrap();
}

#[tokio::test]
async fn inbound_frames_are_broadcast_and_routed() {
    let mut h = start(config(20, 1_000));
    let mut passive = h.transport.subscribe();
    let peer = h.listener.accept().await.unwrap();

    peer.send_raw("not json at all");
    peer.emit("projects_changed", json!(null));
    peer.send(&json!({"type": "state", "data": {"projects": []}}));

    match passive.recv().await.unwrap() {
        InboundFrame::Event(ev) => assert_eq!(ev.event, EventType::ProjectsChanged),
        other => panic!("expected event, got {other:?}"),
    }
    assert!(matches!(passive.recv().await.unwrap(), InboundFrame::State(_)));

    match h.notifications.recv().await.unwrap() {
        Notification::Event(ev) => assert_eq!(ev.event, EventType::ProjectsChanged),
        other => panic!("expected event, got {other:?}"),
    }
    assert_eq!(
        h.notifications.recv().await.unwrap(),
        Notification::Hydrate(json!({"projects": []}))
    );

    h.shutdown.cancel();
    h.run.await.unwrap();
}

#[tokio::test]
async fn timeout_forgets_the_request_and_ignores_late_reply() {
    let mut h = start(config(20, 50));
    let mut peer = h.listener.accept().await.unwrap();

    let t = h.transport.clone();
    let call = tokio::spawn(async move { t.send_with_response("stdlib.list", Map::new()).await });
    let (id, _) = next_request(&mut peer).await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, TransportError::Timeout { ref action, .. } if action == "stdlib.list"));
    assert_eq!(h.transport.pending_requests(), 0);

    // A late reply is a no-op and does not disturb later traffic.
    peer.respond(&id, json!({"items": []}));
    peer.emit("stdlib_changed", json!(null));
    assert!(matches!(
        h.notifications.recv().await.unwrap(),
        Notification::Event(_)
    ));

    h.shutdown.cancel();
    h.run.await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_and_fails_queued_requests() {
    let (transport, _notifications) = Transport::new(config(20, 5_000));
    let t = transport.clone();
    let queued = tokio::spawn(async move { t.send_with_response("projects.list", Map::new()).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.queued_frames(), 1);

    transport.close();
    assert_eq!(queued.await.unwrap(), Err(TransportError::Closed));
    assert_eq!(transport.state(), ConnectionState::Closed);
    assert_eq!(
        transport.send_with_response("projects.list", Map::new()).await,
        Err(TransportError::Closed)
    );
}
