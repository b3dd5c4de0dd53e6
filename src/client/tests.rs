use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_async;
use tungstenite::protocol::Message as WsMessage;

use super::transport_client::{SendOptions, Transport, TransportEvent};
use crate::config::TransportSettings;
use crate::transport::connection::ConnectionState;
use crate::transport::message::{KIND_ACK, KIND_HANDSHAKE, KIND_PING, KIND_PONG, Message};

struct TestServer {
    url: String,
    received: Arc<Mutex<Vec<Message>>>,
    push: mpsc::UnboundedSender<WsMessage>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    fn received_kinds(&self, kind: &str) -> Vec<Message> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }

    fn push_frame(&self, msg: &Message) {
        let text = serde_json::to_string(msg).unwrap();
        self.push.send(WsMessage::text(text)).unwrap();
    }
}

/// Spawns an in-process websocket server that records every frame it
/// receives, answers pings with pongs, and (optionally) acks every
/// `requiresAck` frame. Frames pushed through `push` go to the currently
/// connected client. Accepts clients sequentially, so reconnects land here
/// too.
async fn spawn_server(auto_ack: bool) -> TestServer {
    let addr = format!(
        "127.0.0.1:{}",
        portpicker::pick_unused_port().expect("No free ports")
    );
    let listener = TcpListener::bind(&addr).await.expect("Can't bind");
    let received = Arc::new(Mutex::new(Vec::new()));
    let (push_tx, push_rx) = mpsc::unbounded_channel::<WsMessage>();
    let push_rx = Arc::new(tokio::sync::Mutex::new(push_rx));

    let recv = received.clone();
    let task = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(_) => continue,
            };
            let (mut ws_sender, mut ws_receiver) = ws.split();
            let mut push = push_rx.lock().await;
            loop {
                tokio::select! {
                    frame = ws_receiver.next() => {
                        let Some(Ok(frame)) = frame else { break };
                        if !frame.is_text() {
                            continue;
                        }
                        let Ok(msg) = serde_json::from_str::<Message>(frame.to_text().unwrap())
                        else {
                            continue;
                        };
                        let wants_ack = auto_ack && msg.requires_ack;
                        let ping_ts = if msg.kind == KIND_PING {
                            msg.payload["timestamp"].as_i64()
                        } else {
                            None
                        };
                        let id = msg.id.clone();
                        recv.lock().unwrap().push(msg);
                        if let Some(ts) = ping_ts {
                            let text = serde_json::to_string(&Message::pong("server", ts)).unwrap();
                            if ws_sender.send(WsMessage::text(text)).await.is_err() {
                                break;
                            }
                        }
                        if wants_ack {
                            let text = serde_json::to_string(&Message::ack("server", &id)).unwrap();
                            if ws_sender.send(WsMessage::text(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                    out = push.recv() => {
                        let Some(out) = out else { break };
                        if ws_sender.send(out).await.is_err() {
                            break;
                        }
                    }
                }
            }
            drop(push);
        }
    });

    TestServer {
        url: format!("ws://{addr}"),
        received,
        push: push_tx,
        task,
    }
}

fn test_settings(url: &str) -> TransportSettings {
    TransportSettings {
        url: url.to_string(),
        reconnect_interval_ms: 100,
        max_reconnect_attempts: 3,
        heartbeat_interval_ms: 60_000,
        auto_reconnect: true,
        message_queue_size: 1000,
        ack_timeout_ms: 10_000,
    }
}

async fn next_matching(
    rx: &mut broadcast::Receiver<TransportEvent>,
    mut pred: impl FnMut(&TransportEvent) -> bool,
) -> TransportEvent {
    loop {
        let event = timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

fn drain_events(rx: &mut broadcast::Receiver<TransportEvent>) -> Vec<TransportEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_connect_sends_handshake_exactly_once() {
    let server = spawn_server(true).await;
    let transport = Transport::new(test_settings(&server.url));

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(200)).await;

    assert_eq!(transport.connection_state(), ConnectionState::Connected);
    assert!(transport.stats().connected);

    let handshakes = server.received_kinds(KIND_HANDSHAKE);
    assert_eq!(handshakes.len(), 1);
    assert_eq!(
        handshakes[0].payload["clientId"],
        transport.client_id()
    );

    // Repeated connect while connected is a no-op, no second handshake
    transport.connect().await.expect("repeat connect failed");
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_kinds(KIND_HANDSHAKE).len(), 1);
}

#[tokio::test]
async fn test_initial_connect_failure_is_an_error() {
    let addr = format!(
        "127.0.0.1:{}",
        portpicker::pick_unused_port().expect("No free ports")
    );
    let transport = Transport::new(test_settings(&format!("ws://{addr}")));

    assert!(transport.connect().await.is_err());
    assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_send_while_disconnected_queues() {
    let transport = Transport::new(test_settings("ws://127.0.0.1:1"));

    transport
        .send("app:test", json!({"n": 1}), SendOptions::default())
        .await
        .unwrap();
    transport
        .send("app:test", json!({"n": 2}), SendOptions::default())
        .await
        .unwrap();

    assert_eq!(transport.queue_size(), 2);
    assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_full_queue_drops_newest_and_keeps_backlog() {
    let mut settings = test_settings("ws://127.0.0.1:1");
    settings.message_queue_size = 2;
    let transport = Transport::new(settings);

    for n in 1..=3 {
        transport
            .send("app:test", json!({"n": n}), SendOptions::default())
            .await
            .unwrap();
    }

    // The third message was rejected; the first two stay queued
    assert_eq!(transport.queue_size(), 2);
}

#[tokio::test]
async fn test_send_fails_only_on_serialization() {
    let transport = Transport::new(test_settings("ws://127.0.0.1:1"));

    // Maps with non-string keys cannot become JSON
    let mut bad = HashMap::new();
    bad.insert(vec![1u8], 1u8);
    assert!(
        transport
            .send("app:test", bad, SendOptions::default())
            .await
            .is_err()
    );
    assert_eq!(transport.queue_size(), 0);
}

#[tokio::test]
async fn test_queued_messages_flush_in_fifo_order() {
    let server = spawn_server(true).await;
    let transport = Transport::new(test_settings(&server.url));

    for n in 1..=4 {
        transport
            .send("app:test", json!({"n": n}), SendOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(transport.queue_size(), 4);

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(300)).await;

    assert_eq!(transport.queue_size(), 0);
    let order: Vec<u64> = server
        .received_kinds("app:test")
        .iter()
        .map(|m| m.payload["n"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![1, 2, 3, 4]);

    // The handshake went out ahead of the backlog
    assert_eq!(server.received.lock().unwrap()[0].kind, KIND_HANDSHAKE);
}

#[tokio::test]
async fn test_ack_round_trip() {
    let server = spawn_server(true).await;
    let mut settings = test_settings(&server.url);
    settings.ack_timeout_ms = 200;
    let transport = Transport::new(settings);
    let mut events = transport.events();

    transport.connect().await.expect("connect failed");
    transport
        .send(
            "app:test",
            json!({"n": 1}),
            SendOptions {
                requires_ack: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let acked = next_matching(&mut events, |e| {
        matches!(e, TransportEvent::Acknowledged { .. })
    })
    .await;
    let TransportEvent::Acknowledged { id } = acked else {
        unreachable!()
    };
    assert_eq!(id, server.received_kinds("app:test")[0].id);
    assert_eq!(transport.pending_ack_count(), 0);

    // The timer was cancelled; no timeout fires after the deadline passes
    sleep(Duration::from_millis(400)).await;
    let late = drain_events(&mut events);
    assert!(
        !late
            .iter()
            .any(|e| matches!(e, TransportEvent::AckTimeout { .. }))
    );
}

#[tokio::test]
async fn test_ack_timeout_and_late_ack_is_noop() {
    let server = spawn_server(false).await;
    let mut settings = test_settings(&server.url);
    settings.ack_timeout_ms = 150;
    let transport = Transport::new(settings);
    let mut events = transport.events();

    transport.connect().await.expect("connect failed");
    transport
        .send(
            "app:test",
            json!({"n": 1}),
            SendOptions {
                requires_ack: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let timed_out = next_matching(&mut events, |e| {
        matches!(e, TransportEvent::AckTimeout { .. })
    })
    .await;
    let TransportEvent::AckTimeout { id } = timed_out else {
        unreachable!()
    };
    assert_eq!(transport.pending_ack_count(), 0);

    // A late ack must not resurrect the entry or emit acknowledged
    server.push_frame(&Message::ack("server", &id));
    sleep(Duration::from_millis(200)).await;
    let late = drain_events(&mut events);
    assert!(
        !late
            .iter()
            .any(|e| matches!(e, TransportEvent::Acknowledged { .. }))
    );
    assert_eq!(transport.pending_ack_count(), 0);
}

#[tokio::test]
async fn test_inbound_dispatch_specific_then_wildcard() {
    let server = spawn_server(false).await;
    let transport = Transport::new(test_settings(&server.url));
    let calls = Arc::new(Mutex::new(Vec::new()));

    {
        let calls = calls.clone();
        transport.subscribe("inspection:update", move |msg| {
            calls
                .lock()
                .unwrap()
                .push(("specific", msg.payload["lineId"].as_u64().unwrap()));
        });
    }
    {
        let calls = calls.clone();
        transport.subscribe("*", move |msg| {
            calls
                .lock()
                .unwrap()
                .push(("wildcard", msg.payload["lineId"].as_u64().unwrap()));
        });
    }

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(100)).await;

    let mut inbound = Message::new("inspection:update", json!({"lineId": 7}), "server");
    inbound.requires_ack = true;
    server.push_frame(&inbound);
    sleep(Duration::from_millis(300)).await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec![("specific", 7), ("wildcard", 7)]
    );

    // The inbound frame was acked before dispatch
    let acks = server.received_kinds(KIND_ACK);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].acked_id(), Some(inbound.id.as_str()));
}

#[tokio::test]
async fn test_reserved_frames_are_not_republished() {
    let server = spawn_server(false).await;
    let transport = Transport::new(test_settings(&server.url));
    let count = Arc::new(Mutex::new(0));

    {
        let count = count.clone();
        transport.subscribe("*", move |_| *count.lock().unwrap() += 1);
    }

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(100)).await;

    server.push_frame(&Message::pong("server", 0));
    server.push_frame(&Message::ack("server", "nonexistent"));
    sleep(Duration::from_millis(200)).await;

    assert_eq!(*count.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_heartbeat_measures_latency() {
    let server = spawn_server(true).await;
    let mut settings = test_settings(&server.url);
    settings.heartbeat_interval_ms = 100;
    let transport = Transport::new(settings);

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(380)).await;

    let pings = server.received_kinds(KIND_PING);
    assert!(pings.len() >= 2, "expected pings, got {}", pings.len());

    let stats = transport.stats();
    // Pongs came back over loopback, so latency is tiny but measured
    assert!(stats.messages_received >= 2);
    assert!(stats.latency_ms < 50.0);
    assert!(stats.messages_sent as usize >= pings.len());
    assert!(stats.bandwidth.upstream > 0.0);
}

#[tokio::test]
async fn test_server_ping_gets_ponged() {
    let server = spawn_server(false).await;
    let transport = Transport::new(test_settings(&server.url));

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(100)).await;

    server.push_frame(&Message::ping("server"));
    sleep(Duration::from_millis(200)).await;

    let pongs = server.received_kinds(KIND_PONG);
    assert_eq!(pongs.len(), 1);
    assert!(pongs[0].payload["pingTimestamp"].is_i64());
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let server = spawn_server(true).await;
    let transport = Transport::new(test_settings(&server.url));
    let mut events = transport.events();

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(100)).await;

    server.push.send(WsMessage::Close(None)).unwrap();

    next_matching(&mut events, |e| matches!(e, TransportEvent::Closed)).await;
    let reconnecting = next_matching(&mut events, |e| {
        matches!(e, TransportEvent::Reconnecting { .. })
    })
    .await;
    if let TransportEvent::Reconnecting { attempt, delay_ms } = reconnecting {
        assert_eq!(attempt, 1);
        assert_eq!(delay_ms, 100);
    }
    next_matching(&mut events, |e| matches!(e, TransportEvent::Established)).await;

    sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.connection_state(), ConnectionState::Connected);
    assert_eq!(transport.stats().reconnect_attempts, 1);
    assert_eq!(server.received_kinds(KIND_HANDSHAKE).len(), 2);
}

#[tokio::test]
async fn test_failed_after_exhausted_attempts() {
    let server = spawn_server(true).await;
    let transport = Transport::new(test_settings(&server.url));
    let mut events = transport.events();

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(100)).await;

    // Take the server down for good; every retry now hits a dead port
    server.task.abort();

    next_matching(&mut events, |e| matches!(e, TransportEvent::Failed)).await;
    assert_eq!(transport.connection_state(), ConnectionState::Failed);
    assert_eq!(transport.stats().reconnect_attempts, 3);

    // Failed stays recoverable by an explicit connect, which fails cleanly
    // here because nothing is listening anymore
    assert!(transport.connect().await.is_err());
    assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_auto_reconnect_disabled_stays_down() {
    let server = spawn_server(true).await;
    let mut settings = test_settings(&server.url);
    settings.auto_reconnect = false;
    let transport = Transport::new(settings);
    let mut events = transport.events();

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(100)).await;

    server.push.send(WsMessage::Close(None)).unwrap();
    next_matching(&mut events, |e| matches!(e, TransportEvent::Closed)).await;

    sleep(Duration::from_millis(300)).await;
    assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
    let rest = drain_events(&mut events);
    assert!(
        !rest
            .iter()
            .any(|e| matches!(e, TransportEvent::Reconnecting { .. }))
    );
}

#[tokio::test]
async fn test_disconnect_cancels_timers_and_is_idempotent() {
    let server = spawn_server(false).await;
    let mut settings = test_settings(&server.url);
    settings.ack_timeout_ms = 150;
    let transport = Transport::new(settings);
    let mut events = transport.events();

    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(100)).await;

    transport
        .send(
            "app:test",
            json!({"n": 1}),
            SendOptions {
                requires_ack: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.pending_ack_count(), 1);

    transport.disconnect();
    assert_eq!(transport.connection_state(), ConnectionState::Disconnected);
    // The entry stays but its timeout clock was stopped
    assert_eq!(transport.pending_ack_count(), 1);

    sleep(Duration::from_millis(300)).await;
    let after = drain_events(&mut events);
    assert!(
        !after
            .iter()
            .any(|e| matches!(e, TransportEvent::AckTimeout { .. }))
    );
    let closed = after
        .iter()
        .filter(|e| matches!(e, TransportEvent::Closed))
        .count();
    assert_eq!(closed, 1);

    // Second disconnect is a no-op
    transport.disconnect();
    assert!(
        !drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, TransportEvent::Closed))
    );
}

#[tokio::test]
async fn test_client_id_is_stable_across_reconnects() {
    let server = spawn_server(true).await;
    let transport = Transport::new(test_settings(&server.url));

    let id = transport.client_id().to_string();
    transport.connect().await.expect("connect failed");
    sleep(Duration::from_millis(100)).await;

    transport.disconnect();
    transport.connect().await.expect("reconnect failed");
    sleep(Duration::from_millis(100)).await;

    assert_eq!(transport.client_id(), id);
    let handshakes = server.received_kinds(KIND_HANDSHAKE);
    assert_eq!(handshakes.len(), 2);
    assert_eq!(handshakes[0].payload["clientId"], handshakes[1].payload["clientId"]);
}
