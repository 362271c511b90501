//! Integration tests for the async beacon service over the in-memory medium
//!
//! Time is paused, so beacon cadence and freshness are deterministic.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use v2x_beacon::config::BeaconConfig;
use v2x_beacon::core::codec;
use v2x_beacon::core::message::{Kinematics, MessageType, SenderId};
use v2x_beacon::error::Result;
use v2x_beacon::protocol::{BeaconEngine, ForwardRecord, RecordKind};
use v2x_beacon::service::{BeaconService, SharedKinematics};
use v2x_beacon::transport::{InboundHandle, MemoryMedium, Transport};
use v2x_beacon::utils::crypto::AuthKey;
use v2x_beacon::utils::metrics::Metrics;
use v2x_beacon::utils::time::MonotonicClock;

struct Node {
    task: JoinHandle<Result<BeaconEngine>>,
    shutdown: mpsc::Sender<()>,
    requests: mpsc::Sender<MessageType>,
    metrics: Arc<Metrics>,
    kinematics: SharedKinematics,
    inbound: InboundHandle,
}

impl Node {
    async fn stop(self) -> BeaconEngine {
        self.shutdown.send(()).await.unwrap();
        self.task.await.unwrap().unwrap()
    }
}

fn key() -> AuthKey {
    AuthKey::from_bytes(&[0x42; 32]).unwrap()
}

fn id(s: &str) -> SenderId {
    SenderId::new(s).unwrap()
}

fn spawn_node(medium: &MemoryMedium, node_id: &str, clock: &MonotonicClock) -> Node {
    spawn_node_with(medium, node_id, clock, key(), |_| {})
}

fn spawn_node_with(
    medium: &MemoryMedium,
    node_id: &str,
    clock: &MonotonicClock,
    key: AuthKey,
    setup: impl FnOnce(&BeaconEngine),
) -> Node {
    let config = BeaconConfig::default_with_overrides(|c| c.node.id = node_id.into());
    let engine = BeaconEngine::new(&config, key).unwrap();
    setup(&engine);

    let (inbound, queue) =
        InboundHandle::channel(config.limits.inbound_queue, Arc::clone(engine.metrics()));
    let transport = medium.attach(inbound.clone()).unwrap();
    let kinematics = SharedKinematics::new(Kinematics::new(30.0444, 31.2357, 25.5, 90.0));

    let service = BeaconService::new(
        engine,
        transport,
        kinematics.clone(),
        clock.clone(),
        queue,
        &config,
    );
    let metrics = service.metrics();
    let requests = service.requests();
    let (shutdown, shutdown_rx) = mpsc::channel(1);
    let task = tokio::spawn(service.run(shutdown_rx));

    Node {
        task,
        shutdown,
        requests,
        metrics,
        kinematics,
        inbound,
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_nodes_discover_each_other() {
    let medium = MemoryMedium::new();
    let clock = MonotonicClock::new();
    let a = spawn_node(&medium, "V001", &clock);
    let b = spawn_node(&medium, "V002", &clock);

    sleep(Duration::from_millis(1_050)).await;

    let a_metrics = a.metrics.snapshot();
    let a = a.stop().await;
    let b = b.stop().await;

    assert!(a.neighbors().contains(&id("V002")));
    assert!(b.neighbors().contains(&id("V001")));
    assert!(!a.neighbors().contains(&id("V001")));

    // 10 Hz for just over a second.
    assert!(a_metrics.beacons_sent >= 10);
    assert_eq!(a_metrics.auth_failures, 0);
    assert_eq!(a_metrics.replay_attempts, 0);
    assert!(a_metrics.received_messages >= 10);
}

#[tokio::test(start_paused = true)]
async fn test_kinematics_updates_propagate() {
    let medium = MemoryMedium::new();
    let clock = MonotonicClock::new();
    let a = spawn_node(&medium, "V001", &clock);
    let b = spawn_node(&medium, "V002", &clock);

    sleep(Duration::from_millis(250)).await;
    a.kinematics.update(Kinematics::new(29.9792, 31.1342, 12.0, 180.0));
    sleep(Duration::from_millis(250)).await;

    let _ = a.stop().await;
    let b = b.stop().await;
    let record = b.neighbors().get(&id("V001")).unwrap();
    assert_eq!(record.kinematics.speed, 12.0);
    assert_eq!(record.kinematics.heading, 180.0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_neighbor_evicted() {
    let medium = MemoryMedium::new();
    let clock = MonotonicClock::new();
    let a = spawn_node(&medium, "V001", &clock);
    let b = spawn_node(&medium, "V002", &clock);

    sleep(Duration::from_millis(500)).await;
    let _ = a.stop().await;
    sleep(Duration::from_millis(6_000)).await;

    let b_metrics = b.metrics.snapshot();
    let b = b.stop().await;
    assert!(!b.neighbors().contains(&id("V001")));
    assert_eq!(b_metrics.neighbors_evicted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_wrong_key_node_is_rejected() {
    let medium = MemoryMedium::new();
    let clock = MonotonicClock::new();
    let honest = spawn_node(&medium, "V001", &clock);
    let intruder = spawn_node_with(
        &medium,
        "EVIL",
        &clock,
        AuthKey::from_bytes(&[0x13; 32]).unwrap(),
        |_| {},
    );

    sleep(Duration::from_millis(1_000)).await;
    let honest_metrics = honest.metrics.snapshot();
    let honest = honest.stop().await;
    let _ = intruder.stop().await;

    assert!(honest.neighbors().is_empty());
    assert!(honest_metrics.auth_failures >= 10);
    assert_eq!(honest_metrics.received_messages, 0);
}

#[tokio::test(start_paused = true)]
async fn test_self_echo_ignored() {
    let medium = MemoryMedium::new();
    medium.set_self_echo(true);
    let clock = MonotonicClock::new();
    let a = spawn_node(&medium, "V001", &clock);

    sleep(Duration::from_millis(500)).await;
    let snapshot = a.metrics.snapshot();
    let a = a.stop().await;

    assert!(a.neighbors().is_empty());
    assert!(snapshot.self_messages >= 5);
    assert_eq!(snapshot.received_messages, 0);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_request_reaches_neighbors() {
    let medium = MemoryMedium::new();
    let clock = MonotonicClock::new();
    let seen: Arc<Mutex<Vec<ForwardRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let amb = spawn_node(&medium, "AMB1", &clock);
    let car = spawn_node_with(&medium, "V002", &clock, key(), move |engine| {
        engine
            .dispatcher()
            .register(RecordKind::EmergencyAlert, move |record| {
                sink.lock().unwrap().push(record.clone());
                Ok(())
            })
            .unwrap();
    });

    sleep(Duration::from_millis(150)).await;
    amb.requests.send(MessageType::EmergencyAlert).await.unwrap();
    sleep(Duration::from_millis(150)).await;

    let _ = amb.stop().await;
    let car = car.stop().await;

    assert!(car.neighbors().get(&id("AMB1")).unwrap().is_emergency);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].sender_id, id("AMB1"));
    assert!(seen[0].is_emergency);
}

#[tokio::test(start_paused = true)]
async fn test_captured_beacon_replayed_into_node() {
    let medium = MemoryMedium::new();
    let clock = MonotonicClock::new();

    // A passive listener records V001's traffic.
    let (tap, mut captured) = InboundHandle::channel(64, Arc::new(Metrics::new()));
    let _tap = medium.attach(tap).unwrap();

    let a = spawn_node(&medium, "V001", &clock);
    let b = spawn_node(&medium, "V002", &clock);

    sleep(Duration::from_millis(300)).await;
    let _ = a.stop().await;

    let mut recorded = Vec::new();
    while let Ok(datagram) = captured.try_recv() {
        let (message, _) = codec::decode(&datagram.bytes).unwrap();
        if message.sender_id == id("V001") {
            recorded.push(datagram);
        }
    }
    assert!(!recorded.is_empty());

    let attacker: SocketAddr = "10.0.0.99:47474".parse().unwrap();
    for datagram in &recorded {
        b.inbound.deliver(datagram.bytes.clone(), attacker).unwrap();
    }
    sleep(Duration::from_millis(50)).await;

    let snapshot = b.metrics.snapshot();
    let _ = b.stop().await;
    assert_eq!(snapshot.replay_attempts, recorded.len() as u64);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_when_sender_dropped() {
    let medium = MemoryMedium::new();
    let clock = MonotonicClock::new();
    let node = spawn_node(&medium, "V001", &clock);

    drop(node.shutdown);
    let engine = node.task.await.unwrap().unwrap();
    assert_eq!(engine.node_id(), &id("V001"));
}

#[tokio::test(start_paused = true)]
async fn test_transport_broadcast_counts_nothing_on_empty_medium() {
    let medium = MemoryMedium::new();
    let (handle, _queue) = InboundHandle::channel(4, Arc::new(Metrics::new()));
    let transport = medium.attach(handle).unwrap();
    transport.broadcast(&[0u8; 73]).await.unwrap();
    assert_eq!(medium.delivered(), 0);
}
