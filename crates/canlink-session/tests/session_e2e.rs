//! End-to-end session scenarios over mock and virtual transports
//!
//! Run with: cargo test -p canlink-session --test session_e2e

use std::sync::Arc;
use std::time::Duration;

use canlink_session::{
    CanSession, CanlinkConfig, ConnectionState, Direction, FrameData, InterfaceDescriptor,
    InterfaceRegistry, MessageStore, MockTransport, ReceiveOutcome, SessionError, SessionEvent,
    StoreConfig, TransportError, TransportKind, VirtualBus,
};
use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

// =============================================================================
// Fixtures
// =============================================================================

fn pcan() -> InterfaceDescriptor {
    InterfaceDescriptor::new("PCAN USB 1", TransportKind::Pcan, "PCAN_USBBUS1")
}

fn can0() -> InterfaceDescriptor {
    InterfaceDescriptor::new("SocketCAN can0", TransportKind::SocketCan, "can0")
}

fn config(candidates: Vec<InterfaceDescriptor>) -> CanlinkConfig {
    CanlinkConfig {
        project: "ProjectA".to_string(),
        candidates,
        probe: false,
        store: StoreConfig::Memory,
        ..CanlinkConfig::default()
    }
}

/// PCAN present as a family but with no channel, SocketCAN with can0
struct Bench {
    pcan: MockTransport,
    socketcan: MockTransport,
    store: MessageStore,
    session: CanSession,
}

impl Bench {
    fn new() -> Self {
        let pcan_mock = MockTransport::new(TransportKind::Pcan);
        let socketcan_mock = MockTransport::new(TransportKind::SocketCan).with_channel("can0");

        let registry = InterfaceRegistry::new();
        registry.register(Arc::new(pcan_mock.clone()));
        registry.register(Arc::new(socketcan_mock.clone()));

        let store = MessageStore::in_memory();
        let session = CanSession::new(
            config(vec![pcan(), can0()]),
            Arc::new(registry),
            store.clone(),
        )
        .unwrap();

        Self {
            pcan: pcan_mock,
            socketcan: socketcan_mock,
            store,
            session,
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

#[tokio::test]
async fn test_fallback_skips_unavailable_pcan() {
    let bench = Bench::new();

    let descriptor = bench.session.connect_fallback().await.unwrap();

    assert_eq!(descriptor, can0());
    assert_eq!(bench.session.state(), ConnectionState::Connected);
    assert_eq!(bench.pcan.open_count(), 0);
    assert_eq!(bench.socketcan.open_count(), 1);
}

#[tokio::test]
async fn test_all_candidates_fail() {
    let registry = InterfaceRegistry::new();
    registry.register(Arc::new(MockTransport::new(TransportKind::SocketCan)));
    let kvaser = InterfaceDescriptor::new("Kvaser 0", TransportKind::Kvaser, 0u32);
    let session = CanSession::new(
        config(vec![pcan(), kvaser.clone(), can0()]),
        Arc::new(registry),
        MessageStore::in_memory(),
    )
    .unwrap();

    let err = session.connect_fallback().await.unwrap_err();
    let exhausted = match err {
        SessionError::Exhausted(exhausted) => exhausted,
        other => panic!("expected exhaustion, got {other}"),
    };

    let tried: Vec<InterfaceDescriptor> = exhausted
        .attempts
        .iter()
        .map(|attempt| attempt.descriptor.clone())
        .collect();
    assert_eq!(tried, vec![pcan(), kvaser, can0()]);
    assert!(exhausted
        .attempts
        .iter()
        .all(|attempt| matches!(attempt.error, TransportError::Unavailable(_))));
    assert_eq!(session.state(), ConnectionState::Failed);
    assert_eq!(
        session.status_line(),
        "Status: Connection error | Sent: 0 | Received: 0"
    );
}

#[tokio::test]
async fn test_disconnect_twice_equals_once() {
    let bench = Bench::new();
    bench.session.connect_fallback().await.unwrap();

    bench.session.disconnect().await;
    let after_first = (
        bench.session.state(),
        bench.session.counters(),
        bench.socketcan.close_count(),
    );
    bench.session.disconnect().await;
    let after_second = (
        bench.session.state(),
        bench.session.counters(),
        bench.socketcan.close_count(),
    );

    assert_eq!(after_first, after_second);
    assert_eq!(after_first.0, ConnectionState::Disconnected);
    assert_eq!(after_first.2, 1);
}

#[tokio::test]
async fn test_operations_need_a_connection() {
    let bench = Bench::new();

    let send = bench
        .session
        .send(FrameData::new(0x123, vec![1], false).unwrap())
        .await;
    assert!(matches!(send, Err(SessionError::NotConnected { .. })));

    let receive = bench.session.receive(Duration::ZERO).await;
    assert!(matches!(receive, Err(SessionError::NotConnected { .. })));
}

// =============================================================================
// Frames
// =============================================================================

#[tokio::test]
async fn test_send_full_then_oversized_frame() {
    let bench = Bench::new();
    bench.session.connect_fallback().await.unwrap();

    let frame = assert_ok!(
        bench
            .session
            .send(FrameData::new(0x123, vec![0x11; 8], false).unwrap())
            .await
    );
    assert_eq!(frame.direction(), Direction::Sent);
    assert_eq!(bench.session.counters().sent, 1);

    let err = assert_err!(
        bench
            .session
            .send(FrameData::new(0x123, vec![0x11; 9], false).unwrap())
            .await
    );
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(bench.session.counters().sent, 1);
    assert_eq!(bench.socketcan.sent_frames().len(), 1);
}

#[tokio::test]
async fn test_send_failure_keeps_connection() {
    let bench = Bench::new();
    bench.session.connect_fallback().await.unwrap();

    bench
        .socketcan
        .fail_next_send(TransportError::SendFailed("no ack".to_string()));
    let err = bench
        .session
        .send(FrameData::new(0x123, vec![1], false).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Transport(_)));
    assert_eq!(bench.session.state(), ConnectionState::Connected);
    assert_eq!(bench.session.counters().sent, 0);
}

#[tokio::test]
async fn test_receive_without_traffic_waits_timeout() {
    let bench = Bench::new();
    bench.session.connect_fallback().await.unwrap();

    let started = Instant::now();
    let outcome = bench.session.receive(Duration::from_secs(1)).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, ReceiveOutcome::TimedOut);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_millis(1500));
    assert_eq!(bench.session.counters().received, 0);
}

#[tokio::test]
async fn test_receive_counts_frames() {
    let bench = Bench::new();
    bench.session.connect_fallback().await.unwrap();

    bench
        .socketcan
        .inject(FrameData::new(0x7E8, vec![0x02, 0x50, 0x01], false).unwrap());
    let frame = bench
        .session
        .receive(Duration::from_millis(200))
        .await
        .unwrap()
        .into_frame()
        .unwrap();

    assert_eq!(frame.arbitration_id(), 0x7E8);
    assert_eq!(frame.direction(), Direction::Received);
    assert_eq!(bench.session.counters().received, 1);
}

#[tokio::test]
async fn test_unplugged_device_fails_connection() {
    let bench = Bench::new();
    bench.session.connect_fallback().await.unwrap();

    bench.socketcan.unplug();
    let err = bench
        .session
        .receive(Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Transport(TransportError::ConnectionClosed)
    ));
    assert_eq!(bench.session.state(), ConnectionState::Failed);

    let history = bench.store.query("ProjectA").unwrap();
    assert_eq!(
        history.last().map(|m| m.message.as_str()),
        Some("connection lost: Connection closed")
    );
}

#[tokio::test]
async fn test_disconnect_cancels_outstanding_receive() {
    let bench = Arc::new(Bench::new());
    bench.session.connect_fallback().await.unwrap();

    let pending = {
        let bench = bench.clone();
        tokio::spawn(async move { bench.session.receive(Duration::from_secs(30)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    bench.session.disconnect().await;
    let outcome = pending.await.unwrap().unwrap();

    assert_eq!(outcome, ReceiveOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(bench.socketcan.close_count(), 1);
}

#[tokio::test]
async fn test_send_not_held_up_by_pending_receive() {
    let bench = Arc::new(Bench::new());
    bench.session.connect_fallback().await.unwrap();

    let pending = {
        let bench = bench.clone();
        tokio::spawn(async move { bench.session.receive(Duration::from_secs(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    assert_ok!(
        bench
            .session
            .send_with_timeout(
                FrameData::new(0x123, vec![1], false).unwrap(),
                Duration::from_millis(100)
            )
            .await
    );
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_eq!(bench.session.counters().sent, 1);

    bench.session.disconnect().await;
    assert_eq!(pending.await.unwrap().unwrap(), ReceiveOutcome::Cancelled);
}

// =============================================================================
// Logging and events
// =============================================================================

#[tokio::test]
async fn test_session_history_records_traffic() {
    let bench = Bench::new();
    bench.session.connect_fallback().await.unwrap();
    bench
        .session
        .send(FrameData::new(0x123, vec![1, 2, 3], false).unwrap())
        .await
        .unwrap();
    bench.session.disconnect().await;

    let history = bench.session.history("ProjectA").unwrap();
    let rows: Vec<(&str, &str)> = history
        .iter()
        .map(|m| (m.message_type.as_str(), m.message.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("status", "connected SocketCAN can0"),
            ("sent", "123 [3] 01 02 03"),
            ("status", "disconnected SocketCAN can0"),
        ]
    );
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
    assert!(bench.session.history("ProjectB").unwrap().is_empty());
}

#[tokio::test]
async fn test_events_follow_session() {
    let bench = Bench::new();
    let mut events = bench.session.subscribe();

    bench.session.connect_fallback().await.unwrap();
    bench
        .session
        .send(FrameData::new(0x100, vec![], false).unwrap())
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen[0],
        SessionEvent::StateChanged {
            state: ConnectionState::Connecting,
            descriptor: None
        }
    );
    assert_eq!(
        seen[1],
        SessionEvent::StateChanged {
            state: ConnectionState::Connected,
            descriptor: Some(can0())
        }
    );
    assert!(matches!(seen[2], SessionEvent::FrameSent(_)));
}

// =============================================================================
// Virtual bus
// =============================================================================

#[tokio::test]
async fn test_two_sessions_share_virtual_bus() {
    let bus = Arc::new(VirtualBus::new());
    let vcan0 = InterfaceDescriptor::new("Virtual CAN", TransportKind::Virtual, "vcan0");

    let make_session = |project: &str| {
        let registry = InterfaceRegistry::new();
        registry.register(bus.clone());
        let session_config = CanlinkConfig {
            project: project.to_string(),
            ..config(vec![vcan0.clone()])
        };
        CanSession::new(session_config, Arc::new(registry), MessageStore::in_memory()).unwrap()
    };
    let left = make_session("left");
    let right = make_session("right");

    left.connect_fallback().await.unwrap();
    right.connect_fallback().await.unwrap();

    let sent = left
        .send(FrameData::from_text(0x123, "hello", false).unwrap())
        .await
        .unwrap();
    let received = right
        .receive(Duration::from_millis(500))
        .await
        .unwrap()
        .into_frame()
        .unwrap();

    assert_eq!(received.data(), sent.data());
    assert_eq!(received.payload(), b"hello");
    assert_eq!(left.counters().sent, 1);
    assert_eq!(right.counters().received, 1);

    let echo = left.receive(Duration::ZERO).await.unwrap();
    assert_eq!(echo, ReceiveOutcome::TimedOut);
}
