use std::sync::Arc;
use std::time::Duration;

use kameo::Actor;
use kameo::prelude::ActorRef;
use parking_lot::Mutex;
use siot_feed::feed::{
    ConnectionManager, ConnectionManagerArgs, ConnectionState, DEFAULT_CONNECT_TIMEOUT,
    FeedSnapshot, FixedDelayReconnect, GetFeedStatus, StartFeed,
};
use siot_feed::identity::{PageLocation, StaticIdentity};
use siot_feed::presentation::PresentationHook;
use siot_feed::sink::MessageLog;
use siot_feed::testing::{MockServer, MockTransport};
use tokio::time::Instant;

const RETRY: Duration = Duration::from_millis(5000);
const TIMER_SLACK: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq, Eq)]
enum Lifecycle {
    Connected { log_len: usize },
    Message,
    Disconnected(String),
}

#[derive(Clone)]
struct RecordingPresentation {
    log: MessageLog,
    events: Arc<Mutex<Vec<Lifecycle>>>,
}

impl PresentationHook for RecordingPresentation {
    fn on_connected(&mut self) {
        self.events.lock().push(Lifecycle::Connected {
            log_len: self.log.len(),
        });
    }

    fn on_disconnected(&mut self, reason: &str) {
        self.events
            .lock()
            .push(Lifecycle::Disconnected(reason.to_string()));
    }

    fn on_message(&mut self) {
        self.events.lock().push(Lifecycle::Message);
    }
}

type TestManager =
    ConnectionManager<MessageLog, RecordingPresentation, FixedDelayReconnect, MockTransport>;

struct Harness {
    manager: ActorRef<TestManager>,
    server: MockServer,
    log: MessageLog,
    events: Arc<Mutex<Vec<Lifecycle>>>,
}

fn spawn_with_identity(identity: impl siot_feed::identity::IdentitySource) -> Harness {
    let (transport, server) = MockTransport::channel_pair();
    let log = MessageLog::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let manager = ConnectionManager::spawn(ConnectionManagerArgs {
        host: "localhost:8000".to_string(),
        identity: Box::new(identity),
        sink: log.clone(),
        presentation: RecordingPresentation {
            log: log.clone(),
            events: events.clone(),
        },
        reconnect_strategy: FixedDelayReconnect::default(),
        transport,
        connect_timeout: DEFAULT_CONNECT_TIMEOUT,
    });
    Harness {
        manager,
        server,
        log,
        events,
    }
}

fn spawn_manager() -> Harness {
    spawn_with_identity(StaticIdentity::new(Some("42"), "abc123"))
}

/// Poll the manager without letting the paused clock move.
async fn wait_until(
    manager: &ActorRef<TestManager>,
    what: &str,
    pred: impl Fn(&FeedSnapshot) -> bool,
) -> FeedSnapshot {
    let mut last = None;
    for _ in 0..10_000 {
        let snapshot = manager.ask(GetFeedStatus).await.expect("feed status");
        if pred(&snapshot) {
            return snapshot;
        }
        last = Some(snapshot);
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {what} (last={last:?})");
}

fn connected(s: &FeedSnapshot) -> bool {
    s.state == ConnectionState::Connected
}

fn reconnecting(s: &FeedSnapshot) -> bool {
    s.state == ConnectionState::Reconnecting
}

#[tokio::test(start_paused = true)]
async fn reconnect_replaces_log_with_fresh_messages() {
    let Harness {
        manager,
        mut server,
        log,
        events,
    } = spawn_manager();
    manager.tell(StartFeed).send().await.expect("start accepted");

    let attempt = server.next_attempt().await.expect("initial attempt");
    assert_eq!(
        attempt.url(),
        "ws://localhost:8000/ws/42?authorization=abc123"
    );
    let mut first = attempt.accept();
    wait_until(&manager, "first connection", connected).await;

    first.send_text("A").unwrap();
    first.send_text("B").unwrap();
    wait_until(&manager, "two messages", |s| s.messages_received == 2).await;
    assert_eq!(log.entries(), vec!["A", "B"]);

    first.close(1001, "server restart").unwrap();
    let closed_at = Instant::now();
    let snapshot = wait_until(&manager, "reconnecting", reconnecting).await;
    assert_eq!(snapshot.attempt_count, 1);
    // The old entries stay visible until the next connection opens.
    assert_eq!(log.entries(), vec!["A", "B"]);

    let attempt = server.next_attempt().await.expect("reconnect attempt");
    let waited = attempt.at() - closed_at;
    assert!(waited >= RETRY, "reconnected after {waited:?}");
    assert!(waited < RETRY + TIMER_SLACK, "reconnected after {waited:?}");
    assert_eq!(
        attempt.url(),
        "ws://localhost:8000/ws/42?authorization=abc123"
    );

    let second = attempt.accept();
    let snapshot = wait_until(&manager, "second connection", connected).await;
    assert_eq!(snapshot.attempt_count, 0);
    assert!(log.is_empty());

    second.send_text("C").unwrap();
    second.send_text("D").unwrap();
    wait_until(&manager, "post-reconnect messages", |s| s.messages_received == 4).await;
    assert_eq!(log.entries(), vec!["C", "D"]);

    assert_eq!(
        *events.lock(),
        vec![
            Lifecycle::Connected { log_len: 0 },
            Lifecycle::Message,
            Lifecycle::Message,
            Lifecycle::Disconnected("code=1001 reason=server restart".to_string()),
            Lifecycle::Connected { log_len: 0 },
            Lifecycle::Message,
            Lifecycle::Message,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn flapping_server_gets_one_attempt_per_close() {
    let Harness {
        manager,
        mut server,
        ..
    } = spawn_manager();
    manager.tell(StartFeed).send().await.unwrap();

    let initial = server.next_attempt().await.expect("initial attempt");
    let mut closed_at = initial.at();
    initial.reject("connection refused");

    for expected in 1..=10u64 {
        let snapshot = wait_until(&manager, "reconnecting", |s| {
            reconnecting(s) && s.attempt_count == expected
        })
        .await;
        assert_eq!(snapshot.connects_started, expected);
        assert!(server.try_next_attempt().is_none(), "retry storm");

        let attempt = server.next_attempt().await.expect("scheduled attempt");
        let waited = attempt.at() - closed_at;
        assert!(waited >= RETRY, "attempt {expected} after {waited:?}");
        assert!(waited < RETRY + TIMER_SLACK, "attempt {expected} after {waited:?}");

        if expected < 10 {
            closed_at = attempt.at();
            attempt.reject("connection refused");
        } else {
            let _conn = attempt.accept();
            let snapshot = wait_until(&manager, "recovered", connected).await;
            assert_eq!(snapshot.attempt_count, 0);
            assert_eq!(snapshot.connects_started, 11);
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_handshake_times_out_and_is_retried() {
    let Harness {
        manager,
        mut server,
        events,
        ..
    } = spawn_manager();
    manager.tell(StartFeed).send().await.unwrap();

    // Never answered: the peer took the TCP connection but never upgrades.
    let stalled = server.next_attempt().await.expect("initial attempt");
    let started_at = stalled.at();

    let retry = server.next_attempt().await.expect("attempt after the timeout");
    let waited = retry.at() - started_at;
    let expected = DEFAULT_CONNECT_TIMEOUT + RETRY;
    assert!(waited >= expected, "retried after {waited:?}");
    assert!(waited < expected + TIMER_SLACK, "retried after {waited:?}");

    let snapshot = manager.ask(GetFeedStatus).await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Connecting);
    assert_eq!(snapshot.attempt_count, 1);
    assert_eq!(snapshot.connects_started, 2);

    match events.lock().as_slice() {
        [Lifecycle::Disconnected(reason)] => {
            assert!(reason.starts_with("handshake failed"), "{reason}");
            assert!(reason.contains("timed out after 10.0 seconds"), "{reason}");
        }
        other => panic!("unexpected events: {other:?}"),
    }

    // A late answer to the abandoned attempt goes nowhere.
    let _late = stalled.accept();
    let _conn = retry.accept();
    let snapshot = wait_until(&manager, "connected", connected).await;
    assert_eq!(snapshot.attempt_count, 0);
}

#[tokio::test(start_paused = true)]
async fn no_attempt_before_the_delay_elapses() {
    let Harness {
        manager,
        mut server,
        ..
    } = spawn_manager();
    manager.tell(StartFeed).send().await.unwrap();

    let mut conn = server.next_attempt().await.unwrap().accept();
    wait_until(&manager, "connected", connected).await;
    conn.drop_socket();
    wait_until(&manager, "reconnecting", reconnecting).await;

    assert!(
        server
            .next_attempt_timeout(RETRY - Duration::from_millis(1))
            .await
            .is_none()
    );
    assert!(server.next_attempt().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn frames_reach_the_log_in_arrival_order() {
    let Harness {
        manager,
        mut server,
        log,
        events,
    } = spawn_manager();
    manager.tell(StartFeed).send().await.unwrap();

    let mut conn = server.next_attempt().await.unwrap().accept();
    wait_until(&manager, "connected", connected).await;

    let payloads: Vec<String> = (0..250).map(|i| format!("update #{i}")).collect();
    for payload in &payloads {
        conn.send_text(payload.clone()).unwrap();
    }
    conn.send_text("update #0").unwrap();
    conn.close(1000, "done").unwrap();

    let snapshot = wait_until(&manager, "closed after frames", reconnecting).await;
    assert_eq!(snapshot.messages_received, 251);

    let mut expected = payloads;
    expected.push("update #0".to_string());
    assert_eq!(log.entries(), expected);

    let events = events.lock();
    assert_eq!(
        events
            .iter()
            .filter(|event| **event == Lifecycle::Message)
            .count(),
        251
    );
    assert!(matches!(events.last(), Some(Lifecycle::Disconnected(_))));
}

#[tokio::test(start_paused = true)]
async fn handshake_failure_and_stream_end_are_both_closes() {
    let Harness {
        manager,
        mut server,
        events,
        ..
    } = spawn_manager();
    manager.tell(StartFeed).send().await.unwrap();

    server.next_attempt().await.unwrap().reject("503 Service Unavailable");
    let snapshot = wait_until(&manager, "first close", reconnecting).await;
    assert_eq!(snapshot.attempt_count, 1);

    let mut conn = server.next_attempt().await.unwrap().accept();
    wait_until(&manager, "connected", connected).await;
    conn.drop_socket();
    let snapshot = wait_until(&manager, "second close", reconnecting).await;
    assert_eq!(snapshot.attempt_count, 1);

    let events = events.lock();
    match &events[0] {
        Lifecycle::Disconnected(reason) => {
            assert!(reason.starts_with("handshake failed"), "{reason}");
            assert!(reason.contains("503 Service Unavailable"), "{reason}");
        }
        other => panic!("unexpected first event: {other:?}"),
    }
    assert_eq!(events[1], Lifecycle::Connected { log_len: 0 });
    assert_eq!(
        events[2],
        Lifecycle::Disconnected("stream ended".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn control_and_undecodable_frames_never_reach_the_log() {
    use bytes::Bytes;
    use siot_feed::core::WsFrame;

    let Harness {
        manager,
        mut server,
        log,
        ..
    } = spawn_manager();
    manager.tell(StartFeed).send().await.unwrap();

    let conn = server.next_attempt().await.unwrap().accept();
    wait_until(&manager, "connected", connected).await;

    conn.send_inbound(WsFrame::Ping(Bytes::from_static(b"hb")))
        .unwrap();
    conn.send_inbound(WsFrame::Binary(Bytes::from_static(&[0xc3, 0x28])))
        .unwrap();
    conn.send_inbound(WsFrame::Binary(Bytes::from_static(b"binary text")))
        .unwrap();
    conn.send_text("text").unwrap();

    wait_until(&manager, "two payloads", |s| s.messages_received == 2).await;
    assert_eq!(log.entries(), vec!["binary text", "text"]);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_channel_connects_with_literal_null() {
    let Harness {
        manager,
        mut server,
        ..
    } = spawn_with_identity(PageLocation::new("http://localhost:8000", "abc123"));
    manager.tell(StartFeed).send().await.unwrap();

    let attempt = server.next_attempt().await.unwrap();
    assert_eq!(
        attempt.url(),
        "ws://localhost:8000/ws/null?authorization=abc123"
    );
    let snapshot = manager.ask(GetFeedStatus).await.unwrap();
    assert_eq!(
        snapshot.url,
        "ws://localhost:8000/ws/null?authorization=abc123"
    );
}

#[tokio::test(start_paused = true)]
async fn start_is_single_flight() {
    let Harness {
        manager,
        mut server,
        ..
    } = spawn_manager();
    for _ in 0..5 {
        manager.tell(StartFeed).send().await.unwrap();
    }

    let attempt = server.next_attempt().await.expect("one attempt");
    let snapshot = manager.ask(GetFeedStatus).await.unwrap();
    assert_eq!(snapshot.connects_started, 1);
    assert_eq!(snapshot.state, ConnectionState::Connecting);
    assert!(server.try_next_attempt().is_none());

    let _conn = attempt.accept();
    wait_until(&manager, "connected", connected).await;
    manager.tell(StartFeed).send().await.unwrap();
    let snapshot = wait_until(&manager, "still connected", connected).await;
    assert_eq!(snapshot.connects_started, 1);
}

#[tokio::test(start_paused = true)]
async fn idle_manager_does_not_connect() {
    let Harness {
        manager,
        mut server,
        ..
    } = spawn_manager();

    let snapshot = manager.ask(GetFeedStatus).await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Idle);
    assert_eq!(snapshot.attempt_count, 0);
    assert!(
        server
            .next_attempt_timeout(Duration::from_secs(60))
            .await
            .is_none()
    );
}

#[tokio::test(start_paused = true)]
async fn stopping_the_manager_releases_the_connection() {
    let Harness {
        manager,
        mut server,
        ..
    } = spawn_manager();
    manager.tell(StartFeed).send().await.unwrap();

    let conn = server.next_attempt().await.unwrap().accept();
    wait_until(&manager, "connected", connected).await;
    assert!(!conn.is_released());

    manager.stop_gracefully().await.unwrap();
    manager.wait_for_shutdown().await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(conn.is_released());
    assert!(
        server
            .next_attempt_timeout(RETRY * 2)
            .await
            .is_none()
    );
}
