//! End-to-end session scenarios over the mock transport.
//!
//! These tests drive the public API the way the server does: connect
//! intents, manual refreshes, link loss, and the periodic flush, with the
//! mock link standing in for the ring.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use ringd_core::{
    codec, DeviceIdentity, LinkState, MetricKind, MockLink, RingdError, Session, SessionConfig,
    SnapshotStore, Storage, TransportLink,
};

fn identity() -> DeviceIdentity {
    DeviceIdentity::new("AA:BB:CC:DD:EE:FF")
}

fn epoch() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
}

fn session_fixture(
    poll_secs: u64,
    flush_secs: u64,
) -> (Arc<MockLink>, Storage, Session, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path().to_path_buf());
    let link = Arc::new(MockLink::new());
    let session = Session::new(
        Arc::clone(&link) as Arc<dyn TransportLink>,
        Arc::new(storage.clone()),
        SessionConfig {
            poll_interval: Duration::from_secs(poll_secs),
            flush_interval: Duration::from_secs(flush_secs),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        },
    );
    (link, storage, session, dir)
}

/// Answers the burst of polls the scheduler issues at connect, so a later
/// manual refresh cannot coalesce with them.
async fn settle_initial_polls(link: &MockLink, session: &Session) {
    while link.sent_frames().len() < MetricKind::ALL.len() {
        tokio::task::yield_now().await;
    }
    link.push_frame(codec::encode_reply(MetricKind::HeartRate, 70));
    link.push_frame(codec::encode_reply(MetricKind::Steps, 1_000));
    link.push_frame(codec::encode_reply(MetricKind::BloodOxygen, 97));
    while session.latest().len() < MetricKind::ALL.len() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn partial_window_persists_only_observed_metrics() {
    // Connect succeeds, heart rate answers 72, steps and blood oxygen time
    // out; the flush persists a snapshot with only heart rate set.
    let (link, storage, session, _dir) = session_fixture(3600, 30);

    session.connect(identity()).await.unwrap();
    assert_eq!(session.state(), LinkState::Connected);

    while link.sent_frames().len() < MetricKind::ALL.len() {
        tokio::task::yield_now().await;
    }
    link.push_frame(codec::encode_reply(MetricKind::HeartRate, 72));

    tokio::time::sleep(Duration::from_secs(31)).await;

    let stored = storage.query_from(epoch()).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].heart_rate, Some(72));
    assert_eq!(stored[0].steps, None);
    assert_eq!(stored[0].blood_oxygen, None);
}

#[tokio::test]
async fn concurrent_manual_refreshes_share_one_frame() {
    // Two manual refreshes for the same metric before any reply: exactly
    // one frame is sent and both callers receive the same resolved value.
    let (link, _storage, session, _dir) = session_fixture(3600, 3600);
    session.connect(identity()).await.unwrap();
    settle_initial_polls(&link, &session).await;
    let polls_at_connect = link.sent_frames().len();

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.request_metric(MetricKind::HeartRate).await }
    });
    let second = tokio::spawn({
        let session = session.clone();
        async move { session.request_metric(MetricKind::HeartRate).await }
    });

    // Wait until one caller dispatched, then give the other caller time to
    // attach before the reply lands.
    while link.sent_frames().len() == polls_at_connect {
        tokio::task::yield_now().await;
    }
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    link.push_frame(codec::encode_reply(MetricKind::HeartRate, 64));

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.value, 64);
    assert_eq!(second.value, 64);

    let manual_frames: Vec<_> = link.sent_frames()[polls_at_connect..].to_vec();
    assert_eq!(manual_frames.len(), 1);
}

#[tokio::test]
async fn link_loss_fails_inflight_request_and_allows_reconnect() {
    // Link-lost arrives mid-request: the in-flight request resolves with
    // LinkLost, the state becomes Disconnected, and a subsequent connect
    // intent is accepted.
    let (link, _storage, session, _dir) = session_fixture(3600, 3600);
    session.connect(identity()).await.unwrap();
    settle_initial_polls(&link, &session).await;
    let polls_at_connect = link.sent_frames().len();

    let inflight = tokio::spawn({
        let session = session.clone();
        async move { session.request_metric(MetricKind::BloodOxygen).await }
    });
    while link.sent_frames().len() == polls_at_connect {
        tokio::task::yield_now().await;
    }

    let mut state_rx = session.watch_state();
    link.drop_link("ring out of range");

    let err = inflight.await.unwrap().unwrap_err();
    assert!(matches!(err, RingdError::LinkLost), "got {err:?}");

    state_rx
        .wait_for(|state| *state == LinkState::Disconnected)
        .await
        .unwrap();

    session.connect(identity()).await.unwrap();
    assert_eq!(session.state(), LinkState::Connected);
}

#[tokio::test(start_paused = true)]
async fn nothing_persists_after_disconnect() {
    // Samples recorded just before a disconnect never reach storage: the
    // flush is suppressed while the session is not Connected.
    let (link, storage, session, _dir) = session_fixture(3600, 30);
    session.connect(identity()).await.unwrap();

    while link.sent_frames().len() < MetricKind::ALL.len() {
        tokio::task::yield_now().await;
    }
    link.push_frame(codec::encode_reply(MetricKind::HeartRate, 72));

    // Lose the link before the first flush interval elapses.
    let mut state_rx = session.watch_state();
    link.drop_link("ring out of range");
    state_rx
        .wait_for(|state| *state == LinkState::Disconnected)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(storage.query_from(epoch()).unwrap().is_empty());
}

#[tokio::test]
async fn full_lifecycle_walks_the_state_machine() {
    let (link, _storage, session, _dir) = session_fixture(3600, 3600);
    let mut events = session.subscribe();

    session.connect(identity()).await.unwrap();
    session.disconnect().await.unwrap();

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ringd_core::SessionEvent::StateChanged { state } = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![
            LinkState::Connecting,
            LinkState::Connected,
            LinkState::Disconnecting,
            LinkState::Disconnected,
        ]
    );
    assert_eq!(link.connect_calls(), 1);
}
