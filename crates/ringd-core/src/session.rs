//! The device session: lifecycle owner for one ring connection.
//!
//! [`Session`] is the top-level controller. It is the sole writer of
//! [`LinkState`], drives the state machine from transport events, owns the
//! command multiplexer and the sampling scheduler, and fans out
//! [`SessionEvent`] notifications to UI collaborators.
//!
//! One session is constructed per device and passed by handle to everything
//! that needs it; there is no ambient global. Cloning a [`Session`] clones
//! the handle, not the session.
//!
//! ## State machine
//!
//! ```text
//! Disconnected --connect--> Connecting --link up--> Connected
//!      ^                        |                       |
//!      |<--- connect failed ----+                       |-- disconnect --> Disconnecting
//!      |                                                |                       |
//!      |<---------------- link lost --------------------+                       |
//!      |<----------------------------------------------------- link closed ----+
//! ```
//!
//! A connect intent while Connecting or Connected is an idempotent no-op.
//! Entering Connected starts the sampling scheduler; leaving Connected
//! stops it without waiting for in-flight requests — those self-resolve
//! through the multiplexer's link-loss path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::ReadingAggregator;
use crate::error::{Result, RingdError};
use crate::link::{LinkEvent, TransportLink};
use crate::mux::CommandMux;
use crate::sampler::Sampler;
use crate::storage::SnapshotStore;
use crate::types::{DeviceIdentity, LinkState, MetricKind, MetricSample};

/// Capacity of the session event broadcast channel.
const EVENT_CAPACITY: usize = 64;

/// Timing knobs for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often each tracked metric is polled while connected.
    pub poll_interval: Duration,
    /// How often accumulated readings are flushed to storage.
    pub flush_interval: Duration,
    /// Deadline for a single metric request.
    pub request_timeout: Duration,
    /// Deadline for a connect attempt to reach Connected.
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            flush_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// Notifications fanned out to UI collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The link state changed.
    StateChanged {
        /// The state just entered.
        state: LinkState,
    },
    /// A connect attempt did not establish a link.
    ConnectFailed {
        /// Transport-level description of the failure.
        reason: String,
    },
    /// A metric reading arrived.
    MetricUpdated {
        /// The fresh sample.
        sample: MetricSample,
    },
    /// An aggregate snapshot was persisted.
    SnapshotStored {
        /// Timestamp of the stored snapshot.
        timestamp: DateTime<Utc>,
    },
    /// Persisting a snapshot failed; sampling continues.
    StoreFailed {
        /// Description of the persistence failure.
        reason: String,
    },
}

/// Handle to one device session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    link: Arc<dyn TransportLink>,
    mux: CommandMux,
    store: Arc<dyn SnapshotStore>,
    config: SessionConfig,
    aggregator: Mutex<ReadingAggregator>,
    latest: Mutex<HashMap<MetricKind, MetricSample>>,
    device: Mutex<Option<DeviceIdentity>>,
    state_tx: watch::Sender<LinkState>,
    events_tx: broadcast::Sender<SessionEvent>,
    sampler: Mutex<Option<Sampler>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Creates a session over the given link and storage.
    ///
    /// Spawns the multiplexer pump and the session event loop; must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn new(
        link: Arc<dyn TransportLink>,
        store: Arc<dyn SnapshotStore>,
        config: SessionConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let mux = CommandMux::new(Arc::clone(&link));

        // Subscribe before anything can connect so no event is missed.
        let mux_frames = link.frames();
        let mux_events = link.events();
        let session_events = link.events();

        let inner = Arc::new(SessionInner {
            link,
            mux: mux.clone(),
            store,
            config,
            aggregator: Mutex::new(ReadingAggregator::new()),
            latest: Mutex::new(HashMap::new()),
            device: Mutex::new(None),
            state_tx,
            events_tx,
            sampler: Mutex::new(None),
            background: Mutex::new(Vec::new()),
        });

        let pump = tokio::spawn(mux.run(mux_frames, mux_events));
        let event_loop = tokio::spawn(SessionInner::event_loop(
            Arc::clone(&inner),
            session_events,
        ));
        inner
            .background
            .lock()
            .expect("background task lock")
            .extend([pump, event_loop]);

        Self { inner }
    }

    /// Current link state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        *self.inner.state_tx.borrow()
    }

    /// Watch channel following every link-state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribes to session notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// The device this session last connected (or tried to connect) to.
    #[must_use]
    pub fn device(&self) -> Option<DeviceIdentity> {
        self.inner.device.lock().expect("device lock").clone()
    }

    /// Latest known sample per metric kind, in [`MetricKind::ALL`] order.
    #[must_use]
    pub fn latest(&self) -> Vec<MetricSample> {
        let latest = self.inner.latest.lock().expect("latest sample lock");
        MetricKind::ALL
            .iter()
            .filter_map(|kind| latest.get(kind).cloned())
            .collect()
    }

    /// Connects to the identified ring.
    ///
    /// Resolves once the session reaches Connected. A connect intent while
    /// already Connecting or Connected is an idempotent no-op; only one
    /// connect attempt is ever in flight.
    ///
    /// # Errors
    ///
    /// `ConnectFailed` when the attempt does not establish a link within
    /// the configured connect timeout, plus address/device errors from the
    /// transport.
    pub async fn connect(&self, identity: DeviceIdentity) -> Result<()> {
        let inner = &self.inner;
        let accepted = inner.state_tx.send_if_modified(|state| {
            if state.accepts_connect() {
                *state = LinkState::Connecting;
                true
            } else {
                false
            }
        });
        if !accepted {
            debug!(state = %self.state(), "connect intent ignored");
            return Ok(());
        }
        inner.emit(SessionEvent::StateChanged {
            state: LinkState::Connecting,
        });
        info!(device = %identity, "connecting");

        *inner.device.lock().expect("device lock") = Some(identity.clone());
        // A fresh session starts an empty aggregation window; nothing
        // observed before the previous disconnect may leak into it.
        inner.aggregator.lock().expect("aggregator lock").clear();
        inner.latest.lock().expect("latest sample lock").clear();

        if let Err(err) = inner.link.connect(&identity).await {
            let reason = err.to_string();
            if inner.try_transition(LinkState::Connecting, LinkState::Disconnected) {
                inner.emit(SessionEvent::ConnectFailed {
                    reason: reason.clone(),
                });
            }
            return Err(err);
        }

        // The event loop lands on Connected or Disconnected; wait for it.
        let mut state_rx = inner.state_tx.subscribe();
        let outcome = tokio::time::timeout(
            inner.config.connect_timeout,
            state_rx.wait_for(|state| *state != LinkState::Connecting),
        )
        .await
        // Copy the state out of the watch `Ref` so the borrow guard is not
        // held across the `.await` points in the match arms below.
        .map(|res| res.map(|state| *state));

        match outcome {
            Ok(Ok(state)) if state == LinkState::Connected => Ok(()),
            Ok(_) => Err(RingdError::ConnectFailed {
                reason: "link did not come up".into(),
            }),
            Err(_) => {
                let _ = inner.link.disconnect().await;
                if inner.try_transition(LinkState::Connecting, LinkState::Disconnected) {
                    inner.emit(SessionEvent::ConnectFailed {
                        reason: "connect attempt timed out".into(),
                    });
                }
                Err(RingdError::ConnectFailed {
                    reason: "connect attempt timed out".into(),
                })
            }
        }
    }

    /// Disconnects from the ring.
    ///
    /// A disconnect intent while not Connected is a no-op. Does not wait
    /// for in-flight requests; they resolve through the multiplexer's
    /// link-loss path.
    pub async fn disconnect(&self) -> Result<()> {
        let inner = &self.inner;
        let accepted = inner.state_tx.send_if_modified(|state| {
            if *state == LinkState::Connected {
                *state = LinkState::Disconnecting;
                true
            } else {
                false
            }
        });
        if !accepted {
            return Ok(());
        }
        inner.emit(SessionEvent::StateChanged {
            state: LinkState::Disconnecting,
        });
        inner.stop_sampler();

        inner.link.disconnect().await?;

        let mut state_rx = inner.state_tx.subscribe();
        let closed = tokio::time::timeout(
            inner.config.connect_timeout,
            state_rx.wait_for(|state| *state == LinkState::Disconnected),
        )
        .await;
        if closed.is_err() {
            // The transport never confirmed the close; force the terminal
            // state rather than wedge in Disconnecting.
            warn!("disconnect not confirmed by transport; forcing Disconnected");
            inner.try_transition(LinkState::Disconnecting, LinkState::Disconnected);
        }
        Ok(())
    }

    /// Requests one metric right now, reusing the multiplexer path.
    ///
    /// This is the manual-refresh entry point; it coalesces with any poll
    /// the scheduler already has outstanding for the same kind.
    ///
    /// # Errors
    ///
    /// `LinkUnavailable` when not Connected, plus the request errors from
    /// [`CommandMux::request`].
    pub async fn request_metric(&self, kind: MetricKind) -> Result<MetricSample> {
        self.inner.poll_metric(kind).await
    }

    /// Stops background work: the sampler, the multiplexer pump, and the
    /// event loop. In-flight requests resolve with `LinkLost`.
    pub fn shutdown(&self) {
        self.inner.stop_sampler();
        for task in self
            .inner
            .background
            .lock()
            .expect("background task lock")
            .drain(..)
        {
            task.abort();
        }
    }
}

impl SessionInner {
    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; notifications are best-effort.
        let _ = self.events_tx.send(event);
    }

    /// Moves `from` → `to` if the session is currently in `from`.
    /// All LinkState writes are linearized through this method.
    fn try_transition(&self, from: LinkState, to: LinkState) -> bool {
        debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(%from, %to, "link state transition");
            self.emit(SessionEvent::StateChanged { state: to });
        }
        changed
    }

    async fn event_loop(inner: Arc<Self>, mut events: broadcast::Receiver<LinkEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => inner.handle_link_event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "link event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn handle_link_event(self: &Arc<Self>, event: LinkEvent) {
        match event {
            LinkEvent::Up => {
                if self.try_transition(LinkState::Connecting, LinkState::Connected) {
                    info!("connected");
                    self.start_sampler();
                }
            }
            LinkEvent::ConnectFailed { reason } => {
                if self.try_transition(LinkState::Connecting, LinkState::Disconnected) {
                    warn!(%reason, "connect failed");
                    self.emit(SessionEvent::ConnectFailed { reason });
                }
            }
            LinkEvent::Down { reason } => {
                self.stop_sampler();
                if self.try_transition(LinkState::Disconnecting, LinkState::Disconnected) {
                    info!("disconnected");
                } else if self.try_transition(LinkState::Connected, LinkState::Disconnected) {
                    warn!(%reason, "link lost");
                } else if self.try_transition(LinkState::Connecting, LinkState::Disconnected) {
                    self.emit(SessionEvent::ConnectFailed { reason });
                }
            }
            LinkEvent::Failed { reason } => {
                self.stop_sampler();
                if self.try_transition(LinkState::Connected, LinkState::Failed) {
                    warn!(%reason, "transport fault");
                } else if self.try_transition(LinkState::Connecting, LinkState::Disconnected) {
                    self.emit(SessionEvent::ConnectFailed { reason });
                }
            }
        }
    }

    fn start_sampler(self: &Arc<Self>) {
        let mut slot = self.sampler.lock().expect("sampler lock");
        if slot.is_none() {
            *slot = Some(Sampler::start(Arc::clone(self)));
        }
    }

    fn stop_sampler(&self) {
        if let Some(sampler) = self.sampler.lock().expect("sampler lock").take() {
            sampler.stop();
        }
    }

    /// Issues one metric request and records the result.
    pub(crate) async fn poll_metric(&self, kind: MetricKind) -> Result<MetricSample> {
        if *self.state_tx.borrow() != LinkState::Connected {
            return Err(RingdError::LinkUnavailable);
        }

        let value = self.mux.request(kind, self.config.request_timeout).await?;
        let sample = MetricSample {
            kind,
            value,
            observed_at: Utc::now(),
        };
        self.aggregator
            .lock()
            .expect("aggregator lock")
            .record(sample.clone());
        self.latest
            .lock()
            .expect("latest sample lock")
            .insert(kind, sample.clone());
        self.emit(SessionEvent::MetricUpdated {
            sample: sample.clone(),
        });
        Ok(sample)
    }

    /// Persists the current aggregation window, if any.
    ///
    /// Flushes are SUPPRESSED — not deferred — while the session is not
    /// Connected, even if samples were recorded just before a disconnect.
    pub(crate) fn flush_once(&self) {
        if *self.state_tx.borrow() != LinkState::Connected {
            return;
        }

        let snapshot = self
            .aggregator
            .lock()
            .expect("aggregator lock")
            .take_snapshot(Utc::now());
        let Some(snapshot) = snapshot else { return };

        match self.store.insert(&snapshot) {
            Ok(()) => {
                debug!(timestamp = %snapshot.timestamp, "snapshot stored");
                self.emit(SessionEvent::SnapshotStored {
                    timestamp: snapshot.timestamp,
                });
            }
            Err(err) => {
                // Surfaced to subscribers; the flush loop keeps running.
                warn!(%err, "failed to persist snapshot");
                self.emit(SessionEvent::StoreFailed {
                    reason: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::link::MockLink;
    use crate::storage::Storage;
    use chrono::TimeZone;

    fn test_identity() -> DeviceIdentity {
        DeviceIdentity::new("AA:BB:CC:DD:EE:FF")
    }

    fn test_session() -> (Arc<MockLink>, Storage, Session, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let link = Arc::new(MockLink::new());
        let session = Session::new(
            Arc::clone(&link) as Arc<dyn TransportLink>,
            Arc::new(storage.clone()),
            SessionConfig {
                poll_interval: Duration::from_secs(3600),
                flush_interval: Duration::from_secs(3600),
                request_timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(5),
            },
        );
        (link, storage, session, dir)
    }

    #[tokio::test]
    async fn test_connect_passes_through_connecting() {
        let (_link, _storage, session, _dir) = test_session();
        let mut events = session.subscribe();

        session.connect(test_identity()).await.unwrap();
        assert_eq!(session.state(), LinkState::Connected);

        // The notification stream shows the full path, in order.
        let mut states = Vec::new();
        while states.len() < 2 {
            if let SessionEvent::StateChanged { state } = events.recv().await.unwrap() {
                states.push(state);
            }
        }
        assert_eq!(states, vec![LinkState::Connecting, LinkState::Connected]);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_while_connected() {
        let (link, _storage, session, _dir) = test_session();

        session.connect(test_identity()).await.unwrap();
        session.connect(test_identity()).await.unwrap();

        assert_eq!(session.state(), LinkState::Connected);
        assert_eq!(link.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_reports_and_returns_to_disconnected() {
        let (link, _storage, session, _dir) = test_session();
        link.fail_next_connect();
        let mut events = session.subscribe();

        let err = session.connect(test_identity()).await.unwrap_err();
        assert!(matches!(err, RingdError::ConnectFailed { .. }));
        assert_eq!(session.state(), LinkState::Disconnected);

        let mut saw_connect_failed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::ConnectFailed { .. }) {
                saw_connect_failed = true;
            }
        }
        assert!(saw_connect_failed);

        // The session recovers: a new connect intent is accepted.
        session.connect(test_identity()).await.unwrap();
        assert_eq!(session.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_disconnect_intent_walks_through_disconnecting() {
        let (_link, _storage, session, _dir) = test_session();
        session.connect(test_identity()).await.unwrap();
        let mut events = session.subscribe();

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), LinkState::Disconnected);

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::StateChanged { state } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![LinkState::Disconnecting, LinkState::Disconnected]
        );

        // Disconnect when already disconnected is a no-op.
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_request_metric_requires_connected() {
        let (_link, _storage, session, _dir) = test_session();
        let err = session.request_metric(MetricKind::HeartRate).await.unwrap_err();
        assert!(matches!(err, RingdError::LinkUnavailable));
    }

    /// Resolves the scheduler's immediate on-connect polls so later test
    /// steps cannot race with them.
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

    #[tokio::test]
    async fn test_request_metric_records_latest_and_notifies() {
        let (link, _storage, session, _dir) = test_session();
        session.connect(test_identity()).await.unwrap();
        settle_initial_polls(&link, &session).await;
        let frames_before = link.sent_frames().len();
        let mut events = session.subscribe();

        let request = tokio::spawn({
            let session = session.clone();
            async move { session.request_metric(MetricKind::HeartRate).await }
        });
        while link.sent_frames().len() == frames_before {
            tokio::task::yield_now().await;
        }
        link.push_frame(codec::encode_reply(MetricKind::HeartRate, 72));

        let sample = request.await.unwrap().unwrap();
        assert_eq!(sample.value, 72);

        let latest = session.latest();
        let heart_rate = latest
            .iter()
            .find(|sample| sample.kind == MetricKind::HeartRate)
            .unwrap();
        assert_eq!(heart_rate.value, 72);

        let mut saw_update = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::MetricUpdated { sample } = event {
                assert_eq!(sample.value, 72);
                saw_update = true;
            }
        }
        assert!(saw_update);
    }

    #[tokio::test]
    async fn test_link_loss_moves_to_disconnected_and_accepts_reconnect() {
        let (link, _storage, session, _dir) = test_session();
        session.connect(test_identity()).await.unwrap();

        let mut state_rx = session.watch_state();
        link.drop_link("ring out of range");
        state_rx
            .wait_for(|state| *state == LinkState::Disconnected)
            .await
            .unwrap();

        // A fresh connect intent is accepted, not rejected as a duplicate.
        session.connect(test_identity()).await.unwrap();
        assert_eq!(session.state(), LinkState::Connected);
        assert_eq!(link.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_transport_fault_enters_failed_then_recovers() {
        let (link, _storage, session, _dir) = test_session();
        session.connect(test_identity()).await.unwrap();

        let mut state_rx = session.watch_state();
        link.fault("GATT write error");
        state_rx
            .wait_for(|state| *state == LinkState::Failed)
            .await
            .unwrap();

        session.connect(test_identity()).await.unwrap();
        assert_eq!(session.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_flush_suppressed_while_not_connected() {
        let (link, storage, session, _dir) = test_session();
        session.connect(test_identity()).await.unwrap();

        // Observe readings, then lose the link before any flush.
        settle_initial_polls(&link, &session).await;

        let mut state_rx = session.watch_state();
        link.drop_link("ring out of range");
        state_rx
            .wait_for(|state| *state == LinkState::Disconnected)
            .await
            .unwrap();

        // The flush is suppressed, not deferred: nothing reaches storage.
        session.inner.flush_once();
        let stored = storage
            .query_from(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert!(stored.is_empty());
    }
}
