//! Sampling scheduler: periodic polls and periodic flushes while connected.
//!
//! One poll loop runs per tracked metric kind so a slow or hung request for
//! one metric never delays the others, and a separate flush loop persists
//! the aggregation window. All loops are plain interval tasks tied to the
//! session's Connected span: started on entering Connected, aborted on
//! leaving it. Aborting does not wait for in-flight requests — those
//! resolve through the multiplexer's link-loss path.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::session::SessionInner;
use crate::types::MetricKind;

/// Handle to the running poll and flush loops.
pub(crate) struct Sampler {
    tasks: Vec<JoinHandle<()>>,
}

impl Sampler {
    /// Spawns one poll loop per metric kind plus the flush loop.
    pub(crate) fn start(inner: Arc<SessionInner>) -> Self {
        let mut tasks = Vec::with_capacity(MetricKind::ALL.len() + 1);

        for kind in MetricKind::ALL {
            let inner = Arc::clone(&inner);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(inner.config().poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    // First tick fires immediately: poll on connect, then
                    // every poll_interval.
                    ticker.tick().await;
                    match inner.poll_metric(kind).await {
                        Ok(sample) => {
                            trace!(metric = %kind, value = sample.value, "poll complete");
                        }
                        // The mux never retries; the next tick simply tries again.
                        Err(err) if err.is_recoverable() => {
                            debug!(metric = %kind, %err, "poll failed; retrying next tick");
                        }
                        Err(err) => warn!(metric = %kind, %err, "poll failed"),
                    }
                }
            }));
        }

        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config().flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the immediate first tick; the first flush happens a full
            // interval after connect.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.flush_once();
            }
        }));

        Self { tasks }
    }

    /// Aborts all loops. Called on leaving Connected.
    pub(crate) fn stop(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::link::MockLink;
    use crate::session::{Session, SessionConfig};
    use crate::storage::{SnapshotStore, Storage};
    use crate::types::DeviceIdentity;
    use crate::TransportLink;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn epoch() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_start_on_connect_and_flush_persists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let link = Arc::new(MockLink::new());
        let session = Session::new(
            Arc::clone(&link) as Arc<dyn TransportLink>,
            Arc::new(storage.clone()),
            SessionConfig {
                poll_interval: Duration::from_secs(10),
                flush_interval: Duration::from_secs(30),
                request_timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(5),
            },
        );

        session
            .connect(DeviceIdentity::new("AA:BB:CC:DD:EE:FF"))
            .await
            .unwrap();

        // Every tracked metric is polled immediately on connect.
        while link.sent_frames().len() < MetricKind::ALL.len() {
            tokio::task::yield_now().await;
        }

        // The ring answers heart rate; the other metrics stay silent and
        // their requests time out.
        link.push_frame(codec::encode_reply(MetricKind::HeartRate, 72));

        // Cross the flush interval.
        tokio::time::sleep(Duration::from_secs(31)).await;

        let stored = storage.query_from(epoch()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].heart_rate, Some(72));
        assert_eq!(stored[0].steps, None);
        assert_eq!(stored[0].blood_oxygen, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_stops_on_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let link = Arc::new(MockLink::new());
        let session = Session::new(
            Arc::clone(&link) as Arc<dyn TransportLink>,
            Arc::new(storage.clone()),
            SessionConfig {
                poll_interval: Duration::from_secs(10),
                flush_interval: Duration::from_secs(30),
                request_timeout: Duration::from_secs(5),
                connect_timeout: Duration::from_secs(5),
            },
        );

        session
            .connect(DeviceIdentity::new("AA:BB:CC:DD:EE:FF"))
            .await
            .unwrap();
        while link.sent_frames().len() < MetricKind::ALL.len() {
            tokio::task::yield_now().await;
        }
        link.push_frame(codec::encode_reply(MetricKind::HeartRate, 72));

        session.disconnect().await.unwrap();
        let frames_after_disconnect = link.sent_frames().len();

        // Time passes; no polls and no flushes happen while disconnected.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(link.sent_frames().len(), frames_after_disconnect);
        assert!(storage.query_from(epoch()).unwrap().is_empty());
    }
}
