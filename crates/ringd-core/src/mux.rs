//! Command multiplexer: typed requests over the single physical link.
//!
//! The ring services one outstanding request per metric kind, and replies
//! arrive asynchronously on the notify characteristic in whatever order the
//! firmware produces them. [`CommandMux`] bridges that to an async
//! request/reply API:
//!
//! - Concurrent callers asking for the same metric COALESCE onto one
//!   outstanding request — exactly one frame per metric kind is ever on the
//!   air, and every waiter receives the same resolved value. (The
//!   alternative, rejecting duplicates as busy, would force the scheduler
//!   and manual-refresh callers to race each other.)
//! - Replies are matched by reply signature ([`codec::decode_reply`]), not
//!   send order, so interleaved replies for different metrics resolve the
//!   right waiters.
//! - Every request has a deadline; on expiry all waiters resolve with
//!   `TimedOut` and the slot is cleared.
//! - When the link leaves the connected state, every outstanding request
//!   resolves with `LinkLost` immediately. Nothing is left hanging.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::codec;
use crate::error::{Result, RingdError};
use crate::link::{LinkEvent, TransportLink};
use crate::types::MetricKind;

/// Why a pending request was resolved without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestFailure {
    TimedOut,
    LinkLost,
    Unavailable,
}

impl RequestFailure {
    fn into_error(self, kind: MetricKind) -> RingdError {
        match self {
            Self::TimedOut => RingdError::TimedOut { kind },
            Self::LinkLost => RingdError::LinkLost,
            Self::Unavailable => RingdError::LinkUnavailable,
        }
    }
}

type Outcome = std::result::Result<u32, RequestFailure>;

/// One in-flight request for a metric kind, shared by every coalesced
/// caller. Created on dispatch; destroyed on matching reply, timeout, or
/// link loss — whichever comes first.
struct Pending {
    /// Distinguishes this dispatch generation from a successor for the
    /// same kind, so a stale deadline cannot resolve a newer request.
    request_id: Uuid,
    issued_at: Instant,
    waiters: Vec<oneshot::Sender<Outcome>>,
}

type PendingMap = Mutex<HashMap<MetricKind, Pending>>;

/// Multiplexes typed metric requests over one [`TransportLink`].
///
/// The mux is the sole writer to the link's send path; the session and the
/// sampling scheduler both issue their reads through it. Cloning is cheap
/// and clones share the same pending-request table.
#[derive(Clone)]
pub struct CommandMux {
    link: Arc<dyn TransportLink>,
    pending: Arc<PendingMap>,
}

impl CommandMux {
    /// Creates a multiplexer over the given link.
    #[must_use]
    pub fn new(link: Arc<dyn TransportLink>) -> Self {
        Self {
            link,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Requests one metric from the ring, resolving with the decoded value
    /// or a link-level error.
    ///
    /// If a request for `kind` is already outstanding, this call attaches
    /// to it instead of sending another frame and resolves with the same
    /// outcome.
    ///
    /// # Errors
    ///
    /// - `LinkUnavailable` — the link was not connected at dispatch time
    /// - `TimedOut` — no reply within `timeout`
    /// - `LinkLost` — the link left the connected state mid-request
    pub async fn request(&self, kind: MetricKind, timeout: Duration) -> Result<u32> {
        let (rx, dispatch_id) = {
            let mut pending = self.pending.lock().expect("pending request lock");
            let (tx, rx) = oneshot::channel();
            match pending.entry(kind) {
                Entry::Occupied(mut entry) => {
                    trace!(metric = %kind, "coalescing onto outstanding request");
                    entry.get_mut().waiters.push(tx);
                    (rx, None)
                }
                Entry::Vacant(slot) => {
                    let request_id = Uuid::new_v4();
                    slot.insert(Pending {
                        request_id,
                        issued_at: Instant::now(),
                        waiters: vec![tx],
                    });
                    (rx, Some(request_id))
                }
            }
        };

        if let Some(request_id) = dispatch_id {
            if let Err(err) = self.link.send(&codec::encode_request(kind)).await {
                // Dispatch never made it onto the air; callers that
                // attached in the meantime fail with us.
                Self::resolve(
                    &self.pending,
                    kind,
                    Some(request_id),
                    Err(RequestFailure::Unavailable),
                );
                return Err(err);
            }

            let pending = Arc::clone(&self.pending);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                Self::resolve(&pending, kind, Some(request_id), Err(RequestFailure::TimedOut));
            });
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failure)) => Err(failure.into_error(kind)),
            // The pump dropped the table without resolving: session teardown.
            Err(_) => Err(RingdError::LinkLost),
        }
    }

    /// Number of metric kinds with an outstanding request.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pending.lock().expect("pending request lock").len()
    }

    /// Number of callers attached to the outstanding request for `kind`
    /// (zero when none is outstanding).
    #[must_use]
    pub fn waiters(&self, kind: MetricKind) -> usize {
        self.pending
            .lock()
            .expect("pending request lock")
            .get(&kind)
            .map_or(0, |entry| entry.waiters.len())
    }

    /// Drives reply matching and link-loss cancellation until the link's
    /// streams close. The session spawns this once per mux.
    pub async fn run(
        self,
        mut frames: broadcast::Receiver<Vec<u8>>,
        mut events: broadcast::Receiver<LinkEvent>,
    ) {
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(frame) => self.on_frame(&frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "inbound frame stream lagged; replies dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = events.recv() => match event {
                    Ok(LinkEvent::Up) => {}
                    Ok(_) => self.fail_all(),
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // A dropped event may have been a Down; outstanding
                        // requests cannot be trusted to ever resolve.
                        self.fail_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        self.fail_all();
    }

    /// Matches one inbound frame against the pending table.
    fn on_frame(&self, frame: &[u8]) {
        let Some((kind, value)) = codec::decode_reply(frame) else {
            trace!(len = frame.len(), "ignoring non-reply frame");
            return;
        };
        Self::resolve(&self.pending, kind, None, Ok(value));
    }

    /// Resolves every outstanding request with `LinkLost`.
    fn fail_all(&self) {
        let drained: Vec<Pending> = {
            let mut pending = self.pending.lock().expect("pending request lock");
            pending.drain().map(|(_, entry)| entry).collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelling outstanding requests: link lost");
        }
        for entry in drained {
            for waiter in entry.waiters {
                let _ = waiter.send(Err(RequestFailure::LinkLost));
            }
        }
    }

    /// Removes the pending entry for `kind` (when `expected_id` still
    /// matches, if given) and resolves all of its waiters with `outcome`.
    fn resolve(
        pending: &PendingMap,
        kind: MetricKind,
        expected_id: Option<Uuid>,
        outcome: Outcome,
    ) {
        let entry = {
            let mut pending = pending.lock().expect("pending request lock");
            match pending.get(&kind) {
                Some(current) if expected_id.map_or(true, |id| id == current.request_id) => {
                    pending.remove(&kind)
                }
                _ => None,
            }
        };

        let Some(entry) = entry else { return };
        trace!(
            metric = %kind,
            elapsed_ms = entry.issued_at.elapsed().as_millis() as u64,
            waiters = entry.waiters.len(),
            ok = outcome.is_ok(),
            "request resolved"
        );
        for waiter in entry.waiters {
            let _ = waiter.send(outcome);
        }
    }
}
