//! The transport link seam: one physical connection to one ring.
//!
//! [`TransportLink`] abstracts the radio so the session, multiplexer, and
//! scheduler can be driven identically by the real BlueZ transport
//! ([`crate::bluetooth::BleLink`]) and by the scriptable [`MockLink`] used
//! in tests.
//!
//! The link reports its lifecycle through a broadcast stream of
//! [`LinkEvent`]s and delivers inbound frames through a second broadcast
//! stream. Both are lazy and infinite: subscribers join at any time and the
//! streams end only when the link is dropped. I/O faults surface as events
//! (`Failed`), never as errors from `send` — the only send-time error is
//! [`RingdError::LinkUnavailable`](crate::error::RingdError::LinkUnavailable)
//! when no device is connected.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::types::DeviceIdentity;

/// Capacity of the frame and event broadcast channels.
///
/// Frames are tiny and consumed promptly by the multiplexer pump; lagging
/// receivers skip ahead rather than block the radio.
pub(crate) const CHANNEL_CAPACITY: usize = 64;

/// A link-state transition reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The connection was established.
    Up,
    /// A connect attempt did not establish a link.
    ConnectFailed {
        /// Transport-level description of the failure.
        reason: String,
    },
    /// An established connection ended — device-initiated or local.
    Down {
        /// Transport-level description of why the link went down.
        reason: String,
    },
    /// An I/O fault occurred mid-session. The link is unusable until the
    /// next connect.
    Failed {
        /// Transport-level description of the fault.
        reason: String,
    },
}

/// One physical connection to one ring.
///
/// Implementations own the radio; everything above them treats connection
/// lifecycle as events on the [`events`](TransportLink::events) stream.
#[async_trait]
pub trait TransportLink: Send + Sync {
    /// Begins connecting to the identified device.
    ///
    /// The outcome is reported on the event stream (`Up` or
    /// `ConnectFailed`); an `Err` return means the attempt could not even
    /// be started (bad address, unknown device).
    async fn connect(&self, identity: &DeviceIdentity) -> Result<()>;

    /// Tears down the connection. Emits `Down` when the link is closed.
    async fn disconnect(&self) -> Result<()>;

    /// Writes one command frame to the device.
    ///
    /// # Errors
    ///
    /// Fails with `LinkUnavailable` if no device is connected. Mid-send
    /// I/O faults are reported as a `Failed` event instead of an error.
    async fn send(&self, frame: &[u8]) -> Result<()>;

    /// Subscribes to the inbound frame stream.
    fn frames(&self) -> broadcast::Receiver<Vec<u8>>;

    /// Subscribes to link-state transition events.
    fn events(&self) -> broadcast::Receiver<LinkEvent>;
}

// =============================================================================
// MOCK LINK
// =============================================================================

#[cfg(any(test, feature = "mock-link"))]
pub use mock::MockLink;

#[cfg(any(test, feature = "mock-link"))]
mod mock {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::{LinkEvent, TransportLink, CHANNEL_CAPACITY};
    use crate::error::{Result, RingdError};
    use crate::types::DeviceIdentity;
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    /// Scriptable in-memory transport for tests.
    ///
    /// Records every frame written through `send` and lets tests inject
    /// inbound frames and link events as if the radio produced them.
    pub struct MockLink {
        connected: AtomicBool,
        fail_next_connect: AtomicBool,
        connects: AtomicUsize,
        sent: Mutex<Vec<Vec<u8>>>,
        frames_tx: broadcast::Sender<Vec<u8>>,
        events_tx: broadcast::Sender<LinkEvent>,
    }

    impl MockLink {
        /// Creates a disconnected mock link.
        #[must_use]
        pub fn new() -> Self {
            let (frames_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
            let (events_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
            Self {
                connected: AtomicBool::new(false),
                fail_next_connect: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                frames_tx,
                events_tx,
            }
        }

        /// Makes the next `connect` call report `ConnectFailed`.
        pub fn fail_next_connect(&self) {
            self.fail_next_connect.store(true, Ordering::SeqCst);
        }

        /// Number of times `connect` has been called.
        #[must_use]
        pub fn connect_calls(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        /// Frames written through `send`, oldest first.
        #[must_use]
        pub fn sent_frames(&self) -> Vec<Vec<u8>> {
            self.sent.lock().expect("sent frames lock").clone()
        }

        /// Injects an inbound frame as if the ring notified it.
        pub fn push_frame(&self, frame: Vec<u8>) {
            let _ = self.frames_tx.send(frame);
        }

        /// Simulates the device dropping the link.
        pub fn drop_link(&self, reason: &str) {
            self.connected.store(false, Ordering::SeqCst);
            let _ = self.events_tx.send(LinkEvent::Down {
                reason: reason.to_string(),
            });
        }

        /// Simulates a mid-session I/O fault.
        pub fn fault(&self, reason: &str) {
            self.connected.store(false, Ordering::SeqCst);
            let _ = self.events_tx.send(LinkEvent::Failed {
                reason: reason.to_string(),
            });
        }
    }

    impl Default for MockLink {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TransportLink for MockLink {
        async fn connect(&self, _identity: &DeviceIdentity) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_next_connect.swap(false, Ordering::SeqCst) {
                let _ = self.events_tx.send(LinkEvent::ConnectFailed {
                    reason: "mock connect failure".to_string(),
                });
                return Ok(());
            }
            self.connected.store(true, Ordering::SeqCst);
            let _ = self.events_tx.send(LinkEvent::Up);
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            if self.connected.swap(false, Ordering::SeqCst) {
                let _ = self.events_tx.send(LinkEvent::Down {
                    reason: "local disconnect".to_string(),
                });
            }
            Ok(())
        }

        async fn send(&self, frame: &[u8]) -> Result<()> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(RingdError::LinkUnavailable);
            }
            self.sent
                .lock()
                .expect("sent frames lock")
                .push(frame.to_vec());
            Ok(())
        }

        fn frames(&self) -> broadcast::Receiver<Vec<u8>> {
            self.frames_tx.subscribe()
        }

        fn events(&self) -> broadcast::Receiver<LinkEvent> {
            self.events_tx.subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_requires_connection() {
        let link = MockLink::new();
        let err = link.send(&[0x11]).await.unwrap_err();
        assert!(matches!(err, crate::error::RingdError::LinkUnavailable));
    }

    #[tokio::test]
    async fn test_connect_emits_up_event() {
        let link = MockLink::new();
        let mut events = link.events();

        link.connect(&DeviceIdentity::new("AA:BB:CC:DD:EE:FF"))
            .await
            .unwrap();

        assert_eq!(events.recv().await.unwrap(), LinkEvent::Up);
        link.send(&[0x11]).await.unwrap();
        assert_eq!(link.sent_frames(), vec![vec![0x11]]);
    }

    #[tokio::test]
    async fn test_failed_connect_emits_connect_failed() {
        let link = MockLink::new();
        let mut events = link.events();
        link.fail_next_connect();

        link.connect(&DeviceIdentity::new("AA:BB:CC:DD:EE:FF"))
            .await
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::ConnectFailed { .. }
        ));
        assert!(link.send(&[0x11]).await.is_err());
    }

    #[tokio::test]
    async fn test_drop_link_disconnects() {
        let link = MockLink::new();
        link.connect(&DeviceIdentity::new("AA:BB:CC:DD:EE:FF"))
            .await
            .unwrap();

        let mut events = link.events();
        link.drop_link("ring out of range");

        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::Down { .. }
        ));
        assert!(link.send(&[0x11]).await.is_err());
    }
}
