//! Shared domain types: metric kinds, samples, snapshots, and link state.
//!
//! These types cross every layer of ringd — the multiplexer produces
//! [`MetricSample`]s, the aggregator folds them into [`AggregateSnapshot`]s,
//! and the session publishes [`LinkState`] to every collaborator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One of the biometric readings the ring can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Heart rate in beats per minute.
    HeartRate,
    /// Step count since the ring's daily reset.
    Steps,
    /// Blood oxygen saturation in percent.
    BloodOxygen,
}

impl MetricKind {
    /// Every metric kind the sampling scheduler tracks.
    pub const ALL: [Self; 3] = [Self::HeartRate, Self::Steps, Self::BloodOxygen];

    /// Stable snake_case name, used in API paths and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HeartRate => "heart_rate",
            Self::Steps => "steps",
            Self::BloodOxygen => "blood_oxygen",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heart_rate" => Ok(Self::HeartRate),
            "steps" => Ok(Self::Steps),
            "blood_oxygen" => Ok(Self::BloodOxygen),
            other => Err(format!("unknown metric kind: '{other}'")),
        }
    }
}

/// Opaque handle identifying one physical ring.
///
/// Wraps the Bluetooth MAC address produced by discovery. Immutable once
/// discovered; construction does not validate the address (the config layer
/// does that at the user-input boundary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceIdentity {
    address: String,
}

impl DeviceIdentity {
    /// Wraps a Bluetooth address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// The underlying Bluetooth address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Lifecycle state of the wireless link to the ring.
///
/// Owned exclusively by the session state machine; all other components
/// observe it through a watch channel and none mutate it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No link; ready for a connect intent.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Link established; commands may be issued.
    Connected,
    /// A disconnect intent is being carried out.
    Disconnecting,
    /// The transport reported an I/O fault mid-session. Ready for a new
    /// connect intent, like Disconnected.
    Failed,
}

impl LinkState {
    /// Whether a connect intent is accepted in this state.
    #[must_use]
    pub const fn accepts_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// Whether a transition to `next` is one of the legal state-machine
    /// edges. The session asserts this before every transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            // Connect intent accepted
            (Self::Disconnected | Self::Failed, Self::Connecting)
                // Link came up / connect attempt failed
                | (Self::Connecting, Self::Connected | Self::Disconnected)
                // Link lost, disconnect intent, or mid-session fault
                | (Self::Connected, Self::Disconnected | Self::Disconnecting | Self::Failed)
                // Orderly teardown finished
                | (Self::Disconnecting, Self::Disconnected)
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One successfully decoded reading from the ring.
///
/// Produced only by successful reply matching in the command multiplexer;
/// immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MetricSample {
    /// Which metric this reading is for.
    pub kind: MetricKind,
    /// The decoded value (bpm, step count, or percent).
    pub value: u32,
    /// When the reply was received (UTC).
    pub observed_at: DateTime<Utc>,
}

/// One persisted record combining the most recent readings across metric
/// kinds at a point in time.
///
/// Each field is optional because a sampling window may observe only a
/// subset of metrics. Written once to storage, then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AggregateSnapshot {
    /// When the snapshot was taken (UTC).
    pub timestamp: DateTime<Utc>,
    /// Latest heart rate observed in the window, if any.
    pub heart_rate: Option<u32>,
    /// Latest step count observed in the window, if any.
    pub steps: Option<u32>,
    /// Latest blood oxygen observed in the window, if any.
    pub blood_oxygen: Option<u32>,
}

impl AggregateSnapshot {
    /// `true` when no metric was observed in the window.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.heart_rate.is_none() && self.steps.is_none() && self.blood_oxygen.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_kind_round_trips_through_str() {
        for kind in MetricKind::ALL {
            assert_eq!(kind.as_str().parse::<MetricKind>().unwrap(), kind);
        }
        assert!("pulse".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_metric_kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&MetricKind::BloodOxygen).unwrap();
        assert_eq!(json, "\"blood_oxygen\"");
    }

    #[test]
    fn test_valid_transitions() {
        assert!(LinkState::Disconnected.can_transition_to(LinkState::Connecting));
        assert!(LinkState::Connecting.can_transition_to(LinkState::Connected));
        assert!(LinkState::Connected.can_transition_to(LinkState::Disconnecting));
        assert!(LinkState::Disconnecting.can_transition_to(LinkState::Disconnected));
        assert!(LinkState::Failed.can_transition_to(LinkState::Connecting));
    }

    #[test]
    fn test_invalid_transitions() {
        // Connected is never entered without passing through Connecting.
        assert!(!LinkState::Disconnected.can_transition_to(LinkState::Connected));
        assert!(!LinkState::Disconnecting.can_transition_to(LinkState::Connected));
        assert!(!LinkState::Disconnected.can_transition_to(LinkState::Disconnecting));
    }

    #[test]
    fn test_accepts_connect() {
        assert!(LinkState::Disconnected.accepts_connect());
        assert!(LinkState::Failed.accepts_connect());
        assert!(!LinkState::Connecting.accepts_connect());
        assert!(!LinkState::Connected.accepts_connect());
        assert!(!LinkState::Disconnecting.accepts_connect());
    }

    #[test]
    fn test_snapshot_is_empty() {
        let snapshot = AggregateSnapshot {
            timestamp: Utc::now(),
            heart_rate: None,
            steps: None,
            blood_oxygen: None,
        };
        assert!(snapshot.is_empty());

        let snapshot = AggregateSnapshot {
            heart_rate: Some(72),
            ..snapshot
        };
        assert!(!snapshot.is_empty());
    }
}
