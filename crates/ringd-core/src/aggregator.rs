//! Reading aggregator: the latest sample per metric since the last flush.
//!
//! The scheduler records every successful poll here; at flush time it takes
//! a snapshot of whatever was observed in the window. Held samples are
//! cleared on every snapshot, so a reading can never silently repeat into a
//! later snapshot after the device stopped answering for that metric.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{AggregateSnapshot, MetricKind, MetricSample};

/// Accumulates the most recent [`MetricSample`] per kind.
///
/// Last-write-wins per kind; access is serialized by the session (single
/// writer per metric kind).
#[derive(Debug, Default)]
pub struct ReadingAggregator {
    samples: HashMap<MetricKind, MetricSample>,
}

impl ReadingAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sample, replacing any earlier sample of the same kind.
    pub fn record(&mut self, sample: MetricSample) {
        self.samples.insert(sample.kind, sample);
    }

    /// Builds a snapshot from the held samples and clears them.
    ///
    /// Returns `None` when nothing was recorded since the last snapshot —
    /// callers must not persist an all-absent record.
    pub fn take_snapshot(&mut self, timestamp: DateTime<Utc>) -> Option<AggregateSnapshot> {
        if self.samples.is_empty() {
            return None;
        }

        let value = |kind: MetricKind| self.samples.get(&kind).map(|sample| sample.value);
        let snapshot = AggregateSnapshot {
            timestamp,
            heart_rate: value(MetricKind::HeartRate),
            steps: value(MetricKind::Steps),
            blood_oxygen: value(MetricKind::BloodOxygen),
        };
        self.samples.clear();
        Some(snapshot)
    }

    /// Discards all held samples without producing a snapshot. Called when
    /// a new session starts so a stale pre-disconnect reading cannot leak
    /// into the new session's first snapshot.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// `true` when no sample has been recorded since the last snapshot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
