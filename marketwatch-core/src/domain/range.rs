//! Missing range: a maximal run of absent slots.

use super::instrument::InstrumentId;
use super::interval::Interval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive, interval-aligned run of slots with no stored observation.
///
/// Transient: recomputed from storage on every reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissingRange {
    pub instrument_id: InstrumentId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MissingRange {
    pub fn new(instrument_id: InstrumentId, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "range start must not exceed end");
        Self {
            instrument_id,
            start,
            end,
        }
    }

    /// A range covering exactly one slot.
    pub fn single(instrument_id: InstrumentId, slot: DateTime<Utc>) -> Self {
        Self::new(instrument_id, slot, slot)
    }

    pub fn slot_count(&self, interval: Interval) -> usize {
        (interval.steps_between(self.start, self.end) + 1).max(0) as usize
    }

    /// Materialize the range back into its constituent slots.
    pub fn slots(&self, interval: Interval) -> Vec<DateTime<Utc>> {
        let step = interval.duration();
        let mut out = Vec::with_capacity(self.slot_count(interval));
        let mut t = self.start;
        while t <= self.end {
            out.push(t);
            t += step;
        }
        out
    }
}

impl fmt::Display for MissingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "instrument {} [{} .. {}]",
            self.instrument_id,
            self.start.format("%Y-%m-%dT%H:%M"),
            self.end.format("%Y-%m-%dT%H:%M")
        )
    }
}
