//! Gap extraction: grid minus stored slots, collapsed into maximal runs.

use crate::domain::{InstrumentId, Interval, MissingRange};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Grid slots absent from `existing`, preserving grid order.
pub fn missing_slots(
    grid: &[DateTime<Utc>],
    existing: &BTreeSet<DateTime<Utc>>,
) -> Vec<DateTime<Utc>> {
    grid.iter()
        .filter(|t| !existing.contains(t))
        .copied()
        .collect()
}

/// Collapse ascending slots into maximal runs of consecutive slots.
///
/// A new range starts whenever the distance to the previous slot is not
/// exactly one interval.
pub fn collapse_ranges<I>(instrument: InstrumentId, slots: I, interval: Interval) -> Vec<MissingRange>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let step = interval.duration();
    let mut ranges = Vec::new();
    let mut current: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

    for slot in slots {
        current = match current {
            Some((start, prev)) if slot - prev == step => Some((start, slot)),
            Some((start, prev)) => {
                ranges.push(MissingRange::new(instrument, start, prev));
                Some((slot, slot))
            }
            None => Some((slot, slot)),
        };
    }
    if let Some((start, end)) = current {
        ranges.push(MissingRange::new(instrument, start, end));
    }
    ranges
}

/// Missing slots of `grid` as maximal ranges.
pub fn extract_gaps(
    instrument: InstrumentId,
    grid: &[DateTime<Utc>],
    existing: &BTreeSet<DateTime<Utc>>,
    interval: Interval,
) -> Vec<MissingRange> {
    collapse_ranges(instrument, missing_slots(grid, existing), interval)
}
