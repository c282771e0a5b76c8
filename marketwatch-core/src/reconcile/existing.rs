//! Existing-set loader.

use crate::domain::{InstrumentId, Interval};
use crate::storage::{ObservationStore, StorageError};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Slots in `[start, end]` that already hold at least one observation.
///
/// Stored timestamps are truncated to their slot, so several raw points in one
/// slot collapse. The query reaches down to the slot boundary at or below
/// `start` and up to the last second of the slot containing `end`.
pub fn load_existing(
    store: &dyn ObservationStore,
    instrument: InstrumentId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Interval,
) -> Result<BTreeSet<DateTime<Utc>>, StorageError> {
    if start > end {
        return Ok(BTreeSet::new());
    }
    let query_start = interval.truncate(start);
    let query_end = interval.truncate(end) + interval.duration() - Duration::seconds(1);
    let stamps = store.list_observations(instrument, query_start, query_end)?;
    Ok(stamps.into_iter().map(|ts| interval.truncate(ts)).collect())
}
