//! Expected-grid generator.

use crate::domain::Interval;
use chrono::{DateTime, Duration, Utc};

/// Every interval-aligned instant `t` with `start <= t <= end`, ascending.
///
/// An unaligned `start` rounds up to the next boundary. `start > end` gives an
/// empty grid.
pub fn expected_grid(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Interval,
) -> Vec<DateTime<Utc>> {
    if start > end {
        return Vec::new();
    }
    let first = interval.ceil(start);
    if first > end {
        return Vec::new();
    }
    let count = interval.steps_between(first, end) + 1;
    let step = interval.as_secs();
    (0..count)
        .map(|i| first + Duration::seconds(step * i))
        .collect()
}
