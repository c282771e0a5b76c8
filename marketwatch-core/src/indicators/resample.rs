//! Resample an intraday series to one close per UTC day.

use crate::domain::Observation;
use chrono::NaiveDate;

/// Last close of each UTC calendar day, ascending by date.
///
/// Input must be ascending by timestamp.
pub fn daily_closes(observations: &[Observation]) -> Vec<(NaiveDate, f64)> {
    let mut out: Vec<(NaiveDate, f64)> = Vec::new();
    for obs in observations {
        let day = obs.timestamp.date_naive();
        let close = obs.close_or_price();
        match out.last_mut() {
            Some((last_day, last_close)) if *last_day == day => *last_close = close,
            _ => out.push((day, close)),
        }
    }
    out
}
