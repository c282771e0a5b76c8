//! Interval: the fixed sampling period of a price series.
//!
//! Slots are multiples of the interval counted from the Unix epoch (UTC), so
//! an hourly grid lands on `HH:00:00` and a daily grid on midnight UTC.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed positive sampling period, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    #[error("interval must be a positive number of seconds, got {0}")]
    NonPositive(i64),

    #[error("invalid interval '{0}' (expected e.g. 15m, 1h, 6h, 1d)")]
    Parse(String),
}

impl Interval {
    pub const MINUTE: Interval = Interval { secs: 60 };
    pub const HOUR: Interval = Interval { secs: 3_600 };
    pub const SIX_HOURS: Interval = Interval { secs: 21_600 };
    pub const DAY: Interval = Interval { secs: 86_400 };

    pub fn from_secs(secs: i64) -> Result<Self, IntervalError> {
        if secs <= 0 {
            return Err(IntervalError::NonPositive(secs));
        }
        Ok(Self { secs })
    }

    pub fn as_secs(&self) -> i64 {
        self.secs
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.secs)
    }

    /// Floor `ts` to the slot boundary at or below it.
    ///
    /// Sub-second precision is dropped.
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let floored = ts.timestamp().div_euclid(self.secs) * self.secs;
        DateTime::from_timestamp(floored, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Round `ts` up to the first slot boundary at or above it.
    pub fn ceil(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self.truncate(ts);
        if floor == ts {
            floor
        } else {
            floor + self.duration()
        }
    }

    pub fn is_aligned(&self, ts: DateTime<Utc>) -> bool {
        self.truncate(ts) == ts
    }

    /// Number of whole intervals from `from` to `to` (negative if `to < from`).
    pub fn steps_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        (to - from).num_seconds().div_euclid(self.secs)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.secs;
        if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3_600 == 0 {
            write!(f, "{}h", s / 3_600)
        } else if s % 60 == 0 {
            write!(f, "{}m", s / 60)
        } else {
            write!(f, "{s}s")
        }
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| IntervalError::Parse(s.to_string()))?;
        let (count, unit) = trimmed.split_at(split);
        let count: i64 = count
            .parse()
            .map_err(|_| IntervalError::Parse(s.to_string()))?;
        let unit_secs = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => return Err(IntervalError::Parse(s.to_string())),
        };
        let secs = count
            .checked_mul(unit_secs)
            .ok_or_else(|| IntervalError::Parse(s.to_string()))?;
        Self::from_secs(secs)
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn truncate_to_hour() {
        assert_eq!(Interval::HOUR.truncate(at(3, 42, 17)), at(3, 0, 0));
        assert_eq!(Interval::HOUR.truncate(at(3, 0, 0)), at(3, 0, 0));
    }

    #[test]
    fn truncate_drops_subseconds() {
        let ts = at(5, 0, 0) + Duration::milliseconds(250);
        assert_eq!(Interval::HOUR.truncate(ts), at(5, 0, 0));
        assert!(!Interval::HOUR.is_aligned(ts));
    }

    #[test]
    fn ceil_rounds_up_only_when_unaligned() {
        assert_eq!(Interval::HOUR.ceil(at(3, 0, 1)), at(4, 0, 0));
        assert_eq!(Interval::HOUR.ceil(at(3, 0, 0)), at(3, 0, 0));
    }

    #[test]
    fn six_hour_slots_count_from_epoch() {
        assert_eq!(Interval::SIX_HOURS.truncate(at(11, 59, 0)), at(6, 0, 0));
    }

    #[test]
    fn truncate_before_epoch_floors_downward() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 30, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(Interval::HOUR.truncate(ts), expected);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("1h".parse::<Interval>().unwrap(), Interval::HOUR);
        assert_eq!("6h".parse::<Interval>().unwrap(), Interval::SIX_HOURS);
        assert_eq!("1d".parse::<Interval>().unwrap(), Interval::DAY);
        assert_eq!("15m".parse::<Interval>().unwrap().as_secs(), 900);
        assert_eq!(Interval::DAY.to_string(), "1d");
        assert_eq!(Interval::from_secs(900).unwrap().to_string(), "15m");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("h".parse::<Interval>().is_err());
        assert!("10x".parse::<Interval>().is_err());
        assert!("0h".parse::<Interval>().is_err());
        assert!("60".parse::<Interval>().is_err());
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&Interval::HOUR).unwrap();
        assert_eq!(json, "\"1h\"");
        let back: Interval = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(back, Interval::DAY);
    }

    #[test]
    fn steps_between_counts_whole_intervals() {
        assert_eq!(Interval::HOUR.steps_between(at(0, 0, 0), at(5, 0, 0)), 5);
        assert_eq!(Interval::HOUR.steps_between(at(0, 0, 0), at(5, 59, 0)), 5);
    }
}
