//! Observation: one stored point of a price series.

use super::interval::Interval;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV point as returned by an upstream source (before slot truncation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Numeric fields of an observation.
///
/// Candle feeds fill every field and use the close as `price`; price-only
/// feeds leave the OHLCV columns empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationFields {
    pub price: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl ObservationFields {
    pub fn price_only(price: f64) -> Self {
        Self {
            price,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
        }
    }
}

/// A stored point keyed by (instrument, slot timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub fields: ObservationFields,
}

impl Observation {
    /// Build the observation for the slot a candle falls into.
    pub fn from_candle(candle: &Candle, interval: Interval) -> Self {
        Self {
            timestamp: interval.truncate(candle.timestamp),
            fields: ObservationFields {
                price: candle.close,
                open: Some(candle.open),
                high: Some(candle.high),
                low: Some(candle.low),
                close: Some(candle.close),
                volume: Some(candle.volume),
            },
        }
    }

    pub fn price_only(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            fields: ObservationFields::price_only(price),
        }
    }

    /// Close if present, otherwise the quoted price.
    pub fn close_or_price(&self) -> f64 {
        self.fields.close.unwrap_or(self.fields.price)
    }
}
