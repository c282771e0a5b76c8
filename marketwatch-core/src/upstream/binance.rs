//! Binance spot klines.
//!
//! `GET /api/v3/klines?symbol=..&interval=..&startTime=..&endTime=..&limit=..`
//! returns rows `[openTime, "open", "high", "low", "close", "volume", ...]`
//! with millisecond times and string prices, oldest first. One request per
//! call: a window wider than `limit` candles comes back truncated and the
//! paginated backfill policy asks again from where the page stopped.

use super::circuit_breaker::CircuitBreaker;
use super::http::{JsonClient, DEFAULT_TIMEOUT};
use super::{UpstreamError, UpstreamSource};
use crate::domain::{Candle, Interval};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

const BASE_URL: &str = "https://api.binance.com";

/// Largest page Binance serves.
pub const MAX_LIMIT: usize = 1_000;

pub struct BinanceSource {
    http: JsonClient,
    base_url: String,
    limit: usize,
}

impl BinanceSource {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: JsonClient::new("binance", breaker, DEFAULT_TIMEOUT)?,
            base_url: BASE_URL.to_string(),
            limit: MAX_LIMIT,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Candles per request, clamped to `1..=1000`.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, MAX_LIMIT);
        self
    }

    fn klines_url(&self) -> String {
        format!("{}/api/v3/klines", self.base_url.trim_end_matches('/'))
    }
}

/// `XRP-EUR` -> `XRPEUR`.
pub fn market_symbol(pair: &str) -> String {
    pair.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Kline interval code for `interval`, if Binance serves it.
pub fn interval_code(interval: Interval) -> Option<&'static str> {
    let code = match interval.as_secs() {
        60 => "1m",
        300 => "5m",
        900 => "15m",
        1_800 => "30m",
        3_600 => "1h",
        7_200 => "2h",
        14_400 => "4h",
        21_600 => "6h",
        43_200 => "12h",
        86_400 => "1d",
        _ => return None,
    };
    Some(code)
}

fn number(row: &[Value], idx: usize) -> Result<f64, UpstreamError> {
    let value = row.get(idx).ok_or_else(|| {
        UpstreamError::ResponseFormatChanged(format!("kline row has no column {idx}"))
    })?;
    match value {
        Value::String(s) => s.parse::<f64>().map_err(|e| {
            UpstreamError::ResponseFormatChanged(format!("column {idx} is not numeric ({s}): {e}"))
        }),
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            UpstreamError::ResponseFormatChanged(format!("column {idx} out of range: {n}"))
        }),
        other => Err(UpstreamError::ResponseFormatChanged(format!(
            "column {idx} has unexpected type: {other}"
        ))),
    }
}

/// Decode kline rows into ascending, de-duplicated candles.
pub fn parse_klines(rows: Vec<Vec<Value>>) -> Result<Vec<Candle>, UpstreamError> {
    let mut candles = Vec::with_capacity(rows.len());
    for row in &rows {
        let open_ms = row.first().and_then(Value::as_i64).ok_or_else(|| {
            UpstreamError::ResponseFormatChanged("kline row missing open time".into())
        })?;
        let timestamp = DateTime::from_timestamp_millis(open_ms).ok_or_else(|| {
            UpstreamError::ResponseFormatChanged(format!("invalid kline open time: {open_ms}"))
        })?;
        candles.push(Candle {
            timestamp,
            open: number(row, 1)?,
            high: number(row, 2)?,
            low: number(row, 3)?,
            close: number(row, 4)?,
            volume: number(row, 5)?,
        });
    }
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    Ok(candles)
}

impl UpstreamSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Candle>, UpstreamError> {
        let code = interval_code(interval).ok_or_else(|| UpstreamError::UnsupportedInterval {
            source_name: self.name().to_string(),
            interval,
        })?;
        let query = [
            ("symbol", market_symbol(symbol)),
            ("interval", code.to_string()),
            ("startTime", start.timestamp_millis().to_string()),
            ("endTime", end.timestamp_millis().to_string()),
            ("limit", self.limit.to_string()),
        ];
        let rows: Vec<Vec<Value>> = self.http.get_json(&self.klines_url(), &query, symbol)?;
        let mut candles = parse_klines(rows)?;
        candles.retain(|c| c.timestamp <= end);
        Ok(candles)
    }

    fn fetch_latest(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<Candle>, UpstreamError> {
        let code = interval_code(interval).ok_or_else(|| UpstreamError::UnsupportedInterval {
            source_name: self.name().to_string(),
            interval,
        })?;
        let query = [
            ("symbol", market_symbol(symbol)),
            ("interval", code.to_string()),
            ("limit", "1".to_string()),
        ];
        let rows: Vec<Vec<Value>> = self.http.get_json(&self.klines_url(), &query, symbol)?;
        Ok(parse_klines(rows)?.pop())
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
