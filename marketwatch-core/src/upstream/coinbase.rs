//! Coinbase Exchange candles.
//!
//! `GET /products/{pair}/candles?granularity=..&start=..&end=..` returns rows
//! `[time, low, high, open, close, volume]`, newest first, at most 300 rows per
//! request. Longer windows are split into 300-candle chunks.

use super::circuit_breaker::CircuitBreaker;
use super::http::{JsonClient, DEFAULT_TIMEOUT};
use super::{UpstreamError, UpstreamSource};
use crate::domain::{Candle, Interval};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Arc;

const BASE_URL: &str = "https://api.exchange.coinbase.com";
const MAX_CANDLES_PER_REQUEST: i64 = 300;
const GRANULARITIES: [i64; 6] = [60, 300, 900, 3_600, 21_600, 86_400];

pub struct CoinbaseSource {
    http: JsonClient,
    base_url: String,
}

impl CoinbaseSource {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: JsonClient::new("coinbase", breaker, DEFAULT_TIMEOUT)?,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the client at another host (sandbox or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn candles_url(&self, pair: &str) -> String {
        format!("{}/products/{pair}/candles", self.base_url.trim_end_matches('/'))
    }

    fn granularity(&self, interval: Interval) -> Result<i64, UpstreamError> {
        let secs = interval.as_secs();
        if GRANULARITIES.contains(&secs) {
            Ok(secs)
        } else {
            Err(UpstreamError::UnsupportedInterval {
                source_name: self.name().to_string(),
                interval,
            })
        }
    }
}

/// Decode Coinbase candle rows into ascending, de-duplicated candles.
pub fn parse_candles(rows: Vec<Vec<f64>>) -> Result<Vec<Candle>, UpstreamError> {
    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let [time, low, high, open, close, volume] = row[..] else {
            return Err(UpstreamError::ResponseFormatChanged(format!(
                "expected 6 columns per candle, got {}",
                row.len()
            )));
        };
        let timestamp = DateTime::from_timestamp(time as i64, 0).ok_or_else(|| {
            UpstreamError::ResponseFormatChanged(format!("invalid candle time: {time}"))
        })?;
        candles.push(Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    Ok(candles)
}

impl UpstreamSource for CoinbaseSource {
    fn name(&self) -> &str {
        "coinbase"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Candle>, UpstreamError> {
        let granularity = self.granularity(interval)?;
        let url = self.candles_url(symbol);
        let chunk = Duration::seconds(granularity * (MAX_CANDLES_PER_REQUEST - 1));
        let step = Duration::seconds(granularity);

        let mut candles = Vec::new();
        let mut chunk_start = start;
        while chunk_start <= end {
            let chunk_end = (chunk_start + chunk).min(end);
            let query = [
                ("granularity", granularity.to_string()),
                ("start", chunk_start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("end", chunk_end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ];
            let rows: Vec<Vec<f64>> = self.http.get_json(&url, &query, symbol)?;
            candles.extend(parse_candles(rows)?);
            chunk_start = chunk_end + step;
        }

        candles.retain(|c| c.timestamp >= interval.truncate(start) && c.timestamp <= end);
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
        Ok(candles)
    }

    fn fetch_latest(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<Candle>, UpstreamError> {
        let granularity = self.granularity(interval)?;
        let query = [("granularity", granularity.to_string())];
        let rows: Vec<Vec<f64>> = self.http.get_json(&self.candles_url(symbol), &query, symbol)?;
        Ok(parse_candles(rows)?.pop())
    }

    fn is_available(&self) -> bool {
        self.http.is_available()
    }
}
