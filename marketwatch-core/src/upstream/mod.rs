//! Upstream source trait and structured error types.
//!
//! The `UpstreamSource` trait abstracts over candle providers (Coinbase,
//! Binance) so the backfill driver can be pointed at any of them and mocked in
//! tests. Providers make one logical request per call; retrying is the
//! driver's job.

pub mod binance;
pub mod circuit_breaker;
pub mod coinbase;
pub mod http;
pub mod scripted;

pub use binance::BinanceSource;
pub use circuit_breaker::CircuitBreaker;
pub use coinbase::CoinbaseSource;
pub use scripted::{flat_candle, FetchCall, ScriptedSource};

use crate::domain::{Candle, Interval};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Transport-level failures while talking to an upstream source.
///
/// An empty answer is not an error: `fetch` returns `Ok(vec![])`.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by {source_name} (retry after {retry_after_secs}s)")]
    RateLimited {
        source_name: String,
        retry_after_secs: u64,
    },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("{source_name} does not serve {interval} candles")]
    UnsupportedInterval {
        source_name: String,
        interval: Interval,
    },

    #[error("hard stop: {0} is blocking requests (circuit breaker tripped)")]
    CircuitBreakerTripped(String),

    #[error("http error: {0}")]
    Http(String),
}

/// A candle provider.
pub trait UpstreamSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Candles whose slot lies within `[start, end]`, ascending by timestamp.
    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Candle>, UpstreamError>;

    /// The most recent candle, if any.
    fn fetch_latest(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Option<Candle>, UpstreamError> {
        let end = Utc::now();
        let start = interval.truncate(end) - interval.duration();
        Ok(self.fetch(symbol, start, end, interval)?.pop())
    }

    /// Whether the source currently accepts requests (not blocked).
    fn is_available(&self) -> bool {
        true
    }
}

/// Which concrete upstream to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Coinbase,
    Binance,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Coinbase => f.write_str("coinbase"),
            SourceKind::Binance => f.write_str("binance"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coinbase" => Ok(SourceKind::Coinbase),
            "binance" => Ok(SourceKind::Binance),
            other => Err(format!("unknown source '{other}' (expected coinbase or binance)")),
        }
    }
}
