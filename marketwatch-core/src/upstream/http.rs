//! Blocking JSON client shared by the HTTP sources.
//!
//! One request per call, no internal retry. Status handling feeds the
//! circuit breaker: 403 trips it, 429 and 5xx count as failures.

use super::circuit_breaker::CircuitBreaker;
use super::UpstreamError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Connect/read timeout applied to every upstream request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct JsonClient {
    client: reqwest::blocking::Client,
    breaker: Arc<CircuitBreaker>,
    source_name: &'static str,
}

impl JsonClient {
    pub fn new(
        source_name: &'static str,
        breaker: Arc<CircuitBreaker>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("marketwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            breaker,
            source_name,
        })
    }

    pub fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }

    /// GET `url` with `query` and decode the JSON body.
    ///
    /// `symbol` is only used to build `SymbolNotFound` errors.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        symbol: &str,
    ) -> Result<T, UpstreamError> {
        if !self.breaker.is_allowed() {
            return Err(UpstreamError::CircuitBreakerTripped(self.source_name.into()));
        }

        tracing::debug!(upstream = self.source_name, url, ?query, "upstream request");
        let resp = self.client.get(url).query(query).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                self.breaker.record_failure();
            }
            UpstreamError::NetworkUnreachable(e.to_string())
        })?;

        let status = resp.status();
        match status {
            StatusCode::FORBIDDEN => {
                self.breaker.trip();
                return Err(UpstreamError::CircuitBreakerTripped(self.source_name.into()));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                self.breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(UpstreamError::RateLimited {
                    source_name: self.source_name.into(),
                    retry_after_secs,
                });
            }
            StatusCode::NOT_FOUND => {
                return Err(UpstreamError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
            s if s.is_server_error() => {
                self.breaker.record_failure();
                return Err(UpstreamError::Http(format!("HTTP {s} from {}", self.source_name)));
            }
            s if !s.is_success() => {
                let body = resp.text().unwrap_or_default();
                return Err(UpstreamError::Http(format!(
                    "HTTP {s} from {} for {symbol}: {body}",
                    self.source_name
                )));
            }
            _ => {}
        }

        let parsed = resp.json::<T>().map_err(|e| {
            UpstreamError::ResponseFormatChanged(format!(
                "failed to parse {} response for {symbol}: {e}",
                self.source_name
            ))
        })?;
        self.breaker.record_success();
        Ok(parsed)
    }
}
