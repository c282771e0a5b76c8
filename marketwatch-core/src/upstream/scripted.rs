//! Programmable in-process source.
//!
//! Answers each fetch from a closure and records every call, so backfill
//! behaviour can be driven deterministically without a network.

use super::{UpstreamError, UpstreamSource};
use crate::domain::{Candle, Interval};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};

/// One recorded `fetch` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub symbol: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: Interval,
    /// 1-based position of this call.
    pub call_no: usize,
}

type Responder = dyn Fn(&FetchCall) -> Result<Vec<Candle>, UpstreamError> + Send + Sync;

pub struct ScriptedSource {
    name: String,
    responder: Box<Responder>,
    calls: Mutex<Vec<FetchCall>>,
}

impl ScriptedSource {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&FetchCall) -> Result<Vec<Candle>, UpstreamError> + Send + Sync + 'static,
    {
        Self {
            name: "scripted".to_string(),
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve the slice of `candles` that falls inside each requested window.
    pub fn from_candles(candles: Vec<Candle>) -> Self {
        Self::new(move |call| {
            Ok(candles
                .iter()
                .filter(|c| c.timestamp >= call.start && c.timestamp <= call.end)
                .cloned()
                .collect())
        })
    }

    /// Always answer with an empty page.
    pub fn empty() -> Self {
        Self::new(|_| Ok(Vec::new()))
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl UpstreamSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Interval,
    ) -> Result<Vec<Candle>, UpstreamError> {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            let call = FetchCall {
                symbol: symbol.to_string(),
                start,
                end,
                interval,
                call_no: calls.len() + 1,
            };
            calls.push(call.clone());
            call
        };
        (self.responder)(&call)
    }
}

/// A flat candle at `timestamp` closing at `close`.
pub fn flat_candle(timestamp: DateTime<Utc>, close: f64) -> Candle {
    Candle {
        timestamp,
        open: close,
        high: close,
        low: close,
        close,
        volume: 0.0,
    }
}
