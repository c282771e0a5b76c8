//! Last-row indicator summary for one instrument.

use super::{bollinger, macd, rsi, sma};
use serde::Serialize;

const RSI_PERIOD: usize = 14;
const MA_PERIOD: usize = 50;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_MULTIPLIER: f64 = 2.0;

/// Indicator values at the most recent close.
///
/// Fields are `None` while the series is too short for that indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub rsi14: Option<f64>,
    pub ma50: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub macd_bullish_cross: bool,
    pub macd_bearish_cross: bool,
}

fn last_valid(series: &[f64]) -> Option<f64> {
    series.last().copied().filter(|v| !v.is_nan())
}

impl IndicatorSnapshot {
    /// `None` for an empty series.
    pub fn latest(closes: &[f64]) -> Option<Self> {
        let price = *closes.last()?;
        let m = macd(closes, 12, 26, 9);
        let bands = bollinger(closes, BOLLINGER_PERIOD, BOLLINGER_MULTIPLIER);
        Some(Self {
            price,
            rsi14: last_valid(&rsi(closes, RSI_PERIOD)),
            ma50: last_valid(&sma(closes, MA_PERIOD)),
            macd: last_valid(&m.macd),
            macd_signal: last_valid(&m.signal),
            bollinger_upper: last_valid(&bands.upper),
            bollinger_lower: last_valid(&bands.lower),
            macd_bullish_cross: m.bullish_cross(),
            macd_bearish_cross: m.bearish_cross(),
        })
    }

    pub fn is_oversold(&self) -> bool {
        self.rsi14.is_some_and(|r| r < 30.0)
    }

    pub fn is_overbought(&self) -> bool {
        self.rsi14.is_some_and(|r| r > 70.0)
    }
}
