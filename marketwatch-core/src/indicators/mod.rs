//! Technical indicators over a close series.
//!
//! Pure functions: a slice of closes in, a series of the same length out.
//! Warm-up positions hold `f64::NAN`.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod resample;
pub mod rsi;
pub mod sma;
pub mod snapshot;

pub use bollinger::{bollinger, BollingerBands};
pub use ema::ema;
pub use macd::{macd, Macd};
pub use resample::daily_closes;
pub use rsi::rsi;
pub use sma::sma;
pub use snapshot::IndicatorSnapshot;

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
