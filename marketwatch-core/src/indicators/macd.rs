//! MACD: EMA(fast) - EMA(slow), its EMA(signal) and the histogram.

use super::ema::ema;

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl Macd {
    /// MACD crossed above its signal line on the last value.
    pub fn bullish_cross(&self) -> bool {
        self.last_two_diffs()
            .is_some_and(|(prev, last)| prev < 0.0 && last > 0.0)
    }

    /// MACD crossed below its signal line on the last value.
    pub fn bearish_cross(&self) -> bool {
        self.last_two_diffs()
            .is_some_and(|(prev, last)| prev > 0.0 && last < 0.0)
    }

    fn last_two_diffs(&self) -> Option<(f64, f64)> {
        let n = self.histogram.len();
        if n < 2 {
            return None;
        }
        Some((self.histogram[n - 2], self.histogram[n - 1]))
    }
}

/// Standard parameters are 12 / 26 / 9.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();
    Macd {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn flat_series_has_zero_macd() {
        let m = macd(&[10.0; 40], 12, 26, 9);
        assert!(m.macd.iter().all(|v| v.abs() < DEFAULT_EPSILON));
        assert!(m.histogram.iter().all(|v| v.abs() < DEFAULT_EPSILON));
    }

    #[test]
    fn first_step_by_hand() {
        // fast alpha = 2/3, slow alpha = 2/5, signal alpha = 1
        let m = macd(&[10.0, 13.0], 2, 4, 1);
        assert_approx(m.macd[0], 0.0, DEFAULT_EPSILON);
        assert_approx(m.macd[1], 12.0 - 11.2, 1e-9);
        assert_approx(m.signal[1], m.macd[1], 1e-9);
        assert_approx(m.histogram[1], 0.0, 1e-9);
    }

    #[test]
    fn rising_series_turns_bullish() {
        let mut closes = vec![10.0; 30];
        closes.extend([9.0, 8.0, 7.0, 6.0, 5.0]);
        closes.push(20.0);
        let m = macd(&closes, 12, 26, 9);
        assert!(m.bullish_cross());
        assert!(!m.bearish_cross());
    }
}
