//! Bollinger Bands: SMA(period) +/- multiplier * stddev(period).
//!
//! Sample stddev (divide by N - 1), matching a pandas rolling `std()`.
//! Lookback: period - 1. A period below 2 yields no bands.

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(values: &[f64], period: usize, multiplier: f64) -> BollingerBands {
    let n = values.len();
    let mut bands = BollingerBands {
        upper: vec![f64::NAN; n],
        middle: vec![f64::NAN; n],
        lower: vec![f64::NAN; n],
    };
    if period < 2 || n < period {
        return bands;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance =
            window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (period - 1) as f64;
        let stddev = variance.sqrt();
        bands.middle[i] = mean;
        bands.upper[i] = mean + multiplier * stddev;
        bands.lower[i] = mean - multiplier * stddev;
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn bands_by_hand() {
        // window [2, 4, 4, 4, 5, 5, 7, 9]: mean 5, squared deviations sum 32,
        // sample stddev sqrt(32 / 7)
        let b = bollinger(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8, 2.0);
        let sd = (32.0_f64 / 7.0).sqrt();
        assert_approx(b.middle[7], 5.0, DEFAULT_EPSILON);
        assert_approx(b.upper[7], 5.0 + 2.0 * sd, DEFAULT_EPSILON);
        assert_approx(b.lower[7], 5.0 - 2.0 * sd, DEFAULT_EPSILON);
        assert!(b.middle[6].is_nan());
    }

    #[test]
    fn uses_sample_stddev() {
        // pandas: Series([1, 2, 3, 4]).rolling(4).std() * 2 + mean
        let b = bollinger(&[1.0, 2.0, 3.0, 4.0], 4, 2.0);
        assert_approx(b.upper[3], 5.081988897471611, 1e-12);
    }

    #[test]
    fn single_value_period_has_no_bands() {
        let b = bollinger(&[1.0, 2.0, 3.0], 1, 2.0);
        assert!(b.middle.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn constant_series_collapses_bands() {
        let b = bollinger(&[3.0; 5], 3, 2.0);
        assert_approx(b.upper[4], 3.0, DEFAULT_EPSILON);
        assert_approx(b.lower[4], 3.0, DEFAULT_EPSILON);
    }
}
