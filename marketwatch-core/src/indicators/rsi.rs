//! Relative Strength Index.
//!
//! Plain rolling means of gains and losses over the last `period` changes
//! (no Wilder smoothing). RSI = 100 - 100 / (1 + avg_gain / avg_loss).
//! First valid value at index `period`. avg_loss == 0 gives 100; a flat
//! window has no defined ratio and stays NaN.

pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    for i in period..n {
        // changes[j] is the move into values[j + 1]
        let window = &changes[i - period..i];
        if window.iter().any(|c| c.is_nan()) {
            continue;
        }
        let gain: f64 = window.iter().filter(|&&c| c > 0.0).sum();
        let loss: f64 = -window.iter().filter(|&&c| c < 0.0).sum::<f64>();
        result[i] = compute_rsi(gain / period as f64, loss / period as f64);
    }
    result
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        f64::NAN
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
