//! Rolling mean and standard deviation.
//!
//! Sample standard deviation over the trailing n closes, current bar included:
//! STDDEV(n)[i] = sqrt(sum((C[i-j] - MEAN(n)[i])^2 for j in 0..n) / (n - 1))
//! Warmup: first (n-1) bars are undefined.
//!
//! Each window is summed from scratch rather than updated incrementally, so a
//! value never depends on rounding carried over from earlier bars. A spread
//! below `RELATIVE_ZERO_SPREAD` of the window's largest magnitude is rounding
//! residue and reported as exactly zero.

pub const RELATIVE_ZERO_SPREAD: f64 = 1e-12;

pub fn rolling_mean(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let warmup = period.saturating_sub(1);

    (0..prices.len())
        .map(|i| {
            if period == 0 || i < warmup {
                return None;
            }
            let window = &prices[i + 1 - period..=i];
            Some(window.iter().sum::<f64>() / period as f64)
        })
        .collect()
}

pub fn rolling_stddev(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let warmup = period.saturating_sub(1);

    (0..prices.len())
        .map(|i| {
            if period < 2 || i < warmup {
                return None;
            }
            let window = &prices[i + 1 - period..=i];
            Some(sample_stddev(window))
        })
        .collect()
}

/// Sample standard deviation (divides by n - 1). Zero for fewer than two values
/// and for values that differ only by rounding.
pub fn sample_stddev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1) as f64;
    let stddev = variance.sqrt();

    let scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if stddev <= RELATIVE_ZERO_SPREAD * scale {
        0.0
    } else {
        stddev
    }
}
