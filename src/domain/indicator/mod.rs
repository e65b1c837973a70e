//! Rolling indicators over a close-price series.
//!
//! - `IndicatorFrame`: rolling mean, rolling standard deviation and z-score,
//!   aligned bar-for-bar with the input prices
//! - `stddev`: the rolling mean / sample standard deviation primitives
//! - `rsi`: relative strength index used by the confirmation rule
//!
//! Undefined values are `None`. Nothing here mutates its input, so every
//! function is safe to call repeatedly and from many threads.

pub mod rsi;
pub mod stddev;

use stddev::{rolling_mean, rolling_stddev};

/// Indicator values aligned to a price series.
///
/// The first `window - 1` entries of every column are `None`. A zero
/// standard deviation leaves the score undefined rather than infinite.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    pub window: usize,
    pub mean: Vec<Option<f64>>,
    pub stddev: Vec<Option<f64>>,
    pub score: Vec<Option<f64>>,
}

impl IndicatorFrame {
    /// Computes the frame for `window`. A window below 2, or longer than the
    /// series, yields an all-undefined frame instead of an error.
    pub fn compute(prices: &[f64], window: usize) -> Self {
        if window < 2 || prices.len() < window {
            return Self::undefined(prices.len(), window);
        }

        let mean = rolling_mean(prices, window);
        let stddev = rolling_stddev(prices, window);
        let score = prices
            .iter()
            .zip(mean.iter().zip(stddev.iter()))
            .map(|(&price, (m, s))| match (m, s) {
                (Some(m), Some(s)) if *s > 0.0 => Some((price - m) / s),
                _ => None,
            })
            .collect();

        Self {
            window,
            mean,
            stddev,
            score,
        }
    }

    pub fn undefined(len: usize, window: usize) -> Self {
        Self {
            window,
            mean: vec![None; len],
            stddev: vec![None; len],
            score: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.score.len()
    }

    pub fn is_empty(&self) -> bool {
        self.score.is_empty()
    }

    /// Number of bars with a defined score.
    pub fn defined_count(&self) -> usize {
        self.score.iter().filter(|s| s.is_some()).count()
    }
}

/// Simple moving average; same warmup as the frame's mean.
pub fn sma(prices: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; prices.len()];
    }
    rolling_mean(prices, window)
}
