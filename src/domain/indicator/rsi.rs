//! RSI (Relative Strength Index).
//!
//! Average gain and loss are simple means over the last n price changes
//! (not Wilder-smoothed), matching the rolling-window convention used by the
//! rest of the indicator engine.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100. If both are 0 the value is
//! undefined.
//!
//! Warmup: first n bars are undefined (n changes need n + 1 closes).

pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = vec![None; prices.len()];
    if period == 0 || prices.len() <= period {
        return values;
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for w in prices.windows(2) {
        let change = w[1] - w[0];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    for (i, value) in values.iter_mut().enumerate().skip(period) {
        // changes ending at bar i are gains[i - period..i]
        let avg_gain = gains[i - period..i].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[i - period..i].iter().sum::<f64>() / period as f64;

        *value = if avg_loss == 0.0 {
            if avg_gain > 0.0 { Some(100.0) } else { None }
        } else {
            Some(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
        };
    }

    values
}
