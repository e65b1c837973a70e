//! Trade simulation: positions -> executed positions, returns, equity, trades.
//!
//! The position decided at bar t is only realized in the return from t to
//! t + 1, so the executed series is the decided series shifted forward by
//! one bar with a flat first entry. Everything is produced in a single
//! forward scan; values at index i never read anything past index i.

use crate::domain::error::CtaError;
use crate::domain::position::{Position, Trade};

/// Output of one simulation, aligned bar-for-bar with the prices.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub executed: Vec<Position>,
    pub returns: Vec<f64>,
    pub equity: Vec<f64>,
    pub trades: Vec<Trade>,
}

impl Simulation {
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| !t.is_open())
    }

    pub fn open_trade(&self) -> Option<&Trade> {
        self.trades.last().filter(|t| t.is_open())
    }

    pub fn final_equity(&self) -> f64 {
        self.equity.last().copied().unwrap_or(1.0)
    }
}

/// Shifts decided positions forward one bar; the first bar is always flat.
pub fn lag_positions(positions: &[Position]) -> Vec<Position> {
    let mut executed = Vec::with_capacity(positions.len());
    if !positions.is_empty() {
        executed.push(Position::Flat);
        executed.extend_from_slice(&positions[..positions.len() - 1]);
    }
    executed
}

/// Runs the simulation.
///
/// - `return[0] = 0`, `return[i] = exposure(executed[i]) * (p[i] - p[i-1]) / p[i-1]`
/// - `equity[0] = 1`, `equity[i] = equity[i-1] * (1 + return[i])`
/// - a trade opens where executed goes flat -> non-flat (entry price p[i]) and
///   closes where it returns to flat (exit price p[i]); a trade still held on
///   the last bar is left open
pub fn simulate(prices: &[f64], positions: &[Position]) -> Result<Simulation, CtaError> {
    if prices.len() != positions.len() {
        return Err(CtaError::LengthMismatch {
            prices: prices.len(),
            positions: positions.len(),
        });
    }

    let executed = lag_positions(positions);
    let n = prices.len();
    let mut returns: Vec<f64> = Vec::with_capacity(n);
    let mut equity: Vec<f64> = Vec::with_capacity(n);
    let mut trades: Vec<Trade> = Vec::new();
    let mut open: Option<Trade> = None;

    for i in 0..n {
        let state = executed[i];

        let ret = if i == 0 {
            0.0
        } else {
            state.exposure() * (prices[i] - prices[i - 1]) / prices[i - 1]
        };
        let value = if i == 0 { 1.0 } else { equity[i - 1] * (1.0 + ret) };
        if !value.is_finite() {
            return Err(CtaError::Numerical {
                reason: format!("equity is not finite at bar {}", i),
            });
        }
        returns.push(ret);
        equity.push(value);

        match open.take() {
            Some(mut trade) if state != trade.direction => {
                trade.exit_index = Some(i);
                trade.exit_price = Some(prices[i]);
                trades.push(trade);
                if !state.is_flat() {
                    open = Some(open_trade(i, prices[i], state));
                }
            }
            Some(trade) => open = Some(trade),
            None if !state.is_flat() => open = Some(open_trade(i, prices[i], state)),
            None => {}
        }
    }

    trades.extend(open);

    Ok(Simulation {
        executed,
        returns,
        equity,
        trades,
    })
}

fn open_trade(index: usize, price: f64, direction: Position) -> Trade {
    Trade {
        entry_index: index,
        exit_index: None,
        entry_price: price,
        exit_price: None,
        direction,
    }
}
