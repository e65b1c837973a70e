//! Performance metrics.
//!
//! Every ratio whose denominator is zero or undefined is reported as `None`.
//! Standard deviations use the sample convention (n - 1), like the
//! indicator engine.

use std::fmt;
use std::str::FromStr;

use crate::domain::execution::Simulation;
use crate::domain::indicator::stddev::sample_stddev;

/// Annualization and risk-free inputs for a report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    pub periods_per_year: f64,
    /// Annual rate; spread evenly over `periods_per_year`.
    pub risk_free_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            periods_per_year: 365.0,
            risk_free_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub total_return: Option<f64>,
    pub annualized_return: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub calmar_ratio: Option<f64>,
    pub recovery_time: Option<usize>,
    pub max_consecutive_losses: Option<usize>,
    pub profit_factor: Option<f64>,
    pub win_rate: Option<f64>,
    pub avg_trade_duration: Option<f64>,
    pub time_in_market: Option<f64>,
    pub total_trades: usize,
    pub closed_trades: usize,
    pub has_open_trade: bool,
}

impl MetricsReport {
    /// A report with every metric undefined; recorded for grid points whose
    /// evaluation failed.
    pub fn undefined() -> Self {
        MetricsReport {
            total_return: None,
            annualized_return: None,
            volatility: None,
            sharpe_ratio: None,
            sortino_ratio: None,
            max_drawdown: None,
            calmar_ratio: None,
            recovery_time: None,
            max_consecutive_losses: None,
            profit_factor: None,
            win_rate: None,
            avg_trade_duration: None,
            time_in_market: None,
            total_trades: 0,
            closed_trades: 0,
            has_open_trade: false,
        }
    }

    pub fn compute(sim: &Simulation, config: &MetricsConfig) -> Self {
        let equity = &sim.equity;
        let ppy = config.periods_per_year;

        let final_equity = equity.last().copied();
        let total_return = final_equity.map(|e| e - 1.0);

        // returns[0] is the defined zero before any period has elapsed
        let period_returns: &[f64] = if sim.returns.len() > 1 {
            &sim.returns[1..]
        } else {
            &[]
        };
        let periods = period_returns.len();

        let annualized_return = match final_equity {
            Some(e) if periods > 0 && e > 0.0 => finite(e.powf(ppy / periods as f64) - 1.0),
            _ => None,
        };

        let volatility = if periods >= 2 {
            finite(sample_stddev(period_returns) * ppy.sqrt())
        } else {
            None
        };

        let rf_per_period = config.risk_free_rate / ppy;
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(period_returns, rf_per_period, ppy);

        let drawdown = compute_drawdown(equity);
        let max_drawdown = drawdown.as_ref().map(|d| d.max_drawdown);
        let recovery_time = drawdown.as_ref().and_then(|d| d.recovery_time);

        let calmar_ratio = match (annualized_return, max_drawdown) {
            (Some(ar), Some(dd)) if dd > 0.0 => finite(ar / dd),
            _ => None,
        };

        let trade_stats = compute_trade_stats(sim);

        let time_in_market = if sim.executed.is_empty() {
            None
        } else {
            let held = sim.executed.iter().filter(|p| !p.is_flat()).count();
            Some(held as f64 / sim.executed.len() as f64)
        };

        MetricsReport {
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            calmar_ratio,
            recovery_time,
            max_consecutive_losses: Some(trade_stats.max_consecutive_losses),
            profit_factor: trade_stats.profit_factor,
            win_rate: trade_stats.win_rate,
            avg_trade_duration: trade_stats.avg_duration,
            time_in_market,
            total_trades: sim.trades.len(),
            closed_trades: trade_stats.closed,
            has_open_trade: sim.open_trade().is_some(),
        }
    }

    pub fn value(&self, metric: MetricName) -> Option<f64> {
        match metric {
            MetricName::TotalReturn => self.total_return,
            MetricName::AnnualizedReturn => self.annualized_return,
            MetricName::Volatility => self.volatility,
            MetricName::Sharpe => self.sharpe_ratio,
            MetricName::Sortino => self.sortino_ratio,
            MetricName::MaxDrawdown => self.max_drawdown,
            MetricName::Calmar => self.calmar_ratio,
            MetricName::RecoveryTime => self.recovery_time.map(|v| v as f64),
            MetricName::MaxConsecutiveLosses => self.max_consecutive_losses.map(|v| v as f64),
            MetricName::ProfitFactor => self.profit_factor,
            MetricName::WinRate => self.win_rate,
            MetricName::AvgTradeDuration => self.avg_trade_duration,
            MetricName::TimeInMarket => self.time_in_market,
        }
    }
}

/// Whether larger or smaller values of a metric are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Objective {
    Maximize,
    Minimize,
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "maximize" | "max" => Ok(Objective::Maximize),
            "minimize" | "min" => Ok(Objective::Minimize),
            other => Err(format!(
                "unknown objective '{}' (expected maximize or minimize)",
                other
            )),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::Maximize => write!(f, "maximize"),
            Objective::Minimize => write!(f, "minimize"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    TotalReturn,
    AnnualizedReturn,
    Volatility,
    Sharpe,
    Sortino,
    MaxDrawdown,
    Calmar,
    RecoveryTime,
    MaxConsecutiveLosses,
    ProfitFactor,
    WinRate,
    AvgTradeDuration,
    TimeInMarket,
}

impl MetricName {
    pub const ALL: [MetricName; 13] = [
        MetricName::TotalReturn,
        MetricName::AnnualizedReturn,
        MetricName::Volatility,
        MetricName::Sharpe,
        MetricName::Sortino,
        MetricName::MaxDrawdown,
        MetricName::Calmar,
        MetricName::RecoveryTime,
        MetricName::MaxConsecutiveLosses,
        MetricName::ProfitFactor,
        MetricName::WinRate,
        MetricName::AvgTradeDuration,
        MetricName::TimeInMarket,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricName::TotalReturn => "total_return",
            MetricName::AnnualizedReturn => "annualized_return",
            MetricName::Volatility => "volatility",
            MetricName::Sharpe => "sharpe",
            MetricName::Sortino => "sortino",
            MetricName::MaxDrawdown => "max_drawdown",
            MetricName::Calmar => "calmar",
            MetricName::RecoveryTime => "recovery_time",
            MetricName::MaxConsecutiveLosses => "max_consecutive_losses",
            MetricName::ProfitFactor => "profit_factor",
            MetricName::WinRate => "win_rate",
            MetricName::AvgTradeDuration => "avg_trade_duration",
            MetricName::TimeInMarket => "time_in_market",
        }
    }

    /// Declared direction used when ranking by this metric.
    pub fn default_objective(self) -> Objective {
        match self {
            MetricName::Volatility
            | MetricName::MaxDrawdown
            | MetricName::RecoveryTime
            | MetricName::MaxConsecutiveLosses
            | MetricName::AvgTradeDuration => Objective::Minimize,
            MetricName::TotalReturn
            | MetricName::AnnualizedReturn
            | MetricName::Sharpe
            | MetricName::Sortino
            | MetricName::Calmar
            | MetricName::ProfitFactor
            | MetricName::WinRate
            | MetricName::TimeInMarket => Objective::Maximize,
        }
    }
}

impl FromStr for MetricName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        let alias = match key.as_str() {
            "sharpe_ratio" => "sharpe",
            "sortino_ratio" => "sortino",
            "calmar_ratio" => "calmar",
            "annual_return" => "annualized_return",
            other => other,
        };
        MetricName::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == alias)
            .ok_or_else(|| format!("unknown metric '{}'", s.trim()))
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn finite(value: f64) -> Option<f64> {
    Some(value).filter(|v| v.is_finite())
}

#[derive(Debug, Clone, PartialEq)]
struct Drawdown {
    max_drawdown: f64,
    recovery_time: Option<usize>,
}

/// Running-maximum scan. Recovery time counts periods from the trough of the
/// deepest drawdown until equity first regains the peak preceding it; zero
/// when equity never fell.
fn compute_drawdown(equity: &[f64]) -> Option<Drawdown> {
    let first = *equity.first()?;

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut trough_idx = 0usize;
    let mut trough_peak = first;

    for (i, &value) in equity.iter().enumerate() {
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            let dd = (peak - value) / peak;
            if dd > max_dd {
                max_dd = dd;
                trough_idx = i;
                trough_peak = peak;
            }
        }
    }

    let recovery_time = if max_dd == 0.0 {
        Some(0)
    } else {
        equity[trough_idx..]
            .iter()
            .position(|&v| v >= trough_peak)
    };

    Some(Drawdown {
        max_drawdown: max_dd,
        recovery_time,
    })
}

fn compute_risk_adjusted(returns: &[f64], rf: f64, ppy: f64) -> (Option<f64>, Option<f64>) {
    if returns.len() < 2 {
        return (None, None);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let stddev = sample_stddev(returns);
    let excess_return = mean - rf;

    let sharpe = if stddev > 0.0 {
        finite(excess_return / stddev * ppy.sqrt())
    } else {
        None
    };

    let downside_sq: f64 = returns
        .iter()
        .map(|&r| (r - rf).min(0.0).powi(2))
        .sum();
    let downside_dev = (downside_sq / (n - 1.0)).sqrt();

    let sortino = if downside_dev > 0.0 {
        finite(excess_return / downside_dev * ppy.sqrt())
    } else {
        None
    };

    (sharpe, sortino)
}

struct TradeStats {
    closed: usize,
    win_rate: Option<f64>,
    profit_factor: Option<f64>,
    avg_duration: Option<f64>,
    max_consecutive_losses: usize,
}

fn compute_trade_stats(sim: &Simulation) -> TradeStats {
    let mut closed = 0usize;
    let mut wins = 0usize;
    let mut gross_profit = 0.0_f64;
    let mut gross_loss = 0.0_f64;
    let mut total_duration = 0usize;
    let mut losing_streak = 0usize;
    let mut max_losing_streak = 0usize;

    for trade in sim.closed_trades() {
        let (Some(ret), Some(duration)) = (trade.return_pct(), trade.duration()) else {
            continue;
        };
        closed += 1;
        total_duration += duration;

        if ret > 0.0 {
            wins += 1;
            gross_profit += ret;
        } else if ret < 0.0 {
            gross_loss += ret.abs();
        }

        if ret < 0.0 {
            losing_streak += 1;
            max_losing_streak = max_losing_streak.max(losing_streak);
        } else {
            losing_streak = 0;
        }
    }

    let (win_rate, avg_duration) = if closed > 0 {
        (
            Some(wins as f64 / closed as f64),
            Some(total_duration as f64 / closed as f64),
        )
    } else {
        (None, None)
    };

    let profit_factor = if gross_loss > 0.0 {
        finite(gross_profit / gross_loss)
    } else {
        None
    };

    TradeStats {
        closed,
        win_rate,
        profit_factor,
        avg_duration,
        max_consecutive_losses: max_losing_streak,
    }
}
