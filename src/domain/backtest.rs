//! Single-run pipeline: prices -> indicators -> positions -> simulation -> metrics.
//!
//! `BacktestConfig` carries every parameter one run needs. The optimizer
//! derives one config per grid point with [`BacktestConfig::with_param`] and
//! calls [`evaluate`]; nothing here holds state between runs.

use tracing::debug;

use crate::domain::error::CtaError;
use crate::domain::execution::{Simulation, simulate};
use crate::domain::indicator::IndicatorFrame;
use crate::domain::metrics::{MetricsConfig, MetricsReport};
use crate::domain::position::Position;
use crate::domain::price::PriceSeries;
use crate::domain::signal::SignalRule;

/// Names accepted by [`BacktestConfig::with_param`], in canonical order.
pub const SWEEPABLE_PARAMS: [&str; 6] = [
    "window",
    "threshold",
    "exit_threshold",
    "trend_window",
    "rsi_period",
    "rsi_level",
];

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub rule: SignalRule,
    pub window: usize,
    pub threshold: f64,
    pub metrics: MetricsConfig,
}

impl BacktestConfig {
    /// Returns a copy with one named parameter replaced.
    ///
    /// Integer parameters reject fractional or negative values. Rule
    /// parameters are rejected when the configured rule does not use them.
    pub fn with_param(&self, name: &str, value: f64) -> Result<Self, CtaError> {
        if !value.is_finite() {
            return Err(CtaError::invalid_parameter(name, "value must be finite"));
        }
        let mut config = self.clone();
        match (name, &mut config.rule) {
            ("window", _) => config.window = as_count(name, value)?,
            ("threshold", _) => config.threshold = value,
            ("exit_threshold", SignalRule::BandExit { exit_threshold, .. }) => {
                *exit_threshold = value
            }
            ("trend_window", SignalRule::TrendFiltered { trend_window, .. }) => {
                *trend_window = as_count(name, value)?
            }
            ("rsi_period", SignalRule::RsiConfirmed { rsi_period, .. }) => {
                *rsi_period = as_count(name, value)?
            }
            ("rsi_level", SignalRule::RsiConfirmed { rsi_level, .. }) => *rsi_level = value,
            (other, rule) if SWEEPABLE_PARAMS.contains(&other) => {
                return Err(CtaError::invalid_parameter(
                    other,
                    format!("not used by rule {}", rule.kind()),
                ));
            }
            (other, _) => {
                return Err(CtaError::invalid_parameter(other, "unknown parameter"));
            }
        }
        Ok(config)
    }

    /// Checks the values a run cannot proceed without.
    pub fn validate(&self) -> Result<(), CtaError> {
        if !self.threshold.is_finite() {
            return Err(CtaError::invalid_parameter("threshold", "must be finite"));
        }
        if !(self.metrics.periods_per_year.is_finite() && self.metrics.periods_per_year > 0.0) {
            return Err(CtaError::invalid_parameter(
                "periods_per_year",
                "must be a positive number",
            ));
        }
        if !self.metrics.risk_free_rate.is_finite() {
            return Err(CtaError::invalid_parameter("risk_free_rate", "must be finite"));
        }
        match &self.rule {
            SignalRule::BandExit { exit_threshold, .. } if !exit_threshold.is_finite() => {
                Err(CtaError::invalid_parameter("exit_threshold", "must be finite"))
            }
            SignalRule::TrendFiltered { trend_window, .. } if *trend_window == 0 => {
                Err(CtaError::invalid_parameter("trend_window", "must be at least 1"))
            }
            SignalRule::RsiConfirmed { rsi_period, .. } if *rsi_period == 0 => {
                Err(CtaError::invalid_parameter("rsi_period", "must be at least 1"))
            }
            SignalRule::RsiConfirmed { rsi_level, .. } if !(0.0..=100.0).contains(rsi_level) => {
                Err(CtaError::invalid_parameter("rsi_level", "must be within 0..=100"))
            }
            _ => Ok(()),
        }
    }
}

fn as_count(name: &str, value: f64) -> Result<usize, CtaError> {
    if value < 0.0 || value.fract() != 0.0 {
        return Err(CtaError::invalid_parameter(
            name,
            format!("expected a non-negative integer, got {}", value),
        ));
    }
    Ok(value as usize)
}

/// Every intermediate series of one run, aligned bar-for-bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub frame: IndicatorFrame,
    pub positions: Vec<Position>,
    pub simulation: Simulation,
    pub report: MetricsReport,
}

pub fn run(series: &PriceSeries, config: &BacktestConfig) -> Result<BacktestResult, CtaError> {
    evaluate(&series.closes(), config)
}

/// Runs the pipeline over raw closes. Used by the optimizer so the closes are
/// extracted once per sweep.
pub fn evaluate(closes: &[f64], config: &BacktestConfig) -> Result<BacktestResult, CtaError> {
    config.validate()?;

    let frame = IndicatorFrame::compute(closes, config.window);
    let positions = config.rule.generate(closes, &frame, config.threshold);
    let simulation = simulate(closes, &positions)?;
    let report = MetricsReport::compute(&simulation, &config.metrics);

    debug!(
        rule = %config.rule,
        window = config.window,
        threshold = config.threshold,
        bars = closes.len(),
        trades = report.total_trades,
        "backtest evaluated"
    );

    Ok(BacktestResult {
        frame,
        positions,
        simulation,
        report,
    })
}
