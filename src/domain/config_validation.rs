//! Configuration validation.
//!
//! Every section is checked before any data is loaded, so a bad key fails
//! fast with the section and key it came from. The parse helpers are shared
//! with the CLI builders that turn a validated config into domain values.

use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::backtest::SWEEPABLE_PARAMS;
use crate::domain::error::CtaError;
use crate::domain::metrics::{MetricName, Objective};
use crate::domain::optimizer::{ParamRange, ParameterGrid};
use crate::domain::price::SamplingInterval;
use crate::domain::signal::Direction;
use crate::ports::config_port::ConfigPort;

pub const RULE_KINDS: [&str; 4] = ["threshold", "band_exit", "trend_filter", "rsi_confirm"];

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), CtaError> {
    required_string(config, "data", "path")?;
    let start = optional::<NaiveDate>(config, "data", "start_date")?;
    let end = optional::<NaiveDate>(config, "data", "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(invalid("data", "start_date", "start_date must not be after end_date"));
        }
    }
    optional::<SamplingInterval>(config, "data", "interval")?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), CtaError> {
    let ppy = optional::<f64>(config, "backtest", "periods_per_year")?;
    if ppy.is_some_and(|v| !(v.is_finite() && v > 0.0)) {
        return Err(invalid(
            "backtest",
            "periods_per_year",
            "periods_per_year must be positive",
        ));
    }
    let rf = optional::<f64>(config, "backtest", "risk_free_rate")?.unwrap_or(0.0);
    if !(0.0..1.0).contains(&rf) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), CtaError> {
    let rule = rule_kind(config)?;
    required::<Direction>(config, "strategy", "direction")?;
    validate_window(config, "window", 2)?;
    validate_finite(config, "threshold")?;

    match rule.as_str() {
        "band_exit" => validate_finite(config, "exit_threshold"),
        "trend_filter" => validate_window(config, "trend_window", 1),
        "rsi_confirm" => {
            validate_window(config, "rsi_period", 1)?;
            let level = required::<f64>(config, "strategy", "rsi_level")?;
            if !(0.0..=100.0).contains(&level) {
                return Err(invalid("strategy", "rsi_level", "rsi_level must be within 0..=100"));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Checks `[optimize]`. Each name in `params` must be sweepable, used by the
/// configured rule, and have a `start, stop, step` range under its own key.
pub fn validate_optimize_config(config: &dyn ConfigPort) -> Result<(), CtaError> {
    let rule = rule_kind(config)?;
    let params = param_names(config)?;
    if params.is_empty() {
        return Err(invalid("optimize", "params", "at least one parameter is required"));
    }
    let mut grid = ParameterGrid::new();

    for (i, name) in params.iter().enumerate() {
        if !SWEEPABLE_PARAMS.contains(&name.as_str()) {
            return Err(invalid(
                "optimize",
                "params",
                format!("'{}' is not a sweepable parameter", name),
            ));
        }
        if params[..i].contains(name) {
            return Err(invalid("optimize", "params", format!("'{}' listed twice", name)));
        }
        if !rule_uses(&rule, name) {
            return Err(invalid(
                "optimize",
                "params",
                format!("rule {} has no parameter '{}'", rule, name),
            ));
        }
        grid.add(name, param_range(config, name)?)?;
    }

    required::<MetricName>(config, "optimize", "metric")?;
    optional::<Objective>(config, "optimize", "objective")?;
    if optional::<usize>(config, "optimize", "top")? == Some(0) {
        return Err(invalid("optimize", "top", "top must be at least 1"));
    }
    Ok(())
}

/// `[strategy] rule`, defaulting to `threshold`.
pub fn rule_kind(config: &dyn ConfigPort) -> Result<String, CtaError> {
    let rule = config
        .get_string("strategy", "rule")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "threshold".to_string());
    if !RULE_KINDS.contains(&rule.as_str()) {
        return Err(invalid(
            "strategy",
            "rule",
            format!("unknown rule '{}' (expected {})", rule, RULE_KINDS.join(", ")),
        ));
    }
    Ok(rule)
}

fn rule_uses(rule: &str, param: &str) -> bool {
    match param {
        "window" | "threshold" => true,
        "exit_threshold" => rule == "band_exit",
        "trend_window" => rule == "trend_filter",
        "rsi_period" | "rsi_level" => rule == "rsi_confirm",
        _ => false,
    }
}

/// `[optimize] params` split on commas, in declaration order.
pub fn param_names(config: &dyn ConfigPort) -> Result<Vec<String>, CtaError> {
    let raw = required_string(config, "optimize", "params")?;
    Ok(raw
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Parses `[optimize] <name> = start, stop, step`. A single number is a
/// one-value range.
pub fn param_range(config: &dyn ConfigPort, name: &str) -> Result<ParamRange, CtaError> {
    let raw = required_string(config, "optimize", name)?;
    let parts = raw
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| invalid("optimize", name, format!("'{}': {}", raw, e)))?;

    match parts.as_slice() {
        [value] => Ok(ParamRange::single(*value)),
        [start, stop, step] => {
            ParamRange::new(*start, *stop, *step).map_err(|reason| invalid("optimize", name, reason))
        }
        _ => Err(invalid(
            "optimize",
            name,
            format!("expected 'start, stop, step', got '{}'", raw),
        )),
    }
}

pub fn required_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, CtaError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(CtaError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

pub fn required<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, CtaError>
where
    T: FromStr,
    T::Err: Display,
{
    optional(config, section, key)?.ok_or_else(|| CtaError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

/// Parses a key if it is present and non-blank.
pub fn optional<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, CtaError>
where
    T: FromStr,
    T::Err: Display,
{
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, format!("'{}': {}", s.trim(), e))),
        _ => Ok(None),
    }
}

fn validate_window(config: &dyn ConfigPort, key: &str, min: usize) -> Result<(), CtaError> {
    let value = required::<usize>(config, "strategy", key)?;
    if value < min {
        return Err(invalid("strategy", key, format!("{} must be at least {}", key, min)));
    }
    Ok(())
}

fn validate_finite(config: &dyn ConfigPort, key: &str) -> Result<(), CtaError> {
    let value = required::<f64>(config, "strategy", key)?;
    if !value.is_finite() {
        return Err(invalid("strategy", key, format!("{} must be finite", key)));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> CtaError {
    CtaError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}
