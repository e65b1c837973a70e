//! Core domain types and logic.

pub mod price;
pub mod indicator;
pub mod signal;
pub mod position;
pub mod execution;
pub mod metrics;
pub mod backtest;
pub mod optimizer;
pub mod config_validation;
pub mod error;
