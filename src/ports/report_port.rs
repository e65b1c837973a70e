//! Report output port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::CtaError;
use crate::domain::optimizer::OptimizationResult;
use crate::domain::price::PriceSeries;

/// Port for writing run and sweep reports.
pub trait ReportPort {
    /// Per-bar table of one run: prices, decided and executed positions,
    /// returns and equity.
    fn write_run(
        &self,
        series: &PriceSeries,
        result: &BacktestResult,
        output_path: &str,
    ) -> Result<(), CtaError>;

    fn write_trades(&self, result: &BacktestResult, output_path: &str) -> Result<(), CtaError>;

    /// One row per grid point: parameter columns then one column per metric.
    /// Rows follow the result's ranking.
    fn write_sweep(&self, result: &OptimizationResult, output_path: &str) -> Result<(), CtaError>;
}
