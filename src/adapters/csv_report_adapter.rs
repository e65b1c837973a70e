//! CSV report adapter.
//!
//! Undefined values are written as empty cells so downstream tools read them
//! as missing rather than zero.

use std::path::Path;

use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::CtaError;
use crate::domain::metrics::MetricName;
use crate::domain::optimizer::OptimizationResult;
use crate::domain::price::PriceSeries;
use crate::ports::report_port::ReportPort;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn writer(output_path: &str) -> Result<csv::Writer<std::fs::File>, CtaError> {
    Ok(csv::Writer::from_path(Path::new(output_path))?)
}

impl ReportPort for CsvReportAdapter {
    fn write_run(
        &self,
        series: &PriceSeries,
        result: &BacktestResult,
        output_path: &str,
    ) -> Result<(), CtaError> {
        let sim = &result.simulation;
        if series.len() != sim.equity.len() {
            return Err(CtaError::LengthMismatch {
                prices: series.len(),
                positions: sim.equity.len(),
            });
        }

        let mut wtr = writer(output_path)?;
        wtr.write_record([
            "timestamp",
            "close",
            "mean",
            "stddev",
            "score",
            "position",
            "executed",
            "return",
            "equity",
        ])?;

        for (i, bar) in series.bars().iter().enumerate() {
            wtr.write_record([
                bar.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                bar.close.to_string(),
                cell(result.frame.mean[i]),
                cell(result.frame.stddev[i]),
                cell(result.frame.score[i]),
                result.positions[i].as_i8().to_string(),
                sim.executed[i].as_i8().to_string(),
                sim.returns[i].to_string(),
                sim.equity[i].to_string(),
            ])?;
        }
        wtr.flush()?;

        info!(path = output_path, rows = series.len(), "wrote run report");
        Ok(())
    }

    fn write_trades(&self, result: &BacktestResult, output_path: &str) -> Result<(), CtaError> {
        let mut wtr = writer(output_path)?;
        wtr.write_record([
            "entry_index",
            "exit_index",
            "entry_price",
            "exit_price",
            "direction",
            "return",
            "duration",
        ])?;

        for trade in &result.simulation.trades {
            wtr.write_record([
                trade.entry_index.to_string(),
                trade.exit_index.map(|i| i.to_string()).unwrap_or_default(),
                trade.entry_price.to_string(),
                cell(trade.exit_price),
                trade.direction.to_string(),
                cell(trade.return_pct()),
                trade.duration().map(|d| d.to_string()).unwrap_or_default(),
            ])?;
        }
        wtr.flush()?;

        info!(
            path = output_path,
            trades = result.simulation.trades.len(),
            "wrote trade list"
        );
        Ok(())
    }

    fn write_sweep(&self, result: &OptimizationResult, output_path: &str) -> Result<(), CtaError> {
        let param_names: Vec<String> = result
            .entries()
            .first()
            .map(|e| e.point.values().iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default();

        let mut header = vec!["rank".to_string(), "index".to_string()];
        header.extend(param_names.iter().cloned());
        header.extend(MetricName::ALL.iter().map(|m| m.to_string()));
        header.extend(["total_trades".to_string(), "error".to_string()]);

        let mut wtr = writer(output_path)?;
        wtr.write_record(&header)?;

        for (rank, entry) in result.ranked().iter().enumerate() {
            let mut row = vec![(rank + 1).to_string(), entry.index.to_string()];
            row.extend(
                param_names
                    .iter()
                    .map(|name| cell(entry.point.get(name))),
            );
            row.extend(MetricName::ALL.iter().map(|m| cell(entry.report.value(*m))));
            row.push(entry.report.total_trades.to_string());
            row.push(entry.error.clone().unwrap_or_default());
            wtr.write_record(&row)?;
        }
        wtr.flush()?;

        info!(path = output_path, rows = result.len(), "wrote sweep table");
        Ok(())
    }
}
