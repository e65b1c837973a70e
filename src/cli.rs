//! CLI definition and dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    optional, param_names, param_range, required, rule_kind, validate_backtest_config,
    validate_data_config, validate_optimize_config, validate_strategy_config,
};
use crate::domain::error::CtaError;
use crate::domain::metrics::{MetricName, MetricsConfig, MetricsReport, Objective};
use crate::domain::optimizer::{
    OptimizationEntry, OptimizationResult, Optimizer, ParameterGrid, RankBy,
};
use crate::domain::price::{PriceSeries, SamplingInterval};
use crate::domain::signal::{Direction, SignalRule};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_TOP: usize = 10;

#[derive(Parser, Debug)]
#[command(
    name = "ctatrader",
    about = "Z-score strategy backtester and parameter optimizer"
)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest with the [strategy] parameters
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the per-bar run table to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the trade list to this CSV file
        #[arg(long)]
        trades: Option<PathBuf>,
    },
    /// Sweep the [optimize] parameter grid and rank the results
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the full ranked sweep table to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Evaluate grid points on one thread
        #[arg(long)]
        sequential: bool,
    },
    /// Validate a configuration file without loading data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing(cli.verbose);
    match cli.command {
        Command::Backtest {
            config,
            output,
            trades,
        } => run_backtest(&config, output.as_deref(), trades.as_deref()),
        Command::Optimize {
            config,
            output,
            sequential,
        } => run_optimize(&config, output.as_deref(), sequential),
        Command::Validate { config } => run_validate(&config),
    }
}

/// Installs the stderr log subscriber. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: CtaError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(&err)
}

fn data_adapter(config_path: &Path) -> CsvAdapter {
    let base = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    CsvAdapter::new(base)
}

fn run_backtest(config_path: &Path, output: Option<&Path>, trades: Option<&Path>) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate
    let validated = validate_data_config(&adapter)
        .and_then(|_| validate_backtest_config(&adapter))
        .and_then(|_| validate_strategy_config(&adapter));
    if let Err(e) = validated {
        return fail(e);
    }

    // Stages 3-5: Load data, build config, run pipeline
    let data_port = data_adapter(config_path);
    let (series, config, result) = match run_backtest_pipeline(&adapter, &data_port) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    // Stage 6: Console summary
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Rule:             {}", config.rule);
    eprintln!(
        "Window:           {}  Threshold: {}",
        config.window, config.threshold
    );
    eprintln!(
        "Bars:             {} ({} to {})",
        series.len(),
        series.first_timestamp(),
        series.last_timestamp()
    );
    print_summary(&result.report);

    // Stage 7: Reports
    let reporter = CsvReportAdapter::new();
    if let Some(path) = output {
        if let Err(e) = reporter.write_run(&series, &result, &path.to_string_lossy()) {
            return fail(e);
        }
        eprintln!("\nRun written to: {}", path.display());
    }
    if let Some(path) = trades {
        if let Err(e) = reporter.write_trades(&result, &path.to_string_lossy()) {
            return fail(e);
        }
        eprintln!("Trades written to: {}", path.display());
    }

    ExitCode::SUCCESS
}

fn run_optimize(config_path: &Path, output: Option<&Path>, sequential: bool) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate
    let validated = validate_data_config(&adapter)
        .and_then(|_| validate_backtest_config(&adapter))
        .and_then(|_| validate_strategy_config(&adapter))
        .and_then(|_| validate_optimize_config(&adapter));
    if let Err(e) = validated {
        return fail(e);
    }

    // Stages 3-5: Load data, build grid, sweep
    let data_port = data_adapter(config_path);
    let parallel = !sequential && adapter.get_bool("optimize", "parallel", true);
    let result = match run_optimize_pipeline(&adapter, &data_port, parallel) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    // Stage 6: Ranked table on stdout
    let top = match optional::<usize>(&adapter, "optimize", "top") {
        Ok(top) => top.unwrap_or(DEFAULT_TOP),
        Err(e) => return fail(e),
    };
    print_sweep_table(&result, top);

    match result.best() {
        Some(best) => {
            eprintln!("\n=== Best: {} ===", best.point);
            print_summary(&best.report);
        }
        None => eprintln!(
            "\nNo grid point produced a defined {}",
            result.rank_by().metric
        ),
    }

    // Stage 7: Report
    if let Some(path) = output {
        if let Err(e) = CsvReportAdapter::new().write_sweep(&result, &path.to_string_lossy()) {
            return fail(e);
        }
        eprintln!("\nSweep written to: {}", path.display());
    }

    ExitCode::SUCCESS
}

pub fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let validated = validate_data_config(&adapter)
        .and_then(|_| validate_backtest_config(&adapter))
        .and_then(|_| validate_strategy_config(&adapter));
    if let Err(e) = validated {
        return fail(e);
    }
    let rule = match build_rule(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    eprintln!("Config validated successfully");
    eprintln!("\nStrategy rule:");
    eprintln!("  {}", rule);

    if adapter.get_string("optimize", "params").is_some() {
        if let Err(e) = validate_optimize_config(&adapter) {
            return fail(e);
        }
        let grid = match build_grid(&adapter) {
            Ok(g) => g,
            Err(e) => return fail(e),
        };
        let rank_by = match build_rank_by(&adapter) {
            Ok(r) => r,
            Err(e) => return fail(e),
        };
        eprintln!("\nOptimizer grid:");
        eprintln!("  parameters: {}", grid.names().join(", "));
        eprintln!("  points:     {}", grid.size());
        eprintln!("  rank by:    {}", rank_by);
    }

    eprintln!("\nValidation complete: configuration is valid");
    ExitCode::SUCCESS
}

/// Loads the `[data]` series through `data_port`, cut to the configured
/// date range.
pub fn load_series(
    adapter: &dyn ConfigPort,
    data_port: &dyn DataPort,
) -> Result<PriceSeries, CtaError> {
    let path = required::<String>(adapter, "data", "path")?;
    let series = data_port.load_prices(&path)?;

    let start = optional::<NaiveDate>(adapter, "data", "start_date")?;
    let end = optional::<NaiveDate>(adapter, "data", "end_date")?;
    if start.is_none() && end.is_none() {
        return Ok(series);
    }
    let series = series.between(start, end)?;
    info!(bars = series.len(), "applied date range");
    Ok(series)
}

/// Periods per year: explicit override, then the declared interval, then the
/// interval inferred from the bar spacing, then daily.
pub fn resolve_periods_per_year(
    adapter: &dyn ConfigPort,
    series: &PriceSeries,
) -> Result<f64, CtaError> {
    if let Some(ppy) = optional::<f64>(adapter, "backtest", "periods_per_year")? {
        return Ok(ppy);
    }
    if let Some(interval) = optional::<SamplingInterval>(adapter, "data", "interval")? {
        return Ok(interval.periods_per_year());
    }
    match SamplingInterval::infer(series) {
        Some(interval) => {
            info!(%interval, "inferred sampling interval");
            Ok(interval.periods_per_year())
        }
        None => {
            warn!("cannot infer sampling interval from a single bar, assuming 24h");
            Ok(SamplingInterval::Day.periods_per_year())
        }
    }
}

pub fn build_rule(adapter: &dyn ConfigPort) -> Result<SignalRule, CtaError> {
    let direction = required::<Direction>(adapter, "strategy", "direction")?;
    let rule = match rule_kind(adapter)?.as_str() {
        "band_exit" => SignalRule::BandExit {
            direction,
            exit_threshold: required(adapter, "strategy", "exit_threshold")?,
        },
        "trend_filter" => SignalRule::TrendFiltered {
            direction,
            trend_window: required(adapter, "strategy", "trend_window")?,
        },
        "rsi_confirm" => SignalRule::RsiConfirmed {
            direction,
            rsi_period: required(adapter, "strategy", "rsi_period")?,
            rsi_level: required(adapter, "strategy", "rsi_level")?,
        },
        _ => SignalRule::Threshold { direction },
    };
    Ok(rule)
}

pub fn build_backtest_config(
    adapter: &dyn ConfigPort,
    series: &PriceSeries,
) -> Result<BacktestConfig, CtaError> {
    Ok(BacktestConfig {
        rule: build_rule(adapter)?,
        window: required(adapter, "strategy", "window")?,
        threshold: required(adapter, "strategy", "threshold")?,
        metrics: MetricsConfig {
            periods_per_year: resolve_periods_per_year(adapter, series)?,
            risk_free_rate: optional(adapter, "backtest", "risk_free_rate")?.unwrap_or(0.0),
        },
    })
}

pub fn build_grid(adapter: &dyn ConfigPort) -> Result<ParameterGrid, CtaError> {
    let mut grid = ParameterGrid::new();
    for name in param_names(adapter)? {
        let range = param_range(adapter, &name)?;
        grid.add(&name, range)?;
    }
    Ok(grid)
}

pub fn build_rank_by(adapter: &dyn ConfigPort) -> Result<RankBy, CtaError> {
    let metric = required::<MetricName>(adapter, "optimize", "metric")?;
    let rank_by = RankBy::new(metric);
    Ok(match optional::<Objective>(adapter, "optimize", "objective")? {
        Some(objective) => rank_by.with_objective(objective),
        None => rank_by,
    })
}

pub fn run_backtest_pipeline(
    adapter: &dyn ConfigPort,
    data_port: &dyn DataPort,
) -> Result<(PriceSeries, BacktestConfig, BacktestResult), CtaError> {
    let series = load_series(adapter, data_port)?;
    let config = build_backtest_config(adapter, &series)?;
    info!(
        rule = %config.rule,
        window = config.window,
        threshold = config.threshold,
        periods_per_year = config.metrics.periods_per_year,
        "running backtest"
    );
    let result = backtest::run(&series, &config)?;
    Ok((series, config, result))
}

pub fn run_optimize_pipeline(
    adapter: &dyn ConfigPort,
    data_port: &dyn DataPort,
    parallel: bool,
) -> Result<OptimizationResult, CtaError> {
    let series = load_series(adapter, data_port)?;
    let base = build_backtest_config(adapter, &series)?;
    let grid = build_grid(adapter)?;
    let rank_by = build_rank_by(adapter)?;

    Ok(Optimizer::new(rank_by)
        .with_parallelism(parallel)
        .run(&series, &base, &grid))
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}%", v * 100.0))
}

fn fmt_num(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

/// Drawdown is shown as a positive loss fraction everywhere on the console.
fn fmt_drawdown(value: Option<f64>) -> String {
    fmt_pct(value)
}

pub fn summary_lines(report: &MetricsReport) -> Vec<String> {
    vec![
        format!("Total Return:     {}", fmt_pct(report.total_return)),
        format!("Annual Return:    {}", fmt_pct(report.annualized_return)),
        format!("Volatility:       {}", fmt_pct(report.volatility)),
        format!("Sharpe Ratio:     {}", fmt_num(report.sharpe_ratio)),
        format!("Sortino Ratio:    {}", fmt_num(report.sortino_ratio)),
        format!("Max Drawdown:     {}", fmt_drawdown(report.max_drawdown)),
        format!("Calmar Ratio:     {}", fmt_num(report.calmar_ratio)),
        format!(
            "Recovery Time:    {}",
            report
                .recovery_time
                .map_or_else(|| "not recovered".to_string(), |t| format!("{} bars", t))
        ),
        format!(
            "Total Trades:     {} ({} closed{})",
            report.total_trades,
            report.closed_trades,
            if report.has_open_trade { ", 1 open" } else { "" }
        ),
        format!("Win Rate:         {}", fmt_pct(report.win_rate)),
        format!("Profit Factor:    {}", fmt_num(report.profit_factor)),
        format!(
            "Max Loss Streak:  {}",
            report
                .max_consecutive_losses
                .map_or_else(|| "n/a".to_string(), |n| n.to_string())
        ),
        format!("Avg Duration:     {} bars", fmt_num(report.avg_trade_duration)),
        format!("Time in Market:   {}", fmt_pct(report.time_in_market)),
    ]
}

pub fn print_summary(report: &MetricsReport) {
    for line in summary_lines(report) {
        eprintln!("{}", line);
    }
}

pub fn sweep_row(rank: usize, entry: &OptimizationEntry, metric: MetricName) -> String {
    let metric_cell = match &entry.error {
        Some(_) => "failed".to_string(),
        None => fmt_num(entry.report.value(metric)),
    };
    format!(
        "{:>4}  {:<40} {:>14} {:>12} {:>10} {:>7}",
        rank,
        entry.point.to_string(),
        metric_cell,
        fmt_pct(entry.report.total_return),
        fmt_drawdown(entry.report.max_drawdown),
        entry.report.total_trades
    )
}

/// Prints the top `n` ranked entries to stdout.
pub fn print_sweep_table(result: &OptimizationResult, n: usize) {
    let metric = result.rank_by().metric;
    println!(
        "{:>4}  {:<40} {:>14} {:>12} {:>10} {:>7}",
        "rank",
        "parameters",
        metric.as_str(),
        "total_ret",
        "max_dd",
        "trades"
    );
    for (rank, entry) in result.top(n).iter().enumerate() {
        println!("{}", sweep_row(rank + 1, entry, metric));
    }
    let failed = result.failed().count();
    if failed > 0 {
        eprintln!("{} of {} grid points failed", failed, result.len());
    }
}
