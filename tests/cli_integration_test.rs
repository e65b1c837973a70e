//! CLI integration tests.
//!
//! Tests cover:
//! - Config building (build_rule, build_backtest_config, build_grid, build_rank_by)
//! - Periods-per-year resolution
//! - Pipelines against MockDataPort and against real CSV files on disk
//! - Full command dispatch through `cli::run`

mod common;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use common::*;
use ctatrader::adapters::csv_adapter::CsvAdapter;
use ctatrader::adapters::file_config_adapter::FileConfigAdapter;
use ctatrader::cli::{self, Cli};
use ctatrader::domain::error::CtaError;
use ctatrader::domain::metrics::{MetricName, Objective};
use ctatrader::domain::signal::{Direction, SignalRule};

fn config_from(content: &str) -> FileConfigAdapter {
    FileConfigAdapter::from_string(content).unwrap()
}

fn same_code(a: ExitCode, b: ExitCode) -> bool {
    format!("{:?}", a) == format!("{:?}", b)
}

const STRATEGY_INI: &str = r#"
[data]
path = prices.csv

[backtest]
risk_free_rate = 0.0

[strategy]
rule = band_exit
direction = mean_reversion
window = 10
threshold = 1.0
exit_threshold = 0.0

[optimize]
params = window, threshold
window = 5, 15, 5
threshold = 0.5, 1.5, 0.5
metric = max_drawdown
parallel = false
top = 3
"#;

mod config_building {
    use super::*;

    #[test]
    fn build_rule_band_exit() {
        let rule = cli::build_rule(&config_from(STRATEGY_INI)).unwrap();
        assert_eq!(
            rule,
            SignalRule::BandExit {
                direction: Direction::MeanReversion,
                exit_threshold: 0.0,
            }
        );
    }

    #[test]
    fn build_rule_defaults_to_threshold() {
        let config = config_from("[strategy]\ndirection = momentum\n");
        assert_eq!(
            cli::build_rule(&config).unwrap(),
            SignalRule::Threshold {
                direction: Direction::Momentum
            }
        );
    }

    #[test]
    fn build_rule_rsi_confirm() {
        let config = config_from(
            "[strategy]\nrule = rsi_confirm\ndirection = momentum\nrsi_period = 14\nrsi_level = 55\n",
        );
        assert_eq!(
            cli::build_rule(&config).unwrap(),
            SignalRule::RsiConfirmed {
                direction: Direction::Momentum,
                rsi_period: 14,
                rsi_level: 55.0,
            }
        );
    }

    #[test]
    fn build_backtest_config_reads_strategy() {
        let config = cli::build_backtest_config(
            &config_from(STRATEGY_INI),
            &series(&zigzag(30)),
        )
        .unwrap();
        assert_eq!(config.window, 10);
        assert_eq!(config.threshold, 1.0);
        // daily bars
        assert_eq!(config.metrics.periods_per_year, 365.0);
        assert_eq!(config.metrics.risk_free_rate, 0.0);
    }

    #[test]
    fn missing_window_is_config_missing() {
        let config = config_from("[strategy]\ndirection = momentum\nthreshold = 1\n");
        let err = cli::build_backtest_config(&config, &series(&zigzag(10))).unwrap_err();
        assert!(matches!(err, CtaError::ConfigMissing { ref key, .. } if key == "window"));
    }

    #[test]
    fn build_grid_keeps_declaration_order() {
        let grid = cli::build_grid(&config_from(STRATEGY_INI)).unwrap();
        assert_eq!(grid.names(), vec!["window", "threshold"]);
        assert_eq!(grid.size(), 9);
        let first = &grid.points()[0];
        assert_eq!(first.get("window"), Some(5.0));
        assert_eq!(first.get("threshold"), Some(0.5));
    }

    #[test]
    fn build_rank_by_uses_declared_objective() {
        let rank = cli::build_rank_by(&config_from(STRATEGY_INI)).unwrap();
        assert_eq!(rank.metric, MetricName::MaxDrawdown);
        assert_eq!(rank.objective, Objective::Minimize);
    }

    #[test]
    fn build_rank_by_honours_override() {
        let config = config_from("[optimize]\nmetric = sharpe\nobjective = minimize\n");
        let rank = cli::build_rank_by(&config).unwrap();
        assert_eq!(rank.objective, Objective::Minimize);
    }
}

mod periods_per_year {
    use super::*;

    #[test]
    fn explicit_override_wins() {
        let config = config_from("[data]\ninterval = 1h\n[backtest]\nperiods_per_year = 252\n");
        let ppy = cli::resolve_periods_per_year(&config, &series(&zigzag(5))).unwrap();
        assert_eq!(ppy, 252.0);
    }

    #[test]
    fn declared_interval_beats_inference() {
        let config = config_from("[data]\ninterval = 1w\n");
        let ppy = cli::resolve_periods_per_year(&config, &series(&zigzag(5))).unwrap();
        assert_eq!(ppy, 52.0);
    }

    #[test]
    fn inferred_from_spacing() {
        let config = config_from("[data]\npath = x.csv\n");
        let ppy = cli::resolve_periods_per_year(&config, &series(&zigzag(5))).unwrap();
        assert_eq!(ppy, 365.0);
    }

    #[test]
    fn single_bar_falls_back_to_daily() {
        let config = config_from("[data]\npath = x.csv\n");
        let ppy = cli::resolve_periods_per_year(&config, &series(&[100.0])).unwrap();
        assert_eq!(ppy, 365.0);
    }
}

mod pipelines {
    use super::*;

    #[test]
    fn backtest_pipeline_with_mock_data() {
        let data = MockDataPort::new(series(&zigzag(120)));
        let (loaded, config, result) =
            cli::run_backtest_pipeline(&config_from(STRATEGY_INI), &data).unwrap();
        assert_eq!(loaded.len(), 120);
        assert_eq!(config.window, 10);
        assert_eq!(result.simulation.equity.len(), 120);
    }

    #[test]
    fn data_errors_propagate() {
        let data = MockDataPort::failing("connection refused");
        let err = cli::run_backtest_pipeline(&config_from(STRATEGY_INI), &data).unwrap_err();
        assert!(matches!(err, CtaError::DataLoad { .. }));
        assert!(same_code(ExitCode::from(&err), ExitCode::from(5)));
    }

    #[test]
    fn date_range_is_applied() {
        let ini = STRATEGY_INI.replace(
            "path = prices.csv",
            "path = prices.csv\nstart_date = 2020-01-11\nend_date = 2020-01-30",
        );
        let data = MockDataPort::new(series(&zigzag(60)));
        let (loaded, _, _) = cli::run_backtest_pipeline(&config_from(&ini), &data).unwrap();
        assert_eq!(loaded.len(), 20);
    }

    #[test]
    fn empty_date_range_is_no_data() {
        let ini = STRATEGY_INI.replace("path = prices.csv", "path = prices.csv\nstart_date = 2030-01-01");
        let data = MockDataPort::new(series(&zigzag(60)));
        let err = cli::run_backtest_pipeline(&config_from(&ini), &data).unwrap_err();
        assert!(matches!(err, CtaError::NoData { .. }));
    }

    #[test]
    fn optimize_pipeline_with_mock_data() {
        let data = MockDataPort::new(series(&zigzag(150)));
        let result = cli::run_optimize_pipeline(&config_from(STRATEGY_INI), &data, true).unwrap();
        assert_eq!(result.len(), 9);
        assert!(result.failed().next().is_none());
        assert!(result.best().is_some());
    }

    #[test]
    fn backtest_pipeline_with_csv_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("prices.csv"), price_csv(&zigzag(90))).unwrap();

        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let (loaded, _, result) =
            cli::run_backtest_pipeline(&config_from(STRATEGY_INI), &adapter).unwrap();
        assert_eq!(loaded.len(), 90);
        assert!(result.report.total_return.is_some());
    }
}

mod commands {
    use super::*;

    fn write_setup(dir: &Path, ini: &str) -> std::path::PathBuf {
        std::fs::write(dir.join("prices.csv"), price_csv(&zigzag(120))).unwrap();
        let ini_path = dir.join("strategy.ini");
        std::fs::write(&ini_path, ini).unwrap();
        ini_path
    }

    fn run_args(args: &[&str]) -> ExitCode {
        cli::run(Cli::try_parse_from(args).unwrap())
    }

    #[test]
    fn backtest_command_writes_reports() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini = write_setup(dir.path(), STRATEGY_INI);
        let run_csv = dir.path().join("run.csv");
        let trades_csv = dir.path().join("trades.csv");

        let code = run_args(&[
            "ctatrader",
            "backtest",
            "--config",
            ini.to_str().unwrap(),
            "--output",
            run_csv.to_str().unwrap(),
            "--trades",
            trades_csv.to_str().unwrap(),
        ]);
        assert!(same_code(code, ExitCode::SUCCESS));

        let run = std::fs::read_to_string(&run_csv).unwrap();
        assert!(run.starts_with("timestamp,close,mean,stddev,score,position,executed,return,equity"));
        assert_eq!(run.lines().count(), 121);
        assert!(trades_csv.exists());
    }

    #[test]
    fn optimize_command_writes_sweep() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini = write_setup(dir.path(), STRATEGY_INI);
        let sweep_csv = dir.path().join("sweep.csv");

        let code = run_args(&[
            "ctatrader",
            "optimize",
            "-c",
            ini.to_str().unwrap(),
            "-o",
            sweep_csv.to_str().unwrap(),
        ]);
        assert!(same_code(code, ExitCode::SUCCESS));

        let sweep = std::fs::read_to_string(&sweep_csv).unwrap();
        assert_eq!(sweep.lines().count(), 10);
        assert!(sweep.starts_with("rank,index,window,threshold,total_return"));
    }

    #[test]
    fn validate_command_accepts_valid_config() {
        let file = write_temp_file(".ini", STRATEGY_INI);
        assert!(same_code(cli::run_validate(file.path()), ExitCode::SUCCESS));
    }

    #[test]
    fn validate_command_rejects_bad_config() {
        let ini = STRATEGY_INI.replace("window = 10", "window = 1");
        let file = write_temp_file(".ini", &ini);
        assert!(same_code(cli::run_validate(file.path()), ExitCode::from(2)));
    }

    #[test]
    fn validate_command_rejects_bad_grid() {
        let ini = STRATEGY_INI.replace("params = window, threshold", "params = window, rsi_level");
        let file = write_temp_file(".ini", &ini);
        assert!(same_code(cli::run_validate(file.path()), ExitCode::from(2)));
    }

    #[test]
    fn missing_config_file_exits_with_config_code() {
        let code = run_args(&["ctatrader", "validate", "-c", "/nonexistent/strategy.ini"]);
        assert!(same_code(code, ExitCode::from(2)));
    }

    #[test]
    fn missing_price_file_exits_with_data_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini_path = dir.path().join("strategy.ini");
        std::fs::write(&ini_path, STRATEGY_INI).unwrap();
        let code = run_args(&["ctatrader", "backtest", "-c", ini_path.to_str().unwrap()]);
        assert!(same_code(code, ExitCode::from(5)));
    }
}
