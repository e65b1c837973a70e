#![allow(dead_code)]

use std::io::Write;

use ctatrader::domain::backtest::BacktestConfig;
use ctatrader::domain::error::CtaError;
use ctatrader::domain::metrics::MetricsConfig;
use ctatrader::domain::price::PriceSeries;
use ctatrader::domain::signal::{Direction, SignalRule};
use ctatrader::ports::data_port::DataPort;

/// Serves one in-memory series, or a fixed error.
pub struct MockDataPort {
    pub series: Option<PriceSeries>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(series: PriceSeries) -> Self {
        Self {
            series: Some(series),
            error: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            series: None,
            error: Some(reason.to_string()),
        }
    }
}

impl DataPort for MockDataPort {
    fn load_prices(&self, source: &str) -> Result<PriceSeries, CtaError> {
        if let Some(reason) = &self.error {
            return Err(CtaError::DataLoad {
                reason: reason.clone(),
            });
        }
        self.series.clone().ok_or_else(|| CtaError::NoData {
            source_name: source.to_string(),
        })
    }
}

pub const WORKED_EXAMPLE: [f64; 7] = [100.0, 102.0, 101.0, 105.0, 99.0, 98.0, 110.0];

pub fn series(closes: &[f64]) -> PriceSeries {
    PriceSeries::from_closes(closes).unwrap()
}

/// Deterministic oscillating series with drift, long enough for every rule.
pub fn zigzag(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + (t * 0.45).sin() * 6.0 + (t * 0.13).cos() * 3.0 + t * 0.15
        })
        .collect()
}

pub fn threshold_config(direction: Direction, window: usize, threshold: f64) -> BacktestConfig {
    BacktestConfig {
        rule: SignalRule::Threshold { direction },
        window,
        threshold,
        metrics: MetricsConfig::default(),
    }
}

pub fn all_rules(direction: Direction) -> Vec<SignalRule> {
    vec![
        SignalRule::Threshold { direction },
        SignalRule::BandExit {
            direction,
            exit_threshold: 0.25,
        },
        SignalRule::TrendFiltered {
            direction,
            trend_window: 8,
        },
        SignalRule::RsiConfirmed {
            direction,
            rsi_period: 5,
            rsi_level: 50.0,
        },
    ]
}

pub fn write_temp_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// `timestamp,close` CSV with one bar per day from 2021-01-01.
pub fn price_csv(closes: &[f64]) -> String {
    let start = chrono::NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    let mut out = String::from("timestamp,close\n");
    for (i, close) in closes.iter().enumerate() {
        let day = start + chrono::Duration::days(i as i64);
        out.push_str(&format!("{},{}\n", day.format("%Y-%m-%d"), close));
    }
    out
}
