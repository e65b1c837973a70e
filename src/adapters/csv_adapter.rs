//! CSV file data adapter.
//!
//! Expects a header row with a timestamp column (`timestamp`, `date` or
//! `time`) and a `close` column; without recognisable headers the first two
//! columns are used. Rows must already be in ascending time order.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::info;

use crate::domain::error::CtaError;
use crate::domain::price::{PriceBar, PriceSeries};
use crate::ports::data_port::DataPort;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, source: &str) -> PathBuf {
        self.base_path.join(source)
    }
}

impl DataPort for CsvAdapter {
    fn load_prices(&self, source: &str) -> Result<PriceSeries, CtaError> {
        let path = self.csv_path(source);
        let content = fs::read_to_string(&path).map_err(|e| CtaError::DataLoad {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let bars = parse_bars(&content)?;
        if bars.is_empty() {
            return Err(CtaError::NoData {
                source_name: path.display().to_string(),
            });
        }

        let series = PriceSeries::new(bars)?;
        info!(
            path = %path.display(),
            bars = series.len(),
            first = %series.first_timestamp(),
            last = %series.last_timestamp(),
            "loaded price series"
        );
        Ok(series)
    }
}

/// Parses CSV text into bars without validating the series as a whole.
pub fn parse_bars(content: &str) -> Result<Vec<PriceBar>, CtaError> {
    let reader = |has_headers: bool| {
        csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .has_headers(has_headers)
            .from_reader(content.as_bytes())
    };

    let mut rdr = reader(true);
    let headers = rdr.headers()?.clone();
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.contains(&h.to_lowercase().as_str()))
    };
    let ts_named = find(&["timestamp", "date", "time", "datetime"]);
    let close_named = find(&["close", "price"]);

    // no recognised header: the first line is data
    let first_line = if ts_named.is_none() && close_named.is_none() {
        rdr = reader(false);
        1
    } else {
        2
    };
    let ts_col = ts_named.unwrap_or(0);
    let close_col = close_named.unwrap_or(1);

    let mut bars = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let line = row + first_line;

        let ts_str = record.get(ts_col).ok_or_else(|| CtaError::DataLoad {
            reason: format!("line {}: missing timestamp column", line),
        })?;
        let timestamp = parse_timestamp(ts_str).ok_or_else(|| CtaError::DataLoad {
            reason: format!("line {}: invalid timestamp '{}'", line, ts_str),
        })?;

        let close: f64 = record
            .get(close_col)
            .ok_or_else(|| CtaError::DataLoad {
                reason: format!("line {}: missing close column", line),
            })?
            .parse()
            .map_err(|e| CtaError::DataLoad {
                reason: format!("line {}: invalid close value: {}", line, e),
            })?;

        bars.push(PriceBar { timestamp, close });
    }

    Ok(bars)
}

/// Accepts unix seconds, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339
/// (converted to UTC).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data(name: &str, content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        fs::write(path.join(name), content).unwrap();
        (dir, path)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn load_prices_returns_series() {
        let (_dir, path) = setup_test_data(
            "btc.csv",
            "timestamp,close\n2024-01-15,42000.5\n2024-01-16,43000\n2024-01-17,41800.25\n",
        );
        let adapter = CsvAdapter::new(path);
        let series = adapter.load_prices("btc.csv").unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.first_timestamp(), day(2024, 1, 15));
        assert_eq!(series.closes(), vec![42000.5, 43000.0, 41800.25]);
    }

    #[test]
    fn columns_found_by_header_name() {
        let (_dir, path) = setup_test_data(
            "ohlc.csv",
            "date,open,high,low,close\n2024-01-15,1,2,0.5,1.5\n2024-01-16,1.5,2,1,1.8\n",
        );
        let series = CsvAdapter::new(path).load_prices("ohlc.csv").unwrap();
        assert_eq!(series.closes(), vec![1.5, 1.8]);
    }

    #[test]
    fn headerless_file_keeps_first_row() {
        let bars = parse_bars("2024-01-01,100\n2024-01-02,101\n2024-01-03,102\n").unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp, day(2024, 1, 1));
        assert_eq!(bars[0].close, 100.0);
    }

    #[test]
    fn headerless_file_reports_line_numbers() {
        let err = parse_bars("2024-01-01,100\n2024-01-02,oops\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let bars = parse_bars("timestamp,close\n\n2024-01-15,1.0\n\n2024-01-16,2.0\n").unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[test]
    fn missing_file_is_data_error() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        assert!(matches!(
            adapter.load_prices("nope.csv"),
            Err(CtaError::DataLoad { .. })
        ));
    }

    #[test]
    fn header_only_file_is_no_data() {
        let (_dir, path) = setup_test_data("empty.csv", "timestamp,close\n");
        assert!(matches!(
            CsvAdapter::new(path).load_prices("empty.csv"),
            Err(CtaError::NoData { .. })
        ));
    }

    #[test]
    fn bad_close_reports_line() {
        let err = parse_bars("timestamp,close\n2024-01-15,1.0\n2024-01-16,abc\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn unordered_rows_are_rejected() {
        let (_dir, path) = setup_test_data(
            "bad.csv",
            "timestamp,close\n2024-01-16,1.0\n2024-01-15,2.0\n",
        );
        assert!(matches!(
            CsvAdapter::new(path).load_prices("bad.csv"),
            Err(CtaError::MalformedSeries { index: 1, .. })
        ));
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp("1704067200"), Some(day(2024, 1, 1)));
        assert_eq!(parse_timestamp("2024-01-01"), Some(day(2024, 1, 1)));
        assert_eq!(
            parse_timestamp("2024-01-01 10:30:00"),
            day(2024, 1, 1).date().and_hms_opt(10, 30, 0)
        );
        assert_eq!(
            parse_timestamp("2024-01-01T12:00:00+02:00"),
            day(2024, 1, 1).date().and_hms_opt(10, 0, 0)
        );
        assert_eq!(parse_timestamp("01/01/2024"), None);
    }
}
