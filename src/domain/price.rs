//! Price bars, validated price series and sampling intervals.

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::CtaError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    pub timestamp: NaiveDateTime,
    pub close: f64,
}

/// An ordered, validated sequence of closing prices.
///
/// Construction is the only place the pipeline's preconditions are checked:
/// at least one bar, every close finite and positive, timestamps strictly
/// increasing. Everything downstream assumes these hold.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, CtaError> {
        if bars.is_empty() {
            return Err(CtaError::MalformedSeries {
                index: 0,
                reason: "series has no bars".into(),
            });
        }

        for (i, bar) in bars.iter().enumerate() {
            if !bar.close.is_finite() || bar.close <= 0.0 {
                return Err(CtaError::MalformedSeries {
                    index: i,
                    reason: format!("close must be a positive number, got {}", bar.close),
                });
            }
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(CtaError::MalformedSeries {
                    index: i,
                    reason: format!(
                        "timestamp {} does not follow {}",
                        bar.timestamp,
                        bars[i - 1].timestamp
                    ),
                });
            }
        }

        Ok(Self { bars })
    }

    /// Builds a series from bare closes on consecutive days starting 2020-01-01.
    pub fn from_closes(closes: &[f64]) -> Result<Self, CtaError> {
        let origin = NaiveDate::from_ymd_opt(2020, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| CtaError::DataLoad {
                reason: "invalid origin date".into(),
            })?;
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                timestamp: origin + chrono::Duration::days(i as i64),
                close,
            })
            .collect();
        Self::new(bars)
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> NaiveDateTime {
        self.bars[0].timestamp
    }

    pub fn last_timestamp(&self) -> NaiveDateTime {
        self.bars[self.bars.len() - 1].timestamp
    }

    /// Sub-series with bar dates inside `[start, end]` (either bound optional).
    pub fn between(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, CtaError> {
        let bars: Vec<PriceBar> = self
            .bars
            .iter()
            .filter(|b| start.is_none_or(|s| b.timestamp.date() >= s))
            .filter(|b| end.is_none_or(|e| b.timestamp.date() <= e))
            .copied()
            .collect();

        if bars.is_empty() {
            return Err(CtaError::NoData {
                source_name: format!(
                    "date range {} to {}",
                    start.map_or("start".to_string(), |d| d.to_string()),
                    end.map_or("end".to_string(), |d| d.to_string())
                ),
            });
        }
        Ok(PriceSeries { bars })
    }

    /// Median spacing between consecutive bars, in seconds.
    pub fn median_spacing_secs(&self) -> Option<i64> {
        if self.bars.len() < 2 {
            return None;
        }
        let mut gaps: Vec<i64> = self
            .bars
            .windows(2)
            .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
            .collect();
        gaps.sort_unstable();
        Some(gaps[gaps.len() / 2])
    }
}

/// Bar spacing of a price history. The market trades around the clock, so
/// periods per year count calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingInterval {
    TenMinutes,
    Hour,
    Day,
    Week,
    Month,
}

impl SamplingInterval {
    pub const ALL: [SamplingInterval; 5] = [
        SamplingInterval::TenMinutes,
        SamplingInterval::Hour,
        SamplingInterval::Day,
        SamplingInterval::Week,
        SamplingInterval::Month,
    ];

    pub fn periods_per_year(self) -> f64 {
        match self {
            SamplingInterval::TenMinutes => 52_560.0,
            SamplingInterval::Hour => 8_760.0,
            SamplingInterval::Day => 365.0,
            SamplingInterval::Week => 52.0,
            SamplingInterval::Month => 12.0,
        }
    }

    pub fn nominal_secs(self) -> i64 {
        match self {
            SamplingInterval::TenMinutes => 600,
            SamplingInterval::Hour => 3_600,
            SamplingInterval::Day => 86_400,
            SamplingInterval::Week => 604_800,
            SamplingInterval::Month => 2_629_800,
        }
    }

    /// Nearest known interval to the series' median bar spacing, compared on
    /// a log scale so that e.g. a 30-day month is not mistaken for a week.
    pub fn infer(series: &PriceSeries) -> Option<SamplingInterval> {
        let spacing = series.median_spacing_secs()?;
        if spacing <= 0 {
            return None;
        }
        let target = (spacing as f64).ln();
        Self::ALL.iter().copied().min_by(|a, b| {
            let da = ((a.nominal_secs() as f64).ln() - target).abs();
            let db = ((b.nominal_secs() as f64).ln() - target).abs();
            da.total_cmp(&db)
        })
    }
}

impl FromStr for SamplingInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "10m" => Ok(SamplingInterval::TenMinutes),
            "1h" => Ok(SamplingInterval::Hour),
            "24h" | "1d" => Ok(SamplingInterval::Day),
            "1w" => Ok(SamplingInterval::Week),
            "1month" => Ok(SamplingInterval::Month),
            other => Err(format!(
                "unknown interval '{}' (expected 10m, 1h, 24h, 1w or 1month)",
                other
            )),
        }
    }
}

impl fmt::Display for SamplingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SamplingInterval::TenMinutes => "10m",
            SamplingInterval::Hour => "1h",
            SamplingInterval::Day => "24h",
            SamplingInterval::Week => "1w",
            SamplingInterval::Month => "1month",
        };
        f.write_str(s)
    }
}
