//! Parameter-grid optimizer.
//!
//! Enumerates the Cartesian product of the declared parameter ranges (first
//! declared parameter outermost), runs the backtest pipeline for every point,
//! and ranks the reports by one metric. Points share nothing mutable, so they
//! can be evaluated with rayon; results are always stored in enumeration
//! order regardless of how they were computed.

use std::cmp::Ordering;
use std::fmt;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::backtest::{self, BacktestConfig, SWEEPABLE_PARAMS};
use crate::domain::error::CtaError;
use crate::domain::metrics::{MetricName, MetricsReport, Objective};
use crate::domain::price::PriceSeries;

const RANGE_TOLERANCE: f64 = 1e-9;

/// Upper bound on the number of points in one grid.
pub const MAX_GRID_POINTS: usize = 1_000_000;

/// Inclusive arithmetic range `start, start + step, ..., <= stop`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl ParamRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Result<Self, String> {
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err("range bounds must be finite".into());
        }
        if step <= 0.0 {
            return Err(format!("step must be positive, got {}", step));
        }
        if stop < start {
            return Err(format!("stop {} is below start {}", stop, start));
        }
        let steps = ((stop - start) / step + RANGE_TOLERANCE).floor();
        if steps >= MAX_GRID_POINTS as f64 {
            return Err(format!(
                "range has more than {} values",
                MAX_GRID_POINTS
            ));
        }
        Ok(ParamRange { start, stop, step })
    }

    pub fn single(value: f64) -> Self {
        ParamRange {
            start: value,
            stop: value,
            step: 1.0,
        }
    }

    pub fn len(&self) -> usize {
        // float-to-int casts saturate
        (((self.stop - self.start) / self.step + RANGE_TOLERANCE).floor() as usize).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Each value is computed as `start + k * step` so no rounding error
    /// accumulates along the range.
    pub fn values(&self) -> Vec<f64> {
        (0..self.len())
            .map(|k| self.start + k as f64 * self.step)
            .collect()
    }
}

/// One combination of parameter values, in grid declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterPoint {
    values: Vec<(String, f64)>,
}

impl ParameterPoint {
    pub fn new(values: Vec<(String, f64)>) -> Self {
        ParameterPoint { values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn values(&self) -> &[(String, f64)] {
        &self.values
    }

    /// Applies every value of the point to `base`, in order.
    pub fn apply(&self, base: &BacktestConfig) -> Result<BacktestConfig, CtaError> {
        self.values
            .iter()
            .try_fold(base.clone(), |config, (name, value)| {
                config.with_param(name, *value)
            })
    }
}

impl fmt::Display for ParameterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// Ordered set of named parameter ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterGrid {
    params: Vec<(String, ParamRange)>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter. Unknown names and repeated names are rejected.
    pub fn add(&mut self, name: &str, range: ParamRange) -> Result<(), CtaError> {
        if !SWEEPABLE_PARAMS.contains(&name) {
            return Err(CtaError::invalid_parameter(
                name,
                format!(
                    "not a sweepable parameter (expected one of {})",
                    SWEEPABLE_PARAMS.join(", ")
                ),
            ));
        }
        if self.params.iter().any(|(n, _)| n == name) {
            return Err(CtaError::invalid_parameter(name, "declared twice"));
        }
        match self.size().checked_mul(range.len()) {
            Some(size) if size <= MAX_GRID_POINTS => {}
            _ => {
                return Err(CtaError::ConfigInvalid {
                    section: "optimize".into(),
                    key: name.to_string(),
                    reason: format!("grid would exceed {} points", MAX_GRID_POINTS),
                });
            }
        }
        self.params.push((name.to_string(), range));
        Ok(())
    }

    pub fn with(mut self, name: &str, range: ParamRange) -> Result<Self, CtaError> {
        self.add(name, range)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn size(&self) -> usize {
        self.params
            .iter()
            .fold(1usize, |acc, (_, r)| acc.saturating_mul(r.len()))
    }

    /// Cartesian product, last parameter varying fastest. An empty grid has
    /// exactly one (empty) point: the base configuration.
    pub fn points(&self) -> Vec<ParameterPoint> {
        let axes: Vec<Vec<f64>> = self.params.iter().map(|(_, r)| r.values()).collect();
        let mut points = Vec::with_capacity(self.size());
        let mut counters = vec![0usize; axes.len()];

        loop {
            let values = self
                .params
                .iter()
                .zip(&axes)
                .zip(&counters)
                .map(|(((name, _), axis), &k)| (name.clone(), axis[k]))
                .collect();
            points.push(ParameterPoint::new(values));

            // advance the odometer from the innermost axis
            let mut axis = axes.len();
            loop {
                if axis == 0 {
                    return points;
                }
                axis -= 1;
                counters[axis] += 1;
                if counters[axis] < axes[axis].len() {
                    break;
                }
                counters[axis] = 0;
            }
        }
    }
}

/// Metric and direction used to order a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankBy {
    pub metric: MetricName,
    pub objective: Objective,
}

impl RankBy {
    /// Ranks by `metric` in its declared direction.
    pub fn new(metric: MetricName) -> Self {
        RankBy {
            metric,
            objective: metric.default_objective(),
        }
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    /// Better values first; undefined values after every defined one.
    fn compare(&self, a: Option<f64>, b: Option<f64>) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => match self.objective {
                Objective::Maximize => y.total_cmp(&x),
                Objective::Minimize => x.total_cmp(&y),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for RankBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.metric, self.objective)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationEntry {
    /// Position in enumeration order.
    pub index: usize,
    pub point: ParameterPoint,
    pub report: MetricsReport,
    /// Set when the point failed; `report` is then entirely undefined.
    pub error: Option<String>,
}

/// Per-value summary of one metric across a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityRow {
    pub value: f64,
    /// Points at this value with the metric defined.
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    entries: Vec<OptimizationEntry>,
    rank_by: RankBy,
}

impl OptimizationResult {
    pub fn new(entries: Vec<OptimizationEntry>, rank_by: RankBy) -> Self {
        OptimizationResult { entries, rank_by }
    }

    /// All entries in enumeration order.
    pub fn entries(&self) -> &[OptimizationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rank_by(&self) -> RankBy {
        self.rank_by
    }

    pub fn failed(&self) -> impl Iterator<Item = &OptimizationEntry> {
        self.entries.iter().filter(|e| e.error.is_some())
    }

    /// Entries best-first. The sort is stable, so equal values keep
    /// enumeration order.
    pub fn ranked(&self) -> Vec<&OptimizationEntry> {
        let metric = self.rank_by.metric;
        let mut ranked: Vec<&OptimizationEntry> = self.entries.iter().collect();
        ranked.sort_by(|a, b| {
            self.rank_by
                .compare(a.report.value(metric), b.report.value(metric))
        });
        ranked
    }

    pub fn top(&self, n: usize) -> Vec<&OptimizationEntry> {
        self.ranked().into_iter().take(n).collect()
    }

    /// Best entry with the ranking metric defined.
    pub fn best(&self) -> Option<&OptimizationEntry> {
        self.ranked()
            .into_iter()
            .next()
            .filter(|e| e.report.value(self.rank_by.metric).is_some())
    }

    pub fn get(&self, point: &ParameterPoint) -> Option<&OptimizationEntry> {
        self.entries.iter().find(|e| &e.point == point)
    }

    /// Mean, min and max of `metric` for each distinct value of `param`,
    /// in order of first appearance. Undefined reports are left out of the
    /// statistics.
    pub fn sensitivity(&self, param: &str, metric: MetricName) -> Vec<SensitivityRow> {
        let mut groups: Vec<(f64, Vec<f64>)> = Vec::new();

        for entry in &self.entries {
            let Some(value) = entry.point.get(param) else {
                continue;
            };
            let slot = match groups.iter().position(|(v, _)| *v == value) {
                Some(i) => i,
                None => {
                    groups.push((value, Vec::new()));
                    groups.len() - 1
                }
            };
            if let Some(m) = entry.report.value(metric) {
                groups[slot].1.push(m);
            }
        }

        groups
            .into_iter()
            .map(|(value, samples)| {
                let count = samples.len();
                let mean = (count > 0).then(|| samples.iter().sum::<f64>() / count as f64);
                let min = samples.iter().copied().reduce(f64::min);
                let max = samples.iter().copied().reduce(f64::max);
                SensitivityRow {
                    value,
                    count,
                    mean,
                    min,
                    max,
                }
            })
            .collect()
    }
}

pub struct Optimizer {
    rank_by: RankBy,
    parallel: bool,
}

impl Optimizer {
    pub fn new(rank_by: RankBy) -> Self {
        Optimizer {
            rank_by,
            parallel: true,
        }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Evaluates every grid point against `series`. A point that fails is
    /// recorded with an undefined report and the sweep carries on.
    pub fn run(
        &self,
        series: &PriceSeries,
        base: &BacktestConfig,
        grid: &ParameterGrid,
    ) -> OptimizationResult {
        let closes = series.closes();
        let points = grid.points();

        info!(
            points = points.len(),
            bars = closes.len(),
            parallel = self.parallel,
            rank_by = %self.rank_by,
            "starting parameter sweep"
        );

        let evaluate = |(index, point): (usize, &ParameterPoint)| {
            evaluate_point(index, point, &closes, base)
        };

        let entries: Vec<OptimizationEntry> = if self.parallel {
            points.par_iter().enumerate().map(evaluate).collect()
        } else {
            points.iter().enumerate().map(evaluate).collect()
        };

        let result = OptimizationResult::new(entries, self.rank_by);
        info!(
            evaluated = result.len(),
            failed = result.failed().count(),
            "parameter sweep finished"
        );
        result
    }
}

fn evaluate_point(
    index: usize,
    point: &ParameterPoint,
    closes: &[f64],
    base: &BacktestConfig,
) -> OptimizationEntry {
    let outcome = point
        .apply(base)
        .and_then(|config| backtest::evaluate(closes, &config));

    match outcome {
        Ok(result) => OptimizationEntry {
            index,
            point: point.clone(),
            report: result.report,
            error: None,
        },
        Err(e) => {
            warn!(index, point = %point, error = %e, "grid point failed");
            OptimizationEntry {
                index,
                point: point.clone(),
                report: MetricsReport::undefined(),
                error: Some(e.to_string()),
            }
        }
    }
}
