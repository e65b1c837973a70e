//! Signal rules: indicator frame + parameters -> position series.
//!
//! Every rule decides the position at bar i from data at indices <= i only.
//! The comparison direction is explicit configuration; nothing here assumes
//! whether the strategy chases or fades a deviation from the mean.

use std::fmt;
use std::str::FromStr;

use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::{IndicatorFrame, sma};
use crate::domain::position::Position;

/// Which side of the mean a score must reach to activate the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Active when `score > threshold` (price stretched above its mean).
    Momentum,
    /// Active when `score < -threshold` (price stretched below its mean).
    MeanReversion,
}

impl Direction {
    pub fn enters(self, score: f64, threshold: f64) -> bool {
        match self {
            Direction::Momentum => score > threshold,
            Direction::MeanReversion => score < -threshold,
        }
    }

    /// True once the score has come back through the exit band.
    pub fn exits(self, score: f64, exit_threshold: f64) -> bool {
        match self {
            Direction::Momentum => score < exit_threshold,
            Direction::MeanReversion => score > -exit_threshold,
        }
    }

    /// RSI agrees with the direction when it is beyond `level` on the same side.
    pub fn confirms_rsi(self, rsi: f64, level: f64) -> bool {
        match self {
            Direction::Momentum => rsi > level,
            Direction::MeanReversion => rsi < level,
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "momentum" => Ok(Direction::Momentum),
            "mean_reversion" | "mean-reversion" => Ok(Direction::MeanReversion),
            other => Err(format!(
                "unknown direction '{}' (expected momentum or mean_reversion)",
                other
            )),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Momentum => write!(f, "momentum"),
            Direction::MeanReversion => write!(f, "mean_reversion"),
        }
    }
}

/// A position rule selected at configuration time.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalRule {
    /// Active on every bar whose score clears the threshold.
    Threshold { direction: Direction },
    /// Enter like `Threshold`, hold until the score crosses back through
    /// `exit_threshold`.
    BandExit {
        direction: Direction,
        exit_threshold: f64,
    },
    /// `Threshold`, only while the close is above its `trend_window` average.
    TrendFiltered {
        direction: Direction,
        trend_window: usize,
    },
    /// `Threshold`, only when RSI(`rsi_period`) agrees relative to `rsi_level`.
    RsiConfirmed {
        direction: Direction,
        rsi_period: usize,
        rsi_level: f64,
    },
}

impl SignalRule {
    pub fn direction(&self) -> Direction {
        match self {
            SignalRule::Threshold { direction }
            | SignalRule::BandExit { direction, .. }
            | SignalRule::TrendFiltered { direction, .. }
            | SignalRule::RsiConfirmed { direction, .. } => *direction,
        }
    }

    /// Config name of the rule kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalRule::Threshold { .. } => "threshold",
            SignalRule::BandExit { .. } => "band_exit",
            SignalRule::TrendFiltered { .. } => "trend_filter",
            SignalRule::RsiConfirmed { .. } => "rsi_confirm",
        }
    }

    /// Produces one position per bar of `frame`. Bars with an undefined
    /// score, or an undefined confirming indicator, are always flat.
    pub fn generate(&self, prices: &[f64], frame: &IndicatorFrame, threshold: f64) -> Vec<Position> {
        let direction = self.direction();
        let active = |on: bool| if on { Position::Long } else { Position::Flat };

        match self {
            SignalRule::Threshold { .. } => frame
                .score
                .iter()
                .map(|score| active(score.is_some_and(|z| direction.enters(z, threshold))))
                .collect(),

            SignalRule::BandExit { exit_threshold, .. } => {
                let mut held = Position::Flat;
                frame
                    .score
                    .iter()
                    .map(|score| {
                        held = match score {
                            None => Position::Flat,
                            Some(z) if held.is_flat() => active(direction.enters(*z, threshold)),
                            Some(z) => active(!direction.exits(*z, *exit_threshold)),
                        };
                        held
                    })
                    .collect()
            }

            SignalRule::TrendFiltered { trend_window, .. } => {
                let trend = sma(prices, *trend_window);
                frame
                    .score
                    .iter()
                    .zip(prices.iter().zip(trend.iter()))
                    .map(|(score, (price, trend_mean))| match (score, trend_mean) {
                        (Some(z), Some(m)) => active(direction.enters(*z, threshold) && price > m),
                        _ => Position::Flat,
                    })
                    .collect()
            }

            SignalRule::RsiConfirmed {
                rsi_period,
                rsi_level,
                ..
            } => {
                let rsi = calculate_rsi(prices, *rsi_period);
                frame
                    .score
                    .iter()
                    .zip(rsi.iter())
                    .map(|(score, rsi)| match (score, rsi) {
                        (Some(z), Some(r)) => active(
                            direction.enters(*z, threshold) && direction.confirms_rsi(*r, *rsi_level),
                        ),
                        _ => Position::Flat,
                    })
                    .collect()
            }
        }
    }
}

impl fmt::Display for SignalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalRule::Threshold { direction } => write!(f, "THRESHOLD({})", direction),
            SignalRule::BandExit {
                direction,
                exit_threshold,
            } => write!(f, "BAND_EXIT({}, exit={})", direction, exit_threshold),
            SignalRule::TrendFiltered {
                direction,
                trend_window,
            } => write!(f, "TREND_FILTER({}, trend={})", direction, trend_window),
            SignalRule::RsiConfirmed {
                direction,
                rsi_period,
                rsi_level,
            } => write!(
                f,
                "RSI_CONFIRM({}, rsi={}, level={})",
                direction, rsi_period, rsi_level
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position::{Flat, Long};

    fn frame_with_scores(scores: &[Option<f64>]) -> IndicatorFrame {
        IndicatorFrame {
            window: 2,
            mean: vec![Some(0.0); scores.len()],
            stddev: vec![Some(1.0); scores.len()],
            score: scores.to_vec(),
        }
    }

    #[test]
    fn direction_parse() {
        assert_eq!("momentum".parse::<Direction>(), Ok(Direction::Momentum));
        assert_eq!(
            "Mean_Reversion".parse::<Direction>(),
            Ok(Direction::MeanReversion)
        );
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn threshold_momentum() {
        let frame = frame_with_scores(&[None, Some(0.5), Some(1.5), Some(1.0), Some(-2.0)]);
        let rule = SignalRule::Threshold {
            direction: Direction::Momentum,
        };
        let prices = [1.0; 5];
        assert_eq!(
            rule.generate(&prices, &frame, 1.0),
            vec![Flat, Flat, Long, Flat, Flat]
        );
    }

    #[test]
    fn threshold_mean_reversion() {
        let frame = frame_with_scores(&[None, Some(0.5), Some(1.5), Some(-1.0), Some(-2.0)]);
        let rule = SignalRule::Threshold {
            direction: Direction::MeanReversion,
        };
        let prices = [1.0; 5];
        assert_eq!(
            rule.generate(&prices, &frame, 1.0),
            vec![Flat, Flat, Flat, Flat, Long]
        );
    }

    #[test]
    fn threshold_unreachable_is_all_flat() {
        let frame = frame_with_scores(&[Some(3.0), Some(-3.0), Some(10.0)]);
        let rule = SignalRule::Threshold {
            direction: Direction::Momentum,
        };
        let positions = rule.generate(&[1.0; 3], &frame, 1e9);
        assert!(positions.iter().all(|p| p.is_flat()));
    }

    #[test]
    fn band_exit_holds_until_exit_band() {
        let frame = frame_with_scores(&[
            Some(0.0),
            Some(2.5),
            Some(1.0),
            Some(0.6),
            Some(0.4),
            Some(1.0),
        ]);
        let rule = SignalRule::BandExit {
            direction: Direction::Momentum,
            exit_threshold: 0.5,
        };
        assert_eq!(
            rule.generate(&[1.0; 6], &frame, 2.0),
            vec![Flat, Long, Long, Long, Flat, Flat]
        );
    }

    #[test]
    fn band_exit_mean_reversion_exits_at_mean() {
        let frame = frame_with_scores(&[Some(-2.5), Some(-1.0), Some(0.1), Some(-0.5)]);
        let rule = SignalRule::BandExit {
            direction: Direction::MeanReversion,
            exit_threshold: 0.0,
        };
        assert_eq!(
            rule.generate(&[1.0; 4], &frame, 2.0),
            vec![Long, Long, Flat, Flat]
        );
    }

    #[test]
    fn band_exit_undefined_score_resets() {
        let frame = frame_with_scores(&[Some(3.0), None, Some(1.0)]);
        let rule = SignalRule::BandExit {
            direction: Direction::Momentum,
            exit_threshold: 0.0,
        };
        assert_eq!(rule.generate(&[1.0; 3], &frame, 2.0), vec![Long, Flat, Flat]);
    }

    #[test]
    fn trend_filter_blocks_below_trend() {
        // trend SMA(2): [-, 11, 10, 7.5]
        let prices = [12.0, 10.0, 10.0, 5.0];
        let frame = frame_with_scores(&[Some(-3.0), Some(-3.0), Some(-3.0), Some(-3.0)]);
        let rule = SignalRule::TrendFiltered {
            direction: Direction::MeanReversion,
            trend_window: 2,
        };
        // bar 0 has no trend; bar 1: 10 < 11; bar 2: 10 == 10 (not above); bar 3: 5 < 7.5
        assert_eq!(
            rule.generate(&prices, &frame, 1.0),
            vec![Flat, Flat, Flat, Flat]
        );

        let rising = [10.0, 11.0, 12.0, 13.0];
        assert_eq!(
            rule.generate(&rising, &frame, 1.0),
            vec![Flat, Long, Long, Long]
        );
    }

    #[test]
    fn rsi_confirm_requires_both() {
        // changes +1 +1 +1 -> RSI(2) at bars 2, 3 = 100
        let prices = [10.0, 11.0, 12.0, 13.0];
        let frame = frame_with_scores(&[Some(2.0), Some(2.0), Some(2.0), Some(0.5)]);
        let rule = SignalRule::RsiConfirmed {
            direction: Direction::Momentum,
            rsi_period: 2,
            rsi_level: 50.0,
        };
        assert_eq!(
            rule.generate(&prices, &frame, 1.0),
            vec![Flat, Flat, Long, Flat]
        );

        let oversold_only = SignalRule::RsiConfirmed {
            direction: Direction::MeanReversion,
            rsi_period: 2,
            rsi_level: 30.0,
        };
        let falling = [13.0, 12.0, 11.0, 10.0];
        let low = frame_with_scores(&[Some(-2.0); 4]);
        assert_eq!(
            oversold_only.generate(&falling, &low, 1.0),
            vec![Flat, Flat, Long, Long]
        );
    }

    #[test]
    fn rule_display_and_kind() {
        let rule = SignalRule::BandExit {
            direction: Direction::Momentum,
            exit_threshold: 0.5,
        };
        assert_eq!(rule.to_string(), "BAND_EXIT(momentum, exit=0.5)");
        assert_eq!(rule.kind(), "band_exit");
        assert_eq!(rule.direction(), Direction::Momentum);
    }
}
