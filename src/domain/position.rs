//! Position states and trade records.

use std::fmt;

/// Market exposure held over one period. The strategy is long-only, so the
/// closed set of states is flat and long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    #[default]
    Flat,
    Long,
}

impl Position {
    pub fn is_flat(self) -> bool {
        self == Position::Flat
    }

    /// Signed fraction of equity exposed to the price move.
    pub fn exposure(self) -> f64 {
        match self {
            Position::Flat => 0.0,
            Position::Long => 1.0,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Position::Flat => 0,
            Position::Long => 1,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Flat => write!(f, "FLAT"),
            Position::Long => write!(f, "LONG"),
        }
    }
}

/// A contiguous run of non-flat executed positions.
///
/// `exit_index`/`exit_price` are `None` while the trade is still open at the
/// end of the series; open trades stay in the trade list but are left out of
/// realized statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_index: usize,
    pub exit_index: Option<usize>,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub direction: Position,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_index.is_none()
    }

    /// Realized fractional return, `None` while open.
    pub fn return_pct(&self) -> Option<f64> {
        self.exit_price
            .map(|exit| self.direction.exposure() * (exit - self.entry_price) / self.entry_price)
    }

    /// Periods between entry and exit, `None` while open.
    pub fn duration(&self) -> Option<usize> {
        self.exit_index.map(|exit| exit - self.entry_index)
    }
}
