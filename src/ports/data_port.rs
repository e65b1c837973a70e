//! Price data access port trait.

use crate::domain::error::CtaError;
use crate::domain::price::PriceSeries;

pub trait DataPort {
    /// Loads the full close-price history for `source` (a file path for the
    /// CSV adapter). The returned series has already passed
    /// `PriceSeries::new` validation.
    fn load_prices(&self, source: &str) -> Result<PriceSeries, CtaError>;
}
