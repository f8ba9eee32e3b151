pub mod adf;
pub mod engle_granger;
pub mod mackinnon;
pub mod scanner;

use rust_decimal::Decimal;

use crate::types::PriceSeries;
use crate::StatArbResult;

/// A pairwise cointegration test producing a p-value in `[0, 1]`.
///
/// Low p-values are evidence that the two series share a long-run
/// equilibrium. Implementations must be deterministic and free of shared
/// mutable state; the scanner may call them from several threads.
pub trait CointegrationTest: Sync {
    fn p_value(&self, a: &PriceSeries, b: &PriceSeries) -> StatArbResult<Decimal>;
}
