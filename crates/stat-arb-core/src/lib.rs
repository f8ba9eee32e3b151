pub mod error;
pub mod stats;
pub mod types;

#[cfg(feature = "cointegration")]
pub mod cointegration;

#[cfg(feature = "signals")]
pub mod signals;

#[cfg(feature = "backtest")]
pub mod backtest;

#[cfg(test)]
mod fixtures;

pub use error::StatArbError;
pub use types::*;

/// Standard result type for all stat-arb computations
pub type StatArbResult<T> = Result<T, StatArbError>;
