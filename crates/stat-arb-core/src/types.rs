use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StatArbError;
use crate::StatArbResult;

/// Prices and price-derived quantities. Wraps Decimal to prevent accidental f64 usage.
pub type Price = Decimal;

/// Rates and returns expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// A single observation of a symbol's price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: Price,
}

/// Wire shape of a [`PriceSeries`] before its invariants are checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

/// Ordered, gap-free price history for one symbol.
///
/// Dates are strictly increasing. Once constructed the series is immutable;
/// every component borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceSeries", into = "RawPriceSeries")]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> StatArbResult<Self> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(StatArbError::InvalidConfiguration {
                field: "symbol".into(),
                reason: "symbol must not be empty".into(),
            });
        }
        if let Some(w) = points.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(StatArbError::InvalidConfiguration {
                field: format!("{symbol}.points"),
                reason: format!(
                    "dates must be strictly increasing, found {} after {}",
                    w[1].date, w[0].date
                ),
            });
        }
        Ok(Self { symbol, points })
    }

    /// Build a series from consecutive daily observations starting at `start`.
    pub fn from_daily(
        symbol: impl Into<String>,
        start: NaiveDate,
        prices: &[Price],
    ) -> StatArbResult<Self> {
        let mut points = Vec::with_capacity(prices.len());
        for (i, price) in prices.iter().enumerate() {
            let date = start
                .checked_add_days(Days::new(i as u64))
                .ok_or_else(|| StatArbError::InvalidConfiguration {
                    field: "start".into(),
                    reason: format!("date overflow at observation {i}"),
                })?;
            points.push(PricePoint {
                date,
                price: *price,
            });
        }
        Self::new(symbol, points)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn prices(&self) -> Vec<Price> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Fails unless both series cover exactly the same dates.
    pub fn ensure_aligned_with(&self, other: &PriceSeries) -> StatArbResult<()> {
        if self.len() != other.len() {
            return Err(StatArbError::InvalidConfiguration {
                field: other.symbol.clone(),
                reason: format!(
                    "{} has {} observations but {} has {}; series must be aligned",
                    other.symbol,
                    other.len(),
                    self.symbol,
                    self.len()
                ),
            });
        }
        if let Some((a, b)) = self
            .points
            .iter()
            .zip(&other.points)
            .find(|(a, b)| a.date != b.date)
        {
            return Err(StatArbError::InvalidConfiguration {
                field: other.symbol.clone(),
                reason: format!(
                    "date mismatch: {} has {} where {} has {}",
                    other.symbol, b.date, self.symbol, a.date
                ),
            });
        }
        Ok(())
    }

    pub(crate) fn ensure_min_len(&self, min: usize, context: &str) -> StatArbResult<()> {
        if self.len() < min {
            return Err(StatArbError::InsufficientData(format!(
                "{context} requires at least {min} observations, {} has {}",
                self.symbol,
                self.len()
            )));
        }
        Ok(())
    }
}

impl TryFrom<RawPriceSeries> for PriceSeries {
    type Error = StatArbError;

    fn try_from(raw: RawPriceSeries) -> Result<Self, Self::Error> {
        PriceSeries::new(raw.symbol, raw.points)
    }
}

impl From<PriceSeries> for RawPriceSeries {
    fn from(series: PriceSeries) -> Self {
        RawPriceSeries {
            symbol: series.symbol,
            points: series.points,
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
