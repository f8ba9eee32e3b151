use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::adf::LagSelection;
use super::engle_granger::EngleGranger;
use super::CointegrationTest;
use crate::error::StatArbError;
use crate::types::{PriceSeries, Rate};
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A pair whose cointegration p-value fell below the significance level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCandidate {
    pub symbol_a: String,
    pub symbol_b: String,
    pub p_value: Decimal,
}

/// Square p-value matrix over the universe. Only the upper triangle is
/// tested; the diagonal and lower triangle hold 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PValueMatrix {
    symbols: Vec<String>,
    values: Vec<Vec<Decimal>>,
}

impl PValueMatrix {
    fn new(symbols: Vec<String>) -> Self {
        let n = symbols.len();
        Self {
            symbols,
            values: vec![vec![Decimal::ONE; n]; n],
        }
    }

    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Row-major values, suitable for rendering as a heatmap.
    pub fn rows(&self) -> &[Vec<Decimal>] {
        &self.values
    }

    pub fn get(&self, i: usize, j: usize) -> Option<Decimal> {
        self.values.get(i)?.get(j).copied()
    }

    /// p-value of a pair in either order, read from the upper triangle.
    pub fn p_value(&self, a: &str, b: &str) -> Option<Decimal> {
        let i = self.symbols.iter().position(|s| s == a)?;
        let j = self.symbols.iter().position(|s| s == b)?;
        self.get(i.min(j), i.max(j))
    }
}

/// A pair the scan could not test because one leg is degenerate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPair {
    pub symbol_a: String,
    pub symbol_b: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairScan {
    pub matrix: PValueMatrix,
    /// Significant pairs, lowest p-value first
    pub ranked_pairs: Vec<PairCandidate>,
    pub skipped: Vec<SkippedPair>,
    pub tests_run: usize,
}

impl PairScan {
    pub fn best(&self) -> Option<&PairCandidate> {
        self.ranked_pairs.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Pairs with p-value strictly below this level are reported (default 0.05)
    pub significance: Rate,
    pub lag_selection: LagSelection,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            significance: dec!(0.05),
            lag_selection: LagSelection::default(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        validate_threshold(self.significance)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Engle–Granger scan of every unordered pair in `universe`.
///
/// Cost is O(n²) tests of O(T) each; there is no pruning, every pair is
/// tested independently.
pub fn scan_pairs(universe: &[PriceSeries], threshold: Rate) -> StatArbResult<PairScan> {
    scan_pairs_with(universe, threshold, &EngleGranger::default())
}

pub fn scan_pairs_with_config(
    universe: &[PriceSeries],
    config: &ScanConfig,
) -> StatArbResult<PairScan> {
    config.validate()?;
    scan_pairs_with(
        universe,
        config.significance,
        &EngleGranger::new(config.lag_selection),
    )
}

/// Scan with any [`CointegrationTest`]. Pairs are visited as (i, j), i < j,
/// in universe order, and ties in the ranking keep that order.
pub fn scan_pairs_with<T>(
    universe: &[PriceSeries],
    threshold: Rate,
    tester: &T,
) -> StatArbResult<PairScan>
where
    T: CointegrationTest + ?Sized,
{
    validate_threshold(threshold)?;
    validate_universe(universe)?;

    let n = universe.len();
    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();
    let outcomes = evaluate_pairs(universe, &pairs, tester);

    let mut matrix = PValueMatrix::new(universe.iter().map(|s| s.symbol().to_string()).collect());
    let mut ranked_pairs = Vec::new();
    let mut skipped = Vec::new();

    for ((i, j), outcome) in pairs.iter().copied().zip(outcomes) {
        let (a, b) = (&universe[i], &universe[j]);
        match outcome {
            Ok(p_value) => {
                if p_value < Decimal::ZERO || p_value > Decimal::ONE {
                    return Err(StatArbError::InvalidConfiguration {
                        field: format!("{}/{}", a.symbol(), b.symbol()),
                        reason: format!("test returned p-value {p_value} outside [0, 1]"),
                    });
                }
                matrix.values[i][j] = p_value;
                if p_value < threshold {
                    ranked_pairs.push(PairCandidate {
                        symbol_a: a.symbol().to_string(),
                        symbol_b: b.symbol().to_string(),
                        p_value,
                    });
                }
            }
            Err(StatArbError::DegenerateRegression { context }) => {
                tracing::warn!(a = a.symbol(), b = b.symbol(), %context, "skipping pair");
                skipped.push(SkippedPair {
                    symbol_a: a.symbol().to_string(),
                    symbol_b: b.symbol().to_string(),
                    reason: context,
                });
            }
            Err(e) => return Err(e),
        }
    }

    // sort_by is stable: equal p-values keep (i, j) order
    ranked_pairs.sort_by(|x, y| x.p_value.cmp(&y.p_value));

    tracing::info!(
        symbols = n,
        tests = pairs.len(),
        significant = ranked_pairs.len(),
        skipped = skipped.len(),
        %threshold,
        "pair scan complete"
    );

    Ok(PairScan {
        matrix,
        ranked_pairs,
        skipped,
        tests_run: pairs.len(),
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

#[cfg(not(feature = "parallel"))]
fn evaluate_pairs<T>(
    universe: &[PriceSeries],
    pairs: &[(usize, usize)],
    tester: &T,
) -> Vec<StatArbResult<Decimal>>
where
    T: CointegrationTest + ?Sized,
{
    pairs
        .iter()
        .map(|&(i, j)| tester.p_value(&universe[i], &universe[j]))
        .collect()
}

#[cfg(feature = "parallel")]
fn evaluate_pairs<T>(
    universe: &[PriceSeries],
    pairs: &[(usize, usize)],
    tester: &T,
) -> Vec<StatArbResult<Decimal>>
where
    T: CointegrationTest + ?Sized,
{
    use rayon::prelude::*;

    // collect() on an indexed parallel iterator preserves pair order
    pairs
        .par_iter()
        .map(|&(i, j)| tester.p_value(&universe[i], &universe[j]))
        .collect()
}

fn validate_threshold(threshold: Rate) -> StatArbResult<()> {
    if threshold <= Decimal::ZERO || threshold > Decimal::ONE {
        return Err(StatArbError::InvalidConfiguration {
            field: "threshold".into(),
            reason: format!("significance level must be in (0, 1], got {threshold}"),
        });
    }
    Ok(())
}

fn validate_universe(universe: &[PriceSeries]) -> StatArbResult<()> {
    if universe.len() < 2 {
        return Err(StatArbError::InsufficientData(format!(
            "A pair scan needs at least 2 series, got {}",
            universe.len()
        )));
    }
    let mut seen = HashSet::new();
    for s in universe {
        if !seen.insert(s.symbol()) {
            return Err(StatArbError::InvalidConfiguration {
                field: "universe".into(),
                reason: format!("symbol {} appears more than once", s.symbol()),
            });
        }
    }
    let first = &universe[0];
    for s in &universe[1..] {
        first.ensure_aligned_with(s)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
