use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::StatArbError;
use crate::stats::{ln_decimal, mean, population_std, sample_std, simple_regression};
use crate::types::PriceSeries;
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How the spread is standardised into a z-score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZScoreNormalization {
    /// Mean and population std over the whole sample. Every z-score sees the
    /// full history, including observations after it.
    #[default]
    FullSample,
    /// Mean and sample std over the trailing `window` observations only.
    Rolling { window: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadPoint {
    pub date: NaiveDate,
    pub spread: Decimal,
    pub z_score: Option<Decimal>,
    /// Percentage change from the previous spread; `None` at t=0 or when the
    /// previous spread is exactly zero
    pub spread_return: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadSeries {
    pub beta: Decimal,
    pub spread_mean: Decimal,
    pub spread_std: Decimal,
    pub normalization: ZScoreNormalization,
    pub points: Vec<SpreadPoint>,
}

impl SpreadSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn spreads(&self) -> Vec<Decimal> {
        self.points.iter().map(|p| p.spread).collect()
    }

    pub fn z_scores(&self) -> Vec<Option<Decimal>> {
        self.points.iter().map(|p| p.z_score).collect()
    }

    pub fn spread_returns(&self) -> Vec<Option<Decimal>> {
        self.points.iter().map(|p| p.spread_return).collect()
    }

    /// Periods after the first whose return is undefined (previous spread at zero).
    pub fn undefined_returns(&self) -> usize {
        self.points
            .iter()
            .skip(1)
            .filter(|p| p.spread_return.is_none())
            .count()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// `spread = s2 - beta * s1` with full-sample z-scores.
pub fn build_spread_signal(
    s1: &PriceSeries,
    s2: &PriceSeries,
    beta: Decimal,
) -> StatArbResult<SpreadSeries> {
    build_spread_signal_with(s1, s2, beta, ZScoreNormalization::FullSample)
}

pub fn build_spread_signal_with(
    s1: &PriceSeries,
    s2: &PriceSeries,
    beta: Decimal,
    normalization: ZScoreNormalization,
) -> StatArbResult<SpreadSeries> {
    s1.ensure_aligned_with(s2)?;
    s1.ensure_min_len(2, "Spread construction")?;

    let spread: Vec<Decimal> = s1
        .points()
        .iter()
        .zip(s2.points())
        .map(|(p1, p2)| {
            beta.checked_mul(p1.price)
                .and_then(|hedge| p2.price.checked_sub(hedge))
                .ok_or_else(|| StatArbError::NumericOverflow {
                    context: format!("spread on {}", p1.date),
                })
        })
        .collect::<StatArbResult<_>>()?;

    let spread_mean = mean(&spread)?;
    let spread_std = population_std(&spread)?;
    if spread_std == Decimal::ZERO {
        return Err(StatArbError::DegenerateSpread {
            context: format!(
                "{}/{} spread is constant at {}; z-score is undefined",
                s1.symbol(),
                s2.symbol(),
                spread_mean
            ),
        });
    }

    let z_scores: Vec<Option<Decimal>> = match normalization {
        ZScoreNormalization::FullSample => spread
            .iter()
            .map(|s| Some((*s - spread_mean) / spread_std))
            .collect(),
        ZScoreNormalization::Rolling { window } => {
            if window < 2 {
                return Err(StatArbError::InvalidConfiguration {
                    field: "normalization.window".into(),
                    reason: format!("rolling z-score window must be at least 2, got {window}"),
                });
            }
            rolling_z_scores(&spread, window)?
        }
    };

    let points = s1
        .points()
        .iter()
        .enumerate()
        .map(|(t, p)| {
            let spread_return = if t == 0 {
                None
            } else {
                pct_change(spread[t - 1], spread[t]).ok_or_else(|| {
                    StatArbError::NumericOverflow {
                        context: format!(
                            "spread return on {}: {} -> {}",
                            p.date,
                            spread[t - 1],
                            spread[t]
                        ),
                    }
                })?
            };
            Ok(SpreadPoint {
                date: p.date,
                spread: spread[t],
                z_score: z_scores[t],
                spread_return,
            })
        })
        .collect::<StatArbResult<Vec<_>>>()?;

    Ok(SpreadSeries {
        beta,
        spread_mean,
        spread_std,
        normalization,
        points,
    })
}

/// Sample std of the trailing `window` z-scores, defined once the window is
/// full and every z-score in it is defined.
pub fn rolling_volatility(
    z_scores: &[Option<Decimal>],
    window: usize,
) -> StatArbResult<Vec<Option<Decimal>>> {
    if window < 2 {
        return Err(StatArbError::InvalidConfiguration {
            field: "vol_window".into(),
            reason: format!("rolling volatility window must be at least 2, got {window}"),
        });
    }
    let mut vol = Vec::with_capacity(z_scores.len());
    for t in 0..z_scores.len() {
        if t + 1 < window {
            vol.push(None);
            continue;
        }
        let slice: Option<Vec<Decimal>> = z_scores[t + 1 - window..=t].iter().copied().collect();
        vol.push(match slice {
            Some(slice) => Some(sample_std(&slice)?),
            None => None,
        });
    }
    Ok(vol)
}

/// Mean-reversion half-life in periods from an AR(1) fit
/// `S_t = c + phi * S_{t-1}`: `-ln 2 / ln phi`. `None` unless 0 < phi < 1.
pub fn half_life(spread: &[Decimal]) -> Option<Decimal> {
    if spread.len() < 3 {
        return None;
    }
    let fit = simple_regression(&spread[..spread.len() - 1], &spread[1..]).ok()?;
    let phi = fit.slope;
    if phi <= Decimal::ZERO || phi >= Decimal::ONE {
        return None;
    }
    let ln_phi = ln_decimal(phi)?;
    if ln_phi == Decimal::ZERO {
        return None;
    }
    let ln2 = dec!(0.6931471805599453);
    Some((-ln2 / ln_phi).abs())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// `Some(None)` when `prev` is zero; `None` when the change overflows.
fn pct_change(prev: Decimal, current: Decimal) -> Option<Option<Decimal>> {
    if prev == Decimal::ZERO {
        return Some(None);
    }
    let change = current.checked_sub(prev)?.checked_div(prev)?;
    Some(Some(change))
}

fn rolling_z_scores(spread: &[Decimal], window: usize) -> StatArbResult<Vec<Option<Decimal>>> {
    let mut z = Vec::with_capacity(spread.len());
    for t in 0..spread.len() {
        if t + 1 < window {
            z.push(None);
            continue;
        }
        let slice = &spread[t + 1 - window..=t];
        let m = mean(slice)?;
        let sd = sample_std(slice)?;
        z.push(if sd == Decimal::ZERO {
            None
        } else {
            Some((spread[t] - m) / sd)
        });
    }
    Ok(z)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
