use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::StatArbError;
use crate::stats::{ln_decimal, ols, sqrt_decimal};
use crate::StatArbResult;

/// How many lagged differences the ADF regression carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagSelection {
    /// Minimise AIC over `0..=max_lag`; `None` uses the Schwert rule.
    Aic { max_lag: Option<usize> },
    Fixed(usize),
}

impl Default for LagSelection {
    fn default() -> Self {
        LagSelection::Aic { max_lag: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdfResult {
    /// t-value of the lagged level coefficient
    pub statistic: Decimal,
    pub used_lag: usize,
    /// Observations in the final regression
    pub nobs: usize,
}

/// Schwert's rule `ceil(12 * (n/100)^(1/4))`, capped at `n/2 - 1`.
pub fn schwert_max_lag(n: usize) -> usize {
    let ratio = Decimal::from(n as i64) / dec!(100);
    // round first so sqrt noise cannot push an exact value over the ceiling
    let rule = (dec!(12) * sqrt_decimal(sqrt_decimal(ratio)))
        .round_dp(10)
        .ceil()
        .to_usize()
        .unwrap_or(0);
    rule.min((n / 2).saturating_sub(1))
}

/// Design for `Δx_t = γ x_{t-1} + Σ φ_i Δx_{t-i}` using `lags` lagged
/// differences, on the rows that survive trimming `first_row` leading diffs.
fn lagged_design(
    levels: &[Decimal],
    diffs: &[Decimal],
    lags: usize,
    first_row: usize,
) -> (Vec<Decimal>, Vec<Vec<Decimal>>) {
    let mut y = Vec::with_capacity(diffs.len().saturating_sub(first_row));
    let mut x = Vec::with_capacity(y.capacity());
    for t in first_row..diffs.len() {
        let mut row = Vec::with_capacity(lags + 1);
        row.push(levels[t]);
        for i in 1..=lags {
            row.push(diffs[t - i]);
        }
        y.push(diffs[t]);
        x.push(row);
    }
    (y, x)
}

/// Augmented Dickey–Fuller regression without constant or trend.
///
/// Used on Engle–Granger residuals, which are mean-zero by construction.
pub fn adf_statistic(series: &[Decimal], lags: LagSelection) -> StatArbResult<AdfResult> {
    let n = series.len();
    if n < 4 {
        return Err(StatArbError::InsufficientData(
            "Need at least 4 observations for an ADF regression".into(),
        ));
    }
    let diffs: Vec<Decimal> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let used_lag = match lags {
        LagSelection::Fixed(k) => k,
        LagSelection::Aic { max_lag } => {
            let max_lag = max_lag.unwrap_or_else(|| schwert_max_lag(n));
            select_lag_by_aic(series, &diffs, max_lag)?
        }
    };

    if diffs.len() <= 2 * used_lag + 1 {
        return Err(StatArbError::InsufficientData(format!(
            "{n} observations are too few for an ADF regression with {used_lag} lags"
        )));
    }

    let (y, x) = lagged_design(series, &diffs, used_lag, used_lag);
    let fit = ols(&y, &x)?;
    let statistic = fit
        .t_value(0)
        .ok_or_else(|| StatArbError::DegenerateRegression {
            context: "ADF lagged-level coefficient has zero standard error".into(),
        })?;

    Ok(AdfResult {
        statistic,
        used_lag,
        nobs: fit.nobs,
    })
}

/// Fits every lag count on the common sample trimmed by `max_lag` and keeps the
/// lowest AIC; ties go to the shorter model. Constant terms of the
/// log-likelihood are dropped.
fn select_lag_by_aic(levels: &[Decimal], diffs: &[Decimal], max_lag: usize) -> StatArbResult<usize> {
    if diffs.len() <= 2 * max_lag + 1 {
        return Err(StatArbError::InsufficientData(format!(
            "{} observations are too few to search {max_lag} ADF lags",
            levels.len()
        )));
    }

    let mut best: Option<(Decimal, usize)> = None;
    for lag in 0..=max_lag {
        let (y, x) = lagged_design(levels, diffs, lag, max_lag);
        let fit = ols(&y, &x)?;
        let nobs = Decimal::from(fit.nobs as i64);
        let log_sigma2 =
            ln_decimal(fit.ssr / nobs).ok_or_else(|| StatArbError::DegenerateRegression {
                context: format!("ADF regression with {lag} lags fits without error"),
            })?;
        let aic = nobs * log_sigma2 + Decimal::from(2 * (lag as i64 + 1));
        tracing::trace!(lag, %aic, "ADF lag candidate");
        if best.map_or(true, |(b, _)| aic < b) {
            best = Some((aic, lag));
        }
    }

    let (aic, lag) = best.ok_or_else(|| {
        StatArbError::InsufficientData("no ADF lag candidate could be fitted".into())
    })?;
    tracing::debug!(lag, max_lag, %aic, "selected ADF lag by AIC");
    Ok(lag)
}
