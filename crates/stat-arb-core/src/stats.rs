//! Decimal statistics shared by the cointegration, signal and backtest modules.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::StatArbError;
use crate::StatArbResult;

/// Pivots at or below this magnitude are treated as a singular design matrix.
const SINGULAR_PIVOT: Decimal = dec!(0.000000000000000001);

// ---------------------------------------------------------------------------
// Decimal math helpers
// ---------------------------------------------------------------------------

pub fn sqrt_decimal(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    val.sqrt().unwrap_or(Decimal::ZERO)
}

/// Natural logarithm; `None` for non-positive input.
pub fn ln_decimal(val: Decimal) -> Option<Decimal> {
    if val <= Decimal::ZERO {
        return None;
    }
    Some(val.ln())
}

fn norm_pdf(x: Decimal) -> Decimal {
    let sqrt_2pi = dec!(2.506628274631000502415765285);
    Decimal::ONE / (((x * x) / dec!(2)).exp() * sqrt_2pi)
}

/// Standard normal CDF using Abramowitz & Stegun approximation.
/// Phi(x) = 1 - phi(x) * (b1*t + b2*t^2 + b3*t^3 + b4*t^4 + b5*t^5)
/// where t = 1 / (1 + 0.2316419 * |x|)
pub fn norm_cdf(x: Decimal) -> Decimal {
    if x <= dec!(-10) {
        return Decimal::ZERO;
    }
    if x >= dec!(10) {
        return Decimal::ONE;
    }
    let b1 = dec!(0.319381530);
    let b2 = dec!(-0.356563782);
    let b3 = dec!(1.781477937);
    let b4 = dec!(-1.821255978);
    let b5 = dec!(1.330274429);
    let p = dec!(0.2316419);

    let abs_x = x.abs();
    let t = Decimal::ONE / (Decimal::ONE + p * abs_x);
    let poly = t * (b1 + t * (b2 + t * (b3 + t * (b4 + t * b5))));
    let cdf_pos = Decimal::ONE - norm_pdf(abs_x) * poly;

    if x < Decimal::ZERO {
        Decimal::ONE - cdf_pos
    } else {
        cdf_pos
    }
}

// ---------------------------------------------------------------------------
// Moments
// ---------------------------------------------------------------------------

fn overflow(context: &str) -> StatArbError {
    StatArbError::NumericOverflow {
        context: context.into(),
    }
}

fn ensure_len(values: &[Decimal], min: usize, what: &str) -> StatArbResult<()> {
    if values.len() < min {
        return Err(StatArbError::InsufficientData(format!(
            "{what} needs at least {min} values, got {}",
            values.len()
        )));
    }
    Ok(())
}

pub fn mean(values: &[Decimal]) -> StatArbResult<Decimal> {
    ensure_len(values, 1, "Mean")?;
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| overflow("sum of values"))?;
    Ok(sum / Decimal::from(values.len() as i64))
}

fn sum_sq_dev(values: &[Decimal], mean: Decimal) -> StatArbResult<Decimal> {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| {
            let d = v.checked_sub(mean)?;
            acc.checked_add(d.checked_mul(d)?)
        })
        .ok_or_else(|| overflow("sum of squared deviations"))
}

/// Population variance (divides by n).
pub fn population_variance(values: &[Decimal]) -> StatArbResult<Decimal> {
    let m = mean(values)?;
    Ok(sum_sq_dev(values, m)? / Decimal::from(values.len() as i64))
}

/// Sample variance (divides by n - 1); needs at least two values.
pub fn sample_variance(values: &[Decimal]) -> StatArbResult<Decimal> {
    ensure_len(values, 2, "Sample variance")?;
    let m = mean(values)?;
    Ok(sum_sq_dev(values, m)? / Decimal::from(values.len() as i64 - 1))
}

pub fn population_std(values: &[Decimal]) -> StatArbResult<Decimal> {
    population_variance(values).map(sqrt_decimal)
}

pub fn sample_std(values: &[Decimal]) -> StatArbResult<Decimal> {
    sample_variance(values).map(sqrt_decimal)
}

// ---------------------------------------------------------------------------
// Regression
// ---------------------------------------------------------------------------

/// Result of a single-regressor OLS with intercept: y = intercept + slope * x.
#[derive(Debug, Clone)]
pub struct SimpleRegression {
    pub intercept: Decimal,
    pub slope: Decimal,
    pub r_squared: Decimal,
    pub residuals: Vec<Decimal>,
}

/// OLS of `y` on `[1, x]`: slope = cov(x, y) / var(x).
pub fn simple_regression(x: &[Decimal], y: &[Decimal]) -> StatArbResult<SimpleRegression> {
    let n = x.len();
    if n != y.len() {
        return Err(StatArbError::InvalidConfiguration {
            field: "y".into(),
            reason: format!("regressor has {n} values but response has {}", y.len()),
        });
    }
    if n < 2 {
        return Err(StatArbError::InsufficientData(
            "Need at least 2 observations for a regression".into(),
        ));
    }
    let n_dec = Decimal::from(n as i64);
    let mean_x: Decimal = x.iter().copied().sum::<Decimal>() / n_dec;
    let mean_y: Decimal = y.iter().copied().sum::<Decimal>() / n_dec;

    let mut cov_xy = Decimal::ZERO;
    let mut var_x = Decimal::ZERO;
    let mut var_y = Decimal::ZERO;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        cov_xy += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == Decimal::ZERO {
        return Err(StatArbError::DegenerateRegression {
            context: "independent variable has zero variance".into(),
        });
    }

    let slope = cov_xy / var_x;
    let intercept = mean_y - slope * mean_x;
    let residuals: Vec<Decimal> = (0..n).map(|i| y[i] - intercept - slope * x[i]).collect();
    let ssr: Decimal = residuals.iter().map(|e| *e * *e).sum();
    let r_squared = if var_y == Decimal::ZERO {
        Decimal::ZERO
    } else {
        Decimal::ONE - ssr / var_y
    };

    Ok(SimpleRegression {
        intercept,
        slope,
        r_squared,
        residuals,
    })
}

/// Multiple-regressor OLS fit (no implicit intercept).
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Vec<Decimal>,
    pub std_errors: Vec<Decimal>,
    pub ssr: Decimal,
    pub nobs: usize,
}

impl OlsFit {
    pub fn t_value(&self, idx: usize) -> Option<Decimal> {
        let se = *self.std_errors.get(idx)?;
        if se == Decimal::ZERO {
            return None;
        }
        Some(self.coefficients[idx] / se)
    }
}

/// OLS of `y` on the columns of `x` (one row per observation).
///
/// Solves the normal equations by Gauss–Jordan elimination with partial
/// pivoting, keeping `(X'X)^-1` for the coefficient standard errors.
pub fn ols(y: &[Decimal], x: &[Vec<Decimal>]) -> StatArbResult<OlsFit> {
    let nobs = y.len();
    if x.len() != nobs {
        return Err(StatArbError::InvalidConfiguration {
            field: "x".into(),
            reason: format!("design has {} rows but response has {nobs}", x.len()),
        });
    }
    let k = x.first().map(|r| r.len()).unwrap_or(0);
    if k == 0 {
        return Err(StatArbError::InvalidConfiguration {
            field: "x".into(),
            reason: "design matrix has no columns".into(),
        });
    }
    if x.iter().any(|r| r.len() != k) {
        return Err(StatArbError::InvalidConfiguration {
            field: "x".into(),
            reason: "design matrix rows differ in width".into(),
        });
    }
    if nobs <= k {
        return Err(StatArbError::InsufficientData(format!(
            "{nobs} observations cannot identify {k} coefficients"
        )));
    }

    // Augmented [X'X | X'y | I]
    let width = 2 * k + 1;
    let mut m = vec![vec![Decimal::ZERO; width]; k];
    for (row, yv) in x.iter().zip(y) {
        for i in 0..k {
            for j in i..k {
                m[i][j] += row[i] * row[j];
            }
            m[i][k] += row[i] * *yv;
        }
    }
    for i in 0..k {
        for j in 0..i {
            m[i][j] = m[j][i];
        }
        m[i][k + 1 + i] = Decimal::ONE;
    }

    for col in 0..k {
        let pivot_row = (col..k)
            .max_by(|&a, &b| m[a][col].abs().cmp(&m[b][col].abs()))
            .unwrap_or(col);
        if m[pivot_row][col].abs() <= SINGULAR_PIVOT {
            return Err(StatArbError::DegenerateRegression {
                context: format!("design matrix is singular at column {col}"),
            });
        }
        m.swap(col, pivot_row);
        let pivot = m[col][col];
        for v in m[col].iter_mut() {
            *v /= pivot;
        }
        for r in 0..k {
            if r == col {
                continue;
            }
            let factor = m[r][col];
            if factor == Decimal::ZERO {
                continue;
            }
            for c in 0..width {
                let delta = factor * m[col][c];
                m[r][c] -= delta;
            }
        }
    }

    let coefficients: Vec<Decimal> = (0..k).map(|i| m[i][k]).collect();
    let ssr: Decimal = x
        .iter()
        .zip(y)
        .map(|(row, yv)| {
            let fitted: Decimal = row.iter().zip(&coefficients).map(|(a, b)| *a * *b).sum();
            let e = *yv - fitted;
            e * e
        })
        .sum();
    let sigma2 = ssr / Decimal::from((nobs - k) as i64);
    let std_errors = (0..k)
        .map(|i| sqrt_decimal(sigma2 * m[i][k + 1 + i]))
        .collect();

    Ok(OlsFit {
        coefficients,
        std_errors,
        ssr,
        nobs,
    })
}
