use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::adf::{adf_statistic, LagSelection};
use super::mackinnon::engle_granger_p_value;
use super::CointegrationTest;
use crate::error::StatArbError;
use crate::stats::{population_variance, simple_regression};
use crate::types::PriceSeries;
use crate::StatArbResult;

/// Fewest observations accepted for a cointegration test.
pub const MIN_OBSERVATIONS: usize = 30;

/// `1 - 100 * sqrt(f64::EPSILON)`: at or above this R² the pair is treated as
/// perfectly collinear and the residual unit-root test is skipped.
const COLLINEAR_R_SQUARED: Decimal = dec!(0.9999985098838806);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngleGrangerResult {
    /// ADF t-statistic of the residuals; `None` when the pair is collinear
    pub adf_statistic: Option<Decimal>,
    pub p_value: Decimal,
    pub used_lag: Option<usize>,
    pub observations: usize,
    /// Slope of the first series on the second
    pub cointegrating_beta: Decimal,
    pub cointegrating_intercept: Decimal,
    pub collinear: bool,
}

/// Engle–Granger two-step test: regress the first series on the second with
/// an intercept, then test the residuals for a unit root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngleGranger {
    pub lag_selection: LagSelection,
}

impl EngleGranger {
    pub fn new(lag_selection: LagSelection) -> Self {
        Self { lag_selection }
    }

    pub fn run(&self, a: &PriceSeries, b: &PriceSeries) -> StatArbResult<EngleGrangerResult> {
        a.ensure_aligned_with(b)?;
        a.ensure_min_len(MIN_OBSERVATIONS, "Cointegration test")?;

        let ya = a.prices();
        let xb = b.prices();
        if population_variance(&ya)? == Decimal::ZERO {
            return Err(StatArbError::DegenerateRegression {
                context: format!("{} is constant", a.symbol()),
            });
        }
        let fit = simple_regression(&xb, &ya).map_err(|e| match e {
            StatArbError::DegenerateRegression { .. } => StatArbError::DegenerateRegression {
                context: format!("{} is constant", b.symbol()),
            },
            other => other,
        })?;

        if fit.r_squared >= COLLINEAR_R_SQUARED {
            tracing::warn!(
                a = a.symbol(),
                b = b.symbol(),
                r_squared = %fit.r_squared,
                "series are (almost) perfectly collinear; cointegration test is not reliable"
            );
            return Ok(EngleGrangerResult {
                adf_statistic: None,
                p_value: engle_granger_p_value(None),
                used_lag: None,
                observations: a.len(),
                cointegrating_beta: fit.slope,
                cointegrating_intercept: fit.intercept,
                collinear: true,
            });
        }

        let adf = adf_statistic(&fit.residuals, self.lag_selection)?;
        let p_value = engle_granger_p_value(Some(adf.statistic));
        tracing::debug!(
            a = a.symbol(),
            b = b.symbol(),
            statistic = %adf.statistic,
            lag = adf.used_lag,
            %p_value,
            "Engle-Granger test"
        );

        Ok(EngleGrangerResult {
            adf_statistic: Some(adf.statistic),
            p_value,
            used_lag: Some(adf.used_lag),
            observations: a.len(),
            cointegrating_beta: fit.slope,
            cointegrating_intercept: fit.intercept,
            collinear: false,
        })
    }
}

impl CointegrationTest for EngleGranger {
    fn p_value(&self, a: &PriceSeries, b: &PriceSeries) -> StatArbResult<Decimal> {
        self.run(a, b).map(|r| r.p_value)
    }
}

/// p-value that `a` and `b` are cointegrated, using AIC lag selection.
pub fn test_cointegration(a: &PriceSeries, b: &PriceSeries) -> StatArbResult<Decimal> {
    EngleGranger::default().p_value(a, b)
}
