use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StatArbError;
use crate::stats::simple_regression;
use crate::types::PriceSeries;
use crate::StatArbResult;

/// OLS fit of the dependent leg on the independent leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeRegression {
    /// Units of the independent leg per unit of the dependent leg
    pub beta: Decimal,
    /// Computed for completeness; the spread does not subtract it
    pub intercept: Decimal,
    pub r_squared: Decimal,
}

/// Regress `s2` on `[1, s1]`.
pub fn fit_hedge_regression(s1: &PriceSeries, s2: &PriceSeries) -> StatArbResult<HedgeRegression> {
    s1.ensure_aligned_with(s2)?;
    s1.ensure_min_len(2, "Hedge ratio estimation")?;
    let fit = simple_regression(&s1.prices(), &s2.prices()).map_err(|e| match e {
        StatArbError::DegenerateRegression { .. } => StatArbError::DegenerateRegression {
            context: format!("OLS hedge ratio: {} has zero variance", s1.symbol()),
        },
        other => other,
    })?;
    Ok(HedgeRegression {
        beta: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r_squared,
    })
}

/// Hedge ratio (beta) of `s2` on `s1`.
pub fn estimate_hedge_ratio(s1: &PriceSeries, s2: &PriceSeries) -> StatArbResult<Decimal> {
    fit_hedge_regression(s1, s2).map(|h| h.beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::series;
    use rust_decimal_macros::dec;

    #[test]
    fn test_recovers_beta_of_two() {
        let s1: Vec<Decimal> = (0..60)
            .map(|i| dec!(100) + Decimal::from((i * 7) % 11) - Decimal::from(i) / dec!(4))
            .collect();
        let s2: Vec<Decimal> = s1
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let tiny = if i % 2 == 0 { dec!(0.0001) } else { dec!(-0.0001) };
                dec!(2) * *p + tiny
            })
            .collect();
        let beta = estimate_hedge_ratio(&series("S1", &s1), &series("S2", &s2)).unwrap();
        assert!((beta - dec!(2)).abs() < dec!(0.01), "beta = {}", beta);
    }

    #[test]
    fn test_intercept_and_r_squared() {
        let s1: Vec<Decimal> = (1..=30).map(Decimal::from).collect();
        let s2: Vec<Decimal> = s1.iter().map(|p| dec!(10) + dec!(0.5) * *p).collect();
        let h = fit_hedge_regression(&series("S1", &s1), &series("S2", &s2)).unwrap();
        assert_eq!(h.beta, dec!(0.5));
        assert_eq!(h.intercept, dec!(10));
        assert_eq!(h.r_squared, Decimal::ONE);
    }

    #[test]
    fn test_constant_independent_leg() {
        let s1 = vec![dec!(42); 30];
        let s2: Vec<Decimal> = (1..=30).map(Decimal::from).collect();
        let err = estimate_hedge_ratio(&series("FLAT", &s1), &series("S2", &s2)).unwrap_err();
        assert!(matches!(err, StatArbError::DegenerateRegression { .. }));
        assert!(err.to_string().contains("FLAT"));
    }

    #[test]
    fn test_length_mismatch() {
        let s1: Vec<Decimal> = (1..=30).map(Decimal::from).collect();
        let s2: Vec<Decimal> = (1..=29).map(Decimal::from).collect();
        assert!(matches!(
            estimate_hedge_ratio(&series("S1", &s1), &series("S2", &s2)),
            Err(StatArbError::InvalidConfiguration { .. })
        ));
    }
}
