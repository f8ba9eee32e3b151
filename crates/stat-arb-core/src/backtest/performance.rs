use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StatArbError;
use crate::signals::state_machine::Position;
use crate::stats::{mean, sample_std, sqrt_decimal};
use crate::types::Rate;
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Trading periods per year used for annualisation (default 252)
    pub periods_per_year: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            periods_per_year: 252,
        }
    }
}

impl PerformanceConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        if self.periods_per_year == 0 {
            return Err(StatArbError::InvalidConfiguration {
                field: "periods_per_year".into(),
                reason: "Periods per year must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Risk and return summary of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub annualized_return: Rate,
    pub annualized_volatility: Rate,
    /// 0 when annualized volatility is 0
    pub sharpe_ratio: Decimal,
    /// Most negative drawdown, in (-inf, 0]; 0 if equity never declines
    pub max_drawdown: Rate,
    /// 0 when max drawdown is 0
    pub calmar_ratio: Decimal,
    /// Total compounded return over the sample
    pub total_return: Rate,
    /// Growth of 1 unit, one value per timestamp starting at 1
    pub equity_curve: Vec<Decimal>,
    pub drawdown: Vec<Rate>,
    /// `position[t-1] * spread_return[t]`; `None` at t=0 and where the spread
    /// return is undefined
    pub strategy_returns: Vec<Option<Rate>>,
    /// Defined strategy returns the moments were computed from
    pub observations: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Realise each position over the following interval: the label decided at
/// `t-1` earns the spread return from `t-1` to `t`.
pub fn strategy_returns(
    positions: &[Position],
    spread_returns: &[Option<Rate>],
) -> StatArbResult<Vec<Option<Rate>>> {
    if positions.len() != spread_returns.len() {
        return Err(StatArbError::InvalidConfiguration {
            field: "spread_returns".into(),
            reason: format!(
                "{} spread returns for {} positions",
                spread_returns.len(),
                positions.len()
            ),
        });
    }
    Ok((0..positions.len())
        .map(|t| {
            if t == 0 {
                return None;
            }
            spread_returns[t].map(|r| positions[t - 1].exposure() * r)
        })
        .collect())
}

/// Annualised return, volatility, Sharpe, equity curve, drawdown and Calmar
/// for a position stream traded against a spread-return stream.
pub fn evaluate_performance(
    positions: &[Position],
    spread_returns: &[Option<Rate>],
    periods_per_year: u32,
) -> StatArbResult<PerformanceReport> {
    PerformanceConfig { periods_per_year }.validate()?;
    let strategy = strategy_returns(positions, spread_returns)?;

    let realised: Vec<Decimal> = strategy.iter().flatten().copied().collect();
    if realised.len() < 2 {
        return Err(StatArbError::InsufficientData(format!(
            "At least 2 defined strategy returns required, got {}",
            realised.len()
        )));
    }

    let periods = Decimal::from(periods_per_year);
    let mean_return = mean(&realised)?;
    let std_dev = sample_std(&realised)?;

    let annualized_return =
        mean_return
            .checked_mul(periods)
            .ok_or_else(|| StatArbError::NumericOverflow {
                context: "annualized return".into(),
            })?;
    let annualized_volatility = std_dev * sqrt_decimal(periods);
    let sharpe_ratio = guarded_ratio(annualized_return, annualized_volatility, "Sharpe ratio")?;

    let equity_curve = compound(&strategy)?;
    let drawdown = drawdown_series(&equity_curve);
    let max_drawdown = drawdown.iter().copied().min().unwrap_or(Decimal::ZERO);
    let calmar_ratio = guarded_ratio(annualized_return, max_drawdown.abs(), "Calmar ratio")?;
    let total_return = equity_curve.last().copied().unwrap_or(Decimal::ONE) - Decimal::ONE;

    Ok(PerformanceReport {
        annualized_return,
        annualized_volatility,
        sharpe_ratio,
        max_drawdown,
        calmar_ratio,
        total_return,
        equity_curve,
        drawdown,
        strategy_returns: strategy,
        observations: realised.len(),
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// `numerator / denominator`, or 0 when the denominator is zero.
fn guarded_ratio(numerator: Decimal, denominator: Decimal, what: &str) -> StatArbResult<Decimal> {
    if denominator.is_zero() {
        return Ok(Decimal::ZERO);
    }
    numerator
        .checked_div(denominator)
        .ok_or_else(|| StatArbError::NumericOverflow {
            context: what.into(),
        })
}

/// Cumulative product of `1 + r`, treating undefined returns as 0.
fn compound(returns: &[Option<Rate>]) -> StatArbResult<Vec<Decimal>> {
    let mut equity = Decimal::ONE;
    let mut curve = Vec::with_capacity(returns.len());
    for (t, r) in returns.iter().enumerate() {
        equity = Decimal::ONE
            .checked_add(r.unwrap_or(Decimal::ZERO))
            .and_then(|growth| equity.checked_mul(growth))
            .ok_or_else(|| StatArbError::NumericOverflow {
                context: format!("equity curve at period {t}"),
            })?;
        curve.push(equity);
    }
    Ok(curve)
}

/// `(equity - running_max) / running_max`. The running max starts at the
/// first equity value, so it stays positive.
fn drawdown_series(equity: &[Decimal]) -> Vec<Rate> {
    let mut peak = match equity.first() {
        Some(first) => *first,
        None => return Vec::new(),
    };
    equity
        .iter()
        .map(|e| {
            if *e > peak {
                peak = *e;
            }
            if peak <= Decimal::ZERO {
                Decimal::ZERO
            } else {
                (*e - peak) / peak
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use Position::{Flat, LongSpread, ShortSpread};

    fn some(values: &[Decimal]) -> Vec<Option<Decimal>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_strategy_return_uses_previous_position() {
        let positions = [Flat, LongSpread, ShortSpread, Flat];
        let returns = [None, Some(dec!(0.1)), Some(dec!(0.2)), Some(dec!(0.3))];
        let out = strategy_returns(&positions, &returns).unwrap();
        assert_eq!(
            out,
            vec![None, Some(dec!(0)), Some(dec!(0.2)), Some(dec!(-0.3))]
        );
    }

    #[test]
    fn test_no_look_ahead() {
        let positions = [Flat, LongSpread, LongSpread, ShortSpread, Flat];
        let base = [
            None,
            Some(dec!(0.01)),
            Some(dec!(-0.02)),
            Some(dec!(0.03)),
            Some(dec!(0.04)),
        ];
        let mut altered = base;
        altered[3] = Some(dec!(9));
        altered[4] = Some(dec!(-9));
        let a = strategy_returns(&positions, &base).unwrap();
        let b = strategy_returns(&positions, &altered).unwrap();
        assert_eq!(a[..3], b[..3]);
    }

    #[test]
    fn test_all_zero_returns_guarded() {
        let positions = vec![Flat; 10];
        let mut returns = some(&[dec!(0.01); 10]);
        returns[0] = None;
        let report = evaluate_performance(&positions, &returns, 252).unwrap();
        assert!(report.strategy_returns[1..].iter().all(|r| *r == Some(Decimal::ZERO)));
        assert_eq!(report.sharpe_ratio, Decimal::ZERO);
        assert_eq!(report.calmar_ratio, Decimal::ZERO);
        assert_eq!(report.max_drawdown, Decimal::ZERO);
        assert_eq!(report.annualized_volatility, Decimal::ZERO);
        assert_eq!(report.total_return, Decimal::ZERO);
    }

    #[test]
    fn test_rising_equity_has_zero_drawdown() {
        let positions = vec![LongSpread; 6];
        let returns = [
            None,
            Some(dec!(0.01)),
            Some(dec!(0.02)),
            Some(dec!(0.005)),
            Some(dec!(0.03)),
            Some(dec!(0.01)),
        ];
        let report = evaluate_performance(&positions, &returns, 252).unwrap();
        assert_eq!(report.max_drawdown, Decimal::ZERO);
        assert_eq!(report.calmar_ratio, Decimal::ZERO);
        assert!(report.sharpe_ratio > Decimal::ZERO);
        assert!(report.drawdown.iter().all(|d| d.is_zero()));
    }

    #[test]
    fn test_annualisation() {
        let positions = vec![LongSpread; 3];
        let returns = [None, Some(dec!(0.01)), Some(dec!(0.03))];
        let report = evaluate_performance(&positions, &returns, 252).unwrap();
        // mean 0.02, sample std sqrt(0.0002)
        assert_eq!(report.annualized_return, dec!(5.04));
        let expected_vol = sqrt_decimal(dec!(0.0002)) * sqrt_decimal(dec!(252));
        assert!((report.annualized_volatility - expected_vol).abs() < dec!(0.0000001));
        assert!((report.sharpe_ratio - dec!(5.04) / expected_vol).abs() < dec!(0.0000001));
        assert_eq!(report.observations, 2);
    }

    #[test]
    fn test_equity_and_drawdown() {
        let positions = vec![LongSpread; 4];
        let returns = [None, Some(dec!(0.1)), Some(dec!(-0.5)), Some(dec!(0.2))];
        let report = evaluate_performance(&positions, &returns, 252).unwrap();
        assert_eq!(
            report.equity_curve,
            vec![dec!(1), dec!(1.1), dec!(0.55), dec!(0.66)]
        );
        assert_eq!(report.drawdown[0], Decimal::ZERO);
        assert_eq!(report.drawdown[2], dec!(-0.5));
        assert_eq!(report.max_drawdown, dec!(-0.5));
        assert_eq!(report.calmar_ratio, report.annualized_return / dec!(0.5));
        assert_eq!(report.total_return, dec!(-0.34));
    }

    #[test]
    fn test_undefined_returns_skipped_in_moments() {
        let positions = vec![ShortSpread; 4];
        let returns = [None, Some(dec!(0.01)), None, Some(dec!(0.03))];
        let report = evaluate_performance(&positions, &returns, 252).unwrap();
        assert_eq!(report.observations, 2);
        assert_eq!(report.equity_curve[2], report.equity_curve[1]);
        assert_eq!(report.annualized_return, dec!(-5.04));
    }

    #[test]
    fn test_errors() {
        let positions = vec![Flat; 3];
        assert!(matches!(
            evaluate_performance(&positions, &[None, Some(dec!(0.1))], 252),
            Err(StatArbError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            evaluate_performance(&positions, &[None, Some(dec!(0.1)), None], 252),
            Err(StatArbError::InsufficientData(_))
        ));
        assert!(matches!(
            evaluate_performance(&positions, &[None, Some(dec!(0.1)), Some(dec!(0.1))], 0),
            Err(StatArbError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_extreme_return_overflows_moments() {
        let positions = vec![LongSpread; 4];
        let returns = [None, Some(dec!(1000000000000000)), Some(dec!(-0.5)), Some(dec!(0.1))];
        assert!(matches!(
            evaluate_performance(&positions, &returns, 252),
            Err(StatArbError::NumericOverflow { .. })
        ));
    }

    #[test]
    fn test_equity_overflow_is_reported() {
        // squares stay representable, the compounded equity does not
        let positions = vec![LongSpread; 4];
        let big = dec!(100000000000);
        let returns = [None, Some(big), Some(big), Some(big)];
        let err = evaluate_performance(&positions, &returns, 252).unwrap_err();
        assert!(matches!(err, StatArbError::NumericOverflow { ref context } if context.starts_with("equity")));
    }

    #[test]
    fn test_performance_config_default() {
        assert_eq!(PerformanceConfig::default().periods_per_year, 252);
        let parsed: PerformanceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, PerformanceConfig::default());
    }
}
