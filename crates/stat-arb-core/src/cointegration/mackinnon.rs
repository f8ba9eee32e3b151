use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::stats::norm_cdf;

/// MacKinnon (1994) response-surface coefficients for one test configuration.
struct ResponseSurface {
    /// Above this statistic the p-value is 1
    tau_max: Decimal,
    /// Below this statistic the p-value is 0
    tau_min: Decimal,
    /// Switch point between the small-p and large-p polynomials
    tau_star: Decimal,
    small_p: [Decimal; 3],
    large_p: [Decimal; 4],
}

/// Constant in the cointegrating regression, two series.
const CONSTANT_TWO_SERIES: ResponseSurface = ResponseSurface {
    tau_max: dec!(0.92),
    tau_min: dec!(-18.86),
    tau_star: dec!(-2.62),
    small_p: [dec!(2.92), dec!(1.5012), dec!(0.039796)],
    large_p: [dec!(2.1945), dec!(0.64695), dec!(-0.29198), dec!(-0.042377)],
};

fn polyval(coefficients: &[Decimal], x: Decimal) -> Decimal {
    coefficients
        .iter()
        .rev()
        .fold(Decimal::ZERO, |acc, c| acc * x + *c)
}

/// Asymptotic p-value of an Engle–Granger ADF statistic for a pair.
///
/// `None` stands for a statistic of negative infinity (perfectly collinear
/// series) and maps to 0.
pub fn engle_granger_p_value(statistic: Option<Decimal>) -> Decimal {
    let surface = &CONSTANT_TWO_SERIES;
    let Some(tau) = statistic else {
        return Decimal::ZERO;
    };
    if tau > surface.tau_max {
        return Decimal::ONE;
    }
    if tau < surface.tau_min {
        return Decimal::ZERO;
    }
    let z = if tau <= surface.tau_star {
        polyval(&surface.small_p, tau)
    } else {
        polyval(&surface.large_p, tau)
    };
    norm_cdf(z).max(Decimal::ZERO).min(Decimal::ONE)
}
