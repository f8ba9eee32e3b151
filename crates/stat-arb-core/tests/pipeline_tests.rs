mod common;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use stat_arb_core::backtest::performance::{evaluate_performance, strategy_returns};
use stat_arb_core::backtest::pipeline::{backtest_pair, PairBacktestConfig, PairBacktestInput};
use stat_arb_core::backtest::trades::ExitReason;
use stat_arb_core::signals::hedge_ratio::estimate_hedge_ratio;
use stat_arb_core::signals::spread::{build_spread_signal, rolling_volatility, ZScoreNormalization};
use stat_arb_core::signals::state_machine::{
    run_position_state_machine, Position, StrategyConfig,
};
use stat_arb_core::PriceSeries;

use common::{noise, series, walk, N};

// ===========================================================================
// Fixtures
// ===========================================================================

/// `b = 2a + 50 + noise`, with a +/-3 shock every 20 periods (at t = 10, 30,
/// 50, ...) alternating in sign, so the spread jumps and reverts next period.
fn cointegrated_pair() -> (PriceSeries, PriceSeries) {
    let a = walk(3, N, dec!(100));
    let b: Vec<Decimal> = a
        .iter()
        .zip(noise(5, N))
        .enumerate()
        .map(|(t, (x, e))| {
            let shock = if t % 20 != 10 {
                Decimal::ZERO
            } else if (t / 20) % 2 == 0 {
                dec!(3)
            } else {
                dec!(-3)
            };
            dec!(2) * *x + dec!(50) + e + shock
        })
        .collect();
    (series("AAA", &a), series("BBB", &b))
}

fn input(a: PriceSeries, b: PriceSeries) -> PairBacktestInput {
    PairBacktestInput {
        series_a: a,
        series_b: b,
        config: PairBacktestConfig::default(),
    }
}

// ---------------------------------------------------------------------------
// End-to-end backtest
// ---------------------------------------------------------------------------

#[test]
fn test_backtest_cointegrated_pair() {
    let (a, b) = cointegrated_pair();
    let out = backtest_pair(&input(a, b)).unwrap();
    let r = &out.result;

    assert_eq!(r.symbol_a, "AAA");
    assert_eq!(r.symbol_b, "BBB");
    assert!(r.cointegration.p_value < dec!(0.01), "p = {}", r.cointegration.p_value);
    assert!((r.hedge.beta - dec!(2)).abs() < dec!(0.05), "beta = {}", r.hedge.beta);

    assert_eq!(r.spread.len(), N);
    assert_eq!(r.rolling_vol.len(), N);
    assert_eq!(r.positions.len(), N);
    assert_eq!(r.positions.positions[0], Position::Flat);
    assert!(r.rolling_vol[..19].iter().all(Option::is_none));
    assert!(r.rolling_vol[19].is_some());

    // One round trip per shock once the volatility window has filled
    assert_eq!(r.trades.len(), 11);
    assert_eq!(r.trades[0].entry_period, 30);
    assert_eq!(r.trades[0].direction, Position::LongSpread);
    assert_eq!(r.trades[1].entry_period, 50);
    assert_eq!(r.trades[1].direction, Position::ShortSpread);
    assert!(r
        .trades
        .iter()
        .all(|t| t.exit_reason == ExitReason::MeanReversion && t.holding_periods <= 2));
    assert_eq!(r.win_rate, Decimal::ONE);

    assert!(r.report.sharpe_ratio > Decimal::ZERO);
    assert!(r.report.total_return > Decimal::ZERO);
    assert!(r.report.max_drawdown <= Decimal::ZERO);
    assert_eq!(r.report.equity_curve.len(), N);
    assert_eq!(r.report.equity_curve[0], Decimal::ONE);
    assert!(r.half_life.map_or(true, |h| h < Decimal::ONE));

    assert!(out.warnings.is_empty(), "warnings: {:?}", out.warnings);
    assert_eq!(out.metadata.precision, "rust_decimal_128bit");
}

#[test]
fn test_backtest_is_deterministic() {
    let (a, b) = cointegrated_pair();
    let first = backtest_pair(&input(a.clone(), b.clone())).unwrap();
    let second = backtest_pair(&input(a, b)).unwrap();
    assert_eq!(
        serde_json::to_value(&first.result).unwrap(),
        serde_json::to_value(&second.result).unwrap()
    );
}

#[test]
fn test_unrelated_pair_warns() {
    let (a, _) = cointegrated_pair();
    let c = series("CCC", &walk(19, N, dec!(60)));
    let out = backtest_pair(&input(a, c)).unwrap();

    assert!(out.result.cointegration.p_value >= dec!(0.05));
    assert!(out.warnings.iter().any(|w| w.contains("not below")));
    assert!(out.result.trades.is_empty());
    assert!(out.warnings.iter().any(|w| w.starts_with("No trades")));
    assert_eq!(out.result.win_rate, Decimal::ZERO);
    assert_eq!(out.result.report.sharpe_ratio, Decimal::ZERO);
    assert_eq!(out.result.report.calmar_ratio, Decimal::ZERO);
}

#[test]
fn test_rolling_normalization_has_warm_up() {
    let (a, b) = cointegrated_pair();
    let mut input = input(a, b);
    input.config.normalization = ZScoreNormalization::Rolling { window: 20 };
    let out = backtest_pair(&input).unwrap();
    let z = out.result.spread.z_scores();

    assert!(z[..19].iter().all(Option::is_none));
    assert!(z[19..].iter().all(Option::is_some));
    // vol needs 20 defined z-scores
    assert!(out.result.rolling_vol[..38].iter().all(Option::is_none));
    assert!(out.result.rolling_vol[38].is_some());
    assert!(out
        .result
        .trades
        .iter()
        .all(|t| t.entry_period >= 38));
}

#[test]
fn test_assumptions_echo_config() {
    let (a, b) = cointegrated_pair();
    let out = backtest_pair(&input(a, b)).unwrap();
    assert_eq!(
        out.assumptions["performance"]["periods_per_year"],
        serde_json::json!(252)
    );
}

// ---------------------------------------------------------------------------
// Component chain
// ---------------------------------------------------------------------------

#[test]
fn test_hedge_ratio_recovers_two() {
    let (a, b) = cointegrated_pair();
    let beta = estimate_hedge_ratio(&a, &b).unwrap();
    assert!((beta - dec!(2)).abs() < dec!(0.05), "beta = {}", beta);
}

#[test]
fn test_no_look_ahead_in_strategy_returns() {
    let (a, b) = cointegrated_pair();
    let beta = estimate_hedge_ratio(&a, &b).unwrap();
    let spread = build_spread_signal(&a, &b, beta).unwrap();
    let z = spread.z_scores();
    let config = StrategyConfig::default();
    let vol = rolling_volatility(&z, config.vol_window).unwrap();
    let positions = run_position_state_machine(&z, &vol, &config).unwrap();

    let returns = spread.spread_returns();
    let baseline = strategy_returns(&positions.positions, &returns).unwrap();

    for cut in [31usize, 51, 100, 200] {
        let mut altered = returns.clone();
        for r in altered.iter_mut().skip(cut + 1) {
            *r = Some(dec!(0.5));
        }
        let shifted = strategy_returns(&positions.positions, &altered).unwrap();
        assert_eq!(&baseline[..=cut], &shifted[..=cut], "cut at {cut}");
    }
}

#[test]
fn test_strategy_return_matches_previous_position() {
    let (a, b) = cointegrated_pair();
    let out = backtest_pair(&input(a, b)).unwrap();
    let r = &out.result;
    let spread_returns = r.spread.spread_returns();

    assert_eq!(r.report.strategy_returns[0], None);
    for t in 1..N {
        let expected = spread_returns[t].map(|x| r.positions.positions[t - 1].exposure() * x);
        assert_eq!(r.report.strategy_returns[t], expected, "t = {t}");
    }
}

#[test]
fn test_flat_book_has_guarded_ratios() {
    let positions = vec![Position::Flat; 50];
    let mut returns: Vec<Option<Decimal>> = noise(21, 50).into_iter().map(Some).collect();
    returns[0] = None;
    let report = evaluate_performance(&positions, &returns, 252).unwrap();
    assert_eq!(report.annualized_return, Decimal::ZERO);
    assert_eq!(report.sharpe_ratio, Decimal::ZERO);
    assert_eq!(report.calmar_ratio, Decimal::ZERO);
    assert_eq!(report.max_drawdown, Decimal::ZERO);
    assert_eq!(report.equity_curve, vec![Decimal::ONE; 50]);
}
