use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::performance::{evaluate_performance, PerformanceConfig, PerformanceReport};
use super::trades::{extract_trades, win_rate, PairTrade};
use crate::cointegration::engle_granger::{EngleGranger, EngleGrangerResult};
use crate::cointegration::scanner::{scan_pairs_with_config, PairScan, ScanConfig};
use crate::error::StatArbError;
use crate::signals::hedge_ratio::{fit_hedge_regression, HedgeRegression};
use crate::signals::spread::{
    build_spread_signal_with, half_life, rolling_volatility, SpreadSeries, ZScoreNormalization,
};
use crate::signals::state_machine::{run_position_state_machine, PositionSeries, StrategyConfig};
use crate::types::{with_metadata, ComputationOutput, PriceSeries, Rate};
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// Every knob of a single-pair backtest. All sections default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairBacktestConfig {
    pub scan: ScanConfig,
    pub strategy: StrategyConfig,
    pub performance: PerformanceConfig,
    pub normalization: ZScoreNormalization,
}

impl PairBacktestConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        self.scan.validate()?;
        self.strategy.validate()?;
        self.performance.validate()?;
        if let ZScoreNormalization::Rolling { window } = self.normalization {
            if window < 2 {
                return Err(StatArbError::InvalidConfiguration {
                    field: "normalization.window".into(),
                    reason: "Rolling z-score window must be at least 2".into(),
                });
            }
        }
        Ok(())
    }
}

/// `series_a` is the independent leg, `series_b` the dependent leg:
/// `spread = b - beta * a`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairBacktestInput {
    pub series_a: PriceSeries,
    pub series_b: PriceSeries,
    #[serde(default)]
    pub config: PairBacktestConfig,
}

impl PairBacktestInput {
    pub fn from_json(json: &str) -> StatArbResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairBacktestOutput {
    pub symbol_a: String,
    pub symbol_b: String,
    pub cointegration: EngleGrangerResult,
    pub hedge: HedgeRegression,
    pub spread: SpreadSeries,
    /// Rolling sample std of the z-score, aligned with `spread.points`
    pub rolling_vol: Vec<Option<Decimal>>,
    pub positions: PositionSeries,
    pub report: PerformanceReport,
    pub trades: Vec<PairTrade>,
    pub win_rate: Rate,
    /// AR(1) half-life of the spread in periods, when it mean-reverts
    pub half_life: Option<Decimal>,
}

/// Scan result plus the backtest of its top-ranked pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestPairBacktest {
    pub scan: PairScan,
    pub backtest: ComputationOutput<PairBacktestOutput>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Cointegration test, hedge ratio, spread, position state machine,
/// performance and trade ledger for one pair.
pub fn backtest_pair(
    input: &PairBacktestInput,
) -> StatArbResult<ComputationOutput<PairBacktestOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = &input.config;
    config.validate()?;

    let (a, b) = (&input.series_a, &input.series_b);

    // --- Cointegration ---
    let cointegration = EngleGranger::new(config.scan.lag_selection).run(a, b)?;
    if cointegration.collinear {
        warnings.push(format!(
            "{} and {} are perfectly collinear; p-value reported as 0",
            a.symbol(),
            b.symbol()
        ));
    }
    if cointegration.p_value >= config.scan.significance {
        warnings.push(format!(
            "Cointegration p-value {:.4} is not below {}; the spread may not mean-revert",
            cointegration.p_value, config.scan.significance
        ));
    }

    // --- Hedge ratio and spread ---
    let hedge = fit_hedge_regression(a, b)?;
    let spread = build_spread_signal_with(a, b, hedge.beta, config.normalization)?;
    let undefined = spread.undefined_returns();
    if undefined > 0 {
        tracing::warn!(a = a.symbol(), b = b.symbol(), undefined, "spread returns undefined");
        warnings.push(format!(
            "{undefined} spread return(s) undefined where the previous spread was zero; treated as flat"
        ));
    }

    // --- Positions ---
    let z_scores = spread.z_scores();
    let rolling_vol = rolling_volatility(&z_scores, config.strategy.vol_window)?;
    let positions = run_position_state_machine(&z_scores, &rolling_vol, &config.strategy)?;

    // --- Performance ---
    let report = evaluate_performance(
        &positions.positions,
        &spread.spread_returns(),
        config.performance.periods_per_year,
    )?;
    let trades = extract_trades(&positions, &z_scores, &report.strategy_returns)?;
    if trades.is_empty() {
        warnings.push("No trades: |z| never crossed the entry threshold while the volatility filter admitted entries".into());
    }
    let win_rate = win_rate(&trades);
    let half_life = half_life(&spread.spreads());

    tracing::info!(
        a = a.symbol(),
        b = b.symbol(),
        p_value = %cointegration.p_value,
        beta = %hedge.beta,
        trades = trades.len(),
        sharpe = %report.sharpe_ratio,
        "pair backtest complete"
    );

    let output = PairBacktestOutput {
        symbol_a: a.symbol().to_string(),
        symbol_b: b.symbol().to_string(),
        cointegration,
        hedge,
        spread,
        rolling_vol,
        positions,
        report,
        trades,
        win_rate,
        half_life,
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Engle-Granger screen, OLS hedge ratio, z-score mean reversion with stop-loss and volatility filter",
        config,
        warnings,
        elapsed,
        output,
    ))
}

/// Scan `universe`, then backtest the lowest p-value pair. `None` when no
/// pair is significant.
pub fn backtest_best_pair(
    universe: &[PriceSeries],
    config: &PairBacktestConfig,
) -> StatArbResult<Option<BestPairBacktest>> {
    config.validate()?;
    let scan = scan_pairs_with_config(universe, &config.scan)?;
    let best = match scan.best() {
        Some(best) => best.clone(),
        None => {
            tracing::info!(symbols = universe.len(), "no significant pair to backtest");
            return Ok(None);
        }
    };

    let lookup = |symbol: &str| {
        universe
            .iter()
            .find(|s| s.symbol() == symbol)
            .cloned()
            .ok_or_else(|| StatArbError::InvalidConfiguration {
                field: "universe".into(),
                reason: format!("ranked symbol {symbol} missing from universe"),
            })
    };
    let input = PairBacktestInput {
        series_a: lookup(&best.symbol_a)?,
        series_b: lookup(&best.symbol_b)?,
        config: *config,
    };
    let backtest = backtest_pair(&input)?;
    Ok(Some(BestPairBacktest { scan, backtest }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
