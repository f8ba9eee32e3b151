use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StatArbError;
use crate::signals::state_machine::{Position, PositionSeries, TransitionReason};
use crate::types::Rate;
use crate::StatArbResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    MeanReversion,
    StopLoss,
    /// Still open at the last observation; marked to market there
    EndOfSample,
}

/// One round trip from entry to exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairTrade {
    pub direction: Position,
    pub entry_period: usize,
    pub exit_period: usize,
    pub holding_periods: usize,
    pub entry_z: Option<Decimal>,
    pub exit_z: Option<Decimal>,
    /// Compounded strategy return over `entry_period + 1 ..= exit_period`
    pub trade_return: Rate,
    pub exit_reason: ExitReason,
}

/// Rebuild round trips from the transition log.
///
/// `z_scores` and `strategy_returns` must be aligned with `positions`.
pub fn extract_trades(
    positions: &PositionSeries,
    z_scores: &[Option<Decimal>],
    strategy_returns: &[Option<Rate>],
) -> StatArbResult<Vec<PairTrade>> {
    let n = positions.len();
    if z_scores.len() != n || strategy_returns.len() != n {
        return Err(StatArbError::InvalidConfiguration {
            field: "trade inputs".into(),
            reason: format!(
                "{} positions, {} z-scores, {} strategy returns",
                n,
                z_scores.len(),
                strategy_returns.len()
            ),
        });
    }

    let mut trades = Vec::new();
    let mut open: Option<(Position, usize)> = None;
    let mut last_period: Option<usize> = None;

    for tr in &positions.transitions {
        if tr.period >= n || last_period.is_some_and(|last| tr.period <= last) {
            return Err(StatArbError::InvalidConfiguration {
                field: "transitions".into(),
                reason: format!(
                    "transition period {} out of order or outside 0..{n}",
                    tr.period
                ),
            });
        }
        last_period = Some(tr.period);

        match (tr.reason, open) {
            (TransitionReason::Entry, None) => open = Some((tr.to, tr.period)),
            (TransitionReason::MeanReversionExit, Some((direction, entry))) => {
                trades.push(close(
                    direction,
                    entry,
                    tr.period,
                    ExitReason::MeanReversion,
                    z_scores,
                    strategy_returns,
                )?);
                open = None;
            }
            (TransitionReason::StopLoss, Some((direction, entry))) => {
                trades.push(close(
                    direction,
                    entry,
                    tr.period,
                    ExitReason::StopLoss,
                    z_scores,
                    strategy_returns,
                )?);
                open = None;
            }
            (reason, state) => {
                return Err(StatArbError::InvalidConfiguration {
                    field: "transitions".into(),
                    reason: format!(
                        "{reason:?} at period {} while open position is {state:?}",
                        tr.period
                    ),
                });
            }
        }
    }

    if let Some((direction, entry)) = open {
        if n > 0 {
            trades.push(close(
                direction,
                entry,
                n - 1,
                ExitReason::EndOfSample,
                z_scores,
                strategy_returns,
            )?);
        }
    }

    Ok(trades)
}

/// Share of trades with a strictly positive return; 0 with no trades.
pub fn win_rate(trades: &[PairTrade]) -> Rate {
    if trades.is_empty() {
        return Decimal::ZERO;
    }
    let wins = trades
        .iter()
        .filter(|t| t.trade_return > Decimal::ZERO)
        .count();
    Decimal::from(wins as i64) / Decimal::from(trades.len() as i64)
}

fn close(
    direction: Position,
    entry: usize,
    exit: usize,
    exit_reason: ExitReason,
    z_scores: &[Option<Decimal>],
    strategy_returns: &[Option<Rate>],
) -> StatArbResult<PairTrade> {
    let growth = strategy_returns[entry + 1..=exit]
        .iter()
        .try_fold(Decimal::ONE, |acc, r| {
            acc.checked_mul(Decimal::ONE.checked_add(r.unwrap_or(Decimal::ZERO))?)
        })
        .ok_or_else(|| StatArbError::NumericOverflow {
            context: format!("return of trade {entry}..{exit}"),
        })?;
    Ok(PairTrade {
        direction,
        entry_period: entry,
        exit_period: exit,
        holding_periods: exit - entry,
        entry_z: z_scores[entry],
        exit_z: z_scores[exit],
        trade_return: growth - Decimal::ONE,
        exit_reason,
    })
}
