//! Position state machine for a mean-reverting spread.
//!
//! States are [`Position::Flat`], [`Position::LongSpread`] and
//! [`Position::ShortSpread`]. At each step after the first:
//!
//! * with a position open, the stop-loss (`|z| >= stop_loss`) is checked
//!   first, then the mean-reversion exit, otherwise the position is held;
//! * when flat, a long entry (`z <= -entry`) or short entry (`z >= entry`)
//!   is taken only if the rolling volatility of the z-score is below the cap.
//!
//! Exactly one transition can happen per step, so a position closed at `t`
//! can only be reopened from `t + 1`. The position at `t` uses information up
//! to `t`; it is traded from `t + 1` (see the performance evaluator).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::StatArbError;
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    Flat,
    /// Long the spread: buy the dependent leg, sell beta of the independent leg
    LongSpread,
    ShortSpread,
}

impl Position {
    /// Exposure label: +1 long, -1 short, 0 flat.
    pub fn sign(self) -> i8 {
        match self {
            Position::Flat => 0,
            Position::LongSpread => 1,
            Position::ShortSpread => -1,
        }
    }

    pub fn exposure(self) -> Decimal {
        Decimal::from(self.sign())
    }

    pub fn is_open(self) -> bool {
        self != Position::Flat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Entry,
    MeanReversionExit,
    StopLoss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub period: usize,
    pub from: Position,
    pub to: Position,
    pub reason: TransitionReason,
}

/// One position label per timestamp plus the transitions that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSeries {
    pub positions: Vec<Position>,
    pub transitions: Vec<Transition>,
}

impl PositionSeries {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn signs(&self) -> Vec<i8> {
        self.positions.iter().map(|p| p.sign()).collect()
    }
}

/// Thresholds for entry, exit, stop-loss and the volatility admission filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// |z| at or beyond which a flat book opens a position (default 2.0)
    pub entry_threshold: Decimal,
    /// Band around zero in which an open position is closed (default 0.5)
    pub exit_threshold: Decimal,
    /// |z| at or beyond which an open position is force-closed (default 4.0)
    pub stop_loss: Decimal,
    /// Entries require rolling z volatility strictly below this (default 1.25)
    pub vol_cap: Decimal,
    /// Observations in the rolling volatility window (default 20)
    pub vol_window: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            entry_threshold: dec!(2.0),
            exit_threshold: dec!(0.5),
            stop_loss: dec!(4.0),
            vol_cap: dec!(1.25),
            vol_window: 20,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        if self.entry_threshold <= Decimal::ZERO {
            return Err(invalid("entry_threshold", "Entry threshold must be positive"));
        }
        if self.exit_threshold < Decimal::ZERO {
            return Err(invalid("exit_threshold", "Exit threshold must be non-negative"));
        }
        if self.exit_threshold >= self.entry_threshold {
            return Err(invalid(
                "exit_threshold",
                "Exit threshold must be below the entry threshold",
            ));
        }
        if self.stop_loss <= self.entry_threshold {
            return Err(invalid(
                "stop_loss",
                "Stop-loss threshold must exceed the entry threshold",
            ));
        }
        if self.vol_cap <= Decimal::ZERO {
            return Err(invalid("vol_cap", "Volatility cap must be positive"));
        }
        if self.vol_window < 2 {
            return Err(invalid("vol_window", "Volatility window must be at least 2"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> StatArbError {
    StatArbError::InvalidConfiguration {
        field: field.into(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    config: StrategyConfig,
    state: Position,
}

impl PositionStateMachine {
    pub fn new(config: StrategyConfig) -> StatArbResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Position::Flat,
        })
    }

    pub fn state(&self) -> Position {
        self.state
    }

    /// Stop-loss circuit breaker.
    pub fn stop_loss_hit(&self, z: Decimal) -> bool {
        self.state.is_open() && z.abs() >= self.config.stop_loss
    }

    pub fn mean_reverted(&self, z: Decimal) -> bool {
        match self.state {
            Position::LongSpread => z >= -self.config.exit_threshold,
            Position::ShortSpread => z <= self.config.exit_threshold,
            Position::Flat => false,
        }
    }

    /// The filter fails while the window is still filling or vol is undefined.
    pub fn volatility_admits(&self, period: usize, vol: Option<Decimal>) -> bool {
        if period + 1 < self.config.vol_window {
            return false;
        }
        matches!(vol, Some(v) if v < self.config.vol_cap)
    }

    pub fn entry_signal(
        &self,
        period: usize,
        z: Decimal,
        vol: Option<Decimal>,
    ) -> Option<Position> {
        if self.state.is_open() || !self.volatility_admits(period, vol) {
            return None;
        }
        if z <= -self.config.entry_threshold {
            Some(Position::LongSpread)
        } else if z >= self.config.entry_threshold {
            Some(Position::ShortSpread)
        } else {
            None
        }
    }

    /// Advance one step. An undefined z-score holds the current state.
    pub fn step(
        &mut self,
        period: usize,
        z: Option<Decimal>,
        vol: Option<Decimal>,
    ) -> Option<Transition> {
        let z = z?;
        let (to, reason) = if self.state.is_open() {
            if self.stop_loss_hit(z) {
                (Position::Flat, TransitionReason::StopLoss)
            } else if self.mean_reverted(z) {
                (Position::Flat, TransitionReason::MeanReversionExit)
            } else {
                return None;
            }
        } else {
            (self.entry_signal(period, z, vol)?, TransitionReason::Entry)
        };

        let transition = Transition {
            period,
            from: self.state,
            to,
            reason,
        };
        self.state = to;
        Some(transition)
    }
}

/// Turn a z-score stream into one position per timestamp.
///
/// `position[0]` is always flat: there is no earlier observation to act on.
pub fn run_position_state_machine(
    z_scores: &[Option<Decimal>],
    rolling_vol: &[Option<Decimal>],
    config: &StrategyConfig,
) -> StatArbResult<PositionSeries> {
    if z_scores.len() != rolling_vol.len() {
        return Err(StatArbError::InvalidConfiguration {
            field: "rolling_vol".into(),
            reason: format!(
                "{} volatility values for {} z-scores",
                rolling_vol.len(),
                z_scores.len()
            ),
        });
    }

    let mut machine = PositionStateMachine::new(*config)?;
    let mut positions = Vec::with_capacity(z_scores.len());
    let mut transitions = Vec::new();

    for (t, (z, vol)) in z_scores.iter().zip(rolling_vol).enumerate() {
        if t > 0 {
            if let Some(tr) = machine.step(t, *z, *vol) {
                tracing::trace!(
                    period = t,
                    from = ?tr.from,
                    to = ?tr.to,
                    reason = ?tr.reason,
                    "position transition"
                );
                transitions.push(tr);
            }
        }
        positions.push(machine.state());
    }

    Ok(PositionSeries {
        positions,
        transitions,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
