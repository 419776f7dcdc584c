//! Two-step retest confirmation
//!
//! Touch: the forming bar trades back to the broken level.
//! Confirm: on a later tick, a bar closes beyond the level again.
//! A single call performs at most one of the two steps.

use chrono::{DateTime, FixedOffset};

use super::breakout::{Breakout, BreakoutState};
use crate::types::{Candle, Direction};

/// Result of advancing the retest state by one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetestStep {
    /// No transition this tick
    Waiting,
    /// Price came back to the level; `extreme` is the bar low (BUY) or high (SELL)
    Touched { extreme: f64, level: f64 },
    /// A bar closed back beyond the level
    Confirmed { close: f64, level: f64 },
}

pub struct RetestConfirmer;

impl RetestConfirmer {
    /// Advance `state` using the current (possibly still-forming) bar.
    /// Inert unless the state is pending touch or pending confirm.
    pub fn advance(
        state: &mut BreakoutState,
        bar: &Candle,
        (high, low): (f64, f64),
        now: DateTime<FixedOffset>,
    ) -> RetestStep {
        match *state {
            BreakoutState::PendingRetestTouch { breakout } => {
                let Some(step) = Self::touch(&breakout, bar, high, low) else {
                    return RetestStep::Waiting;
                };
                *state = BreakoutState::PendingRetestConfirm { breakout };
                step
            }
            BreakoutState::PendingRetestConfirm { breakout } => {
                let Some(step) = Self::confirm(&breakout, bar, high, low) else {
                    return RetestStep::Waiting;
                };
                *state = BreakoutState::Confirmed {
                    breakout,
                    retest_time: now,
                };
                step
            }
            BreakoutState::None | BreakoutState::Confirmed { .. } => RetestStep::Waiting,
        }
    }

    fn touch(breakout: &Breakout, bar: &Candle, high: f64, low: f64) -> Option<RetestStep> {
        match breakout.direction {
            Direction::Buy if bar.low <= high => Some(RetestStep::Touched {
                extreme: bar.low,
                level: high,
            }),
            Direction::Sell if bar.high >= low => Some(RetestStep::Touched {
                extreme: bar.high,
                level: low,
            }),
            _ => None,
        }
    }

    fn confirm(breakout: &Breakout, bar: &Candle, high: f64, low: f64) -> Option<RetestStep> {
        match breakout.direction {
            Direction::Buy if bar.close > high => Some(RetestStep::Confirmed {
                close: bar.close,
                level: high,
            }),
            Direction::Sell if bar.close < low => Some(RetestStep::Confirmed {
                close: bar.close,
                level: low,
            }),
            _ => None,
        }
    }
}
