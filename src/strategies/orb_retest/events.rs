//! Strategy transition events
//!
//! Every notification the engine raises is one of these. The numeric fields
//! are the observable contract; `render` is presentation only.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::engine::EngineStatus;
use crate::notifier::Priority;
use crate::types::{Direction, OptionSide, Signal};

const TIME_FMT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyEvent {
    /// First tick of the session. `seeded` carries the restart levels, if any.
    ContextEstablished {
        price: f64,
        time: DateTime<FixedOffset>,
        seeded: Option<(f64, f64)>,
    },

    /// First-five-minute range closed
    EarlyRangeCaptured {
        high: f64,
        low: f64,
        strike_low: i64,
        strike_high: i64,
        time: DateTime<FixedOffset>,
    },

    /// Opening range froze. `None` bounds mean no tick landed in the window.
    RangeCaptured {
        high: Option<f64>,
        low: Option<f64>,
        time: DateTime<FixedOffset>,
    },

    BreakoutDetected {
        direction: Direction,
        price: f64,
        level: f64,
        strike: i64,
        option_side: OptionSide,
        time: DateTime<FixedOffset>,
        /// Raised on the first tick after a seeded restart
        catch_up: bool,
    },

    RetestTouched {
        direction: Direction,
        extreme: f64,
        level: f64,
        time: DateTime<FixedOffset>,
    },

    RetestConfirmed {
        direction: Direction,
        close: f64,
        level: f64,
        strike: i64,
        option_side: OptionSide,
        time: DateTime<FixedOffset>,
    },

    EntrySignal { signal: Box<Signal> },

    Status {
        status: Box<EngineStatus>,
        range_width: Option<f64>,
    },
}

impl StrategyEvent {
    pub fn priority(&self) -> Priority {
        match self {
            StrategyEvent::ContextEstablished { .. }
            | StrategyEvent::BreakoutDetected { .. }
            | StrategyEvent::RetestConfirmed { .. }
            | StrategyEvent::EntrySignal { .. } => Priority::High,
            StrategyEvent::EarlyRangeCaptured { .. }
            | StrategyEvent::RangeCaptured { .. }
            | StrategyEvent::RetestTouched { .. }
            | StrategyEvent::Status { .. } => Priority::Normal,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            StrategyEvent::ContextEstablished { .. } => "context",
            StrategyEvent::EarlyRangeCaptured { .. } => "early_range",
            StrategyEvent::RangeCaptured { .. } => "range",
            StrategyEvent::BreakoutDetected { .. } => "breakout",
            StrategyEvent::RetestTouched { .. } => "retest_touch",
            StrategyEvent::RetestConfirmed { .. } => "retest_confirm",
            StrategyEvent::EntrySignal { .. } => "signal",
            StrategyEvent::Status { .. } => "status",
        }
    }

    /// Human-readable message. `**bold**` markers are converted by the notifier.
    pub fn render(&self, instrument: &str) -> String {
        match self {
            StrategyEvent::ContextEstablished {
                price,
                time,
                seeded: Some((high, low)),
            } => format!(
                "**SESSION RESTART**\n\n\
                 **{instrument} Price:** {price:.2}\n\
                 **Time:** {}\n\
                 **Date:** {}\n\n\
                 **Loaded range (history):**\n\
                 High: {high:.2}\n\
                 Low: {low:.2}\n\
                 Range: {:.2} points\n\n\
                 Monitoring for breakouts against the loaded range",
                time.format(TIME_FMT),
                time.format("%A, %B %d, %Y"),
                high - low,
            ),
            StrategyEvent::ContextEstablished {
                price,
                time,
                seeded: None,
            } => format!(
                "**FIRST LIVE DATA TODAY**\n\n\
                 **{instrument} Price:** {price:.2}\n\
                 **Time:** {}\n\
                 **Date:** {}\n\n\
                 Ready to capture the opening range",
                time.format(TIME_FMT),
                time.format("%A, %B %d, %Y"),
            ),
            StrategyEvent::EarlyRangeCaptured {
                high,
                low,
                strike_low,
                strike_high,
                time,
            } => format!(
                "**First 5-Minute Range**\n\n\
                 **High:** {high:.2}\n\
                 **Low:** {low:.2}\n\
                 **Range:** {:.2} points\n\
                 **Strike range:** {strike_low} - {strike_high}\n\
                 **Time:** {}",
                high - low,
                time.format(TIME_FMT),
            ),
            StrategyEvent::RangeCaptured {
                high: Some(high),
                low: Some(low),
                time,
            } => format!(
                "**Opening Range Complete**\n\n\
                 **High:** {high:.2}\n\
                 **Low:** {low:.2}\n\
                 **Range:** {:.2} points\n\
                 **Time:** {}\n\n\
                 Now monitoring for breakouts",
                high - low,
                time.format(TIME_FMT),
            ),
            StrategyEvent::RangeCaptured { time, .. } => format!(
                "**Opening Range Empty**\n\n\
                 No {instrument} ticks arrived inside the window.\n\
                 **Time:** {}\n\n\
                 Breakout monitoring is disabled for this session",
                time.format(TIME_FMT),
            ),
            StrategyEvent::BreakoutDetected {
                direction,
                price,
                level,
                strike,
                option_side,
                time,
                catch_up,
            } => {
                let (label, verb) = match direction {
                    Direction::Buy => ("BULLISH", "Broke Above"),
                    Direction::Sell => ("BEARISH", "Broke Below"),
                };
                let prefix = if *catch_up { "IMMEDIATE " } else { "" };
                format!(
                    "**{prefix}{label} BREAKOUT**\n\n\
                     **Current Price:** {price:.2}\n\
                     **{verb}:** {level:.2}\n\
                     **Optimal Strike:** {strike} {option_side}\n\
                     **Time:** {}\n\n\
                     Next: waiting for retest",
                    time.format(TIME_FMT),
                )
            }
            StrategyEvent::RetestTouched {
                direction,
                extreme,
                level,
                time,
            } => {
                let moved = match direction {
                    Direction::Buy => "dipped to",
                    Direction::Sell => "rose to",
                };
                format!(
                    "**Retest touch ({direction})**\n\n\
                     Price {moved} {extreme:.2}, touching the level {level:.2}\n\
                     **Time:** {}",
                    time.format(TIME_FMT),
                )
            }
            StrategyEvent::RetestConfirmed {
                direction,
                close,
                level,
                strike,
                option_side,
                time,
            } => {
                let (label, colour) = match direction {
                    Direction::Buy => ("BULLISH", "GREEN"),
                    Direction::Sell => ("BEARISH", "RED"),
                };
                format!(
                    "**RETEST CONFIRMED - {label}**\n\n\
                     **Retest Price:** {close:.2}\n\
                     **Level:** {level:.2}\n\
                     **Strike Price:** {strike} {option_side}\n\
                     **Time:** {}\n\n\
                     Next: waiting for entry (2 consecutive {colour} candles)",
                    time.format(TIME_FMT),
                )
            }
            StrategyEvent::EntrySignal { signal } => format!(
                "**{instrument} SIGNAL**\n\n\
                 **Trade:** BUY {instrument} {} {}\n\
                 **Type:** {}\n\
                 **Entry Price:** {:.2}\n\
                 **Entry Candle:** {}\n\
                 **Range High:** {:.2}\n\
                 **Range Low:** {:.2}\n\
                 **Breakout Price:** {:.2}\n\
                 **Breakout Time:** {}\n\
                 **Retest Time:** {}\n\
                 **Signal Time:** {}",
                signal.strike,
                signal.option_side,
                signal.direction,
                signal.entry_price,
                signal.entry_candle,
                signal.range_high,
                signal.range_low,
                signal.breakout_price,
                signal.breakout_time.format(TIME_FMT),
                signal.retest_time.format(TIME_FMT),
                signal.entry_time.format(TIME_FMT),
            ),
            StrategyEvent::Status {
                status,
                range_width,
            } => {
                let level = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
                let direction = status
                    .breakout_direction
                    .map_or_else(|| "-".to_string(), |d| d.to_string());
                let updated = status
                    .last_update
                    .map_or_else(|| "-".to_string(), |t| t.format(TIME_FMT).to_string());
                format!(
                    "**{instrument} Monitoring Status**\n\n\
                     **Price:** {}\n\
                     **Range:** {} / {} ({} points)\n\
                     **Phase:** {}\n\
                     **Breakout:** {direction}\n\
                     **Ticks:** {}\n\
                     **Last update:** {updated}",
                    level(status.current_price),
                    level(status.range_high),
                    level(status.range_low),
                    level(*range_width),
                    status.phase,
                    status.tick_count,
                )
            }
        }
    }
}
