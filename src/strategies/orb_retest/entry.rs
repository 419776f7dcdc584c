//! Entry pattern and signal cooldown
//!
//! After a confirmed retest, an entry needs the two most recently completed
//! bars to agree in colour and close beyond the broken level. The forming
//! bar is never used.

use chrono::{DateTime, Duration, FixedOffset};

use crate::aggregator::CandleAggregator;
use crate::types::{CandleColor, Direction};

/// Matched two-bar pattern; `entry_price` is the close of the newer bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryPattern {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_candle: CandleColor,
}

pub struct EntrySignalEvaluator;

impl EntrySignalEvaluator {
    /// Minimum history: two completed bars plus the forming one
    pub const MIN_CANDLES: usize = 3;

    pub fn evaluate(
        direction: Direction,
        candles: &CandleAggregator,
        (high, low): (f64, f64),
    ) -> Option<EntryPattern> {
        if candles.len() < Self::MIN_CANDLES {
            return None;
        }
        let last = candles.from_back(1)?;
        let prev = candles.from_back(2)?;

        let matched = match direction {
            Direction::Buy => {
                last.is_green() && prev.is_green() && last.close > high && prev.close > high
            }
            Direction::Sell => {
                last.is_red() && prev.is_red() && last.close < low && prev.close < low
            }
        };

        matched.then(|| EntryPattern {
            direction,
            entry_price: last.close,
            entry_candle: last.color(),
        })
    }
}

/// Minimum spacing between emitted signals, measured in tick time
#[derive(Debug, Clone)]
pub struct Cooldown {
    interval: Duration,
    last_signal_time: Option<DateTime<FixedOffset>>,
}

impl Cooldown {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: i64::try_from(interval_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            last_signal_time: None,
        }
    }

    /// Time left before another signal may be emitted at `now`, if any
    pub fn remaining(&self, now: DateTime<FixedOffset>) -> Option<Duration> {
        let last = self.last_signal_time?;
        let elapsed = now - last;
        if elapsed >= self.interval {
            return None;
        }
        Some(self.interval.checked_sub(&elapsed).unwrap_or(self.interval))
    }

    pub fn record(&mut self, now: DateTime<FixedOffset>) {
        self.last_signal_time = Some(now);
    }

    pub fn last_signal_time(&self) -> Option<DateTime<FixedOffset>> {
        self.last_signal_time
    }

    pub fn reset(&mut self) {
        self.last_signal_time = None;
    }
}
