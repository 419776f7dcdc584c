//! Breakout detection against the opening range
//!
//! Strict inequality both ways; BUY is checked first, so inverted bounds
//! (high < low) resolve to BUY.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::aggregator::CandleAggregator;
use crate::config::BreakoutMode;
use crate::types::Direction;

/// A recorded breakout: direction plus the price and time it was seen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakout {
    pub direction: Direction,
    pub price: f64,
    pub time: DateTime<FixedOffset>,
}

impl Breakout {
    /// The broken range bound: high for BUY, low for SELL
    pub fn level(&self, high: f64, low: f64) -> f64 {
        match self.direction {
            Direction::Buy => high,
            Direction::Sell => low,
        }
    }
}

/// Breakout cycle state. Lives for at most one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakoutState {
    #[default]
    None,
    PendingRetestTouch { breakout: Breakout },
    PendingRetestConfirm { breakout: Breakout },
    Confirmed {
        breakout: Breakout,
        retest_time: DateTime<FixedOffset>,
    },
}

impl BreakoutState {
    pub fn breakout(&self) -> Option<&Breakout> {
        match self {
            BreakoutState::None => None,
            BreakoutState::PendingRetestTouch { breakout }
            | BreakoutState::PendingRetestConfirm { breakout }
            | BreakoutState::Confirmed { breakout, .. } => Some(breakout),
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.breakout().map(|b| b.direction)
    }
}

/// Number of one-minute bars folded into a five-minute breakout bar
const FIVE_MINUTE_BARS: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct BreakoutDetector {
    mode: BreakoutMode,
}

impl BreakoutDetector {
    pub fn new(mode: BreakoutMode) -> Self {
        Self { mode }
    }

    /// Run the configured breakout check for this tick
    pub fn detect(
        &self,
        price: f64,
        time: DateTime<FixedOffset>,
        (high, low): (f64, f64),
        candles: &CandleAggregator,
    ) -> Option<Breakout> {
        match self.mode {
            BreakoutMode::PerTick => Self::check_price(price, time, (high, low)),
            BreakoutMode::FiveMinute => {
                if candles.len() < FIVE_MINUTE_BARS {
                    return None;
                }
                // A five-bar aggregate closes where its trailing bar closes
                let close = candles.current()?.close;
                Self::check_price(close, time, (high, low))
            }
        }
    }

    /// Compare one price against the range bounds
    pub fn check_price(
        price: f64,
        time: DateTime<FixedOffset>,
        (high, low): (f64, f64),
    ) -> Option<Breakout> {
        let direction = if price > high {
            Direction::Buy
        } else if price < low {
            Direction::Sell
        } else {
            return None;
        };
        Some(Breakout {
            direction,
            price,
            time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 2, h, m, s)
            .unwrap()
    }

    #[test]
    fn test_strict_inequality() {
        let now = at(9, 31, 0);
        assert!(BreakoutDetector::check_price(100.0, now, (100.0, 90.0)).is_none());
        assert!(BreakoutDetector::check_price(90.0, now, (100.0, 90.0)).is_none());

        let up = BreakoutDetector::check_price(101.0, now, (100.0, 90.0)).unwrap();
        assert_eq!(up.direction, Direction::Buy);
        assert_eq!(up.price, 101.0);
        assert_eq!(up.time, now);

        let down = BreakoutDetector::check_price(89.5, now, (100.0, 90.0)).unwrap();
        assert_eq!(down.direction, Direction::Sell);
        assert_eq!(down.level(100.0, 90.0), 90.0);
    }

    #[test]
    fn test_inverted_bounds_resolve_to_buy() {
        // high < low: 95 is both above high and below low
        let b = BreakoutDetector::check_price(95.0, at(9, 31, 0), (90.0, 100.0)).unwrap();
        assert_eq!(b.direction, Direction::Buy);
    }

    #[test]
    fn test_five_minute_mode_needs_five_bars() {
        let detector = BreakoutDetector::new(BreakoutMode::FiveMinute);
        let mut candles = CandleAggregator::new(60);
        for m in 31..35 {
            candles.on_tick(105.0, at(9, m, 0));
        }
        assert!(detector
            .detect(105.0, at(9, 34, 30), (100.0, 90.0), &candles)
            .is_none());

        candles.on_tick(104.0, at(9, 35, 0));
        let b = detector
            .detect(104.0, at(9, 35, 1), (100.0, 90.0), &candles)
            .unwrap();
        assert_eq!(b.direction, Direction::Buy);
        assert_eq!(b.price, 104.0);
    }

    #[test]
    fn test_state_direction() {
        let breakout = Breakout {
            direction: Direction::Sell,
            price: 89.0,
            time: at(9, 40, 0),
        };
        assert_eq!(BreakoutState::None.direction(), None);
        assert_eq!(
            BreakoutState::PendingRetestConfirm { breakout }.direction(),
            Some(Direction::Sell)
        );
    }
}
