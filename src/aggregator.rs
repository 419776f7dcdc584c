//! One-minute candle aggregation
//!
//! Folds ticks into minute-bucketed OHLC bars and keeps a bounded history.
//! The trailing bar is still forming; every earlier bar is frozen.

use chrono::{DateTime, FixedOffset};
use std::collections::VecDeque;
use tracing::debug;

use crate::types::{minute_bucket, Candle};

/// What a tick did to the candle history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDisposition {
    /// The tick opened a new bar
    Opened,
    /// The tick refined the trailing bar
    Updated,
    /// The tick belongs to a minute before the trailing bar and was ignored
    Stale,
}

#[derive(Debug, Clone)]
pub struct CandleAggregator {
    candles: VecDeque<Candle>,
    capacity: usize,
}

impl CandleAggregator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            candles: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn on_tick(&mut self, price: f64, timestamp: DateTime<FixedOffset>) -> TickDisposition {
        let bucket = minute_bucket(timestamp);

        match self.candles.back_mut() {
            Some(last) if last.bucket_start == bucket => {
                last.update(price);
                TickDisposition::Updated
            }
            Some(last) if bucket < last.bucket_start => {
                debug!(
                    "Ignoring out-of-order tick for {} (trailing bar {})",
                    bucket.format("%H:%M"),
                    last.bucket_start.format("%H:%M")
                );
                TickDisposition::Stale
            }
            _ => {
                self.candles.push_back(Candle::open_at(bucket, price));
                while self.candles.len() > self.capacity {
                    self.candles.pop_front();
                }
                debug!("New candle: {}", bucket.format("%H:%M"));
                TickDisposition::Opened
            }
        }
    }

    /// The last `n` bars in chronological order, or fewer if not yet available
    pub fn last_n(&self, n: usize) -> Vec<&Candle> {
        let skip = self.candles.len().saturating_sub(n);
        self.candles.iter().skip(skip).collect()
    }

    /// The bar currently being formed
    pub fn current(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Bar at `offset` positions back from the trailing bar (0 = trailing)
    pub fn from_back(&self, offset: usize) -> Option<&Candle> {
        let len = self.candles.len();
        if offset >= len {
            return None;
        }
        self.candles.get(len - 1 - offset)
    }

    pub fn candles(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.candles.clear();
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
    fn test_ticks_within_minute_refine_one_bar() {
        let mut agg = CandleAggregator::new(60);
        assert_eq!(agg.on_tick(100.0, at(9, 31, 0)), TickDisposition::Opened);
        assert_eq!(agg.on_tick(103.0, at(9, 31, 10)), TickDisposition::Updated);
        assert_eq!(agg.on_tick(98.0, at(9, 31, 20)), TickDisposition::Updated);
        assert_eq!(agg.on_tick(101.0, at(9, 31, 59)), TickDisposition::Updated);

        assert_eq!(agg.len(), 1);
        let bar = agg.current().unwrap();
        assert_eq!(bar.bucket_start, at(9, 31, 0));
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (100.0, 103.0, 98.0, 101.0));
        assert_eq!(bar.volume, 0);
    }

    #[test]
    fn test_rollover_freezes_previous_bar() {
        let mut agg = CandleAggregator::new(60);
        agg.on_tick(100.0, at(9, 31, 0));
        agg.on_tick(102.0, at(9, 31, 30));
        agg.on_tick(99.0, at(9, 32, 0));

        assert_eq!(agg.len(), 2);
        let frozen = agg.from_back(1).unwrap();
        assert_eq!(frozen.close, 102.0);
        assert_eq!(agg.current().unwrap().open, 99.0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut agg = CandleAggregator::new(60);
        for i in 0..75u32 {
            agg.on_tick(100.0 + f64::from(i), at(10 + i / 60, i % 60, 0));
        }
        assert_eq!(agg.len(), 60);
        assert_eq!(agg.candles().next().unwrap().open, 115.0);
        assert_eq!(agg.current().unwrap().open, 174.0);
    }

    #[test]
    fn test_stale_tick_ignored() {
        let mut agg = CandleAggregator::new(60);
        agg.on_tick(100.0, at(9, 32, 0));
        assert_eq!(agg.on_tick(50.0, at(9, 31, 59)), TickDisposition::Stale);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.current().unwrap().low, 100.0);
    }

    #[test]
    fn test_last_n() {
        let mut agg = CandleAggregator::new(60);
        assert!(agg.last_n(3).is_empty());
        agg.on_tick(1.0, at(9, 31, 0));
        agg.on_tick(2.0, at(9, 32, 0));
        assert_eq!(agg.last_n(3).len(), 2);
        agg.on_tick(3.0, at(9, 33, 0));
        agg.on_tick(4.0, at(9, 34, 0));
        let last = agg.last_n(3);
        let opens: Vec<f64> = last.iter().map(|c| c.open).collect();
        assert_eq!(opens, vec![2.0, 3.0, 4.0]);
        assert!(agg.from_back(4).is_none());
    }
}
