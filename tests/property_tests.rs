//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Candle history is bounded, sorted and free of duplicate buckets
//! 2. Bars are monotonically refined within their minute
//! 3. The opening range never changes once captured
//! 4. A breakout direction never flips without passing through reset
//! 5. Strikes sit on the step grid, within half a step of the price

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use proptest::prelude::*;
use std::sync::Arc;

use orb_signal::aggregator::CandleAggregator;
use orb_signal::config::Config;
use orb_signal::notifier::{Notifier, Priority};
use orb_signal::{strike_for, StrategyEngine, Tick};

struct Silent;

impl Notifier for Silent {
    fn send(&self, _text: &str, _priority: Priority) {}
}

fn session_start() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(330 * 60)
        .unwrap()
        .with_ymd_and_hms(2024, 5, 2, 9, 15, 0)
        .unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (21_800.0..22_200.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

/// Ticks as (seconds since previous tick, price). Negative steps model
/// out-of-order delivery.
fn arb_ticks(max_len: usize) -> impl Strategy<Value = Vec<(i64, f64)>> {
    prop::collection::vec((-90i64..150, arb_price()), 1..max_len)
}

fn timeline(steps: &[(i64, f64)]) -> Vec<(DateTime<FixedOffset>, f64)> {
    let mut now = session_start();
    steps
        .iter()
        .map(|&(delta, price)| {
            now += Duration::seconds(delta);
            (now, price)
        })
        .collect()
}

// ── 1. Bounded, ordered history ──────────────────────────────────────

proptest! {
    #[test]
    fn candle_history_bounded_and_sorted(steps in arb_ticks(400)) {
        let mut agg = CandleAggregator::new(60);
        for (ts, price) in timeline(&steps) {
            agg.on_tick(price, ts);
            prop_assert!(agg.len() <= 60);
        }
        let buckets: Vec<_> = agg.candles().map(|c| c.bucket_start).collect();
        for pair in buckets.windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }
}

// ── 2. Monotone refinement ───────────────────────────────────────────

proptest! {
    #[test]
    fn bar_refined_within_minute(prices in prop::collection::vec(arb_price(), 1..50)) {
        let mut agg = CandleAggregator::new(60);
        let start = session_start();
        let mut prev: Option<(f64, f64)> = None;
        for (i, &price) in prices.iter().enumerate() {
            agg.on_tick(price, start + Duration::milliseconds(i as i64 * 100));
            let bar = agg.current().unwrap();
            prop_assert_eq!(bar.close, price);
            prop_assert!(bar.low <= bar.open && bar.open <= bar.high);
            if let Some((high, low)) = prev {
                prop_assert!(bar.high >= high);
                prop_assert!(bar.low <= low);
            }
            prev = Some((bar.high, bar.low));
        }
        prop_assert_eq!(agg.len(), 1);
    }
}

// ── 3 & 4. Engine invariants ─────────────────────────────────────────

proptest! {
    #[test]
    fn range_frozen_and_direction_stable(steps in arb_ticks(600)) {
        let mut config = Config::default();
        config.session.roll_over_daily = false;
        let mut engine = StrategyEngine::new(&config, Arc::new(Silent));

        let mut frozen: Option<(Option<f64>, Option<f64>)> = None;
        let mut direction = None;

        for (ts, price) in timeline(&steps) {
            engine.process_tick(Tick::new(price, ts).unwrap());

            let range = engine.opening_range().range();
            match frozen {
                Some(levels) => {
                    prop_assert!(range.captured);
                    prop_assert_eq!((range.high, range.low), levels);
                }
                None if range.captured => frozen = Some((range.high, range.low)),
                None => {}
            }

            let current = engine.status().breakout_direction;
            if let (Some(before), Some(after)) = (direction, current) {
                prop_assert_eq!(before, after);
            }
            direction = current;
        }
    }
}

// ── 5. Strike grid ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn strike_on_grid(price in arb_price(), step in prop::sample::select(vec![50u32, 100])) {
        let strike = strike_for(price, step);
        prop_assert_eq!(strike % i64::from(step), 0);
        prop_assert!((price - strike as f64).abs() <= f64::from(step) / 2.0);
    }
}
