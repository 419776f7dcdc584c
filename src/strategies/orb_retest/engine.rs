//! Strategy engine: phase dispatch over the opening-range retest components
//!
//! One engine per instrument and session. `process_tick` is the only entry
//! point that mutates state; callers serialise access (see `session`).

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::breakout::{BreakoutDetector, BreakoutState};
use super::entry::{Cooldown, EntrySignalEvaluator};
use super::events::StrategyEvent;
use super::opening_range::{OpeningRangeTracker, RangeUpdate};
use super::retest::{RetestConfirmer, RetestStep};
use crate::aggregator::{CandleAggregator, TickDisposition};
use crate::config::{Config, SessionConfig, StrategyConfig};
use crate::history::HistoricalRanges;
use crate::notifier::Notifier;
use crate::types::{strike_for, Direction, Signal, Tick};

/// Strategy phase, strictly ordered; at most one phase acts per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    CapturingRange,
    WatchingForBreakout,
    AwaitingRetestTouch,
    AwaitingRetestConfirm,
    AwaitingEntry,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::CapturingRange => "Capturing opening range",
            Phase::WatchingForBreakout => "Waiting for breakout",
            Phase::AwaitingRetestTouch => "Waiting for retest touch",
            Phase::AwaitingRetestConfirm => "Waiting for retest confirmation",
            Phase::AwaitingEntry => "Waiting for entry",
        };
        f.write_str(label)
    }
}

/// Read-only snapshot for monitoring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub current_price: Option<f64>,
    pub range_high: Option<f64>,
    pub range_low: Option<f64>,
    pub phase: Phase,
    pub breakout_direction: Option<Direction>,
    pub tick_count: u64,
    pub last_update: Option<DateTime<FixedOffset>>,
}

pub struct StrategyEngine {
    instrument: String,
    session: SessionConfig,
    strategy: StrategyConfig,
    offset: FixedOffset,

    candles: CandleAggregator,
    range: OpeningRangeTracker,
    early_range: OpeningRangeTracker,
    detector: BreakoutDetector,
    breakout: BreakoutState,
    cooldown: Cooldown,

    notifier: Arc<dyn Notifier>,

    tick_count: u64,
    stale_ticks: u64,
    skewed_ticks: u64,
    max_forward_skew: Option<Duration>,
    held_jump: Option<DateTime<FixedOffset>>,
    current_price: Option<f64>,
    last_update: Option<DateTime<FixedOffset>>,
    session_date: Option<NaiveDate>,
    context_sent: bool,
    catch_up_pending: bool,
    last_status_at: Option<DateTime<FixedOffset>>,
}

impl StrategyEngine {
    /// Build an engine from a validated configuration
    pub fn new(config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            instrument: config.instrument.clone(),
            session: config.session.clone(),
            strategy: config.strategy.clone(),
            offset: config.session.offset(),
            candles: CandleAggregator::new(config.strategy.max_candles),
            range: OpeningRangeTracker::new(config.session.range_window),
            early_range: OpeningRangeTracker::new(config.session.early_window),
            detector: BreakoutDetector::new(config.strategy.breakout_mode),
            breakout: BreakoutState::None,
            cooldown: Cooldown::new(config.strategy.cooldown_secs),
            notifier,
            tick_count: 0,
            stale_ticks: 0,
            skewed_ticks: 0,
            max_forward_skew: interval(config.strategy.max_forward_skew_secs),
            held_jump: None,
            current_price: None,
            last_update: None,
            session_date: None,
            context_sent: false,
            catch_up_pending: false,
            last_status_at: None,
        }
    }

    /// Install opening levels fetched from history. The next tick runs the
    /// late-start breakout check against them.
    ///
    /// Returns `false` (and changes nothing) if the main range is unusable.
    pub fn seed(&mut self, ranges: &HistoricalRanges) -> bool {
        let Some((high, low)) = ranges.first15() else {
            warn!("Ignoring invalid historical range: {:?}", ranges);
            return false;
        };
        self.range.seed(high, low);
        if let Some((early_high, early_low)) = ranges.first5() {
            self.early_range.seed(early_high, early_low);
        }
        self.catch_up_pending = true;
        info!(
            "Seeded opening range from history: H={:.2}, L={:.2}",
            high, low
        );
        true
    }

    /// Feed one tick through the state machine
    pub fn process_tick(&mut self, tick: Tick) -> Option<Signal> {
        let now = tick.timestamp.with_timezone(&self.offset);
        let price = tick.price;

        self.tick_count += 1;
        if self.is_unconfirmed_jump(now) {
            self.skewed_ticks += 1;
            return None;
        }
        self.roll_over_if_new_day(now.date_naive());

        if self.candles.on_tick(price, now) == TickDisposition::Stale {
            self.stale_ticks += 1;
            return None;
        }
        self.current_price = Some(price);
        self.last_update = Some(now);

        if !self.context_sent {
            self.context_sent = true;
            let seeded = if self.range.is_seeded() {
                self.range.range().levels()
            } else {
                None
            };
            self.emit(StrategyEvent::ContextEstablished {
                price,
                time: now,
                seeded,
            });
        }

        self.track_early_range(price, now);

        let catch_up = std::mem::take(&mut self.catch_up_pending);
        let signal = match self.phase() {
            Phase::CapturingRange => {
                if self.range.on_tick(price, now.time()) == RangeUpdate::Captured {
                    self.on_range_captured(now);
                }
                None
            }
            Phase::WatchingForBreakout => {
                self.watch_for_breakout(price, now, catch_up);
                None
            }
            Phase::AwaitingRetestTouch | Phase::AwaitingRetestConfirm => {
                self.advance_retest(now);
                None
            }
            Phase::AwaitingEntry => self.evaluate_entry(now),
        };

        self.emit_status_if_due(now);
        signal
    }

    /// Clear all per-session state. Lifetime tick counters are kept.
    pub fn reset_session(&mut self) {
        self.candles.clear();
        self.range.reset();
        self.early_range.reset();
        self.breakout = BreakoutState::None;
        self.cooldown.reset();
        self.context_sent = false;
        self.catch_up_pending = false;
        self.held_jump = None;
        self.last_status_at = None;
        self.session_date = None;
        info!("Session state reset");
    }

    pub fn phase(&self) -> Phase {
        if !self.range.is_captured() {
            return Phase::CapturingRange;
        }
        match self.breakout {
            BreakoutState::None => Phase::WatchingForBreakout,
            BreakoutState::PendingRetestTouch { .. } => Phase::AwaitingRetestTouch,
            BreakoutState::PendingRetestConfirm { .. } => Phase::AwaitingRetestConfirm,
            BreakoutState::Confirmed { .. } => Phase::AwaitingEntry,
        }
    }

    pub fn status(&self) -> EngineStatus {
        let range = self.range.range();
        EngineStatus {
            current_price: self.current_price,
            range_high: range.high,
            range_low: range.low,
            phase: self.phase(),
            breakout_direction: self.breakout.direction(),
            tick_count: self.tick_count,
            last_update: self.last_update,
        }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn candles(&self) -> &CandleAggregator {
        &self.candles
    }

    pub fn opening_range(&self) -> &OpeningRangeTracker {
        &self.range
    }

    pub fn early_range(&self) -> &OpeningRangeTracker {
        &self.early_range
    }

    pub fn breakout_state(&self) -> &BreakoutState {
        &self.breakout
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn stale_ticks(&self) -> u64 {
        self.stale_ticks
    }

    /// Ticks held back as unconfirmed forward clock jumps
    pub fn skewed_ticks(&self) -> u64 {
        self.skewed_ticks
    }

    pub fn last_signal_time(&self) -> Option<DateTime<FixedOffset>> {
        self.cooldown.last_signal_time()
    }

    /// Hold back a tick that lands more than the skew limit ahead of the
    /// last accepted tick. A second such tick near the first accepts the jump.
    fn is_unconfirmed_jump(&mut self, now: DateTime<FixedOffset>) -> bool {
        let (Some(limit), Some(last)) = (self.max_forward_skew, self.last_update) else {
            return false;
        };
        if now - last <= limit {
            self.held_jump = None;
            return false;
        }
        if let Some(held) = self.held_jump.take() {
            if (now - held).abs() <= limit {
                info!(
                    "Clock jump confirmed: {} -> {}",
                    last.format("%Y-%m-%d %H:%M:%S"),
                    now.format("%Y-%m-%d %H:%M:%S")
                );
                return false;
            }
        }
        warn!(
            "Holding back tick at {}: {}s ahead of last tick at {}",
            now.format("%Y-%m-%d %H:%M:%S"),
            (now - last).num_seconds(),
            last.format("%H:%M:%S")
        );
        self.held_jump = Some(now);
        true
    }

    fn roll_over_if_new_day(&mut self, date: NaiveDate) {
        if let Some(previous) = self.session_date {
            if self.session.roll_over_daily && date > previous {
                info!("New session date {} (previous {}), rolling over", date, previous);
                self.reset_session();
            }
        }
        if self.session_date.map_or(true, |d| date > d) {
            self.session_date = Some(date);
        }
    }

    fn track_early_range(&mut self, price: f64, now: DateTime<FixedOffset>) {
        if self.early_range.on_tick(price, now.time()) != RangeUpdate::Captured {
            return;
        }
        match self.early_range.range().levels() {
            Some((high, low)) => {
                info!("First 5min complete: H={:.2}, L={:.2}", high, low);
                let step = self.strategy.strike_step;
                self.emit(StrategyEvent::EarlyRangeCaptured {
                    high,
                    low,
                    strike_low: strike_for(low, step),
                    strike_high: strike_for(high, step),
                    time: now,
                });
            }
            None => debug!("Early window closed without ticks"),
        }
    }

    fn on_range_captured(&self, now: DateTime<FixedOffset>) {
        let range = self.range.range();
        match range.levels() {
            Some((high, low)) => {
                info!("Opening range captured: H={:.2}, L={:.2}", high, low)
            }
            None => warn!(
                "Opening range window closed with no ticks; breakouts disabled until reset"
            ),
        }
        self.emit(StrategyEvent::RangeCaptured {
            high: range.high,
            low: range.low,
            time: now,
        });
    }

    fn watch_for_breakout(&mut self, price: f64, now: DateTime<FixedOffset>, catch_up: bool) {
        let Some(levels) = self.range.range().levels() else {
            return;
        };
        // Late-start catch-up always compares the live price
        let found = if catch_up {
            BreakoutDetector::check_price(price, now, levels)
        } else {
            self.detector.detect(price, now, levels, &self.candles)
        };
        let Some(breakout) = found else {
            return;
        };

        let (high, low) = levels;
        let level = breakout.level(high, low);
        match breakout.direction {
            Direction::Buy => info!(
                "BULLISH BREAKOUT{}: {:.2} > {:.2}",
                if catch_up { " (catch-up)" } else { "" },
                breakout.price,
                level
            ),
            Direction::Sell => info!(
                "BEARISH BREAKOUT{}: {:.2} < {:.2}",
                if catch_up { " (catch-up)" } else { "" },
                breakout.price,
                level
            ),
        }

        self.breakout = BreakoutState::PendingRetestTouch { breakout };
        self.emit(StrategyEvent::BreakoutDetected {
            direction: breakout.direction,
            price: breakout.price,
            level,
            strike: strike_for(breakout.price, self.strategy.strike_step),
            option_side: breakout.direction.option_side(),
            time: now,
            catch_up,
        });
    }

    fn advance_retest(&mut self, now: DateTime<FixedOffset>) {
        let Some(levels) = self.range.range().levels() else {
            return;
        };
        let Some(bar) = self.candles.current() else {
            return;
        };
        let step = RetestConfirmer::advance(&mut self.breakout, bar, levels, now);
        let Some(direction) = self.breakout.direction() else {
            return;
        };

        match step {
            RetestStep::Waiting => {}
            RetestStep::Touched { extreme, level } => {
                info!(
                    "Retest touch ({}): price reached {:.2} against level {:.2}",
                    direction, extreme, level
                );
                self.emit(StrategyEvent::RetestTouched {
                    direction,
                    extreme,
                    level,
                    time: now,
                });
            }
            RetestStep::Confirmed { close, level } => {
                info!(
                    "RETEST CONFIRMED ({}): bar closed at {:.2} beyond {:.2}",
                    direction, close, level
                );
                self.emit(StrategyEvent::RetestConfirmed {
                    direction,
                    close,
                    level,
                    strike: strike_for(close, self.strategy.strike_step),
                    option_side: direction.option_side(),
                    time: now,
                });
            }
        }
    }

    fn evaluate_entry(&mut self, now: DateTime<FixedOffset>) -> Option<Signal> {
        let (high, low) = self.range.range().levels()?;
        let BreakoutState::Confirmed {
            breakout,
            retest_time,
        } = self.breakout
        else {
            return None;
        };
        let pattern =
            EntrySignalEvaluator::evaluate(breakout.direction, &self.candles, (high, low))?;

        info!(
            "ENTRY SIGNAL: two consecutive {} candles beyond the range",
            pattern.entry_candle
        );
        self.reset_cycle();

        if let Some(remaining) = self.cooldown.remaining(now) {
            info!(
                "Skipping signal due to cooldown period. {} seconds remaining",
                remaining.num_seconds()
            );
            return None;
        }

        let signal = Signal {
            direction: breakout.direction,
            strike: strike_for(pattern.entry_price, self.strategy.strike_step),
            option_side: breakout.direction.option_side(),
            entry_price: pattern.entry_price,
            entry_time: now,
            entry_candle: pattern.entry_candle,
            range_high: high,
            range_low: low,
            breakout_price: breakout.price,
            breakout_time: breakout.time,
            retest_time,
        };
        self.cooldown.record(now);
        info!(
            "TRADE SIGNAL: BUY {} {} {} @ {:.2}",
            self.instrument, signal.strike, signal.option_side, signal.entry_price
        );
        self.emit(StrategyEvent::EntrySignal {
            signal: Box::new(signal.clone()),
        });
        Some(signal)
    }

    fn reset_cycle(&mut self) {
        self.breakout = BreakoutState::None;
        info!("Strategy reset for next opportunity");
    }

    fn emit_status_if_due(&mut self, now: DateTime<FixedOffset>) {
        if self.strategy.status_interval_secs == 0 {
            return;
        }
        let Some(previous) = self.last_status_at else {
            self.last_status_at = Some(now);
            return;
        };
        let Some(every) = interval(self.strategy.status_interval_secs) else {
            return;
        };
        if now - previous < every {
            return;
        }
        self.last_status_at = Some(now);
        let status = self.status();
        self.emit(StrategyEvent::Status {
            range_width: self.range.range().width(),
            status: Box::new(status),
        });
    }

    fn emit(&self, event: StrategyEvent) {
        debug!("Notifying {} event", event.kind());
        self.notifier
            .send(&event.render(&self.instrument), event.priority());
    }
}

/// `secs` as a duration; `None` for zero
fn interval(secs: u64) -> Option<Duration> {
    if secs == 0 {
        return None;
    }
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}
