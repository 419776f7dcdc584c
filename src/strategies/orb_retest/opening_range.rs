//! Opening range capture
//!
//! Tracks the high/low of a fixed window at the start of the session. The
//! range freezes on the first tick at or after the window end, or at once
//! when seeded from history.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::config::TimeWindow;

/// Snapshot of a tracker. `high`/`low` are `None` until a tick lands in-window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpeningRange {
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub captured: bool,
}

impl OpeningRange {
    /// Usable `(high, low)` bounds: captured and at least one in-window price
    pub fn levels(&self) -> Option<(f64, f64)> {
        if !self.captured {
            return None;
        }
        Some((self.high?, self.low?))
    }

    pub fn width(&self) -> Option<f64> {
        self.levels().map(|(h, l)| h - l)
    }
}

/// How a tick affected the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUpdate {
    /// Nothing changed (before window, or already captured)
    Idle,
    /// The price was folded into the in-window range
    Extended,
    /// The window closed on this tick and the range froze
    Captured,
}

#[derive(Debug, Clone)]
pub struct OpeningRangeTracker {
    window: TimeWindow,
    high: Option<f64>,
    low: Option<f64>,
    captured: bool,
    seeded: bool,
}

impl OpeningRangeTracker {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            high: None,
            low: None,
            captured: false,
            seeded: false,
        }
    }

    pub fn on_tick(&mut self, price: f64, time_of_day: NaiveTime) -> RangeUpdate {
        if self.captured {
            return RangeUpdate::Idle;
        }

        if self.window.contains(time_of_day) {
            self.high = Some(self.high.map_or(price, |h| h.max(price)));
            self.low = Some(self.low.map_or(price, |l| l.min(price)));
            RangeUpdate::Extended
        } else if self.window.has_ended(time_of_day) {
            self.captured = true;
            RangeUpdate::Captured
        } else {
            RangeUpdate::Idle
        }
    }

    /// Install a range from history; the capture window is skipped for the
    /// rest of the session.
    pub fn seed(&mut self, high: f64, low: f64) {
        self.high = Some(high);
        self.low = Some(low);
        self.captured = true;
        self.seeded = true;
    }

    pub fn range(&self) -> OpeningRange {
        OpeningRange {
            high: self.high,
            low: self.low,
            captured: self.captured,
        }
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Start a new session
    pub fn reset(&mut self) {
        self.high = None;
        self.low = None;
        self.captured = false;
        self.seeded = false;
    }
}
