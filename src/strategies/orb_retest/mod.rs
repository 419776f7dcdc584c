//! Opening Range Breakout with Retest
//!
//! Capture the opening range, wait for a breakout, require a touch-then-close
//! retest of the broken level, then enter on two completed candles beyond it.

mod breakout;
mod engine;
mod entry;
mod events;
mod opening_range;
mod retest;

pub use breakout::{Breakout, BreakoutDetector, BreakoutState};
pub use engine::{EngineStatus, Phase, StrategyEngine};
pub use entry::{Cooldown, EntryPattern, EntrySignalEvaluator};
pub use events::StrategyEvent;
pub use opening_range::{OpeningRange, OpeningRangeTracker, RangeUpdate};
pub use retest::{RetestConfirmer, RetestStep};

