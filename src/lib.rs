//! Opening Range Breakout Signals
//!
//! Tick-to-signal engine for a single index: one-minute candles, opening
//! range capture, breakout, two-step retest and entry signal with cooldown.
//! Notifications are handed to an asynchronous delivery service.

pub mod aggregator;
pub mod common;
pub mod config;
pub mod feed;
pub mod history;
pub mod notifier;
pub mod session;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use strategies::orb_retest::{EngineStatus, Phase, StrategyEngine};
pub use types::*;
