//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for notifier credentials. Every field has a default, so
//! `{}` is a complete configuration for the NIFTY session.

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Startup-time configuration errors. These are fatal.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} window is empty: start {start} must be before end {end}")]
    EmptyWindow {
        name: &'static str,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("market open ({open}) must be before market close ({close})")]
    MarketHours { open: NaiveTime, close: NaiveTime },

    #[error("utc offset of {0} minutes is out of range")]
    UtcOffset(i32),

    #[error("strike_step must be greater than zero")]
    ZeroStrikeStep,

    #[error("max_candles must be at least 3, got {0}")]
    CandleHistory(usize),

    #[error("notifier queue_capacity must be greater than zero")]
    ZeroQueueCapacity,

    #[error("{name} of {secs}s exceeds the {max}s limit")]
    IntervalTooLong {
        name: &'static str,
        secs: u64,
        max: u64,
    },
}

/// Upper bound for every interval setting: one day
pub const MAX_INTERVAL_SECS: u64 = 86_400;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrument label used in notifications
    pub instrument: String,
    pub session: SessionConfig,
    pub strategy: StrategyConfig,
    pub notifier: NotifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            instrument: "NIFTY".to_string(),
            session: SessionConfig::default(),
            strategy: StrategyConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load notifier credentials from environment if set
    pub fn apply_env(&mut self) {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok();
        if let (Some(bot_token), Some(chat_id)) = (token, chat_id) {
            self.notifier.telegram = Some(TelegramConfig { bot_token, chat_id });
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        if self.strategy.strike_step == 0 {
            return Err(ConfigError::ZeroStrikeStep);
        }
        if self.strategy.max_candles < 3 {
            return Err(ConfigError::CandleHistory(self.strategy.max_candles));
        }
        if self.notifier.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        for (name, secs) in [
            ("cooldown_secs", self.strategy.cooldown_secs),
            ("status_interval_secs", self.strategy.status_interval_secs),
            ("max_forward_skew_secs", self.strategy.max_forward_skew_secs),
        ] {
            if secs > MAX_INTERVAL_SECS {
                return Err(ConfigError::IntervalTooLong {
                    name,
                    secs,
                    max: MAX_INTERVAL_SECS,
                });
            }
        }
        Ok(())
    }
}

/// Session clock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session timezone as minutes east of UTC (330 = IST)
    pub utc_offset_minutes: i32,
    #[serde(with = "hhmm")]
    pub market_open: NaiveTime,
    #[serde(with = "hhmm")]
    pub market_close: NaiveTime,
    /// Opening range capture window, `[start, end)`
    pub range_window: TimeWindow,
    /// First-five-minute range, informational only
    pub early_window: TimeWindow,
    /// Reset all session state when a tick arrives on a new date
    pub roll_over_daily: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            utc_offset_minutes: 330,
            market_open: hm(9, 15),
            market_close: hm(15, 30),
            range_window: TimeWindow::new(hm(9, 15), hm(9, 30)),
            early_window: TimeWindow::new(hm(9, 15), hm(9, 20)),
            roll_over_daily: true,
        }
    }
}

impl SessionConfig {
    /// Session timezone. Falls back to UTC for offsets `validate` would reject.
    pub fn offset(&self) -> FixedOffset {
        self.fixed_offset().unwrap_or_else(|| Utc.fix())
    }

    fn fixed_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }

    /// Inclusive market-hours check on the session clock
    pub fn in_market_hours(&self, time: NaiveTime) -> bool {
        self.market_open <= time && time <= self.market_close
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fixed_offset().is_none() {
            return Err(ConfigError::UtcOffset(self.utc_offset_minutes));
        }
        if self.market_open >= self.market_close {
            return Err(ConfigError::MarketHours {
                open: self.market_open,
                close: self.market_close,
            });
        }
        self.range_window.validate("range")?;
        self.early_window.validate("early")?;
        Ok(())
    }
}

/// Half-open time-of-day window compared at minute granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// `start <= t < end`, ignoring seconds
    pub fn contains(&self, time: NaiveTime) -> bool {
        let t = session_minute(time);
        session_minute(self.start) <= t && t < session_minute(self.end)
    }

    /// `t >= end`, ignoring seconds
    pub fn has_ended(&self, time: NaiveTime) -> bool {
        session_minute(time) >= session_minute(self.end)
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if session_minute(self.start) >= session_minute(self.end) {
            return Err(ConfigError::EmptyWindow {
                name,
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

fn session_minute(time: NaiveTime) -> (u32, u32) {
    (time.hour(), time.minute())
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

/// How the breakout check consumes price data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutMode {
    /// Compare every live price against the range
    #[default]
    PerTick,
    /// Compare the close of the last five one-minute bars, aggregated
    FiveMinute,
}

/// Strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Minimum seconds between emitted entry signals
    pub cooldown_secs: u64,
    /// Option strike spacing in index points
    pub strike_step: u32,
    /// Number of one-minute candles retained
    pub max_candles: usize,
    pub breakout_mode: BreakoutMode,
    /// Seconds of tick time between status notifications, 0 disables
    pub status_interval_secs: u64,
    /// Ticks further than this ahead of the last accepted tick are held
    /// back until a second tick confirms the jump, 0 disables
    pub max_forward_skew_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            cooldown_secs: 300,
            strike_step: 50,
            max_candles: 60,
            breakout_mode: BreakoutMode::PerTick,
            status_interval_secs: 900,
            max_forward_skew_secs: 900,
        }
    }
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Bounded queue between the engine and the delivery worker
    pub queue_capacity: usize,
    /// Minimum spacing between two deliveries
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig {
            queue_capacity: 256,
            min_interval_ms: 1000,
            max_retries: 3,
            retry_backoff_ms: 500,
            telegram: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Custom serde for `HH:MM` session times
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
