//! Core data types used across the signal engine

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for incoming ticks
#[derive(Debug, Error, PartialEq)]
pub enum TickError {
    #[error("unparsable price: {0:?}")]
    MalformedPrice(String),

    #[error("price must be finite and positive, got {0}")]
    InvalidPrice(f64),

    #[error("unparsable timestamp: {0:?}")]
    MalformedTimestamp(String),
}

/// A single price update for the instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    pub timestamp: DateTime<FixedOffset>,
}

impl Tick {
    /// Create a tick, rejecting prices that can never be traded
    pub fn new(price: f64, timestamp: DateTime<FixedOffset>) -> Result<Self, TickError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(TickError::InvalidPrice(price));
        }
        Ok(Self { price, timestamp })
    }

    /// Parse a raw feed record, converting its timestamp into the session offset.
    ///
    /// Accepted timestamp forms:
    /// - RFC 3339 (`2024-05-02T09:31:04+05:30`)
    /// - epoch milliseconds (`1714622464000`)
    /// - naive `%Y-%m-%d %H:%M:%S`, interpreted in `offset`
    pub fn parse(raw: &RawTick, offset: FixedOffset) -> Result<Self, TickError> {
        let price_str = raw.price.trim();
        let price: f64 = price_str
            .parse()
            .map_err(|_| TickError::MalformedPrice(raw.price.clone()))?;
        let timestamp = parse_timestamp(raw.timestamp.trim(), offset)
            .ok_or_else(|| TickError::MalformedTimestamp(raw.timestamp.clone()))?;
        Self::new(price, timestamp)
    }
}

/// Parse a feed timestamp (epoch millis, RFC 3339 or naive session time)
pub fn parse_timestamp(s: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = s.parse().ok()?;
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&offset));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&offset));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .and_then(|ndt| offset.from_local_datetime(&ndt).single())
}

/// Unparsed tick as delivered by a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTick {
    pub price: String,
    pub timestamp: String,
}

impl RawTick {
    pub fn new(price: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Truncate a timestamp to the start of its minute
pub fn minute_bucket(ts: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// One-minute OHLC bar
///
/// `volume` is always zero: the index feed carries no traded volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub bucket_start: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    /// Open a new bar from the first tick of its minute
    pub fn open_at(bucket_start: DateTime<FixedOffset>, price: f64) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
        }
    }

    /// Fold another tick of the same minute into the bar
    pub fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    pub fn color(&self) -> CandleColor {
        if self.is_green() {
            CandleColor::Green
        } else if self.is_red() {
            CandleColor::Red
        } else {
            CandleColor::Doji
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandleColor {
    Green,
    Red,
    Doji,
}

impl std::fmt::Display for CandleColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandleColor::Green => write!(f, "GREEN"),
            CandleColor::Red => write!(f, "RED"),
            CandleColor::Doji => write!(f, "DOJI"),
        }
    }
}

/// Breakout direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Option contract bought for this direction: calls on BUY, puts on SELL
    pub fn option_side(self) -> OptionSide {
        match self {
            Direction::Buy => OptionSide::CE,
            Direction::Sell => OptionSide::PE,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Option contract side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionSide {
    CE,
    PE,
}

impl std::fmt::Display for OptionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionSide::CE => write!(f, "CE"),
            OptionSide::PE => write!(f, "PE"),
        }
    }
}

/// Nearest strike on a `step`-point grid. Ties round to the even multiple.
pub fn strike_for(price: f64, step: u32) -> i64 {
    let step = f64::from(step.max(1));
    ((price / step).round_ties_even() * step) as i64
}

/// Entry signal emitted once a confirmed retest is followed by two
/// same-direction completed candles beyond the broken level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub strike: i64,
    pub option_side: OptionSide,
    pub entry_price: f64,
    pub entry_time: DateTime<FixedOffset>,
    pub entry_candle: CandleColor,
    pub range_high: f64,
    pub range_low: f64,
    pub breakout_price: f64,
    pub breakout_time: DateTime<FixedOffset>,
    pub retest_time: DateTime<FixedOffset>,
}
