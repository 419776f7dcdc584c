//! Historical opening levels for late starts
//!
//! When the process starts after the range window has closed, the opening
//! levels come from one-minute history instead of live ticks.

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{SessionConfig, TimeWindow};
use crate::types::{parse_timestamp, Candle};

/// First-5-minute and first-15-minute high/low of a session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRanges {
    pub first5_high: f64,
    pub first5_low: f64,
    pub first15_high: f64,
    pub first15_low: f64,
}

impl HistoricalRanges {
    /// Main opening range, if usable
    pub fn first15(&self) -> Option<(f64, f64)> {
        valid_pair(self.first15_high, self.first15_low)
    }

    /// Early range, if usable
    pub fn first5(&self) -> Option<(f64, f64)> {
        valid_pair(self.first5_high, self.first5_low)
    }
}

fn valid_pair(high: f64, low: f64) -> Option<(f64, f64)> {
    (high.is_finite() && low.is_finite() && high >= low).then_some((high, low))
}

/// Source of seed levels, queried once at session start
pub trait HistoricalRangeProvider {
    fn fetch(&self, date: NaiveDate) -> Result<Option<HistoricalRanges>>;
}

/// Reads one-minute OHLC candles from a CSV file
/// (`datetime,open,high,low,close[,volume]`)
#[derive(Debug, Clone)]
pub struct CsvHistoryProvider {
    path: PathBuf,
    session: SessionConfig,
}

impl CsvHistoryProvider {
    pub fn new(path: impl Into<PathBuf>, session: SessionConfig) -> Self {
        Self {
            path: path.into(),
            session,
        }
    }
}

impl HistoricalRangeProvider for CsvHistoryProvider {
    fn fetch(&self, date: NaiveDate) -> Result<Option<HistoricalRanges>> {
        let candles = load_csv(&self.path, self.session.offset())
            .with_context(|| format!("Failed to load history from {}", self.path.display()))?;
        info!(
            "Loaded {} historical candles from {}",
            candles.len(),
            self.path.display()
        );
        Ok(compute_ranges(
            &candles,
            date,
            self.session.early_window,
            self.session.range_window,
        ))
    }
}

/// Load one-minute OHLC candles, converting timestamps to `offset`
pub fn load_csv(path: impl AsRef<Path>, offset: FixedOffset) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path.as_ref())
        .context("Failed to open CSV file")?;

    let mut candles = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?.trim();
        let bucket_start = parse_timestamp(dt_str, offset)
            .with_context(|| format!("Failed to parse datetime: {}", dt_str))?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} column", name))?
                .trim()
                .parse()
                .with_context(|| format!("Failed to parse {} on row {}", name, row_idx + 1))
        };
        let volume = match record.get(5).map(str::trim) {
            Some(v) if !v.is_empty() => v.parse::<f64>().map(|v| v.max(0.0) as u64).unwrap_or(0),
            _ => 0,
        };

        candles.push(Candle {
            bucket_start,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume,
        });
    }

    Ok(candles)
}

/// High/low of the candles of `date` inside each window. `None` when the
/// range window has no candles; a missing early window yields NaN bounds.
pub fn compute_ranges(
    candles: &[Candle],
    date: NaiveDate,
    early_window: TimeWindow,
    range_window: TimeWindow,
) -> Option<HistoricalRanges> {
    let extremes = |window: TimeWindow| -> Option<(f64, f64)> {
        candles
            .iter()
            .filter(|c| c.bucket_start.date_naive() == date)
            .filter(|c| window.contains(c.bucket_start.time()))
            .fold(None, |acc, c| match acc {
                None => Some((c.high, c.low)),
                Some((h, l)) => Some((f64::max(h, c.high), f64::min(l, c.low))),
            })
    };

    let (first15_high, first15_low) = extremes(range_window)?;
    let (first5_high, first5_low) = extremes(early_window).unwrap_or((f64::NAN, f64::NAN));
    debug!(
        "History for {}: 5min H={:.2} L={:.2}, 15min H={:.2} L={:.2}",
        date, first5_high, first5_low, first15_high, first15_low
    );

    Some(HistoricalRanges {
        first5_high,
        first5_low,
        first15_high,
        first15_low,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use std::io::Write;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn candle(h: u32, m: u32, high: f64, low: f64) -> Candle {
        let ts: DateTime<FixedOffset> = ist().with_ymd_and_hms(2024, 5, 2, h, m, 0).unwrap();
        Candle {
            bucket_start: ts,
            open: low,
            high,
            low,
            close: high,
            volume: 0,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    #[test]
    fn test_compute_ranges_by_window() {
        let session = SessionConfig::default();
        let candles = vec![
            candle(9, 14, 500.0, 1.0),
            candle(9, 15, 105.0, 100.0),
            candle(9, 19, 108.0, 102.0),
            candle(9, 22, 112.0, 98.0),
            candle(9, 29, 110.0, 101.0),
            candle(9, 30, 130.0, 90.0),
        ];
        let ranges =
            compute_ranges(&candles, date(), session.early_window, session.range_window).unwrap();
        assert_eq!(ranges.first5(), Some((108.0, 100.0)));
        assert_eq!(ranges.first15(), Some((112.0, 98.0)));
    }

    #[test]
    fn test_other_dates_ignored() {
        let session = SessionConfig::default();
        let candles = vec![candle(9, 20, 105.0, 100.0)];
        let other = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        assert!(compute_ranges(&candles, other, session.early_window, session.range_window).is_none());
    }

    #[test]
    fn test_validity() {
        let mut ranges = HistoricalRanges {
            first5_high: f64::NAN,
            first5_low: f64::NAN,
            first15_high: 100.0,
            first15_low: 90.0,
        };
        assert_eq!(ranges.first15(), Some((100.0, 90.0)));
        assert_eq!(ranges.first5(), None);

        ranges.first15_high = 80.0;
        assert_eq!(ranges.first15(), None);
        ranges.first15_high = f64::INFINITY;
        assert_eq!(ranges.first15(), None);
    }

    #[test]
    fn test_csv_provider() {
        let path = std::env::temp_dir().join(format!("orb_history_{}.csv", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "datetime,open,high,low,close,volume").unwrap();
            writeln!(file, "2024-05-02 09:15:00,100,104,99,103,0").unwrap();
            writeln!(file, "2024-05-02T09:25:00+05:30,103,106,97,98,").unwrap();
            writeln!(file, "2024-05-02 09:40:00,98,120,80,110,0").unwrap();
        }
        let provider = CsvHistoryProvider::new(&path, SessionConfig::default());
        let ranges = provider.fetch(date()).unwrap().unwrap();
        assert_eq!(ranges.first5(), Some((104.0, 99.0)));
        assert_eq!(ranges.first15(), Some((106.0, 97.0)));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_error() {
        let provider = CsvHistoryProvider::new("/nonexistent/history.csv", SessionConfig::default());
        assert!(provider.fetch(date()).is_err());
    }
}
