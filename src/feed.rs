//! Tick sources
//!
//! A feed pushes [`RawTick`]s into a bounded channel from its own task.
//! Parsing happens on the consuming side so a bad record never stops the
//! feed.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::types::RawTick;

/// Read `timestamp,price` rows. Missing fields become empty strings and are
/// rejected later by the tick parser.
pub fn load_tick_csv(path: impl AsRef<Path>) -> Result<Vec<RawTick>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path.as_ref())
        .context("Failed to open tick CSV")?;

    let mut ticks = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read tick row {}", row_idx + 1))?;
        let timestamp = record.get(0).unwrap_or_default();
        let price = record.get(1).unwrap_or_default();
        ticks.push(RawTick::new(price, timestamp));
    }
    Ok(ticks)
}

/// Replay a tick CSV into `tx`, optionally sleeping `pace` between ticks.
/// Resolves to the number of ticks pushed; stops early if the receiver
/// goes away.
pub fn spawn_csv_replay(
    path: impl Into<PathBuf>,
    tx: mpsc::Sender<RawTick>,
    pace: Option<Duration>,
) -> JoinHandle<Result<u64>> {
    let path = path.into();
    tokio::spawn(async move {
        let ticks = tokio::task::spawn_blocking({
            let path = path.clone();
            move || load_tick_csv(&path)
        })
        .await
        .context("Tick loader task panicked")??;
        info!("Replaying {} ticks from {}", ticks.len(), path.display());

        let mut sent = 0u64;
        for tick in ticks {
            if tx.send(tick).await.is_err() {
                debug!("Tick consumer closed, stopping replay after {} ticks", sent);
                break;
            }
            sent += 1;
            if let Some(pace) = pace {
                sleep(pace).await;
            }
        }
        Ok::<u64, anyhow::Error>(sent)
    })
}
