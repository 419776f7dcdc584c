//! Replay command implementation
//!
//! Runs a tick CSV through the full session stack: feed task, bounded tick
//! channel, engine, notification worker.

use anyhow::{Context, Result};
use orb_signal::config::Config;
use orb_signal::feed::spawn_csv_replay;
use orb_signal::history::{CsvHistoryProvider, HistoricalRangeProvider};
use orb_signal::notifier::{DeliverySink, DeliveryStats, NotificationService};
use orb_signal::session::{run_session, SessionControl, SessionReport, SharedEngine};
use orb_signal::StrategyEngine;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Ticks buffered between the feed task and the session loop
const TICK_CHANNEL_CAPACITY: usize = 1024;

#[derive(Serialize)]
struct ReplayOutput {
    #[serde(flatten)]
    report: SessionReport,
    notifications: DeliveryStats,
    notifications_dropped: u64,
}

pub fn run(
    config_path: String,
    ticks_path: String,
    history_path: Option<String>,
    pace_ms: Option<u64>,
) -> Result<()> {
    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, ticks_path, history_path, pace_ms))
}

async fn run_async(
    config_path: String,
    ticks_path: String,
    history_path: Option<String>,
    pace_ms: Option<u64>,
) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    info!("Loaded configuration from: {}", config_path);
    info!(
        "Instrument: {} | range {}-{} | mode {:?} | cooldown {}s",
        config.instrument,
        config.session.range_window.start.format("%H:%M"),
        config.session.range_window.end.format("%H:%M"),
        config.strategy.breakout_mode,
        config.strategy.cooldown_secs
    );

    let sink = DeliverySink::from_config(&config.notifier)
        .context("Failed to build notification sink")?;
    let (notifier, worker) = NotificationService::spawn(&config.notifier, sink);
    let engine = SharedEngine::new(StrategyEngine::new(&config, Arc::new(notifier.clone())));

    let provider = history_path.map(|path| {
        info!("Historical candles: {}", path);
        CsvHistoryProvider::new(path, config.session.clone())
    });

    let (tx, rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
    let feed = spawn_csv_replay(&ticks_path, tx, pace_ms.map(Duration::from_millis));

    let control = SessionControl::new();
    let ctrl_c = control.stop_on_ctrl_c();

    let history = provider
        .as_ref()
        .map(|p| p as &(dyn HistoricalRangeProvider + Send + Sync));
    let report = run_session(engine, rx, history, control).await;
    ctrl_c.abort();

    match feed.await {
        Ok(Ok(sent)) => info!("Feed finished after {} ticks", sent),
        Ok(Err(e)) => return Err(e.context(format!("Tick replay from {} failed", ticks_path))),
        Err(e) => warn!("Feed task ended abnormally: {}", e),
    }

    // The engine's handle went away with the session; drop ours so the
    // worker can drain and exit
    let notifications_dropped = notifier.dropped();
    drop(notifier);
    let notifications = worker.await.context("Notification worker panicked")?;

    let output = ReplayOutput {
        report,
        notifications,
        notifications_dropped,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
