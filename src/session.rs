//! Session loop
//!
//! Connects a tick source to the engine: parses raw ticks at the boundary,
//! filters market hours, seeds history once, and runs until the source
//! closes or the session is stopped.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::history::HistoricalRangeProvider;
use crate::strategies::orb_retest::{EngineStatus, StrategyEngine};
use crate::types::{RawTick, Signal, Tick, TickError};

/// Log throughput every this many ticks
const PERF_LOG_INTERVAL: u64 = 100;

/// Engine behind a mutex; every call is a critical section
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<StrategyEngine>>,
    session: SessionConfig,
}

impl SharedEngine {
    pub fn new(engine: StrategyEngine) -> Self {
        let session = engine.session().clone();
        Self {
            inner: Arc::new(Mutex::new(engine)),
            session,
        }
    }

    /// Parse a raw tick into the session offset. `Ok(None)` for ticks
    /// outside market hours.
    pub fn accept(&self, raw: &RawTick) -> Result<Option<Tick>, TickError> {
        let tick = Tick::parse(raw, self.session.offset())?;
        let time = tick.timestamp.time();
        if !self.session.in_market_hours(time) {
            debug!("Tick outside market hours at {}", time.format("%H:%M:%S"));
            return Ok(None);
        }
        Ok(Some(tick))
    }

    pub fn process_tick(&self, tick: Tick) -> Option<Signal> {
        self.with(|engine| engine.process_tick(tick))
    }

    pub fn status(&self) -> EngineStatus {
        self.with(|engine| engine.status())
    }

    pub fn reset_session(&self) {
        self.with(|engine| engine.reset_session())
    }

    /// Run `f` with exclusive access to the engine
    pub fn with<R>(&self, f: impl FnOnce(&mut StrategyEngine) -> R) -> R {
        let mut engine = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut engine)
    }
}

/// Seed the engine from history if the session starts after the range
/// window closed. Provider failures are logged and treated as unavailable.
pub fn bootstrap(
    engine: &SharedEngine,
    provider: &dyn HistoricalRangeProvider,
    start: DateTime<FixedOffset>,
) -> bool {
    let window = engine.session.range_window;
    if !window.has_ended(start.time()) {
        debug!(
            "Session started at {} before range window end {}, capturing live",
            start.format("%H:%M:%S"),
            window.end.format("%H:%M")
        );
        return false;
    }

    match provider.fetch(start.date_naive()) {
        Ok(Some(ranges)) => engine.with(|e| e.seed(&ranges)),
        Ok(None) => {
            warn!("No historical range for {}, capturing live", start.date_naive());
            false
        }
        Err(e) => {
            warn!("Historical range unavailable: {:#}", e);
            false
        }
    }
}

/// Stop switch for a running session
#[derive(Debug, Clone)]
pub struct SessionControl {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionControl {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Stop the session on Ctrl+C
    pub fn stop_on_ctrl_c(&self) -> JoinHandle<()> {
        let control = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating shutdown...");
                    control.stop();
                }
                Err(e) => error!("Error setting up signal handler: {}", e),
            }
        })
    }
}

/// What happened during a session run
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub ticks_received: u64,
    pub malformed: u64,
    pub outside_market_hours: u64,
    pub seeded: bool,
    pub signals: Vec<Signal>,
    pub status: EngineStatus,
}

/// Consume ticks until the channel closes or `control` is stopped
pub async fn run_session(
    engine: SharedEngine,
    mut ticks: mpsc::Receiver<RawTick>,
    history: Option<&(dyn HistoricalRangeProvider + Send + Sync)>,
    control: SessionControl,
) -> SessionReport {
    let mut received = 0u64;
    let mut malformed = 0u64;
    let mut outside = 0u64;
    let mut processed = 0u64;
    let mut seeded = false;
    let mut bootstrapped = false;
    let mut signals = Vec::new();
    let started = Instant::now();

    info!("Starting session loop...");
    loop {
        if !control.is_running() {
            break;
        }

        let raw = tokio::select! {
            maybe = ticks.recv() => match maybe {
                Some(raw) => raw,
                None => {
                    info!("Tick source closed");
                    break;
                }
            },
            _ = control.shutdown.notified() => {
                info!("Shutdown signal received");
                break;
            }
        };
        received += 1;

        let tick = match engine.accept(&raw) {
            Ok(Some(tick)) => tick,
            Ok(None) => {
                outside += 1;
                continue;
            }
            Err(e) => {
                malformed += 1;
                warn!("Dropping malformed tick {:?}: {}", raw, e);
                continue;
            }
        };

        if !bootstrapped {
            bootstrapped = true;
            if let Some(provider) = history {
                seeded = bootstrap(&engine, provider, tick.timestamp);
            }
        }

        let price = tick.price;
        if let Some(signal) = engine.process_tick(tick) {
            signals.push(signal);
        }
        processed += 1;

        if processed % PERF_LOG_INTERVAL == 0 {
            let elapsed = started.elapsed().as_secs_f64();
            let tps = if elapsed > 0.0 {
                processed as f64 / elapsed
            } else {
                0.0
            };
            info!("Performance: {:.2} ticks/sec, Price: {:.2}", tps, price);
        }
    }

    let status = engine.status();
    info!(
        "Session ended: {} ticks received, {} processed, {} signals",
        received,
        processed,
        signals.len()
    );
    SessionReport {
        ticks_received: received,
        malformed,
        outside_market_hours: outside,
        seeded,
        signals,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::history::HistoricalRanges;
    use crate::notifier::{Notifier, Priority};
    use crate::strategies::orb_retest::Phase;
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone};

    struct Silent;

    impl Notifier for Silent {
        fn send(&self, _text: &str, _priority: Priority) {}
    }

    struct FixedHistory(Option<HistoricalRanges>);

    impl HistoricalRangeProvider for FixedHistory {
        fn fetch(&self, _date: NaiveDate) -> Result<Option<HistoricalRanges>> {
            Ok(self.0)
        }
    }

    fn shared() -> SharedEngine {
        SharedEngine::new(StrategyEngine::new(&Config::default(), Arc::new(Silent)))
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 2, h, m, s)
            .unwrap()
    }

    fn ranges() -> HistoricalRanges {
        HistoricalRanges {
            first5_high: 50_050.0,
            first5_low: 50_010.0,
            first15_high: 50_100.0,
            first15_low: 50_000.0,
        }
    }

    #[test]
    fn test_accept_filters_market_hours() {
        let engine = shared();
        assert!(engine
            .accept(&RawTick::new("100", "2024-05-02 09:14:59"))
            .unwrap()
            .is_none());
        assert!(engine
            .accept(&RawTick::new("100", "2024-05-02 15:30:00"))
            .unwrap()
            .is_some());
        assert!(engine
            .accept(&RawTick::new("100", "2024-05-02 15:30:01"))
            .unwrap()
            .is_none());
        assert!(engine.accept(&RawTick::new("x", "2024-05-02 10:00:00")).is_err());
    }

    #[test]
    fn test_bootstrap_only_after_window() {
        let provider = FixedHistory(Some(ranges()));

        let early = shared();
        assert!(!bootstrap(&early, &provider, at(9, 20, 0)));
        assert_eq!(early.status().phase, Phase::CapturingRange);

        let late = shared();
        assert!(bootstrap(&late, &provider, at(10, 0, 0)));
        assert_eq!(late.status().phase, Phase::WatchingForBreakout);
        assert_eq!(late.status().range_high, Some(50_100.0));
    }

    #[test]
    fn test_bootstrap_ignores_invalid_or_missing() {
        let mut bad = ranges();
        bad.first15_high = f64::NAN;
        assert!(!bootstrap(&shared(), &FixedHistory(Some(bad)), at(10, 0, 0)));
        assert!(!bootstrap(&shared(), &FixedHistory(None), at(10, 0, 0)));
    }

    #[tokio::test]
    async fn test_run_session_counts_and_seeds() {
        let engine = shared();
        let (tx, rx) = mpsc::channel(16);
        for raw in [
            RawTick::new("bad", "2024-05-02 10:00:00"),
            RawTick::new("50200", "2024-05-02 08:00:00"),
            RawTick::new("50200", "2024-05-02 10:00:00"),
            RawTick::new("50210", "2024-05-02 10:00:05"),
        ] {
            tx.send(raw).await.unwrap();
        }
        drop(tx);

        let provider = FixedHistory(Some(ranges()));
        let report = run_session(engine, rx, Some(&provider), SessionControl::new()).await;
        assert_eq!(report.ticks_received, 4);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.outside_market_hours, 1);
        assert!(report.seeded);
        assert_eq!(report.status.phase, Phase::AwaitingRetestTouch);
        assert_eq!(report.status.tick_count, 2);
    }

    #[tokio::test]
    async fn test_stopped_session_exits() {
        let (_tx, rx) = mpsc::channel::<RawTick>(1);
        let control = SessionControl::new();
        control.stop();
        let report = run_session(shared(), rx, None, control).await;
        assert_eq!(report.ticks_received, 0);
    }
}
