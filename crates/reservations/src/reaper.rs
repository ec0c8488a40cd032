//! Background expiry sweeper.
//!
//! The reaper runs independently of the request path on a fixed cadence,
//! finding active reservations whose TTL elapsed and driving them through
//! the same `Active -> Expired` compare-and-set the request path uses for
//! `release`. A reservation confirmed or released while a sweep is in flight
//! simply loses its candidacy; the reaper logs it at debug and moves on.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{error, info};

use stockroom_core::StockResult;
use stockroom_events::{EventBus, EventEnvelope};

use crate::manager::{ReservationManager, SweepOutcome};

/// Reaper configuration.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often to sweep for expired reservations.
    pub interval: Duration,
    /// Thread name, for logging.
    pub name: String,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            name: "reservation-reaper".to_string(),
        }
    }
}

impl ReaperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Cumulative reaper statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReaperStats {
    pub sweeps: u64,
    pub expired: u64,
    pub skipped: u64,
}

/// Handle to control a running reaper.
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ReaperStats>>,
}

impl ReaperHandle {
    /// Request graceful shutdown and wait for the sweep thread to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    /// Get current reaper statistics.
    pub fn stats(&self) -> ReaperStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Background sweep that finds expired, still-active holds and releases them.
pub struct ReservationReaper<B> {
    manager: Arc<ReservationManager<B>>,
    config: ReaperConfig,
}

impl<B> ReservationReaper<B>
where
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn new(manager: Arc<ReservationManager<B>>, config: ReaperConfig) -> Self {
        Self { manager, config }
    }

    /// Run a single sweep synchronously (for tests or manual operation).
    pub fn sweep_once(&self) -> StockResult<SweepOutcome> {
        self.manager.expire_due(Utc::now())
    }

    /// Spawn the reaper in a background thread.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ReaperStats::default()));
        let stats_clone = stats.clone();

        let name = self.config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || {
                reaper_loop(self, shutdown_rx, stats_clone);
            })
            .expect("failed to spawn reservation reaper thread");

        ReaperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn reaper_loop<B>(
    reaper: ReservationReaper<B>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ReaperStats>>,
) where
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    info!(reaper = %reaper.config.name, "reservation reaper started");

    loop {
        // Wait out one interval, or break as soon as shutdown is requested.
        match shutdown_rx.recv_timeout(reaper.config.interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        match reaper.manager.expire_due(Utc::now()) {
            Ok(outcome) => {
                {
                    let mut s = stats.lock().unwrap();
                    s.sweeps += 1;
                    s.expired += outcome.expired.len() as u64;
                    s.skipped += outcome.skipped;
                }
                if !outcome.expired.is_empty() {
                    info!(
                        reaper = %reaper.config.name,
                        expired = outcome.expired.len(),
                        skipped = outcome.skipped,
                        "sweep released expired holds"
                    );
                }
            }
            Err(e) => {
                error!(reaper = %reaper.config.name, error = %e, "sweep failed");
            }
        }
    }

    info!(reaper = %reaper.config.name, "reservation reaper stopped");
}
