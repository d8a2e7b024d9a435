// src/poller/poller.rs
use crate::probe::ProbeResult;
use crate::registry::ServiceDescriptor;
use crate::sweep::{AggregateReport, HealthAggregator, SweepOptions};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Running,
    /// Schedule stopped; the last report stays visible and out-of-band
    /// refreshes still work.
    Disabled,
    /// Schedule stopped for good; results from any still-running sweep are
    /// discarded.
    TornDown,
}

/// A cycle that could not be attempted at all, as opposed to per-service
/// unhealthiness which lives in the report.
#[derive(Debug, Clone, Serialize)]
pub struct SweepError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Drives periodic sweeps and owns the consumer-visible status view. Sweeps
/// from one poller are strictly serialized: a slow sweep delays the next
/// cycle, and `refresh_now` waits its turn behind a scheduled sweep.
pub struct StatusPoller {
    aggregator: Arc<HealthAggregator>,
    descriptors: Vec<Arc<ServiceDescriptor>>,
    options: SweepOptions,
    poll_interval: Duration,
    latest: ArcSwapOption<AggregateReport>,
    last_success: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<SweepError>>,
    state: RwLock<PollerState>,
    sweep_lock: Mutex<()>,
    /// Bumped on every `start`; a schedule loop whose generation is stale
    /// exits even if the shutdown flag was overwritten by a restart.
    generation: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl StatusPoller {
    pub fn new(
        aggregator: Arc<HealthAggregator>,
        descriptors: Vec<Arc<ServiceDescriptor>>,
        options: SweepOptions,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            aggregator,
            descriptors,
            options,
            poll_interval,
            latest: ArcSwapOption::empty(),
            last_success: RwLock::new(None),
            last_error: RwLock::new(None),
            state: RwLock::new(PollerState::Idle),
            sweep_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Activates the schedule: one sweep immediately, then one per interval,
    /// measured cycle start to cycle start.
    pub async fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.write().await;
            match *state {
                PollerState::Running | PollerState::TornDown => return,
                _ => *state = PollerState::Running,
            }
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.shutdown_tx.send(false);

        let poller = self.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting status poller with interval {:?} over {} services",
            self.poll_interval,
            self.descriptors.len()
        );

        tokio::spawn(async move {
            let mut ticker = interval(poller.poll_interval);
            // A sweep that overruns its slot delays the next cycle instead of
            // stacking missed ticks behind it.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // A restart supersedes this loop; only the newest generation
                // may keep the schedule.
                if poller.generation.load(Ordering::SeqCst) != generation {
                    debug!("Status poller schedule superseded by restart");
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        if poller.generation.load(Ordering::SeqCst) != generation {
                            break;
                        }
                        poller.run_cycle().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("Status poller schedule stopped");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Stops the schedule but keeps the status view alive. `start` can be
    /// called again later.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == PollerState::TornDown {
            return;
        }
        *state = PollerState::Disabled;
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the schedule permanently. No further sweep is initiated; a sweep
    /// already in flight may finish but its result is discarded.
    pub async fn teardown(&self) {
        {
            let mut state = self.state.write().await;
            *state = PollerState::TornDown;
        }
        let _ = self.shutdown_tx.send(true);
        info!("Status poller torn down");
    }

    /// Runs one out-of-band sweep without disturbing the schedule. Serialized
    /// against scheduled sweeps like any other cycle.
    pub async fn refresh_now(&self) {
        if self.state().await == PollerState::TornDown {
            return;
        }
        self.run_cycle().await;
    }

    async fn run_cycle(&self) {
        let _guard = self.sweep_lock.lock().await;

        if self.state().await == PollerState::TornDown {
            return;
        }

        // The sweep runs in its own task so a panic is contained as a
        // sweep-level error rather than killing the schedule.
        let aggregator = self.aggregator.clone();
        let descriptors = self.descriptors.clone();
        let options = self.options.clone();
        let outcome =
            tokio::spawn(async move { aggregator.run_sweep(&descriptors, &options).await }).await;

        match outcome {
            Ok(report) => {
                if self.state().await == PollerState::TornDown {
                    debug!(
                        "Discarding sweep {} completed after teardown",
                        report.sweep_id
                    );
                    return;
                }
                self.latest.store(Some(Arc::new(report)));
                *self.last_success.write().await = Some(Utc::now());
                *self.last_error.write().await = None;
            }
            Err(e) => {
                warn!("Sweep could not be completed: {}", e);
                *self.last_error.write().await = Some(SweepError {
                    message: format!("sweep failed: {}", e),
                    at: Utc::now(),
                });
                // The schedule keeps retrying on the same cadence.
            }
        }
    }

    /// Most recent report, if any sweep has completed yet.
    pub fn latest_report(&self) -> Option<Arc<AggregateReport>> {
        self.latest.load_full()
    }

    /// Per-slug view derived from the latest report.
    pub fn status_of(&self, slug: &str) -> Option<ProbeResult> {
        self.latest
            .load_full()
            .and_then(|report| report.result_for(slug).cloned())
    }

    pub async fn last_success(&self) -> Option<DateTime<Utc>> {
        *self.last_success.read().await
    }

    pub async fn last_error(&self) -> Option<SweepError> {
        self.last_error.read().await.clone()
    }

    pub async fn state(&self) -> PollerState {
        *self.state.read().await
    }
}
