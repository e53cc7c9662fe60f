//! Periodic drain trigger

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::CycleFailure;
use super::orchestrator::DrainOrchestrator;
use super::store::{DestinationStore, StagingStore};

/// Runs a drain cycle every `interval` until shut down.
///
/// A tick that finds a cycle already running (e.g. one triggered over HTTP)
/// is skipped. Cycles get a child of the shutdown token, so shutting down
/// also cancels the cycle in progress.
pub struct DrainScheduler<S: ?Sized = dyn StagingStore, D: ?Sized = dyn DestinationStore> {
    orchestrator: Arc<DrainOrchestrator<S, D>>,
    interval: Duration,
    run_on_startup: bool,
}

impl<S, D> DrainScheduler<S, D>
where
    S: StagingStore + ?Sized + 'static,
    D: DestinationStore + ?Sized + 'static,
{
    pub fn new(orchestrator: Arc<DrainOrchestrator<S, D>>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            run_on_startup: false,
        }
    }

    /// Also run a cycle right away instead of waiting one interval
    pub fn run_on_startup(mut self, enabled: bool) -> Self {
        self.run_on_startup = enabled;
        self
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick completes immediately
        if !self.run_on_startup {
            ticker.tick().await;
        }

        info!(
            interval_secs = self.interval.as_secs(),
            run_on_startup = self.run_on_startup,
            "Drain scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {},
            }

            match self.orchestrator.run_cycle(shutdown.child_token()).await {
                Ok(summary) => debug!(rows_seen = summary.rows_seen, "Scheduled drain cycle finished"),
                Err(CycleFailure::ConcurrentCycle) => debug!("Scheduled drain skipped, a cycle is already running"),
                Err(e) => warn!(error = %e, "Scheduled drain cycle failed"),
            }
        }

        info!("Drain scheduler stopped");
    }
}
