//! Drain cycle orchestration
//!
//! One cycle walks the staging table page by page, decodes every row, batches
//! the records per sensor kind, flushes what is left and finally clears the
//! staging table:
//!
//! ```text
//! Idle -> Draining -> Flushing -> Purging -> Idle
//!            \            \
//!             +------------+--> Aborted -> Idle
//! ```
//!
//! Pages are read by a producer task that admits every row through
//! [`Backpressure`] before handing it over a channel. The cycle task decodes
//! rows on the blocking pool (order preserving, `decode_workers` at a time),
//! feeds the [`Batcher`] and releases the admission token. The staging table
//! is only cleared after every batch was written.

use chrono::Utc;
use futures::{stream, StreamExt};
use sdc_common::RawReading;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::backpressure::{AdmitToken, Backpressure};
use super::batcher::Batcher;
use super::decoder;
use super::error::{CycleFailure, DrainError};
use super::store::{DestinationStore, StagingStore};
use super::traversal::PageTraversal;
use super::types::{CycleOutcome, CycleState, CycleSummary, Decoded, DrainConfig, DrainPhase};

/// Longest payload prefix written to the log for an undecodable row
const PAYLOAD_LOG_CHARS: usize = 120;

type Admitted = (RawReading, AdmitToken);

pub struct DrainOrchestrator<S: ?Sized = dyn StagingStore, D: ?Sized = dyn DestinationStore> {
    staging: Arc<S>,
    destination: Arc<D>,
    config: DrainConfig,
    cycle_lock: Mutex<()>,
    phase: watch::Sender<DrainPhase>,
    last: watch::Sender<Option<CycleSummary>>,
}

impl<S, D> DrainOrchestrator<S, D>
where
    S: StagingStore + ?Sized + 'static,
    D: DestinationStore + ?Sized + 'static,
{
    pub fn new(staging: Arc<S>, destination: Arc<D>, config: DrainConfig) -> Self {
        let (phase, _) = watch::channel(DrainPhase::Idle);
        let (last, _) = watch::channel(None);
        Self {
            staging,
            destination,
            config,
            cycle_lock: Mutex::new(()),
            phase,
            last,
        }
    }

    pub fn config(&self) -> &DrainConfig {
        &self.config
    }

    pub fn staging(&self) -> &S {
        &self.staging
    }

    /// Current state of the cycle state machine
    pub fn phase(&self) -> DrainPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<DrainPhase> {
        self.phase.subscribe()
    }

    /// Report of the most recent cycle, completed or aborted
    pub fn last_summary(&self) -> Option<CycleSummary> {
        self.last.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Run one drain cycle.
    ///
    /// Fails with [`CycleFailure::ConcurrentCycle`] without touching anything
    /// when another cycle is active. Any other failure carries the partial
    /// summary; the staging table is left intact in that case.
    pub async fn run_cycle(&self, cancel: CancellationToken) -> Result<CycleSummary, CycleFailure> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Drain cycle requested while another one is running");
            return Err(CycleFailure::ConcurrentCycle);
        };

        let cycle_id = Uuid::new_v4();
        let span = info_span!("drain_cycle", %cycle_id);
        self.drive(cycle_id, cancel).instrument(span).await
    }

    async fn drive(&self, cycle_id: Uuid, cancel: CancellationToken) -> Result<CycleSummary, CycleFailure> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let pages = Arc::new(AtomicU64::new(0));
        let mut state = CycleState::default();
        let mut batcher = Batcher::new(&*self.destination, self.config.batch_size);

        info!(
            page_size = self.config.page_size,
            batch_size = self.config.batch_size,
            max_in_flight = self.config.max_in_flight,
            "Drain cycle started"
        );

        let result = self
            .execute(&mut state, &mut batcher, &pages, &cancel)
            .await;

        state.pages_processed = pages.load(Ordering::SeqCst);
        let summary = CycleSummary {
            cycle_id,
            started_at,
            outcome: if result.is_ok() {
                CycleOutcome::Completed
            } else {
                CycleOutcome::Aborted
            },
            abort_reason: result.as_ref().err().map(ToString::to_string),
            pages_processed: state.pages_processed,
            rows_seen: state.rows_seen,
            rows_decoded: state.rows_decoded,
            rows_failed: state.rows_failed,
            rows_ignored: state.rows_ignored,
            rows_written: batcher.written().clone(),
            batches_flushed: batcher.batches_flushed(),
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            failure_samples: std::mem::take(&mut state.failure_samples),
        };
        self.last.send_replace(Some(summary.clone()));

        match result {
            Ok(()) => {
                info!(
                    pages = summary.pages_processed,
                    rows_seen = summary.rows_seen,
                    rows_decoded = summary.rows_decoded,
                    rows_failed = summary.rows_failed,
                    rows_ignored = summary.rows_ignored,
                    batches = summary.batches_flushed,
                    duration_ms = summary.duration_ms,
                    "Drain cycle completed"
                );
                self.phase.send_replace(DrainPhase::Idle);
                Ok(summary)
            },
            Err(error) => {
                self.phase.send_replace(DrainPhase::Aborted);
                error!(
                    error = %error,
                    pages = summary.pages_processed,
                    rows_seen = summary.rows_seen,
                    rows_decoded = summary.rows_decoded,
                    rows_failed = summary.rows_failed,
                    pending_rows = batcher.pending_rows(),
                    duration_ms = summary.duration_ms,
                    "Drain cycle aborted, staging table left intact"
                );
                self.phase.send_replace(DrainPhase::Idle);
                Err(CycleFailure::Aborted {
                    error,
                    summary: Box::new(summary),
                })
            },
        }
    }

    async fn execute(
        &self,
        state: &mut CycleState,
        batcher: &mut Batcher<'_, D>,
        pages: &Arc<AtomicU64>,
        cancel: &CancellationToken,
    ) -> Result<(), DrainError> {
        self.phase.send_replace(DrainPhase::Draining);
        match self.drain_staging(state, batcher, pages, cancel).await {
            Ok(()) => {},
            Err(DrainError::Cancelled) => {
                self.phase.send_replace(DrainPhase::Flushing);
                if let Err(e) = batcher.flush_all().await {
                    warn!(error = %e, "Final flush after cancellation failed");
                }
                return Err(DrainError::Cancelled);
            },
            Err(e) => return Err(e),
        }

        self.phase.send_replace(DrainPhase::Flushing);
        batcher.flush_all().await?;
        state.pending_batches = batcher.pending_batches();

        if cancel.is_cancelled() {
            return Err(DrainError::Cancelled);
        }

        self.phase.send_replace(DrainPhase::Purging);
        self.staging.truncate().await.map_err(DrainError::Purge)?;
        debug!("Staging table cleared");
        Ok(())
    }

    async fn drain_staging(
        &self,
        state: &mut CycleState,
        batcher: &mut Batcher<'_, D>,
        pages: &Arc<AtomicU64>,
        cancel: &CancellationToken,
    ) -> Result<(), DrainError> {
        let backpressure = Backpressure::new(self.config.max_in_flight);
        let (tx, rx) = mpsc::channel(backpressure.ceiling());

        let producer = tokio::spawn(
            produce(
                Arc::clone(&self.staging),
                self.config.page_size,
                backpressure.clone(),
                tx,
                cancel.clone(),
                Arc::clone(pages),
            )
            .in_current_span(),
        );

        let consumed = consume(rx, &backpressure, state, batcher, self.config.decode_workers).await;
        if consumed.is_err() {
            backpressure.close();
            producer.abort();
        }

        let produced = producer.await;
        consumed?;
        match produced {
            Ok(result) => result,
            Err(e) => Err(DrainError::Worker(e.to_string())),
        }
    }
}

/// Read pages and admit their rows one by one. Stops early on cancellation or
/// once the consuming side went away.
async fn produce<S>(
    store: Arc<S>,
    page_size: usize,
    backpressure: Backpressure,
    tx: mpsc::Sender<Admitted>,
    cancel: CancellationToken,
    pages: Arc<AtomicU64>,
) -> Result<(), DrainError>
where
    S: StagingStore + ?Sized + 'static,
{
    let mut traversal = PageTraversal::new(store, page_size);

    loop {
        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DrainError::Cancelled),
            page = traversal.next_page() => page?,
        };
        let Some(page) = page else {
            return Ok(());
        };
        pages.store(traversal.pages(), Ordering::SeqCst);

        for raw in page {
            let token = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DrainError::Cancelled),
                token = backpressure.admit() => token,
            };
            let Some(token) = token else {
                return Ok(());
            };
            if tx.send((raw, token)).await.is_err() {
                return Ok(());
            }
        }
    }
}

/// Decode admitted rows in admission order and hand records to the batcher.
async fn consume<D>(
    mut rx: mpsc::Receiver<Admitted>,
    backpressure: &Backpressure,
    state: &mut CycleState,
    batcher: &mut Batcher<'_, D>,
    workers: usize,
) -> Result<(), DrainError>
where
    D: DestinationStore + ?Sized,
{
    let mut decoded = stream::poll_fn(move |cx| rx.poll_recv(cx))
        .map(|(raw, token): Admitted| async move {
            let result = tokio::task::spawn_blocking(move || decoder::decode(&raw)).await;
            (result, token)
        })
        .buffered(workers.max(1));

    while let Some((result, token)) = decoded.next().await {
        let outcome = result.map_err(|e| DrainError::Worker(e.to_string()))?;
        state.rows_seen += 1;

        match outcome {
            Ok(Decoded::Record(record)) => {
                state.rows_decoded += 1;
                batcher.add(record).await?;
            },
            Ok(Decoded::Ignored) => state.rows_ignored += 1,
            Err(failure) => {
                warn!(
                    kind = %failure.kind,
                    device_id = failure.raw_snapshot.device_id,
                    timestamp = failure.raw_snapshot.timestamp,
                    reason = %failure.reason,
                    payload = payload_prefix(&failure.raw_snapshot.payload),
                    "Skipping undecodable reading"
                );
                state.record_failure(failure.sample());
            },
        }

        state.pending_batches = batcher.pending_batches();
        backpressure.release(token);
    }

    Ok(())
}

fn payload_prefix(payload: &str) -> &str {
    match payload.char_indices().nth(PAYLOAD_LOG_CHARS) {
        Some((end, _)) => &payload[..end],
        None => payload,
    }
}
