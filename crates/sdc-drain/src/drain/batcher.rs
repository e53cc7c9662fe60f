//! Per-kind batching of decoded records
//!
//! Records are grouped by sensor kind. A group is written as one multi-row
//! insert as soon as it reaches the batch cap; whatever is left is written by
//! [`Batcher::flush_all`] at the end of the cycle.

use sdc_common::SensorKind;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use super::error::DrainError;
use super::store::DestinationStore;
use super::types::DecodedRecord;

pub struct Batcher<'a, D: DestinationStore + ?Sized> {
    store: &'a D,
    cap: usize,
    pending: HashMap<SensorKind, Vec<DecodedRecord>>,
    written: BTreeMap<SensorKind, u64>,
    flushes: u64,
}

impl<'a, D: DestinationStore + ?Sized> Batcher<'a, D> {
    /// A cap of zero is treated as one.
    pub fn new(store: &'a D, cap: usize) -> Self {
        Self {
            store,
            cap: cap.max(1),
            pending: HashMap::new(),
            written: BTreeMap::new(),
            flushes: 0,
        }
    }

    /// Append a record, writing its group if it reached the cap.
    pub async fn add(&mut self, record: DecodedRecord) -> Result<(), DrainError> {
        let kind = record.kind();
        let batch = self.pending.entry(kind).or_default();
        batch.push(record);

        if batch.len() >= self.cap {
            self.flush(kind).await?;
        }
        Ok(())
    }

    /// Write the pending group of `kind`.
    ///
    /// An empty group issues no statement. On failure the group stays pending
    /// so nothing is lost before the cycle aborts.
    pub async fn flush(&mut self, kind: SensorKind) -> Result<(), DrainError> {
        let Some(batch) = self.pending.get_mut(&kind) else {
            return Ok(());
        };
        if batch.is_empty() {
            return Ok(());
        }

        let rows = batch.len();
        if let Err(source) = self.store.insert_batch(kind, batch).await {
            warn!(kind = %kind, rows, error = %source, "Batch insert failed");
            return Err(DrainError::Write { kind, rows, source });
        }

        batch.clear();
        *self.written.entry(kind).or_insert(0) += rows as u64;
        self.flushes += 1;
        debug!(kind = %kind, rows, "Batch flushed");
        Ok(())
    }

    /// Write every non-empty group in [`SensorKind::ALL`] order, stopping at
    /// the first failure.
    pub async fn flush_all(&mut self) -> Result<(), DrainError> {
        for kind in SensorKind::ALL {
            self.flush(kind).await?;
        }
        Ok(())
    }

    pub fn pending_rows(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Number of kinds with at least one pending record
    pub fn pending_batches(&self) -> usize {
        self.pending.values().filter(|b| !b.is_empty()).count()
    }

    pub fn written(&self) -> &BTreeMap<SensorKind, u64> {
        &self.written
    }

    pub fn batches_flushed(&self) -> u64 {
        self.flushes
    }
}
