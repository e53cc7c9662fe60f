//! In-memory stores
//!
//! Used by tests and local runs without a database. Both stores can be told
//! to fail so that abort paths can be exercised.

use async_trait::async_trait;
use sdc_common::{RawReading, SensorKind};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::store::{DestinationStore, StagingStore};
use super::types::DecodedRecord;
use crate::db::{DbError, DbResult};

#[derive(Debug, Default)]
pub struct MemoryStagingStore {
    rows: Mutex<Vec<RawReading>>,
    fail_fetch_at: Mutex<Option<u64>>,
    fail_truncate: Mutex<bool>,
    fetches: AtomicUsize,
}

impl MemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<RawReading>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Make the page fetch starting at `offset` fail
    pub async fn fail_fetch_at(&self, offset: u64) {
        *self.fail_fetch_at.lock().await = Some(offset);
    }

    pub async fn fail_truncate(&self, fail: bool) {
        *self.fail_truncate.lock().await = fail;
    }

    pub async fn rows(&self) -> Vec<RawReading> {
        self.rows.lock().await.clone()
    }

    /// Number of `fetch_page` calls so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StagingStore for MemoryStagingStore {
    async fn fetch_page(&self, offset: u64, limit: usize) -> DbResult<Vec<RawReading>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if *self.fail_fetch_at.lock().await == Some(offset) {
            return Err(DbError::unavailable(format!("staging read failed at offset {offset}")));
        }

        let rows = self.rows.lock().await;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(rows.len());
        let end = start.saturating_add(limit).min(rows.len());
        Ok(rows[start..end].to_vec())
    }

    async fn truncate(&self) -> DbResult<()> {
        if *self.fail_truncate.lock().await {
            return Err(DbError::unavailable("staging truncate failed"));
        }
        self.rows.lock().await.clear();
        Ok(())
    }

    async fn count(&self) -> DbResult<u64> {
        Ok(self.rows.lock().await.len() as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDestinationStore {
    tables: Mutex<HashMap<SensorKind, Vec<DecodedRecord>>>,
    failing: Mutex<HashSet<SensorKind>>,
    writes: Mutex<Vec<(SensorKind, usize)>>,
}

impl MemoryDestinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert into the table of `kind` fail
    pub async fn fail_kind(&self, kind: SensorKind) {
        self.failing.lock().await.insert(kind);
    }

    pub async fn heal_kind(&self, kind: SensorKind) {
        self.failing.lock().await.remove(&kind);
    }

    pub async fn rows(&self, kind: SensorKind) -> Vec<DecodedRecord> {
        self.tables.lock().await.get(&kind).cloned().unwrap_or_default()
    }

    pub async fn total_rows(&self) -> usize {
        self.tables.lock().await.values().map(Vec::len).sum()
    }

    /// Successful inserts as `(kind, rows)`, in order
    pub async fn writes(&self) -> Vec<(SensorKind, usize)> {
        self.writes.lock().await.clone()
    }
}

#[async_trait]
impl DestinationStore for MemoryDestinationStore {
    async fn insert_batch(&self, kind: SensorKind, records: &[DecodedRecord]) -> DbResult<()> {
        if self.failing.lock().await.contains(&kind) {
            return Err(DbError::unavailable(format!("insert into {} failed", kind.table())));
        }
        if let Some(other) = records.iter().find(|r| r.kind() != kind) {
            return Err(DbError::unavailable(format!(
                "{} record in a {kind} batch",
                other.kind()
            )));
        }

        self.tables
            .lock()
            .await
            .entry(kind)
            .or_default()
            .extend_from_slice(records);
        self.writes.lock().await.push((kind, records.len()));
        Ok(())
    }
}
