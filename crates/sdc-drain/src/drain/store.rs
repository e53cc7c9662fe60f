//! Storage seams of the drain
//!
//! The orchestrator only talks to these two traits. Postgres backs them in
//! production ([`super::postgres`]); [`super::memory`] backs them in tests.

use async_trait::async_trait;
use sdc_common::{RawReading, SensorKind};

use super::types::DecodedRecord;
use crate::db::DbResult;

/// Read side: the staging table
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Rows `offset..offset + limit` in stable insertion order.
    ///
    /// Fewer than `limit` rows means the end of the table was reached.
    async fn fetch_page(&self, offset: u64, limit: usize) -> DbResult<Vec<RawReading>>;

    /// Remove every staged row. Idempotent.
    async fn truncate(&self) -> DbResult<()>;

    /// Number of staged rows
    async fn count(&self) -> DbResult<u64>;
}

/// Write side: one table per sensor kind
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Insert all `records` into the table of `kind` as one statement.
    ///
    /// Every record must be of `kind`; either all rows land or none do.
    async fn insert_batch(&self, kind: SensorKind, records: &[DecodedRecord]) -> DbResult<()>;
}
