//! SDC Drain Library
//!
//! Moves staged sensor readings into typed per-kind tables.
//!
//! # Overview
//!
//! Devices upload raw readings into the `samples` staging table. A drain cycle
//! reads that table page by page, decodes each payload according to its sensor
//! kind, writes the records in multi-row batches to `gps`, `gsm`, `wifi` and
//! the other destination tables, and clears the staging table once everything
//! was written. An aborted cycle never clears it, so the next cycle picks the
//! same rows up again.
//!
//! - **Drain**: decoder, batcher, backpressure, paged traversal, orchestrator
//! - **Stores**: Postgres-backed and in-memory staging/destination stores
//! - **Triggers**: periodic scheduler and a small HTTP API
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sdc_drain::drain::memory::{MemoryDestinationStore, MemoryStagingStore};
//! use sdc_drain::drain::{DrainConfig, DrainOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = DrainOrchestrator::new(
//!         Arc::new(MemoryStagingStore::new()),
//!         Arc::new(MemoryDestinationStore::new()),
//!         DrainConfig::default(),
//!     );
//!     let summary = orchestrator.run_cycle(CancellationToken::new()).await?;
//!     println!("{} rows drained", summary.rows_decoded);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod db;
pub mod drain;
pub mod error;

// Re-export commonly used types
pub use error::AppError;
