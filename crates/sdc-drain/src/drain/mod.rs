//! Staging drain
//!
//! Moves raw sensor readings from the `samples` staging table into the typed
//! per-kind destination tables, then clears the staging table. See
//! [`orchestrator`] for the cycle itself.

pub mod backpressure;
pub mod batcher;
pub mod decoder;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod postgres;
pub mod scheduler;
pub mod store;
pub mod traversal;
pub mod types;

pub use decoder::decode;
pub use error::{CycleFailure, DecodeFailure, DecodeReason, DrainError};
pub use orchestrator::DrainOrchestrator;
pub use scheduler::DrainScheduler;
pub use store::{DestinationStore, StagingStore};
pub use types::{
    CycleOutcome, CycleSummary, Decimal, Decoded, DecodedRecord, DrainConfig, DrainPhase, Measurement,
    RecordMeta,
};
