//! Error taxonomy of the drain
//!
//! Row-level problems ([`DecodeFailure`]) are absorbed by the cycle and only
//! show up in its counters. Everything in [`DrainError`] ends the cycle
//! without purging the staging table.

use sdc_common::{RawReading, SensorKind};
use thiserror::Error;

use super::types::{CycleSummary, FailureSample};
use crate::db::DbError;

/// Why a payload could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeReason {
    #[error("unknown sensor kind")]
    UnknownKind,

    #[error("payload does not match the {0} layout")]
    PatternMismatch(SensorKind),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not a decimal number: '{value}'")]
    NotDecimal { field: &'static str, value: String },
}

/// A staged row that could not be turned into a destination record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot decode {kind} reading: {reason}")]
pub struct DecodeFailure {
    /// Sensor tag as staged
    pub kind: String,
    pub reason: DecodeReason,
    pub raw_snapshot: Box<RawReading>,
}

impl DecodeFailure {
    pub fn new(raw: &RawReading, reason: DecodeReason) -> Self {
        Self {
            kind: raw.sensor_kind.clone(),
            reason,
            raw_snapshot: Box::new(raw.clone()),
        }
    }

    pub fn sample(&self) -> FailureSample {
        FailureSample {
            device_id: self.raw_snapshot.device_id,
            timestamp: self.raw_snapshot.timestamp,
            sensor_kind: self.kind.clone(),
            reason: self.reason.to_string(),
        }
    }
}

/// Cycle-fatal errors
#[derive(Error, Debug)]
pub enum DrainError {
    #[error("Failed to read staging page at offset {offset}: {source}")]
    Source {
        offset: u64,
        #[source]
        source: DbError,
    },

    #[error("Failed to write {rows} {kind} rows: {source}")]
    Write {
        kind: SensorKind,
        rows: usize,
        #[source]
        source: DbError,
    },

    #[error("Failed to purge staging table: {0}")]
    Purge(#[source] DbError),

    #[error("Drain cycle cancelled")]
    Cancelled,

    #[error("Decode worker failed: {0}")]
    Worker(String),
}

/// Why a trigger did not produce a completed cycle
#[derive(Error, Debug)]
pub enum CycleFailure {
    /// Another cycle holds the staging table; nothing was touched
    #[error("A drain cycle is already running")]
    ConcurrentCycle,

    #[error("Drain cycle aborted: {error}")]
    Aborted {
        #[source]
        error: DrainError,
        summary: Box<CycleSummary>,
    },
}

impl CycleFailure {
    /// Partial summary of an aborted cycle
    pub fn summary(&self) -> Option<&CycleSummary> {
        match self {
            CycleFailure::ConcurrentCycle => None,
            CycleFailure::Aborted { summary, .. } => Some(summary),
        }
    }
}
