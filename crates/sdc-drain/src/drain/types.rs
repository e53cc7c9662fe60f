//! Core types for the drain pipeline

use chrono::{DateTime, Utc};
use regex::Regex;
use sdc_common::{RawReading, SensorKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use uuid::Uuid;

/// Default rows per staging page
pub const DEFAULT_PAGE_SIZE: usize = 50_000;
/// Default rows per multi-row insert
pub const DEFAULT_BATCH_SIZE: usize = 1_000;
/// Default ceiling of admitted-but-unbatched rows
pub const DEFAULT_MAX_IN_FLIGHT: usize = 20;
/// Default number of concurrent decode jobs
pub const DEFAULT_DECODE_WORKERS: usize = 4;
/// How many decode failures a summary keeps for inspection
pub const MAX_FAILURE_SAMPLES: usize = 5;

#[allow(clippy::expect_used)]
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").expect("decimal pattern is valid")
});

/// Decimal number kept as text so no float rounding happens before the
/// destination column sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimal(String);

impl Decimal {
    /// Accepts an optional sign, digits with an optional fraction, and an
    /// optional exponent. Surrounding whitespace is not accepted.
    pub fn parse(text: &str) -> Option<Self> {
        DECIMAL.is_match(text).then(|| Decimal(text.to_string()))
    }

    pub fn zero() -> Self {
        Decimal("0".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Columns every destination row carries, copied from the staged reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub device_id: i32,
    pub timestamp: i64,
    pub priority: i32,
    pub synced: bool,
    pub data_class: i32,
}

impl From<&RawReading> for RecordMeta {
    fn from(raw: &RawReading) -> Self {
        Self {
            device_id: raw.device_id,
            timestamp: raw.timestamp,
            priority: raw.priority,
            synced: raw.synced,
            data_class: raw.data_class,
        }
    }
}

/// Kind-specific fields of a decoded reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    Gps {
        accuracy: Decimal,
        altitude: Decimal,
        latitude: Decimal,
        longitude: Decimal,
        /// `0` when the payload has no speed tag
        speed: Decimal,
    },
    Gsm {
        /// Empty when the payload has no operator tag
        operator: String,
        neighbors: String,
        lac: Decimal,
        cid: Decimal,
        rssi: Decimal,
    },
    MagneticField {
        x: Decimal,
        y: Decimal,
        z: Decimal,
    },
    Accelerometer {
        x: Decimal,
        y: Decimal,
        z: Decimal,
    },
    Wifi {
        bssid: String,
        /// Empty when absent
        ssid: String,
        /// Empty when absent
        cap: String,
        connected: bool,
        frequency: Decimal,
        signal_level: Decimal,
    },
    Tag {
        text: String,
    },
    NetworkLocation {
        accuracy: Decimal,
        latitude: Decimal,
        longitude: Decimal,
    },
    Bluetooth {
        address: String,
        /// Human-readable device class, e.g. `PHONE`
        class: String,
        /// Empty when absent
        name: String,
        rssi: Decimal,
    },
    Gyroscope {
        x: Decimal,
        y: Decimal,
        z: Decimal,
    },
}

impl Measurement {
    pub fn kind(&self) -> SensorKind {
        match self {
            Measurement::Gps { .. } => SensorKind::Gps,
            Measurement::Gsm { .. } => SensorKind::Gsm,
            Measurement::MagneticField { .. } => SensorKind::MagneticField,
            Measurement::Accelerometer { .. } => SensorKind::Accelerometer,
            Measurement::Wifi { .. } => SensorKind::Wifi,
            Measurement::Tag { .. } => SensorKind::Tag,
            Measurement::NetworkLocation { .. } => SensorKind::NetworkLocation,
            Measurement::Bluetooth { .. } => SensorKind::Bluetooth,
            Measurement::Gyroscope { .. } => SensorKind::Gyroscope,
        }
    }
}

/// A reading ready for its destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRecord {
    pub meta: RecordMeta,
    pub measurement: Measurement,
}

impl DecodedRecord {
    pub fn kind(&self) -> SensorKind {
        self.measurement.kind()
    }
}

/// Successful outcome of decoding one staged row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Record(DecodedRecord),
    /// Recognised tag without a destination
    Ignored,
}

/// Tuning knobs for one drain cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConfig {
    pub page_size: usize,
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub decode_workers: usize,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            decode_workers: DEFAULT_DECODE_WORKERS,
        }
    }
}

/// Drain state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrainPhase {
    #[default]
    Idle,
    Draining,
    Flushing,
    Purging,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    Aborted,
}

/// One decode failure kept for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSample {
    pub device_id: i32,
    pub timestamp: i64,
    pub sensor_kind: String,
    pub reason: String,
}

/// Counters of the running cycle. Lives only as long as the cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    pub pages_processed: u64,
    pub rows_seen: u64,
    pub rows_decoded: u64,
    pub rows_failed: u64,
    pub rows_ignored: u64,
    pub pending_batches: usize,
    pub failure_samples: Vec<FailureSample>,
}

impl CycleState {
    pub fn record_failure(&mut self, sample: FailureSample) {
        self.rows_failed += 1;
        if self.failure_samples.len() < MAX_FAILURE_SAMPLES {
            self.failure_samples.push(sample);
        }
    }
}

/// Report of a finished cycle, successful or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub pages_processed: u64,
    pub rows_seen: u64,
    pub rows_decoded: u64,
    pub rows_failed: u64,
    pub rows_ignored: u64,
    pub rows_written: BTreeMap<SensorKind, u64>,
    pub batches_flushed: u64,
    pub duration_ms: u64,
    pub failure_samples: Vec<FailureSample>,
}
