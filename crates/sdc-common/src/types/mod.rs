//! Common types used across SDC

use serde::{Deserialize, Serialize};

use crate::error::SdcError;

/// Staging tag of readings that carry no measurement and are skipped by the drain.
pub const IGNORED_TAG: &str = "TimeSyncStateChanges";

/// One raw reading as staged in the `samples` table.
///
/// Staged rows are immutable; the drain only reads them and clears the whole
/// table after a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReading {
    /// Device that produced the reading
    pub device_id: i32,
    /// Capture time in epoch milliseconds
    pub timestamp: i64,
    /// Sensor tag as staged, e.g. `GPS` or `Tags`
    pub sensor_kind: String,
    /// Encoded measurement text
    pub payload: String,
    pub priority: i32,
    pub synced: bool,
    pub data_class: i32,
}

/// The closed set of sensor kinds that have a destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorKind {
    Gps,
    Gsm,
    MagneticField,
    Accelerometer,
    Wifi,
    Tag,
    NetworkLocation,
    Bluetooth,
    Gyroscope,
}

impl SensorKind {
    /// Every kind, in flush order.
    pub const ALL: [SensorKind; 9] = [
        SensorKind::Gps,
        SensorKind::Gsm,
        SensorKind::MagneticField,
        SensorKind::Accelerometer,
        SensorKind::Wifi,
        SensorKind::Tag,
        SensorKind::NetworkLocation,
        SensorKind::Bluetooth,
        SensorKind::Gyroscope,
    ];

    /// Tag used for this kind in the staging table
    pub fn tag(self) -> &'static str {
        match self {
            SensorKind::Gps => "GPS",
            SensorKind::Gsm => "GSM",
            SensorKind::MagneticField => "MagneticField",
            SensorKind::Accelerometer => "Accelerometer",
            SensorKind::Wifi => "Wifi",
            SensorKind::Tag => "Tags",
            SensorKind::NetworkLocation => "NetworkLocation",
            SensorKind::Bluetooth => "Bluetooth",
            SensorKind::Gyroscope => "Gyroscope",
        }
    }

    /// Destination table for this kind
    pub fn table(self) -> &'static str {
        match self {
            SensorKind::Gps => "gps",
            SensorKind::Gsm => "gsm",
            SensorKind::MagneticField => "magneticfield",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Wifi => "wifi",
            SensorKind::Tag => "tags",
            SensorKind::NetworkLocation => "networklocation",
            SensorKind::Bluetooth => "bluetooth",
            SensorKind::Gyroscope => "gyroscope",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Result of classifying a staged sensor tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindTag {
    /// A kind with a destination table
    Sensor(SensorKind),
    /// A recognised tag that is skipped without counting as a failure
    Ignored,
}

impl std::str::FromStr for KindTag {
    type Err = SdcError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == IGNORED_TAG {
            return Ok(KindTag::Ignored);
        }
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == s)
            .map(KindTag::Sensor)
            .ok_or_else(|| SdcError::UnknownSensorKind(s.to_string()))
    }
}
