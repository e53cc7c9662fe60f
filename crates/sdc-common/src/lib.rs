//! SDC Common Library
//!
//! Shared types, error handling and logging for the sensor data collection
//! drain.
//!
//! # Overview
//!
//! - **Types**: staged sensor readings and the closed set of sensor kinds
//! - **Error Handling**: the common error type and result alias
//! - **Logging**: `tracing` subscriber setup driven by environment variables
//!
//! # Example
//!
//! ```
//! use sdc_common::types::{KindTag, SensorKind};
//!
//! let tag: KindTag = "GPS".parse().unwrap();
//! assert_eq!(tag, KindTag::Sensor(SensorKind::Gps));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SdcError};
pub use types::{KindTag, RawReading, SensorKind};
