//! Error types for SDC

use thiserror::Error;

/// Result type alias for SDC operations
pub type Result<T> = std::result::Result<T, SdcError>;

/// Main error type for SDC
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdcError {
    #[error("Unknown sensor kind: {0}")]
    UnknownSensorKind(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
