//! Error types for the acquisition core.
//!
//! `AcqError` consolidates the error taxonomy the core surfaces: configuration
//! and I/O failures that propagate normally via `?`, plus the semantic
//! categories the Acquisition Controller converts into a `last_fail_reason`
//! (see [`crate::controller::FailReason`], which most call sites should match
//! on instead of this enum's `Display` output).

use thiserror::Error;

/// Convenience alias for results using the core error type.
pub type AppResult<T> = std::result::Result<T, AcqError>;

#[derive(Error, Debug)]
pub enum AcqError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no detector connected")]
    NotConnected,

    #[error("acquisition already in progress")]
    NotIdle,

    #[error("beam supply not ready: {0}")]
    SupplyNotReady(String),

    #[error("timed out waiting for frame")]
    Timeout,

    #[error("cancelled by caller")]
    Stopped,

    #[error("acquisition finished without producing a frame")]
    NoFrame,

    #[error("reference shape does not match frame: {0}")]
    ShapeMismatch(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("detector driver error: {0}")]
    DeviceError(String),

    #[error("calibration artifact error: {0}")]
    Calibration(String),
}
