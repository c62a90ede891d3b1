//! Unified error types for the ringd core library.
//!
//! This module provides a unified error type [`RingdError`] that covers all
//! failure modes across the ringd system: the Bluetooth link, the command
//! multiplexer, configuration, and persistence.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Session-recoverable**: Link errors resolve a single request or connect
//!   attempt; they never tear down the session itself
//! - **HTTP-ready**: Error types include HTTP status codes and error codes

use std::path::PathBuf;
use thiserror::Error;

use crate::types::MetricKind;

/// The unified error type for all ringd operations.
#[derive(Debug, Error)]
pub enum RingdError {
    // =========================================================================
    // LINK & REQUEST ERRORS
    // =========================================================================
    /// A send was attempted while the link is not connected.
    #[error("Link unavailable: not connected to a device")]
    LinkUnavailable,

    /// No reply arrived for a request within its deadline.
    #[error("Request for {kind} timed out with no reply from the device")]
    TimedOut {
        /// The metric kind whose request expired.
        kind: MetricKind,
    },

    /// The connection dropped while one or more requests were outstanding.
    #[error("Link lost: connection to the device dropped mid-request")]
    LinkLost,

    /// A connect attempt did not establish a link.
    #[error("Connect failed: {reason}")]
    ConnectFailed {
        /// Transport-level description of the failure.
        reason: String,
    },

    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    AdapterNotFound,

    /// The requested device is not known to the adapter.
    #[error("Device not found: '{0}'. Ensure the ring is powered on and within range.")]
    DeviceNotFound(String),

    /// Bluetooth device scanning failed.
    #[error("Bluetooth scan failed: {0}")]
    ScanFailed(String),

    /// A device address did not parse as a Bluetooth MAC address.
    #[error("Invalid device address: '{0}'. Expected a MAC address like 'AA:BB:CC:DD:EE:FF'.")]
    InvalidAddress(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading snapshot data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for ringd operations.
pub type Result<T> = std::result::Result<T, RingdError>;

/// Alias kept for signatures that predate the rename to [`RingdError`].
pub type Error = RingdError;

impl RingdError {
    /// Returns `true` if this error concerns the device link or a request
    /// issued over it.
    #[inline]
    #[must_use]
    pub fn is_link_error(&self) -> bool {
        matches!(
            self,
            Self::LinkUnavailable
                | Self::TimedOut { .. }
                | Self::LinkLost
                | Self::ConnectFailed { .. }
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if this error resolves a single request or connect
    /// attempt and the caller can simply try again.
    ///
    /// All link-level errors are recoverable at the session level; the
    /// sampling scheduler retries on its next tick without any backoff
    /// machinery.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::LinkUnavailable
                | Self::TimedOut { .. }
                | Self::LinkLost
                | Self::ConnectFailed { .. }
                | Self::DeviceNotFound(_)
                | Self::ScanFailed(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::InvalidAddress(_) => 400,

            // 404 Not Found
            Self::ConfigNotFound(_) | Self::DeviceNotFound(_) => 404,

            // 409 Conflict - link state does not permit the operation
            Self::LinkUnavailable => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::IoError(_) => 500,

            // 502 Bad Gateway - the device dropped the link on us
            Self::LinkLost | Self::ConnectFailed { .. } => 502,

            // 503 Service Unavailable - Bluetooth hardware issues
            Self::AdapterNotFound | Self::ScanFailed(_) => 503,

            // 504 Gateway Timeout - the device did not answer in time
            Self::TimedOut { .. } => 504,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LinkUnavailable => "LINK_UNAVAILABLE",
            Self::TimedOut { .. } => "REQUEST_TIMED_OUT",
            Self::LinkLost => "LINK_LOST",
            Self::ConnectFailed { .. } => "CONNECT_FAILED",
            Self::AdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::ScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::InvalidAddress(_) => "INVALID_DEVICE_ADDRESS",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<serde_json::Error> for RingdError {
    fn from(err: serde_json::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl From<toml::ser::Error> for RingdError {
    fn from(err: toml::ser::Error) -> Self {
        Self::ConfigParseError(err.to_string())
    }
}

impl From<config::ConfigError> for RingdError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigParseError(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
