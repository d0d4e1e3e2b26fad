//! Error types for tvremote-core.
//!
//! # Error Classification
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::AdapterUnavailable`] | Do not retry | Adapter missing, off, or access denied |
//! | [`Error::ConnectionFailed`] | Retry with backoff (by reason) | TV may be busy or out of range |
//! | [`Error::TransportError`] | Reconnect | The link dropped or a write failed |
//! | [`Error::Timeout`] | Retry | Transient BLE congestion |
//! | [`Error::Bluetooth`] | Retry | Generic BLE errors are often transient |
//! | [`Error::UnknownButton`] | Do not retry | Programming error |
//! | [`Error::Cancelled`] | Do not retry | Superseded by a newer request |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//!
//! [`is_retryable`] encodes this table and is what the connection manager
//! consults between attempts.
//!
//! Note that a pairing timeout is not an error: the advertising controller
//! reports it as [`crate::PairingEvent::TimedOut`] and returns to idle.

use std::time::Duration;

use thiserror::Error;

use tvremote_types::ReportError;

/// Errors that can occur while scanning, connecting or sending commands.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the central backend.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// The Bluetooth adapter cannot be used at all.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(AdapterFault),

    /// Connecting to a peripheral failed for good.
    #[error("Connection to {address} failed after {attempts} attempt(s) in {elapsed:?}: {reason}")]
    ConnectionFailed {
        /// Address of the peripheral.
        address: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Wall time spent including backoff waits.
        elapsed: Duration,
        /// Why the last attempt failed.
        reason: ConnectionFailureReason,
    },

    /// A session write failed or the session is no longer connected.
    #[error("Transport error on {address}: {reason}")]
    TransportError {
        /// Address of the peer.
        address: String,
        /// Description of the failure.
        reason: String,
    },

    /// The usage code is not in the button table.
    #[error("Unknown button usage code: 0x{0:04X}")]
    UnknownButton(u16),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Report encoding or decoding failed.
    #[error("HID report error: {0}")]
    Report(ReportError),
}

/// Why the Bluetooth adapter cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AdapterFault {
    /// No adapter is present.
    NoAdapter,
    /// The adapter exists but is powered off.
    PoweredOff,
    /// The process is not allowed to use Bluetooth.
    PermissionDenied,
    /// Any other adapter-level failure.
    Other(String),
}

impl std::fmt::Display for AdapterFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
            Self::PoweredOff => write!(f, "Bluetooth adapter is powered off"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// The process lacks Bluetooth permission.
    PermissionDenied,
    /// The peripheral does not expose anything a remote can write to.
    UnsupportedDevice,
    /// The peripheral was not found.
    NotFound,
    /// Device is out of range.
    OutOfRange,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl ConnectionFailureReason {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::AdapterUnavailable | Self::PermissionDenied | Self::UnsupportedDevice
        )
    }

    /// Classify an error returned by a single connection attempt.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::AdapterUnavailable(AdapterFault::PermissionDenied) => Self::PermissionDenied,
            Error::AdapterUnavailable(_) => Self::AdapterUnavailable,
            Error::ConnectionFailed { reason, .. } => reason.clone(),
            Error::Timeout { .. } => Self::Timeout,
            Error::Bluetooth(btleplug::Error::DeviceNotFound) => Self::NotFound,
            Error::Bluetooth(btleplug::Error::PermissionDenied) => Self::PermissionDenied,
            Error::Bluetooth(e) => Self::BleError(e.to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::PermissionDenied => write!(f, "Bluetooth permission denied"),
            Self::UnsupportedDevice => write!(f, "device has no writable HID characteristic"),
            Self::NotFound => write!(f, "device not found"),
            Self::OutOfRange => write!(f, "device out of range"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a transport error for a peer.
    pub fn transport(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportError {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a single-attempt connection failure, as returned by backends.
    pub fn attempt_failed(address: impl Into<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            attempts: 1,
            elapsed: Duration::ZERO,
            reason,
        }
    }
}

impl From<ReportError> for Error {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::UnknownUsage(code) => Error::UnknownButton(code),
            other => Error::Report(other),
        }
    }
}

/// Check whether an error is worth another attempt.
pub fn is_retryable(error: &Error) -> bool {
    match error {
        // Timeout errors are usually transient
        Error::Timeout { .. } => true,
        // Bluetooth errors are often transient
        Error::Bluetooth(btleplug::Error::PermissionDenied) => false,
        Error::Bluetooth(_) => true,
        Error::ConnectionFailed { reason, .. } => reason.is_transient(),
        Error::TransportError { .. } => true,
        Error::AdapterUnavailable(_) => false,
        Error::UnknownButton(_) => false,
        Error::Cancelled => false,
        Error::InvalidConfig(_) => false,
        Error::Report(_) => false,
    }
}

/// Result type alias using tvremote-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
