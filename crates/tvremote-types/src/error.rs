//! Error types for HID report encoding and decoding.

use thiserror::Error;

/// Errors that can occur when building or parsing Consumer-Control reports.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in tvremote-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// The usage code is not part of the fixed button table.
    #[error("Unknown usage code: 0x{0:04X}")]
    UnknownUsage(u16),

    /// The button name could not be parsed.
    #[error("Unknown button name: '{0}'")]
    UnknownButtonName(String),

    /// The report has the wrong size.
    #[error("Invalid report length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected report size.
        expected: usize,
        /// Actual report size.
        actual: usize,
    },

    /// The report carries a report ID other than the consumer control one.
    #[error("Unexpected report ID: {0}")]
    InvalidReportId(u8),

    /// A press was requested while another press is still waiting for its release.
    #[error("Press of 0x{requested:04X} while 0x{pending:04X} is still held")]
    PressWhileHeld {
        /// Usage code that is currently held down.
        pending: u16,
        /// Usage code of the rejected press.
        requested: u16,
    },

    /// A release was seen with no preceding press.
    #[error("Release without a preceding press")]
    ReleaseWithoutPress,
}

/// Result type alias using tvremote-types' ReportError type.
pub type ReportResult<T> = std::result::Result<T, ReportError>;
