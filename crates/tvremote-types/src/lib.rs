//! Platform-agnostic types for the BLE HID TV remote.
//!
//! This crate holds everything that does not need a Bluetooth stack and is
//! shared by the core library and the command line front-end.
//!
//! # Features
//!
//! - Consumer-Control button table and HID report encoder/decoder
//! - The HID report descriptor served in pairing mode
//! - Discovered peripheral and connection history records
//! - UUID constants for the HID-over-GATT profile
//!
//! # Example
//!
//! ```
//! use tvremote_types::{Button, ReportSequencer};
//!
//! let button: Button = "volume_up".parse().unwrap();
//! let mut seq = ReportSequencer::new();
//! let press = seq.press(button.usage_code()).unwrap();
//! let release = seq.release().unwrap();
//! assert_eq!(press, [0x01, 0xE9, 0x00]);
//! assert_eq!(release, [0x01, 0x00, 0x00]);
//! ```

pub mod error;
pub mod hid;
pub mod types;
pub mod uuid;

pub use error::{ReportError, ReportResult};
pub use hid::{Button, DecodedReport, HidReport, ReportSequencer};
pub use types::{HistoryEntry, PeripheralRecord, Sighting, UNKNOWN_NAME, sort_history};
pub use uuid as uuids;
