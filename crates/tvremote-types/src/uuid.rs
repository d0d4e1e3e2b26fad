//! Bluetooth UUIDs for the HID-over-GATT remote.
//!
//! This module contains the standard service, characteristic and descriptor
//! UUIDs used both when talking to a TV as a central and when serving the
//! HID profile as a peripheral.

use uuid::{Uuid, uuid};

// --- HID Service ---

/// Human Interface Device service.
pub const HID_SERVICE: Uuid = uuid!("00001812-0000-1000-8000-00805f9b34fb");

/// HID Information characteristic (bcdHID, country code, flags).
pub const HID_INFORMATION: Uuid = uuid!("00002a4a-0000-1000-8000-00805f9b34fb");

/// Report Map characteristic (the HID report descriptor).
pub const HID_REPORT_MAP: Uuid = uuid!("00002a4b-0000-1000-8000-00805f9b34fb");

/// HID Control Point characteristic (suspend / exit suspend).
pub const HID_CONTROL_POINT: Uuid = uuid!("00002a4c-0000-1000-8000-00805f9b34fb");

/// Report characteristic carrying input reports.
pub const HID_REPORT: Uuid = uuid!("00002a4d-0000-1000-8000-00805f9b34fb");

/// Protocol Mode characteristic (boot / report protocol).
pub const HID_PROTOCOL_MODE: Uuid = uuid!("00002a4e-0000-1000-8000-00805f9b34fb");

/// Report Reference descriptor attached to each Report characteristic.
pub const REPORT_REFERENCE: Uuid = uuid!("00002908-0000-1000-8000-00805f9b34fb");

// --- Standard BLE Service UUIDs ---

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

/// Model number string characteristic.
pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");

/// GAP appearance value for a generic remote control.
pub const APPEARANCE_REMOTE_CONTROL: u16 = 0x0180;
