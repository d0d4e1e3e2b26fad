//! Consumer-Control HID reports.
//!
//! Remote buttons are sent to the TV as 3-byte input reports: the report ID
//! declared in [`REPORT_DESCRIPTOR`] followed by the 16-bit usage code in
//! little-endian order. A key release is the same report with an all-zero
//! payload.
//!
//! ```
//! use tvremote_types::hid::{self, Button, DecodedReport};
//!
//! let press = hid::encode_press(Button::Home.usage_code()).unwrap();
//! assert_eq!(press, [0x01, 0x23, 0x02]);
//! assert_eq!(hid::decode(&press).unwrap(), DecodedReport::Press(0x223));
//!
//! let release = hid::encode_release(Button::Home.usage_code()).unwrap();
//! assert_eq!(release, [0x01, 0x00, 0x00]);
//! assert_eq!(hid::decode(&release).unwrap(), DecodedReport::Release);
//! ```

use core::fmt;
use core::str::FromStr;

use bytes::{Buf, BufMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};

/// Report ID of the consumer control input report.
pub const REPORT_ID: u8 = 0x01;

/// Size of an encoded report including the report ID.
pub const REPORT_LEN: usize = 3;

/// HID report descriptor for the consumer control collection.
pub const REPORT_DESCRIPTOR: [u8; 25] = [
    0x05, 0x0C, // Usage Page (Consumer Devices)
    0x09, 0x01, // Usage (Consumer Control)
    0xA1, 0x01, // Collection (Application)
    0x85, REPORT_ID, //   Report ID (1)
    0x19, 0x00, //   Usage Minimum (0)
    0x2A, 0xFF, 0x02, //   Usage Maximum (767)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x02, //   Logical Maximum (767)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x10, //   Report Size (16)
    0x81, 0x00, //   Input (Data, Array, Abs)
    0xC0, // End Collection
];

/// HID Information value: bcdHID 1.11, country code 0, remote-wake | normally-connectable.
pub const HID_INFORMATION: [u8; 4] = [0x11, 0x01, 0x00, 0x03];

/// A logical remote control button.
///
/// Every variant maps to exactly one Consumer-Control usage code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Button {
    Power,
    Home,
    Back,
    Menu,
    VolumeUp,
    VolumeDown,
    Mute,
    ChannelUp,
    ChannelDown,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    DpadCenter,
    PlayPause,
    Stop,
    FastForward,
    Rewind,
    Record,
    /// Asks the connected TV to enter its own Bluetooth pairing mode.
    Pair,
}

impl Button {
    /// Every button in the fixed table.
    pub const ALL: [Button; 20] = [
        Button::Power,
        Button::Home,
        Button::Back,
        Button::Menu,
        Button::VolumeUp,
        Button::VolumeDown,
        Button::Mute,
        Button::ChannelUp,
        Button::ChannelDown,
        Button::DpadUp,
        Button::DpadDown,
        Button::DpadLeft,
        Button::DpadRight,
        Button::DpadCenter,
        Button::PlayPause,
        Button::Stop,
        Button::FastForward,
        Button::Rewind,
        Button::Record,
        Button::Pair,
    ];

    /// The Consumer-Control usage code for this button.
    #[must_use]
    pub const fn usage_code(self) -> u16 {
        match self {
            Button::Power => 0x30,
            Button::Home => 0x223,
            Button::Back => 0x224,
            Button::Menu => 0x40,
            Button::VolumeUp => 0xE9,
            Button::VolumeDown => 0xEA,
            Button::Mute => 0xE2,
            Button::ChannelUp => 0x9C,
            Button::ChannelDown => 0x9D,
            Button::DpadUp => 0x42,
            Button::DpadDown => 0x43,
            Button::DpadLeft => 0x44,
            Button::DpadRight => 0x45,
            Button::DpadCenter => 0x41,
            Button::PlayPause => 0xCD,
            Button::Stop => 0xB7,
            Button::FastForward => 0xB3,
            Button::Rewind => 0xB4,
            Button::Record => 0xB2,
            Button::Pair => 0x225,
        }
    }

    /// Look up the button for a usage code.
    #[must_use]
    pub fn from_usage(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.usage_code() == code)
    }

    /// Canonical snake_case name, as accepted by [`Button::from_str`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Button::Power => "power",
            Button::Home => "home",
            Button::Back => "back",
            Button::Menu => "menu",
            Button::VolumeUp => "volume_up",
            Button::VolumeDown => "volume_down",
            Button::Mute => "mute",
            Button::ChannelUp => "channel_up",
            Button::ChannelDown => "channel_down",
            Button::DpadUp => "dpad_up",
            Button::DpadDown => "dpad_down",
            Button::DpadLeft => "dpad_left",
            Button::DpadRight => "dpad_right",
            Button::DpadCenter => "dpad_center",
            Button::PlayPause => "play_pause",
            Button::Stop => "stop",
            Button::FastForward => "fast_forward",
            Button::Rewind => "rewind",
            Button::Record => "record",
            Button::Pair => "pair",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Button {
    type Err = ReportError;

    /// Parse a button name.
    ///
    /// Case-insensitive; `-` and `_` are interchangeable, and a few
    /// common aliases are accepted.
    ///
    /// ```
    /// use tvremote_types::hid::Button;
    ///
    /// assert_eq!("VOLUME_UP".parse::<Button>().unwrap(), Button::VolumeUp);
    /// assert_eq!("volume-mute".parse::<Button>().unwrap(), Button::Mute);
    /// assert_eq!("ok".parse::<Button>().unwrap(), Button::DpadCenter);
    /// assert!("eject".parse::<Button>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        let alias = match normalized.as_str() {
            "volume_mute" => Some(Button::Mute),
            "up" => Some(Button::DpadUp),
            "down" => Some(Button::DpadDown),
            "left" => Some(Button::DpadLeft),
            "right" => Some(Button::DpadRight),
            "select" | "ok" | "center" | "enter" => Some(Button::DpadCenter),
            "play" | "pause" => Some(Button::PlayPause),
            "ff" => Some(Button::FastForward),
            _ => None,
        };
        alias
            .or_else(|| Self::ALL.into_iter().find(|b| b.name() == normalized))
            .ok_or_else(|| ReportError::UnknownButtonName(s.to_string()))
    }
}

/// A single logical HID report.
///
/// A press (`pressed = true`) must always be followed by the release of the
/// same code before any other press is sent. [`ReportSequencer`] enforces
/// this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HidReport {
    /// Consumer-Control usage code.
    pub usage_code: u16,
    /// Key down (`true`) or key up (`false`).
    pub pressed: bool,
}

impl HidReport {
    /// A key-down report.
    pub fn press(usage_code: u16) -> Self {
        Self {
            usage_code,
            pressed: true,
        }
    }

    /// A key-up report.
    pub fn release(usage_code: u16) -> Self {
        Self {
            usage_code,
            pressed: false,
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> ReportResult<[u8; REPORT_LEN]> {
        if self.pressed {
            encode_press(self.usage_code)
        } else {
            encode_release(self.usage_code)
        }
    }
}

/// Result of decoding a single report without context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedReport {
    /// Key down with the given usage code.
    Press(u16),
    /// The all-zero release marker.
    Release,
}

/// Encode a key-down report for a usage code in the fixed table.
pub fn encode_press(usage_code: u16) -> ReportResult<[u8; REPORT_LEN]> {
    ensure_known(usage_code)?;
    Ok(write_report(usage_code))
}

/// Encode the key-up report that follows a press of `usage_code`.
///
/// The payload is all zeros regardless of the code; the code is only
/// validated so that releases of unknown keys fail the same way presses do.
pub fn encode_release(usage_code: u16) -> ReportResult<[u8; REPORT_LEN]> {
    ensure_known(usage_code)?;
    Ok(write_report(0))
}

/// Decode a report produced by [`encode_press`] or [`encode_release`].
pub fn decode(data: &[u8]) -> ReportResult<DecodedReport> {
    if data.len() != REPORT_LEN {
        return Err(ReportError::InvalidLength {
            expected: REPORT_LEN,
            actual: data.len(),
        });
    }

    let mut buf = data;
    let report_id = buf.get_u8();
    if report_id != REPORT_ID {
        return Err(ReportError::InvalidReportId(report_id));
    }

    match buf.get_u16_le() {
        0 => Ok(DecodedReport::Release),
        code => {
            ensure_known(code)?;
            Ok(DecodedReport::Press(code))
        }
    }
}

fn ensure_known(usage_code: u16) -> ReportResult<()> {
    match Button::from_usage(usage_code) {
        Some(_) => Ok(()),
        None => Err(ReportError::UnknownUsage(usage_code)),
    }
}

fn write_report(payload: u16) -> [u8; REPORT_LEN] {
    let mut report = [0u8; REPORT_LEN];
    let mut buf = &mut report[..];
    buf.put_u8(REPORT_ID);
    buf.put_u16_le(payload);
    report
}

/// Tracks the held key so presses and releases stay paired.
///
/// Used on the sending side to refuse a second press before the first is
/// released, and on the receiving side to attribute a release marker to the
/// key it ends.
#[derive(Debug, Default, Clone)]
pub struct ReportSequencer {
    held: Option<u16>,
}

impl ReportSequencer {
    /// Create a sequencer with no key held.
    pub fn new() -> Self {
        Self::default()
    }

    /// The usage code currently held down, if any.
    pub fn held(&self) -> Option<u16> {
        self.held
    }

    /// Encode a press of `usage_code`.
    pub fn press(&mut self, usage_code: u16) -> ReportResult<[u8; REPORT_LEN]> {
        if let Some(pending) = self.held {
            return Err(ReportError::PressWhileHeld {
                pending,
                requested: usage_code,
            });
        }
        let report = HidReport::press(usage_code).encode()?;
        self.held = Some(usage_code);
        Ok(report)
    }

    /// Encode the release of the held key.
    pub fn release(&mut self) -> ReportResult<[u8; REPORT_LEN]> {
        let code = self.held.take().ok_or(ReportError::ReleaseWithoutPress)?;
        HidReport::release(code).encode()
    }

    /// Decode an incoming report, recovering the code of a release.
    pub fn decode(&mut self, data: &[u8]) -> ReportResult<HidReport> {
        match decode(data)? {
            DecodedReport::Press(code) => {
                if let Some(pending) = self.held {
                    return Err(ReportError::PressWhileHeld {
                        pending,
                        requested: code,
                    });
                }
                self.held = Some(code);
                Ok(HidReport::press(code))
            }
            DecodedReport::Release => {
                let code = self.held.take().ok_or(ReportError::ReleaseWithoutPress)?;
                Ok(HidReport::release(code))
            }
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Decoding arbitrary bytes never panics.
        #[test]
        fn decode_never_panics(data: Vec<u8>) {
            let _ = decode(&data);
        }

        /// Any 3-byte report either decodes to a known code or is rejected.
        #[test]
        fn decode_accepts_only_table_codes(code: u16) {
            let mut data = vec![REPORT_ID];
            data.extend_from_slice(&code.to_le_bytes());
            match decode(&data) {
                Ok(DecodedReport::Press(c)) => prop_assert!(Button::from_usage(c).is_some()),
                Ok(DecodedReport::Release) => prop_assert_eq!(code, 0),
                Err(e) => prop_assert_eq!(e, ReportError::UnknownUsage(code)),
            }
        }
    }
}
