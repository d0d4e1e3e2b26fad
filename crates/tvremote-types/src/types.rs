//! Records describing discovered peripherals and past connections.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Name shown for peripherals that never advertised one.
pub const UNKNOWN_NAME: &str = "Unknown";

/// A single advertisement seen during one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sighting {
    /// Hardware address (or platform identifier when the address is hidden).
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
}

impl Sighting {
    /// Create a sighting.
    pub fn new(address: impl Into<String>, name: Option<String>, rssi: Option<i16>) -> Self {
        Self {
            address: address.into(),
            name,
            rssi,
        }
    }
}

/// A peripheral discovered during a discovery session.
///
/// One record exists per address; repeated sightings are merged with
/// [`PeripheralRecord::observe`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeripheralRecord {
    /// Hardware address, the unique key.
    pub address: String,
    /// First non-empty name seen for this address.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    /// Every RSSI observed, in order.
    pub rssi_history: Vec<i16>,
    /// When the peripheral was first seen.
    pub first_seen_at: OffsetDateTime,
    /// When the peripheral was last seen.
    pub last_seen_at: OffsetDateTime,
    /// 1-based discovery pass that first saw this peripheral.
    pub discovery_pass: u32,
}

impl PeripheralRecord {
    /// Create a record from its first sighting.
    pub fn from_sighting(sighting: Sighting, seen_at: OffsetDateTime, pass: u32) -> Self {
        let mut record = Self {
            address: sighting.address,
            name: None,
            rssi_history: Vec::new(),
            first_seen_at: seen_at,
            last_seen_at: seen_at,
            discovery_pass: pass,
        };
        record.merge_fields(sighting.name, sighting.rssi);
        record
    }

    /// Merge a later sighting of the same address.
    ///
    /// The first non-empty name wins; RSSI values are appended and
    /// `last_seen_at` only moves forward.
    pub fn observe(&mut self, sighting: Sighting, seen_at: OffsetDateTime) {
        debug_assert_eq!(self.address, sighting.address);
        if seen_at > self.last_seen_at {
            self.last_seen_at = seen_at;
        }
        self.merge_fields(sighting.name, sighting.rssi);
    }

    fn merge_fields(&mut self, name: Option<String>, rssi: Option<i16>) {
        if self.name.is_none()
            && let Some(name) = name
        {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                self.name = Some(trimmed.to_string());
            }
        }
        if let Some(rssi) = rssi {
            self.rssi_history.push(rssi);
        }
    }

    /// Strongest RSSI observed.
    pub fn best_rssi(&self) -> Option<i16> {
        self.rssi_history.iter().copied().max()
    }

    /// The name, or [`UNKNOWN_NAME`] if none was advertised.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    /// Whether a real name was advertised.
    pub fn has_name(&self) -> bool {
        self.name
            .as_deref()
            .is_some_and(|n| !n.is_empty() && n != UNKNOWN_NAME)
    }
}

impl fmt::Display for PeripheralRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.best_rssi() {
            Some(rssi) => write!(f, "{} ({}, {} dBm)", self.display_name(), self.address, rssi),
            None => write!(f, "{} ({})", self.display_name(), self.address),
        }
    }
}

/// Persisted record of a successful connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryEntry {
    /// Peripheral name at the time of connection.
    pub name: String,
    /// When the last successful connection happened.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_connected_at: OffsetDateTime,
    /// Attempts used by the last connect before it succeeded.
    #[cfg_attr(feature = "serde", serde(default))]
    pub attempt_count: u32,
    /// Pinned by the user; favorites sort first.
    #[cfg_attr(feature = "serde", serde(default))]
    pub favorite: bool,
}

impl HistoryEntry {
    /// Create a non-favorite entry.
    pub fn new(name: impl Into<String>, last_connected_at: OffsetDateTime, attempt_count: u32) -> Self {
        Self {
            name: name.into(),
            last_connected_at,
            attempt_count,
            favorite: false,
        }
    }
}

/// Order `(address, entry)` pairs favorites first, then most recently connected.
pub fn sort_history(entries: &mut [(String, HistoryEntry)]) {
    entries.sort_by(|(a_addr, a), (b_addr, b)| {
        b.favorite
            .cmp(&a.favorite)
            .then_with(|| b.last_connected_at.cmp(&a.last_connected_at))
            .then_with(|| a_addr.cmp(b_addr))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sighting(name: Option<&str>, rssi: Option<i16>) -> Sighting {
        Sighting::new("AA:BB:CC:DD:EE:FF", name.map(String::from), rssi)
    }

    #[test]
    fn test_first_non_empty_name_wins() {
        let t0 = datetime!(2024-01-01 12:00 UTC);
        let mut record = PeripheralRecord::from_sighting(sighting(Some(""), Some(-80)), t0, 1);
        assert_eq!(record.name, None);
        assert_eq!(record.display_name(), UNKNOWN_NAME);

        record.observe(sighting(Some("SHIELD"), Some(-60)), t0);
        record.observe(sighting(Some("Other"), None), t0);

        assert_eq!(record.name.as_deref(), Some("SHIELD"));
        assert_eq!(record.rssi_history, vec![-80, -60]);
    }

    #[test]
    fn test_timestamps_monotonic() {
        let t0 = datetime!(2024-01-01 12:00 UTC);
        let t1 = datetime!(2024-01-01 12:00:05 UTC);
        let mut record = PeripheralRecord::from_sighting(sighting(None, None), t1, 2);

        record.observe(sighting(None, None), t0);
        assert_eq!(record.last_seen_at, t1);
        assert_eq!(record.first_seen_at, t1);
        assert_eq!(record.discovery_pass, 2);
    }

    #[test]
    fn test_best_rssi_keeps_history() {
        let t0 = datetime!(2024-01-01 12:00 UTC);
        let mut record = PeripheralRecord::from_sighting(sighting(None, Some(-70)), t0, 1);
        record.observe(sighting(None, Some(-40)), t0);
        record.observe(sighting(None, Some(-90)), t0);

        assert_eq!(record.best_rssi(), Some(-40));
        assert_eq!(record.rssi_history, vec![-70, -40, -90]);
    }

    #[test]
    fn test_has_name_rejects_sentinel() {
        let t0 = datetime!(2024-01-01 12:00 UTC);
        let record = PeripheralRecord::from_sighting(sighting(Some("Unknown"), None), t0, 1);
        assert!(!record.has_name());
    }

    #[test]
    fn test_sort_history_favorites_then_recent() {
        let old = datetime!(2024-01-01 00:00 UTC);
        let new = datetime!(2024-06-01 00:00 UTC);
        let mut fav = HistoryEntry::new("Bedroom", old, 1);
        fav.favorite = true;

        let mut entries = vec![
            ("A".to_string(), HistoryEntry::new("Old", old, 1)),
            ("B".to_string(), HistoryEntry::new("New", new, 2)),
            ("C".to_string(), fav),
        ];
        sort_history(&mut entries);

        let order: Vec<&str> = entries.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_history_entry_json_uses_rfc3339() {
        let entry = HistoryEntry::new("Living Room TV", datetime!(2024-03-04 05:06:07 UTC), 2);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"2024-03-04T05:06:07Z\""));

        let back: HistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_history_entry_defaults_missing_fields() {
        let json = r#"{"name":"TV","last_connected_at":"2024-03-04T05:06:07Z"}"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.attempt_count, 0);
        assert!(!entry.favorite);
    }
}
