//! Utility functions for tvremote-core.

use btleplug::platform::PeripheralId;

/// Address reported by platforms that hide the hardware address (macOS).
pub const NULL_ADDRESS: &str = "00:00:00:00:00:00";

/// Canonical form of an address used as a map key: trimmed, uppercase.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_uppercase()
}

/// Whether two addresses refer to the same peripheral.
///
/// Colons are optional so `aabbccddeeff` matches `AA:BB:CC:DD:EE:FF`.
pub fn same_address(a: &str, b: &str) -> bool {
    let strip = |s: &str| s.trim().replace(':', "").to_uppercase();
    !a.trim().is_empty() && strip(a) == strip(b)
}

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Pick the identifier a peripheral is addressed by.
///
/// Uses the Bluetooth address, or the peripheral ID where the platform
/// reports the null address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == NULL_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(" aa:bb:cc:dd:ee:ff "), "AA:BB:CC:DD:EE:FF");
        assert_eq!(normalize_address("   "), "");
    }

    #[test]
    fn test_same_address_ignores_case_and_colons() {
        assert!(same_address("aabbccddeeff", "AA:BB:CC:DD:EE:FF"));
        assert!(same_address("AA:BB:CC:DD:EE:FF", "aa:bb:cc:dd:ee:ff"));
        assert!(!same_address("AA:BB:CC:DD:EE:FF", "AA:BB:CC:DD:EE:00"));
        assert!(!same_address("", ""));
    }
}
