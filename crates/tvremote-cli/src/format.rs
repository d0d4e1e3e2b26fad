//! Output formatting for text and JSON.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled};

use tvremote_core::{
    ConnectionEvent, DiscoveryEvent, PairingEvent, PairingState, RankedPeripheral, RemoteEvent,
};
use tvremote_types::{Button, HistoryEntry};

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Print JSON instead of text.
    pub json: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, json: bool) -> Self {
        Self { no_color, json }
    }

    /// Serialize a value as pretty JSON.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)? + "\n")
    }
}

pub fn format_scan_json(ranked: &[RankedPeripheral], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        peripherals: &'a [RankedPeripheral],
    }

    opts.as_json(&ScanResult {
        count: ranked.len(),
        peripherals: ranked,
    })
}

#[must_use]
pub fn format_scan_text(ranked: &[RankedPeripheral], opts: &FormatOptions) -> String {
    if ranked.is_empty() {
        return "No TVs found.\nMake sure the TV is on and Bluetooth is enabled, or retry with --all.\n"
            .to_string();
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "#")]
        index: usize,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Signal")]
        signal: String,
        #[tabled(rename = "Score")]
        score: i32,
        #[tabled(rename = "Address")]
        address: String,
    }

    let rows: Vec<Row> = ranked
        .iter()
        .enumerate()
        .map(|(i, p)| Row {
            index: i + 1,
            name: if opts.no_color || !p.is_likely_target {
                p.name.clone()
            } else {
                p.name.cyan().to_string()
            },
            signal: style::format_signal_bar(p.rssi, opts.no_color),
            score: p.score,
            address: p.address.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    style::apply_table_style(&mut table);

    let header = style::heading(&format!("Found {} candidate(s)", ranked.len()), opts.no_color);
    format!("{}\n\n{}\n", header, table)
}

pub fn format_history_json(entries: &[(String, HistoryEntry)], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct EntryJson<'a> {
        address: &'a str,
        #[serde(flatten)]
        entry: &'a HistoryEntry,
    }

    let items: Vec<_> = entries
        .iter()
        .map(|(address, entry)| EntryJson { address, entry })
        .collect();
    opts.as_json(&items)
}

#[must_use]
pub fn format_history_text(entries: &[(String, HistoryEntry)], opts: &FormatOptions) -> String {
    if entries.is_empty() {
        return "No remembered TVs.\n".to_string();
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "")]
        favorite: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Address")]
        address: String,
        #[tabled(rename = "Last connected")]
        last_connected: String,
        #[tabled(rename = "Attempts")]
        attempts: u32,
    }

    let format = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]");
    let rows: Vec<Row> = entries
        .iter()
        .map(|(address, entry)| Row {
            favorite: match (entry.favorite, opts.no_color) {
                (false, _) => String::new(),
                (true, true) => "*".to_string(),
                (true, false) => "*".yellow().to_string(),
            },
            name: entry.name.clone(),
            address: address.clone(),
            last_connected: entry
                .last_connected_at
                .format(&format)
                .unwrap_or_else(|_| entry.last_connected_at.to_string()),
            attempts: entry.attempt_count,
        })
        .collect();

    let mut table = Table::new(rows);
    style::apply_table_style(&mut table);
    format!("{}\n", table)
}

pub fn format_buttons_json(opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ButtonJson {
        name: &'static str,
        usage_code: String,
    }

    let items: Vec<_> = Button::ALL
        .iter()
        .map(|b| ButtonJson {
            name: b.name(),
            usage_code: format!("0x{:04X}", b.usage_code()),
        })
        .collect();
    opts.as_json(&items)
}

#[must_use]
pub fn format_buttons_text() -> String {
    let mut output = String::new();
    for button in Button::ALL {
        output.push_str(&format!("{:<14} 0x{:04X}\n", button.name(), button.usage_code()));
    }
    output
}

/// One line describing an event, or `None` for events not worth printing.
pub fn format_event(event: &RemoteEvent, opts: &FormatOptions) -> Option<String> {
    let line = match event {
        RemoteEvent::Discovery(DiscoveryEvent::PassFailed { pass, error }) => {
            format!("Pass {} failed: {}", pass, error)
        }
        RemoteEvent::Connection(ConnectionEvent::RetryScheduled { address, delay_ms }) => {
            format!("Retrying {} in {} ms", address, delay_ms)
        }
        RemoteEvent::Connection(ConnectionEvent::Failed {
            address,
            attempts,
            reason,
        }) => format!(
            "Could not connect to {} after {} attempt(s): {}",
            address, attempts, reason
        ),
        RemoteEvent::Pairing(PairingEvent::StateChanged { state }) => {
            let state = match state {
                PairingState::Idle => "Pairing mode off".to_string(),
                PairingState::Advertising => "Advertising, waiting for the TV...".to_string(),
                PairingState::Connected => "TV connected".to_string(),
            };
            if opts.no_color {
                state
            } else {
                state.bold().to_string()
            }
        }
        RemoteEvent::Pairing(PairingEvent::PeerConnected {
            address: Some(address),
        }) => format!("Peer address: {}", address),
        RemoteEvent::Pairing(PairingEvent::PeerDisconnected) => "TV disconnected".to_string(),
        RemoteEvent::Pairing(PairingEvent::TimedOut { after_secs }) => {
            format!("No TV connected within {}s", after_secs)
        }
        RemoteEvent::Pairing(PairingEvent::CommandSent { button }) => format!("Sent {}", button),
        _ => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn ranked() -> Vec<RankedPeripheral> {
        vec![RankedPeripheral {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            name: "SHIELD".to_string(),
            rssi: Some(-45),
            score: 170,
            is_likely_target: true,
        }]
    }

    #[test]
    fn test_scan_text() {
        let opts = FormatOptions::new(true, false);
        let text = format_scan_text(&ranked(), &opts);
        assert!(text.starts_with("Found 1 candidate(s)"));
        assert!(text.contains("SHIELD"));
        assert!(text.contains("AA:BB:CC:DD:EE:FF"));
        assert!(text.contains("170"));

        assert!(format_scan_text(&[], &opts).starts_with("No TVs found."));
    }

    #[test]
    fn test_scan_json() {
        let json = format_scan_json(&ranked(), &FormatOptions::new(true, true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["peripherals"][0]["name"], "SHIELD");
        assert_eq!(value["peripherals"][0]["score"], 170);
    }

    #[test]
    fn test_history_json_flattens_entry() {
        let mut entry = HistoryEntry::new("SHIELD", datetime!(2024-01-01 12:00 UTC), 2);
        entry.favorite = true;
        let entries = vec![("AA".to_string(), entry)];

        let json = format_history_json(&entries, &FormatOptions::new(true, true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["address"], "AA");
        assert_eq!(value[0]["name"], "SHIELD");
        assert_eq!(value[0]["favorite"], true);
        assert_eq!(value[0]["last_connected_at"], "2024-01-01T12:00:00Z");
    }

    #[test]
    fn test_history_text() {
        let entries = vec![(
            "AA".to_string(),
            HistoryEntry::new("SHIELD", datetime!(2024-01-01 12:00 UTC), 2),
        )];
        let text = format_history_text(&entries, &FormatOptions::new(true, false));
        assert!(text.contains("SHIELD"));
        assert!(text.contains("2024-01-01 12:00"));
        assert_eq!(
            format_history_text(&[], &FormatOptions::default()),
            "No remembered TVs.\n"
        );
    }

    #[test]
    fn test_buttons_text_lists_every_button() {
        let text = format_buttons_text();
        assert_eq!(text.lines().count(), Button::ALL.len());
        assert!(text.contains("0x0223"));
    }

    #[test]
    fn test_event_lines() {
        let opts = FormatOptions::new(true, false);
        let line = format_event(
            &PairingEvent::TimedOut { after_secs: 120 }.into(),
            &opts,
        );
        assert_eq!(line.as_deref(), Some("No TV connected within 120s"));

        let line = format_event(
            &PairingEvent::StateChanged {
                state: PairingState::Advertising,
            }
            .into(),
            &opts,
        );
        assert_eq!(line.as_deref(), Some("Advertising, waiting for the TV..."));

        let quiet = format_event(
            &DiscoveryEvent::Finished { peripherals: 3 }.into(),
            &opts,
        );
        assert_eq!(quiet, None);
    }
}
