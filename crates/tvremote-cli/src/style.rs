//! Terminal styling: spinners, table style and signal rendering.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Spinner shown while discovery runs.
pub fn scanning_spinner(timeout_secs: u64, passes: u32) -> ProgressBar {
    spinner(format!(
        "Scanning for TVs... ({} pass(es) of {}s)",
        passes.max(1),
        timeout_secs
    ))
}

/// Spinner shown while connecting.
pub fn connecting_spinner(device: &str) -> ProgressBar {
    spinner(format!("Connecting to {}...", device))
}

pub fn apply_table_style(table: &mut tabled::Table) {
    table.with(tabled::settings::Style::rounded());
}

/// Render an RSSI value as a four-step bar.
pub fn format_signal_bar(rssi: Option<i16>, no_color: bool) -> String {
    let Some(rssi) = rssi else {
        return "N/A".to_string();
    };
    let bars = match rssi {
        r if r >= -50 => 4,
        r if r >= -70 => 3,
        r if r >= -85 => 2,
        _ => 1,
    };
    let bar = format!("{}{}", "▮".repeat(bars), "▯".repeat(4 - bars));
    let text = format!("{} {} dBm", bar, rssi);
    if no_color {
        return text;
    }
    match bars {
        4 | 3 => text.green().to_string(),
        2 => text.yellow().to_string(),
        _ => text.red().to_string(),
    }
}

/// Highlight a heading unless colors are off.
pub fn heading(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.bold().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_bar_tiers() {
        assert_eq!(format_signal_bar(Some(-40), true), "▮▮▮▮ -40 dBm");
        assert_eq!(format_signal_bar(Some(-70), true), "▮▮▮▯ -70 dBm");
        assert_eq!(format_signal_bar(Some(-80), true), "▮▮▯▯ -80 dBm");
        assert_eq!(format_signal_bar(Some(-95), true), "▮▯▯▯ -95 dBm");
        assert_eq!(format_signal_bar(None, true), "N/A");
    }
}
