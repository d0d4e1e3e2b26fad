//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tvremote_types::Button;

#[derive(Debug, Parser)]
#[command(name = "tvremote")]
#[command(author, version, about = "Bluetooth LE remote control for Android TV", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, env = "TVREMOTE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby TVs and rank them
    Scan {
        /// Listening time per pass in seconds
        #[arg(short = 'T', long)]
        timeout: Option<u64>,

        /// Number of passes
        #[arg(short, long)]
        retries: Option<u32>,

        /// Also list peripherals that do not look like TVs
        #[arg(short, long)]
        all: bool,
    },

    /// Connect to a TV and press buttons
    Send {
        /// TV address, or use TVREMOTE_DEVICE; defaults to the first history entry
        #[arg(short, long, env = "TVREMOTE_DEVICE")]
        device: Option<String>,

        /// Pause between buttons in milliseconds
        #[arg(long, default_value = "300")]
        gap_ms: u64,

        /// Buttons to press, in order (see `tvremote buttons`)
        #[arg(required = true)]
        buttons: Vec<Button>,
    },

    /// Advertise as a remote and wait for the TV to pair
    Pair {
        /// Name to advertise
        #[arg(short, long)]
        name: Option<String>,

        /// Seconds to wait for the TV
        #[arg(short = 'T', long)]
        timeout: Option<u64>,
    },

    /// List button names
    Buttons,

    /// Show or edit connection history
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },

    /// Show the active configuration
    Config {
        /// Print only the config file path
        #[arg(long)]
        path: bool,

        /// Write the active configuration to the config file
        #[arg(long, conflicts_with = "path")]
        init: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum HistoryAction {
    /// List remembered TVs, favorites first
    List,
    /// Pin a TV to the top of the list
    Favorite { address: String },
    /// Unpin a TV
    Unfavorite { address: String },
    /// Forget one TV
    Forget { address: String },
    /// Forget every TV
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_send_parses_button_names() {
        let cli = Cli::try_parse_from(["tvremote", "send", "-d", "AA", "home", "VOLUME_UP", "ok"])
            .unwrap();
        match cli.command {
            Commands::Send {
                device, buttons, ..
            } => {
                assert_eq!(device.as_deref(), Some("AA"));
                assert_eq!(
                    buttons,
                    vec![Button::Home, Button::VolumeUp, Button::DpadCenter]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_send_rejects_unknown_button() {
        assert!(Cli::try_parse_from(["tvremote", "send", "-d", "AA", "teleport"]).is_err());
    }

    #[test]
    fn test_send_requires_buttons() {
        assert!(Cli::try_parse_from(["tvremote", "send", "-d", "AA"]).is_err());
    }

    #[test]
    fn test_history_subcommands() {
        let cli = Cli::try_parse_from(["tvremote", "history", "favorite", "AA"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History {
                action: Some(HistoryAction::Favorite { .. })
            }
        ));

        let cli = Cli::try_parse_from(["tvremote", "--json", "history"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::History { action: None }));
    }

    #[test]
    fn test_completions_shell() {
        let cli = Cli::try_parse_from(["tvremote", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions {
                shell: clap_complete::Shell::Bash
            }
        ));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["tvremote", "-v", "-q", "buttons"]).is_err());
    }
}
