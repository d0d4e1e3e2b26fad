//! Command implementations for the CLI.

mod buttons;
mod config;
mod history;
mod pair;
mod scan;
mod send;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tvremote_core::{BtleCentral, RemoteService, ServiceConfig, UnsupportedAdvertiser};

use crate::config::Config;
use crate::format::FormatOptions;
use crate::history::HistoryFile;

pub use buttons::cmd_buttons;
pub use config::cmd_config;
pub use history::cmd_history;
pub use pair::cmd_pair;
pub use scan::cmd_scan;
pub use send::cmd_send;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub opts: FormatOptions,
    pub quiet: bool,
}

impl CommandContext {
    /// History lives next to the config file.
    pub fn history_path(&self) -> PathBuf {
        self.config_path.with_file_name("history.json")
    }

    pub fn load_history(&self) -> HistoryFile {
        HistoryFile::load_from(self.history_path())
    }

    /// Whether to draw spinners and progress lines.
    pub fn interactive(&self) -> bool {
        !self.quiet && !self.opts.json
    }
}

/// Build a central-role service for scanning and sending.
async fn central_service(config: ServiceConfig) -> Result<RemoteService> {
    let central = BtleCentral::new()
        .await
        .context("Failed to open the Bluetooth adapter")?;
    let service = RemoteService::new(Arc::new(central), Arc::new(UnsupportedAdvertiser), config)?;
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_path_follows_config() {
        let ctx = CommandContext {
            config: Config::default(),
            config_path: PathBuf::from("/tmp/tv/config.toml"),
            opts: FormatOptions::default(),
            quiet: false,
        };
        assert_eq!(ctx.history_path(), PathBuf::from("/tmp/tv/history.json"));
        assert!(ctx.interactive());

        let json = CommandContext {
            opts: FormatOptions::new(true, true),
            ..ctx
        };
        assert!(!json.interactive());
    }
}
