//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use tvremote_core::backoff::BackoffPolicy;
use tvremote_core::{ConnectOptions, PairingOptions, ScanOptions, ServiceConfig};

/// Directory under the platform config dir holding config and history.
pub const APP_DIR: &str = "tvremote";

/// Platform config directory for this application.
fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default TV address
    #[serde(default)]
    pub device: Option<String>,

    /// Discovery settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Connection settings
    #[serde(default)]
    pub connect: ConnectConfig,

    /// Pairing-mode settings
    #[serde(default)]
    pub pairing: PairingConfig,
}

/// Discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Listening time per pass in seconds.
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,

    /// Number of passes.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Keep peripherals with a score of zero or less.
    #[serde(default)]
    pub include_all: bool,

    /// Maximum number of results; 0 for no limit.
    #[serde(default = "default_rank_limit")]
    pub limit: usize,
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Attempts per connect.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff wait in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Longest backoff wait in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Randomize backoff waits.
    #[serde(default)]
    pub jitter: bool,

    /// Time limit for one attempt in seconds.
    #[serde(default = "default_connect_timeout")]
    pub timeout_secs: u64,

    /// Gap between press and release in milliseconds.
    #[serde(default = "default_inter_report_delay_ms")]
    pub inter_report_delay_ms: u64,
}

/// Pairing-mode settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Name to advertise.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Seconds to wait for the TV.
    #[serde(default = "default_pairing_timeout")]
    pub timeout_secs: u64,
}

fn default_scan_timeout() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_rank_limit() -> usize {
    tvremote_core::scoring::DEFAULT_RANK_LIMIT
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    4000
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_inter_report_delay_ms() -> u64 {
    100
}

fn default_device_name() -> String {
    tvremote_core::pairing::DEFAULT_DEVICE_NAME.to_string()
}

fn default_pairing_timeout() -> u64 {
    120
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scan_timeout(),
            retry_count: default_retry_count(),
            include_all: false,
            limit: default_rank_limit(),
        }
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter: false,
            timeout_secs: default_connect_timeout(),
            inter_report_delay_ms: default_inter_report_delay_ms(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            timeout_secs: default_pairing_timeout(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        app_dir().join("config.toml")
    }

    /// Load config from `path`, or return the default if it is missing or
    /// unreadable.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => warn!("Failed to parse config {}: {}", path.display(), e),
            },
            Err(e) => warn!("Failed to read config {}: {}", path.display(), e),
        }
        Self::default()
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Map the file settings onto the core option structs.
    pub fn service_config(&self) -> ServiceConfig {
        let scan_options = ScanOptions::default()
            .pass_timeout_secs(self.scan.timeout_secs)
            .retry_count(self.scan.retry_count);

        let backoff = BackoffPolicy::default()
            .base(Duration::from_millis(self.connect.backoff_base_ms))
            .max(Duration::from_millis(self.connect.backoff_max_ms))
            .jitter(self.connect.jitter);
        let connect_options = ConnectOptions::default()
            .max_attempts(self.connect.max_attempts)
            .backoff(backoff)
            .connect_timeout(Duration::from_secs(self.connect.timeout_secs))
            .inter_report_delay(Duration::from_millis(self.connect.inter_report_delay_ms));

        let inter_report_delay = Duration::from_millis(self.connect.inter_report_delay_ms);
        let pairing_options = PairingOptions::default()
            .device_name(self.pairing.device_name.clone())
            .timeout(Duration::from_secs(self.pairing.timeout_secs))
            .inter_report_delay(inter_report_delay);

        ServiceConfig {
            scan_options,
            connect_options,
            pairing_options,
            rank_limit: (self.scan.limit > 0).then_some(self.scan.limit),
            ..Default::default()
        }
    }
}

/// Pick the timeout from the command line, falling back to the config.
pub fn resolve_secs(arg: Option<u64>, configured: u64) -> Duration {
    Duration::from_secs(arg.unwrap_or(configured))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_core() {
        let service = Config::default().service_config();
        let core = ServiceConfig::default();
        assert_eq!(service.scan_options, core.scan_options);
        assert_eq!(service.connect_options, core.connect_options);
        assert_eq!(service.pairing_options, core.pairing_options);
        assert_eq!(service.rank_limit, core.rank_limit);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            device = "AA:BB:CC:DD:EE:FF"

            [connect]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.device.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(config.connect.max_attempts, 5);
        assert_eq!(config.connect.backoff_base_ms, 1000);
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(config.pairing, PairingConfig::default());
    }

    #[test]
    fn test_service_config_mapping() {
        let mut config = Config::default();
        config.scan.timeout_secs = 4;
        config.scan.limit = 0;
        config.connect.backoff_max_ms = 8000;
        config.pairing.timeout_secs = 30;

        let service = config.service_config();
        assert_eq!(service.scan_options.pass_timeout, Duration::from_secs(4));
        assert_eq!(service.rank_limit, None);
        assert_eq!(
            service.connect_options.backoff.max,
            Duration::from_secs(8)
        );
        assert_eq!(service.pairing_options.timeout, Duration::from_secs(30));
        assert!(service.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.device = Some("AA".to_string());
        config.pairing.device_name = "Living Room Remote".to_string();
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_bad_file_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scan = 12").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());

        assert_eq!(
            Config::load_from(&dir.path().join("missing.toml")),
            Config::default()
        );
    }

    #[test]
    fn test_resolve_secs() {
        assert_eq!(resolve_secs(Some(3), 10), Duration::from_secs(3));
        assert_eq!(resolve_secs(None, 10), Duration::from_secs(10));
    }
}
