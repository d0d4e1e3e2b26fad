//! Remembered TVs, persisted as `history.json` next to the config file.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use tracing::warn;

use tvremote_types::{HistoryEntry, types::sort_history};

/// Connection history keyed by address.
#[derive(Debug, Clone, Default)]
pub struct HistoryFile {
    path: PathBuf,
    entries: BTreeMap<String, HistoryEntry>,
}

impl HistoryFile {
    /// Load from `path`. A missing or corrupt file yields an empty history.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable history {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &str) -> Option<&HistoryEntry> {
        self.entries.get(address)
    }

    /// Write the history back to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create history directory: {}", parent.display())
            })?;
        }
        let content =
            serde_json::to_string_pretty(&self.entries).context("Failed to serialize history")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write history: {}", self.path.display()))
    }

    /// Record a successful connection, keeping the favorite flag.
    pub fn record_connection(
        &mut self,
        address: &str,
        name: &str,
        at: OffsetDateTime,
        attempts: u32,
    ) {
        let favorite = self.entries.get(address).is_some_and(|e| e.favorite);
        let mut entry = HistoryEntry::new(name, at, attempts);
        entry.favorite = favorite;
        self.entries.insert(address.to_string(), entry);
    }

    /// Pin or unpin a TV. Returns false if the address is unknown.
    pub fn set_favorite(&mut self, address: &str, favorite: bool) -> bool {
        match self.entries.get_mut(address) {
            Some(entry) => {
                entry.favorite = favorite;
                true
            }
            None => false,
        }
    }

    /// Forget one TV. Returns false if the address is unknown.
    pub fn forget(&mut self, address: &str) -> bool {
        self.entries.remove(address).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries with favorites first, then most recent.
    pub fn sorted(&self) -> Vec<(String, HistoryEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(address, entry)| (address.clone(), entry.clone()))
            .collect();
        sort_history(&mut entries);
        entries
    }

    /// Address to use when none was given.
    pub fn preferred(&self) -> Option<String> {
        self.sorted().into_iter().next().map(|(address, _)| address)
    }
}
