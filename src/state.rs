use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Persists the sync watermark and run metadata between runs.
///
/// The first-sync flag is one-way by convention: callers only ever set it to
/// `true`.
pub trait WatermarkStore {
    /// Latest remote update time merged into the mirror, in epoch milliseconds.
    fn watermark(&self) -> i64;
    fn set_watermark(&mut self, millis: i64) -> Result<()>;
    fn set_last_run_time(&mut self, at: DateTime<Utc>) -> Result<()>;
    fn first_sync_completed(&self) -> bool;
    fn set_first_sync_completed(&mut self, done: bool) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub latest_updated_item_timestamp: i64,
    #[serde(default)]
    pub latest_update_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub first_sync_done: bool,
}

/// A [`WatermarkStore`] backed by a TOML file, rewritten on every change.
pub struct StateFile {
    path: PathBuf,
    state: SyncState,
}

impl StateFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            SyncState::default()
        };
        Ok(Self { path, state })
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&self.state)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl WatermarkStore for StateFile {
    fn watermark(&self) -> i64 {
        self.state.latest_updated_item_timestamp
    }

    fn set_watermark(&mut self, millis: i64) -> Result<()> {
        self.state.latest_updated_item_timestamp = millis;
        self.save()
    }

    fn set_last_run_time(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.state.latest_update_run = Some(at);
        self.save()
    }

    fn first_sync_completed(&self) -> bool {
        self.state.first_sync_done
    }

    fn set_first_sync_completed(&mut self, done: bool) -> Result<()> {
        self.state.first_sync_done = done;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateFile::load(dir.path().join("state.toml")).unwrap();

        assert_eq!(store.watermark(), 0);
        assert!(!store.first_sync_completed());
        assert!(!dir.path().join("state.toml").exists());
    }

    #[test]
    fn setters_persist_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let run = Utc::now();

        let mut store = StateFile::load(&path).unwrap();
        store.set_watermark(1_700_000_000_000).unwrap();
        store.set_last_run_time(run).unwrap();
        store.set_first_sync_completed(true).unwrap();

        let reloaded = StateFile::load(&path).unwrap();
        assert_eq!(reloaded.watermark(), 1_700_000_000_000);
        assert_eq!(reloaded.state().latest_update_run, Some(run));
        assert!(reloaded.first_sync_completed());
    }
}
