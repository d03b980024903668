//! Crash-safe persistence of the rate snapshot and the history ledger.
//!
//! Every write goes to a temporary file in the target's directory, is flushed
//! and synced, then renamed over the target. Readers therefore see either the
//! previous complete file or the new complete file. Missing or corrupt files
//! read as empty.

use ratekeeper_common::{HistoryRecord, RateEntry, Snapshot, Timestamp};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::{FxError, FxResult};

/// Owner of the on-disk snapshot and history files.
#[derive(Debug, Clone)]
pub struct RateStore {
    rates_path: PathBuf,
    history_path: PathBuf,
}

impl RateStore {
    pub fn new(rates_path: impl Into<PathBuf>, history_path: impl Into<PathBuf>) -> Self {
        Self {
            rates_path: rates_path.into(),
            history_path: history_path.into(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.rates_path(), config.history_path())
    }

    pub fn rates_path(&self) -> &Path {
        &self.rates_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Load the current snapshot; `None` if absent or unreadable.
    pub fn load_snapshot(&self) -> Option<Snapshot> {
        let content = read_optional(&self.rates_path)?;
        match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %self.rates_path.display(), error = %e, "Corrupt snapshot, treating as empty");
                None
            }
        }
    }

    /// Replace the snapshot with `pairs`, stamped `now`.
    ///
    /// `last_refresh` never moves backwards: if the stored snapshot is newer
    /// than `now`, its timestamp is kept.
    pub fn save_snapshot(
        &self,
        pairs: BTreeMap<String, RateEntry>,
        now: Timestamp,
    ) -> FxResult<Snapshot> {
        let last_refresh = self
            .load_snapshot()
            .and_then(|s| s.last_refresh)
            .map_or(now, |previous| previous.max(now));

        let snapshot = Snapshot::new(pairs, last_refresh);
        atomic_write_json(&self.rates_path, &snapshot)?;

        debug!(
            path = %self.rates_path.display(),
            pairs = snapshot.len(),
            "Snapshot committed"
        );
        Ok(snapshot)
    }

    /// Load the ledger; entries that do not decode are skipped.
    pub fn load_history(&self) -> Vec<HistoryRecord> {
        let Some(content) = read_optional(&self.history_path) else {
            return Vec::new();
        };

        let entries = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                warn!(path = %self.history_path.display(), "History is not a JSON array, treating as empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(path = %self.history_path.display(), error = %e, "Corrupt history, treating as empty");
                return Vec::new();
            }
        };

        let total = entries.len();
        let records: Vec<HistoryRecord> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();

        if records.len() < total {
            warn!(
                path = %self.history_path.display(),
                dropped = total - records.len(),
                "Skipped malformed history entries"
            );
        }
        records
    }

    /// Append `records`, replacing existing entries with the same id.
    /// Within `records` the last entry for an id wins.
    ///
    /// Returns the ledger length after the write.
    pub fn append_history(&self, records: &[HistoryRecord]) -> FxResult<usize> {
        let mut batch: Vec<&HistoryRecord> = Vec::with_capacity(records.len());
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for record in records {
            match positions.get(record.id.as_str()).copied() {
                Some(i) => batch[i] = record,
                None => {
                    positions.insert(record.id.as_str(), batch.len());
                    batch.push(record);
                }
            }
        }

        let mut ledger: Vec<HistoryRecord> = self
            .load_history()
            .into_iter()
            .filter(|r| !positions.contains_key(r.id.as_str()))
            .collect();
        let replaced = batch.len();
        ledger.extend(batch.into_iter().cloned());

        atomic_write_json(&self.history_path, &ledger)?;

        debug!(
            path = %self.history_path.display(),
            appended = replaced,
            total = ledger.len(),
            "History committed"
        );
        Ok(ledger.len())
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read, treating as empty");
            None
        }
    }
}

/// Serialize `value` and atomically replace `path` with it.
fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> FxResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| FxError::persistence(dir, e))?;

    let bytes = serde_json::to_vec_pretty(value)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| FxError::persistence(dir, e))?;
    tmp.write_all(&bytes)
        .and_then(|_| tmp.flush())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| FxError::persistence(tmp.path(), e))?;

    // On failure the temporary file is dropped (and deleted) with the error.
    tmp.persist(path)
        .map_err(|e| FxError::persistence(path, e.error))?;
    Ok(())
}
