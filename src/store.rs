use crate::devices::DeviceId;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

const WARNING_MARKER: &str = "WARNING";
const ERROR_MARKER: &str = "ERROR";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureStats {
    #[serde(rename = "WARNINGS")]
    pub warnings: u32,
    #[serde(rename = "ERRORS")]
    pub errors: u32,
}

/// Append-only JSON-lines record file.
///
/// `append` and `count_failures` share one lock, so a scan never sees a
/// half-written line from this process.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded value is unit, a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serializes `entry` to one line and appends it.
    pub fn append<T: Serialize>(&self, entry: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.guard();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Counts `WARNING` and `ERROR` occurrences in the `failure` field of
    /// entries for `device`. Both counters may move for the same entry.
    pub fn count_failures(&self, device: DeviceId) -> Result<FailureStats, StoreError> {
        let mut stats = FailureStats::default();
        self.scan(|entry| {
            if entry.get("device").and_then(Value::as_i64) != Some(i64::from(device.as_u8())) {
                return;
            }
            let failure = entry.get("failure").and_then(Value::as_str).unwrap_or_default();
            if failure.contains(WARNING_MARKER) {
                stats.warnings += 1;
            }
            if failure.contains(ERROR_MARKER) {
                stats.errors += 1;
            }
        })?;
        Ok(stats)
    }

    /// Every parsable entry in file order.
    pub fn entries(&self) -> Result<Vec<Value>, StoreError> {
        let mut entries = Vec::new();
        self.scan(|entry| entries.push(entry))?;
        Ok(entries)
    }

    fn scan(&self, mut visit: impl FnMut(Value)) -> Result<(), StoreError> {
        let _guard = self.guard();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(entry) => visit(entry),
                Err(e) => warn!(line = index + 1, path = %self.path.display(), "skipping unreadable store entry: {e}"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::new(dir.path().join("absent.jsonl"));
        assert_eq!(store.count_failures(DeviceId::BlackBox).unwrap(), FailureStats::default());
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");
        std::fs::write(&path, "{\"device\": 1, \"failure\": \"ERROR_x\"}\nnot json\n\n").unwrap();
        let store = LogStore::new(&path);
        store.append(&json!({"device": 1, "failure": "WARNING_y"})).unwrap();

        let stats = store.count_failures(DeviceId::EmergencySystem).unwrap();
        assert_eq!(stats, FailureStats { warnings: 1, errors: 1 });
        assert_eq!(store.entries().unwrap().len(), 2);
    }
}
