//! File-backed key-value store.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "values": {
//!     "ticketTimers": { "T1": 65 },
//!     "activeTicket": "T2"
//!   }
//! }
//! ```
//!
//! Every `get` re-reads the file, so writes made by another process sharing
//! the same file are picked up on the next read (last writer wins).
//!
//! # Defensive Loading
//!
//! - Missing or empty file → empty store
//! - Corrupt JSON or unknown version → empty store, warning logged
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a crash mid-write never leaves a torn file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use super::KeyValueStore;
use crate::error::{Result, TrackerError};

const FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    values: BTreeMap<String, Value>,
}

pub struct JsonFileStore {
    name: String,
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(name: impl Into<String>, path: &Path) -> Self {
        Self {
            name: name.into(),
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs_err::read_to_string(&self.path)
            .map_err(|err| TrackerError::io("read store file", err))?;

        if content.trim().is_empty() {
            tracing::warn!(path = %self.path.display(), "Empty store file, treating as empty");
            return Ok(BTreeMap::new());
        }

        match serde_json::from_str::<StoreFile>(&content) {
            Ok(file) if file.version == FILE_VERSION => Ok(file.values),
            Ok(file) => {
                tracing::warn!(
                    path = %self.path.display(),
                    version = file.version,
                    expected = FILE_VERSION,
                    "Unsupported store file version, treating as empty"
                );
                Ok(BTreeMap::new())
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Failed to parse store file, treating as empty"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_all(&self, values: BTreeMap<String, Value>) -> Result<()> {
        let file = StoreFile {
            version: FILE_VERSION,
            values,
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|err| TrackerError::json("serialize store file", err))?;

        let parent_dir = self.path.parent().ok_or_else(|| TrackerError::StoreUnavailable {
            backend: self.name.clone(),
            reason: "store path has no parent directory".to_string(),
        })?;
        fs_err::create_dir_all(parent_dir)
            .map_err(|err| TrackerError::io("create store directory", err))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|err| TrackerError::io("create temp store file", err))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|err| TrackerError::io("write temp store file", err))?;
        temp_file
            .flush()
            .map_err(|err| TrackerError::io("flush temp store file", err))?;
        temp_file
            .persist(&self.path)
            .map_err(|err| TrackerError::io("replace store file", err.error))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>> {
        let mut values = self.read_all()?;
        values.retain(|key, _| keys.contains(&key.as_str()));
        Ok(values)
    }

    fn set(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut values = self.read_all()?;
        values.extend(entries);
        self.write_all(values)
    }
}
