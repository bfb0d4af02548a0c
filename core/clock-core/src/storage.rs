//! Storage configuration and path management for tickclock.
//!
//! This module provides a centralized `StorageConfig` struct that manages all
//! file paths for tickclock data, so the daemon, the CLI and tests agree on
//! where the store, the board snapshot and the socket live.
//!
//! ## Design Principles
//!
//! - **Single source of truth**: All path decisions centralized here
//! - **Testable**: `StorageConfig::with_root()` enables test injection
//! - **Overridable**: `TICKCLOCK_HOME` replaces the default `~/.tickclock`

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackerError};

pub const HOME_ENV: &str = "TICKCLOCK_HOME";
const ROOT_DIR_NAME: &str = ".tickclock";

/// Central configuration for all tickclock storage paths.
///
/// Production code uses `StorageConfig::from_env()` which points to `~/.tickclock/`
/// unless `TICKCLOCK_HOME` is set. Tests use `StorageConfig::with_root(temp_dir)`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all tickclock data (default: ~/.tickclock)
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the root from `TICKCLOCK_HOME`, falling back to the home directory.
    pub fn from_env() -> Result<Self> {
        if let Ok(value) = env::var(HOME_ENV) {
            if !value.trim().is_empty() {
                return Ok(Self::with_root(PathBuf::from(value)));
            }
        }
        let home = dirs::home_dir().ok_or(TrackerError::HomeDirNotFound)?;
        Ok(Self::with_root(home.join(ROOT_DIR_NAME)))
    }

    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory for tickclock data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Store Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to store.json (primary key-value store).
    pub fn store_file(&self) -> PathBuf {
        self.root.join("store.json")
    }

    /// Path to store-fallback.json (used when the primary store fails).
    pub fn fallback_store_file(&self) -> PathBuf {
        self.root.join("store-fallback.json")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Runtime Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to board.json (latest board snapshot written by the page bridge).
    pub fn board_snapshot_file(&self) -> PathBuf {
        self.root.join("board.json")
    }

    /// Path to config.toml (tracker settings).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the daemon's Unix socket.
    pub fn socket_file(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    /// Path to the exports/ directory (CSV reports).
    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    /// Path to the logs/ directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directory Creation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Ensures the root directory and standard subdirectories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)?;
        fs_err::create_dir_all(self.exports_dir())?;
        fs_err::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_with_root_sets_custom_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/test-tickclock"));
        assert_eq!(config.root(), Path::new("/tmp/test-tickclock"));
    }

    #[test]
    fn test_store_file_paths() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/tickclock"));
        assert_eq!(config.store_file(), PathBuf::from("/tmp/tickclock/store.json"));
        assert_eq!(
            config.fallback_store_file(),
            PathBuf::from("/tmp/tickclock/store-fallback.json")
        );
    }

    #[test]
    fn test_runtime_file_paths() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/tickclock"));
        assert_eq!(
            config.board_snapshot_file(),
            PathBuf::from("/tmp/tickclock/board.json")
        );
        assert_eq!(config.config_file(), PathBuf::from("/tmp/tickclock/config.toml"));
        assert_eq!(config.socket_file(), PathBuf::from("/tmp/tickclock/daemon.sock"));
    }

    #[test]
    fn test_ensure_dirs_creates_structure() {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig::with_root(temp.path().join("root"));

        config.ensure_dirs().unwrap();

        assert!(config.root().exists());
        assert!(config.exports_dir().exists());
        assert!(config.logs_dir().exists());
    }
}
