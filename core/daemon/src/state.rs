//! State owned by the daemon.
//!
//! One coordinator serves every client. Connection threads and the scan loop
//! share it through a mutex; the coordinator itself is single-threaded.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tickclock_core::{
    Coordinator, CoordinatorDeps, FallbackStore, JsonFileStore, KeyValueStore, LatestFrame,
    LogNotices, MemoryStore, ScanSummary, SnapshotFileScanner, StorageConfig, SyncBus,
    SystemClock, TrackerConfig,
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub scans: u64,
    pub failures: u64,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_cards: usize,
}

pub struct SharedState {
    storage: StorageConfig,
    config: TrackerConfig,
    started_at: DateTime<Utc>,
    display: Arc<LatestFrame>,
    coordinator: Mutex<Coordinator>,
    scan_stats: Mutex<ScanStats>,
}

impl SharedState {
    pub fn new(storage: StorageConfig, config: TrackerConfig) -> Self {
        let display = Arc::new(LatestFrame::default());
        let coordinator = Coordinator::new(CoordinatorDeps {
            store: build_store(&storage),
            clock: Arc::new(SystemClock),
            scanner: Box::new(SnapshotFileScanner::new(&storage.board_snapshot_file())),
            bus: SyncBus::new(),
            notices: Arc::new(LogNotices),
            display: display.clone(),
            config: config.clone(),
        });

        Self {
            storage,
            config,
            started_at: Utc::now(),
            display,
            coordinator: Mutex::new(coordinator),
            scan_stats: Mutex::new(ScanStats::default()),
        }
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn display(&self) -> &LatestFrame {
        &self.display
    }

    pub fn coordinator(&self) -> MutexGuard<'_, Coordinator> {
        self.coordinator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Scans the board and records the outcome for the health endpoint.
    pub fn run_scan(&self, reason: &str) -> Result<ScanSummary, String> {
        let result = {
            let mut coordinator = self.coordinator();
            coordinator.poll_sync();
            coordinator.scan()
        };

        let mut stats = self
            .scan_stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stats.scans += 1;
        stats.last_scan_at = Some(Utc::now());
        match result {
            Ok(summary) => {
                stats.last_cards = summary.cards;
                stats.last_error = None;
                tracing::debug!(reason, cards = summary.cards, "Scan finished");
                Ok(summary)
            }
            Err(err) => {
                stats.failures += 1;
                stats.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn scan_stats(&self) -> ScanStats {
        self.scan_stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Primary file, then the fallback file, then memory so the daemon keeps
/// counting even when the disk is unusable.
fn build_store(storage: &StorageConfig) -> Arc<dyn KeyValueStore> {
    Arc::new(FallbackStore::new(vec![
        Arc::new(JsonFileStore::new("primary", &storage.store_file())),
        Arc::new(JsonFileStore::new("fallback", &storage.fallback_store_file())),
        Arc::new(MemoryStore::new()),
    ]))
}
