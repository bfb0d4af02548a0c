//! # tickclock-core
//!
//! Time and phase ledgers for a kanban board: one running stopwatch, a total
//! per item, and a per-item breakdown of time spent in each board column,
//! kept consistent across restarts, closed views and re-scans of the board.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Periodic work runs on plain threads.
//! - **Not thread-safe**: Clients provide their own synchronization (`Mutex`).
//! - **Graceful degradation**: Missing or corrupt stored values load as empty, store
//!   failures are logged, and caller mistakes return `false` instead of errors.
//! - **Injected collaborators**: Store, clock, board scanner, notice and display sinks
//!   are traits handed to [`Coordinator::new`], so everything runs without a browser.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickclock_core::*;
//!
//! let mut coordinator = Coordinator::new(CoordinatorDeps { /* ... */ });
//! coordinator.start("T1", Some("Fix login"));
//! coordinator.scan()?;
//! let report = coordinator.export_report();
//! ```

pub mod clock;
pub mod colors;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod format;
pub mod notify;
pub mod phase_ledger;
pub mod scanner;
pub mod storage;
pub mod store;
pub mod sync;
pub mod ticker;
pub mod time_ledger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use colors::{ColorSettings, Highlight, HighlightSource};
pub use config::TrackerConfig;
pub use coordinator::{AuditEntry, Coordinator, CoordinatorDeps, ScanSummary};
pub use error::{Result, TrackerError};
pub use export::{write_report, ExportedReport};
pub use notify::{DisplayFrame, DisplaySink, LatestFrame, LogNotices, Notice, NoticeSink, RecentNotices};
pub use phase_ledger::{normalize_phase, Observation, PhaseLedger, PhaseTransition};
pub use scanner::{BoardCard, BoardColumn, BoardScanner, BoardSnapshot, SnapshotFileScanner, StaticScanner};
pub use storage::StorageConfig;
pub use store::{FallbackStore, JsonFileStore, KeyValueStore, MemoryStore};
pub use sync::{InstanceId, SyncBus};
pub use time_ledger::TimeLedger;
