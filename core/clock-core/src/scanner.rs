//! Board scanning.
//!
//! A [`BoardScanner`] produces a [`BoardSnapshot`]: the board's columns in
//! order, each with its label and cards. The core never reads the host page
//! itself; the page bridge writes `board.json` and [`SnapshotFileScanner`]
//! picks it up, while tests feed a [`StaticScanner`].
//!
//! ```json
//! {
//!   "columns": [
//!     { "label": "Novo", "cards": [ { "itemId": "T1", "title": "Fix login", "owner": "Ana" } ] },
//!     { "label": null, "cards": [] }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::phase_ledger::normalize_phase;

pub trait BoardScanner: Send {
    fn scan(&self) -> Result<BoardSnapshot>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    #[serde(default)]
    pub columns: Vec<BoardColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardColumn {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub cards: Vec<BoardCard>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardCard {
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub secondary_owner: Option<String>,
}

/// A card with a resolved id, placed in a canonical phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub item_id: String,
    pub phase: String,
    pub title: Option<String>,
    pub owner: Option<String>,
    pub secondary_owner: Option<String>,
}

impl BoardSnapshot {
    pub fn column(label: &str, cards: Vec<BoardCard>) -> BoardColumn {
        BoardColumn {
            label: Some(label.to_string()),
            cards,
        }
    }

    /// Resolves every card into a sighting. Columns without a usable label
    /// are named `FASE_<index>`; cards without an id are skipped. Returns the
    /// sightings and the number of skipped cards.
    pub fn sightings(&self) -> (Vec<Sighting>, usize) {
        let mut sightings = Vec::new();
        let mut skipped = 0;

        for (index, column) in self.columns.iter().enumerate() {
            let phase = match column.label.as_deref().map(normalize_phase) {
                Some(phase) if !phase.is_empty() => phase,
                _ => {
                    let fallback = format!("FASE_{}", index);
                    tracing::warn!(column = index, phase = %fallback, "Column label missing; using index name");
                    fallback
                }
            };

            for card in &column.cards {
                let Some(item_id) = card.item_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) else {
                    tracing::warn!(column = index, phase = %phase, "Skipping card without an id");
                    skipped += 1;
                    continue;
                };
                sightings.push(Sighting {
                    item_id: item_id.to_string(),
                    phase: phase.clone(),
                    title: non_blank(&card.title),
                    owner: non_blank(&card.owner),
                    secondary_owner: non_blank(&card.secondary_owner),
                });
            }
        }

        (sightings, skipped)
    }
}

impl BoardCard {
    pub fn new(item_id: &str, title: &str) -> Self {
        Self {
            item_id: Some(item_id.to_string()),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// ─────────────────────────────────────────────────────────────────────────────
// Implementations
// ─────────────────────────────────────────────────────────────────────────────

/// Returns whatever board it was last given.
#[derive(Debug, Default)]
pub struct StaticScanner {
    board: Mutex<BoardSnapshot>,
}

impl StaticScanner {
    pub fn new(board: BoardSnapshot) -> Self {
        Self {
            board: Mutex::new(board),
        }
    }

    pub fn set(&self, board: BoardSnapshot) {
        *self.board.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = board;
    }
}

impl BoardScanner for StaticScanner {
    fn scan(&self) -> Result<BoardSnapshot> {
        Ok(self
            .board
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}

impl<T: BoardScanner + Sync> BoardScanner for std::sync::Arc<T> {
    fn scan(&self) -> Result<BoardSnapshot> {
        (**self).scan()
    }
}

/// Reads the board snapshot file written by the page bridge.
///
/// A missing file means the board has not been seen yet (empty board). A
/// file that cannot be parsed fails the scan so the cycle is skipped rather
/// than treating every card as gone.
#[derive(Debug, Clone)]
pub struct SnapshotFileScanner {
    path: PathBuf,
}

impl SnapshotFileScanner {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl BoardScanner for SnapshotFileScanner {
    fn scan(&self) -> Result<BoardSnapshot> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No board snapshot yet");
            return Ok(BoardSnapshot::default());
        }
        let content = fs_err::read_to_string(&self.path)
            .map_err(|err| TrackerError::io("read board snapshot", err))?;
        if content.trim().is_empty() {
            return Ok(BoardSnapshot::default());
        }
        serde_json::from_str(&content).map_err(|err| {
            TrackerError::ScanFailed(format!("{}: {}", self.path.display(), err))
        })
    }
}
