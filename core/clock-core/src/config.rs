//! Tracker settings loaded from `config.toml`.
//!
//! Every field has a default, so a missing file or a partial file both work.
//! A malformed file is reported to the caller; `load_or_default` logs it and
//! falls back to defaults so the daemon still starts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

/// Thirty days: elapsed times at or beyond this are treated as clock anomalies.
pub const DEFAULT_MAX_ELAPSED_SECS: i64 = 86_400 * 30;

/// Column names of the board the overlay was built for, in board order.
pub const DEFAULT_KNOWN_PHASES: &[&str] = &[
    "NOVO",
    "TRIAGEM",
    "BACKLOG",
    "DESCOBERTA E IDEAÇÃO",
    "DESENVOLVIMENTO",
    "PREENCHIMENTO DE RFP",
    "VALIDAÇÃO INICIAL",
    "APRESENTAÇÃO",
    "REFINAMENTO E CONSOLIDAÇÃO",
    "IMPEDIDOS",
    "ENTREGUES",
    "DISPENSADOS",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Board scan period.
    pub scan_interval_secs: u64,
    /// Display refresh period while a session runs.
    pub tick_interval_ms: u64,
    /// Upper bound for a single elapsed measurement.
    pub max_elapsed_secs: i64,
    /// Pause the running session when its item changes column.
    pub pause_on_phase_change: bool,
    /// Phases exported first (and always) in CSV reports.
    pub known_phases: Vec<String>,
    /// Report file name prefix: `<prefix>-YYYY-MM-DD.csv`.
    pub export_prefix: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            tick_interval_ms: 1000,
            max_elapsed_secs: DEFAULT_MAX_ELAPSED_SECS,
            pause_on_phase_change: true,
            known_phases: DEFAULT_KNOWN_PHASES.iter().map(|p| p.to_string()).collect(),
            export_prefix: "timeMyTicket".to_string(),
        }
    }
}

impl TrackerConfig {
    /// Reads the config file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs_err::read_to_string(path)
            .map_err(|err| TrackerError::io(format!("read {}", path.display()), err))?;
        toml::from_str::<TrackerConfig>(&content).map_err(|err| TrackerError::ConfigMalformed {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load tracker config; using defaults");
                Self::default()
            }
        }
    }
}
