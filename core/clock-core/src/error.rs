//! Error types for tickclock-core operations.
//!
//! Ledger operations never return these: caller mistakes come back as `false`
//! or `None`. `TrackerError` only crosses the store, scanner and config
//! boundaries, where the caller decides whether to log and carry on.

use std::path::PathBuf;

/// All errors that can occur at the edges of tickclock-core.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    // ─────────────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Store unavailable: {backend}: {reason}")]
    StoreUnavailable { backend: String, reason: String },

    #[error("Every store backend failed; last error: {last}")]
    AllBackendsFailed { last: String },

    #[error("Store value for {key} has an unexpected shape: {source}")]
    StoreValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Scanner Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Board scan failed: {0}")]
    ScanFailed(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TrackerError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TrackerError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        TrackerError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using TrackerError.
pub type Result<T> = std::result::Result<T, TrackerError>;

// Conversion for string error compatibility at binary edges
impl From<TrackerError> for String {
    fn from(err: TrackerError) -> String {
        err.to_string()
    }
}
