//! File logging for the CLI.
//!
//! Stdout belongs to command output, so diagnostics go to a daily rolling file
//! under the tickclock logs directory. `TICKCLOCK_DEBUG_LOG=1` forces debug level.

use std::env;

use tickclock_core::StorageConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_LOG_ENV: &str = "TICKCLOCK_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "tickclock-cli.log";

/// Installs the subscriber. Keep the guard alive until exit so buffered lines flush.
pub fn init() -> Option<WorkerGuard> {
    let storage = StorageConfig::from_env().ok()?;
    let logs_dir = storage.logs_dir();
    fs_err::create_dir_all(&logs_dir).ok()?;

    let appender = tracing_appender::rolling::daily(&logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;

    Some(guard)
}

fn debug_enabled() -> bool {
    env::var(DEBUG_LOG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}
