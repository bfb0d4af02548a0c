//! CSV time report.
//!
//! ```text
//! ItemID,Title,Owner,SecondaryOwner,Status,TotalTime,NOVO,BACKLOG,...
//! T1,"Fix login","Ana","Bia","BACKLOG",00:01:05,00:00:40,00:00:25
//! ```
//!
//! Free-text cells are quoted with commas and quotes replaced by spaces so
//! the file opens cleanly in spreadsheet tools without a CSV parser.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{Result, TrackerError};
use crate::format::format_hms;
use crate::phase_ledger::normalize_phase;

const FIXED_HEADER: &str = "ItemID,Title,Owner,SecondaryOwner,Status,TotalTime";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRow {
    pub item_id: String,
    pub title: Option<String>,
    pub owner: Option<String>,
    pub secondary_owner: Option<String>,
    /// Current phase.
    pub status: Option<String>,
    /// Including the live session.
    pub total_secs: u64,
    pub phase_secs: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedReport {
    pub file_name: String,
    pub csv: String,
    pub rows: usize,
}

pub fn report_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}.csv", prefix, date.format("%Y-%m-%d"))
}

/// Phase columns: `known` first in the given order, then every other phase
/// recorded for any row, sorted.
pub fn phase_columns(known: &[String], rows: &[ExportRow]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for phase in known.iter().map(|phase| normalize_phase(phase)) {
        if !phase.is_empty() && !columns.contains(&phase) {
            columns.push(phase);
        }
    }
    let extra: BTreeSet<&String> = rows
        .iter()
        .flat_map(|row| row.phase_secs.keys())
        .filter(|phase| !columns.contains(*phase))
        .collect();
    columns.extend(extra.into_iter().cloned());
    columns
}

pub fn render_csv(known_phases: &[String], rows: &[ExportRow]) -> String {
    let columns = phase_columns(known_phases, rows);

    let mut csv = String::from(FIXED_HEADER);
    for phase in &columns {
        csv.push(',');
        csv.push_str(&sanitize(phase));
    }
    csv.push('\n');

    for row in rows {
        csv.push_str(&sanitize(&row.item_id));
        for text in [&row.title, &row.owner, &row.secondary_owner, &row.status] {
            csv.push_str(",\"");
            csv.push_str(&sanitize(text.as_deref().unwrap_or("")));
            csv.push('"');
        }
        csv.push(',');
        csv.push_str(&format_hms(row.total_secs));
        for phase in &columns {
            csv.push(',');
            csv.push_str(&format_hms(row.phase_secs.get(phase).copied().unwrap_or(0)));
        }
        csv.push('\n');
    }
    csv
}

/// Writes the report into `dir` (created if missing) and returns its path.
/// An existing report of the same name is replaced atomically.
pub fn write_report(dir: &Path, report: &ExportedReport) -> Result<PathBuf> {
    fs_err::create_dir_all(dir).map_err(|err| TrackerError::io("create export directory", err))?;
    let path = dir.join(&report.file_name);

    let mut temp_file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|err| TrackerError::io("create temp report file", err))?;
    temp_file
        .write_all(report.csv.as_bytes())
        .map_err(|err| TrackerError::io("write report", err))?;
    temp_file
        .flush()
        .map_err(|err| TrackerError::io("flush report", err))?;
    temp_file
        .persist(&path)
        .map_err(|err| TrackerError::io("replace report", err.error))?;
    tracing::info!(path = %path.display(), rows = report.rows, "Report exported");
    Ok(path)
}

fn sanitize(text: &str) -> String {
    text.replace([',', '"', '\n', '\r'], " ")
}
