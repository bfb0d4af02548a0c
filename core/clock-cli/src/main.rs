//! tickclock: command-line client for the tickclock daemon.
//!
//! Every subcommand is one request to the daemon, which owns the ledgers.
//! Output goes to stdout; diagnostics go to the log file.

mod daemon_client;
mod logging;
mod render;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tickclock_daemon_protocol::{Action, TimerStateView};

use daemon_client::DaemonClient;

#[derive(Parser)]
#[command(name = "tickclock")]
#[command(about = "Per-card stopwatch and phase ledger for kanban boards")]
#[command(version)]
struct Cli {
    /// Print raw JSON replies instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start timing an item (pauses whatever was running)
    Start {
        #[arg(value_name = "ITEM")]
        item_id: String,

        /// Card title shown in notices and reports
        #[arg(long)]
        title: Option<String>,
    },

    /// Pause the running timer
    Pause,

    /// Add time to an item by hand (e.g. 90, 15m, 1h30m)
    Add {
        #[arg(value_name = "ITEM")]
        item_id: String,

        #[arg(value_name = "DURATION", allow_hyphen_values = true)]
        duration: String,

        /// Also credit this board phase
        #[arg(long)]
        phase: Option<String>,
    },

    /// Delete an item's total and phase breakdown
    Reset {
        #[arg(value_name = "ITEM")]
        item_id: String,
    },

    /// Delete every timer
    ResetAll {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Show totals, or one item's phase breakdown
    Status {
        #[arg(value_name = "ITEM")]
        item_id: Option<String>,
    },

    /// Write the CSV report to the exports directory
    Export,

    /// Re-scan the board snapshot now
    Refresh,

    /// Reload from the store and notify other views
    Sync,

    /// Commit the running session as if the board view closed
    Close,

    /// Show or replace highlight colors
    Colors {
        /// JSON file with the full color settings to store
        #[arg(long, value_name = "FILE")]
        set: Option<PathBuf>,
    },

    /// Check that the daemon is up
    Health,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "tickclock command failed");
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let client = DaemonClient::from_env()?;
    let json_output = cli.json;

    match cli.command {
        Commands::Start { item_id, title } => {
            let data = client.call(
                Action::StartTimer,
                Some(json!({ "itemId": item_id, "title": title })),
            )?;
            report_success(json_output, &data, &format!("Timer running for {}", item_id))
        }
        Commands::Pause => {
            let data = client.call(Action::PauseTimer, None)?;
            report_success(json_output, &data, "Timer paused")
        }
        Commands::Add {
            item_id,
            duration,
            phase,
        } => {
            let seconds = render::parse_duration(&duration)?;
            let data = client.call(
                Action::AddTimeManually,
                Some(json!({ "itemId": item_id, "phase": phase, "seconds": seconds })),
            )?;
            report_success(
                json_output,
                &data,
                &format!("Added {} to {}", tickclock_core::format::format_hms(seconds.max(0) as u64), item_id),
            )
        }
        Commands::Reset { item_id } => {
            let data = client.call(Action::ResetTicketTimer, Some(json!({ "itemId": item_id })))?;
            report_success(json_output, &data, &format!("Reset {}", item_id))
        }
        Commands::ResetAll { yes } => {
            if !yes {
                return Err("refusing to reset every timer without --yes".to_string());
            }
            let data = client.call(Action::ResetAllTimers, None)?;
            report_success(json_output, &data, "All timers reset")
        }
        Commands::Status { item_id } => {
            let data = client.call(Action::GetTimerState, None)?;
            if json_output {
                return print_json(&data);
            }
            let state: TimerStateView = serde_json::from_value(data)
                .map_err(|err| format!("Unexpected timer state: {}", err))?;
            let lines = match item_id {
                Some(item_id) => render::phase_lines(&state, &item_id),
                None => render::status_lines(&state),
            };
            for line in lines {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Export => {
            let data = client.call(Action::ExportTimerReport, None)?;
            if json_output {
                return print_json(&data);
            }
            println!(
                "Exported {} rows to {}",
                data["rows"].as_u64().unwrap_or(0),
                data["path"].as_str().unwrap_or("?")
            );
            Ok(())
        }
        Commands::Refresh => {
            let data = client.call(Action::RefreshTimers, None)?;
            if json_output {
                return print_json(&data);
            }
            println!(
                "Scanned {} cards: {} new, {} moved, {} skipped",
                data["cards"].as_u64().unwrap_or(0),
                data["created"].as_u64().unwrap_or(0),
                data["transitions"].as_u64().unwrap_or(0),
                data["skipped"].as_u64().unwrap_or(0)
            );
            Ok(())
        }
        Commands::Sync => {
            let data = client.call(Action::SyncData, None)?;
            if json_output {
                return print_json(&data);
            }
            println!(
                "Synced; {} other views notified",
                data["notified"].as_u64().unwrap_or(0)
            );
            Ok(())
        }
        Commands::Close => {
            let data = client.call(Action::ViewClosed, None)?;
            report_success(json_output, &data, "Running session committed")
        }
        Commands::Colors { set: Some(path) } => {
            let raw = fs_err::read_to_string(&path).map_err(|err| err.to_string())?;
            let settings: Value = serde_json::from_str(&raw)
                .map_err(|err| format!("{} is not valid JSON: {}", path.display(), err))?;
            let data = client.call(Action::SetColorSettings, Some(json!({ "settings": settings })))?;
            report_success(json_output, &data, "Color settings saved")
        }
        Commands::Colors { set: None } => {
            let data = client.call(Action::GetColorSettings, None)?;
            print_json(&data)
        }
        Commands::Health => {
            let data = client.call(Action::GetHealth, None)?;
            if json_output {
                return print_json(&data);
            }
            println!(
                "daemon {} (pid {}, protocol {})",
                data["status"].as_str().unwrap_or("unknown"),
                data["pid"],
                data["protocol_version"]
            );
            Ok(())
        }
    }
}

/// Prints `message` when the daemon reports success, otherwise fails with
/// the no-op explanation.
fn report_success(json_output: bool, data: &Value, message: &str) -> Result<(), String> {
    if json_output {
        return print_json(data);
    }
    if data["success"].as_bool().unwrap_or(false) {
        println!("{}", message);
        Ok(())
    } else {
        Err("nothing changed (no matching timer, or a zero duration)".to_string())
    }
}

fn print_json(data: &Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(data).map_err(|err| err.to_string())?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn add_accepts_negative_durations() {
        let cli = Cli::try_parse_from(["tickclock", "add", "T1", "-60"]).unwrap();
        match cli.command {
            Commands::Add { duration, .. } => assert_eq!(duration, "-60"),
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["tickclock", "status", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn failed_action_is_an_error() {
        assert!(report_success(false, &json!({"success": false}), "done").is_err());
        assert!(report_success(false, &json!({"success": true}), "done").is_ok());
    }
}
