//! tickclock daemon entrypoint.
//!
//! The long-lived process that owns the ledgers: a socket listener with
//! strict request validation, one coordinator behind a mutex, and a scan loop
//! that reconciles the board snapshot on a fixed interval.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use serde_json::Value;
use tickclock_core::{write_report, ColorSettings, StorageConfig, TrackerConfig};
use tickclock_daemon_protocol::{
    parse_params, Action, AddTimeParams, ErrorInfo, ExportView, Request, ResetTimerParams,
    Response, ScanSummaryView, StartTimerParams, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

mod state;

use state::SharedState;

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;
const DEBUG_LOG_ENV: &str = "TICKCLOCK_DEBUG_LOG";

fn main() {
    init_logging();

    let storage = match StorageConfig::from_env() {
        Ok(storage) => storage,
        Err(err) => {
            error!(error = %err, "Failed to resolve tickclock storage root");
            std::process::exit(1);
        }
    };

    if let Err(err) = storage.ensure_dirs() {
        error!(error = %err, root = %storage.root().display(), "Failed to create storage directories");
        std::process::exit(1);
    }

    let socket_path = storage.socket_file();
    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let config = TrackerConfig::load_or_default(&storage.config_file());
    let shared_state = Arc::new(SharedState::new(storage, config));
    info!(
        root = %shared_state.storage().root().display(),
        scan_interval_secs = shared_state.config().scan_interval_secs,
        pause_on_phase_change = shared_state.config().pause_on_phase_change,
        "Tracker config loaded"
    );

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "tickclock daemon started");

    spawn_scan_loop(Arc::clone(&shared_state));

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&shared_state);
                thread::spawn(|| handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn spawn_scan_loop(state: Arc<SharedState>) {
    let interval = Duration::from_secs(state.config().scan_interval_secs.max(1));
    thread::spawn(move || loop {
        if let Err(err) = state.run_scan("periodic") {
            warn!(error = %err, "Periodic board scan failed");
        }
        thread::sleep(interval);
    });
}

fn init_logging() {
    let debug_enabled = env::var(DEBUG_LOG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<SharedState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(action = ?request.action, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => {
            if buffer[index + 1..].iter().any(|b| !b.is_ascii_whitespace()) {
                warn!("Extra bytes detected after newline; ignoring trailing data");
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, state: &SharedState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    let Request {
        action, id, params, ..
    } = request;

    match action {
        Action::GetHealth => health(id, state),
        Action::StartTimer => {
            let params: StartTimerParams = match parse_params(params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            let started = state
                .coordinator()
                .start(&params.item_id, params.title.as_deref());
            Response::success(id, started)
        }
        Action::PauseTimer => Response::success(id, state.coordinator().pause()),
        Action::AddTimeManually => {
            let params: AddTimeParams = match parse_params(params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            let added = state.coordinator().add_time(
                &params.item_id,
                params.phase.as_deref(),
                params.seconds,
            );
            Response::success(id, added)
        }
        Action::ResetTicketTimer => {
            let params: ResetTimerParams = match parse_params(params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(id, err),
            };
            Response::success(id, state.coordinator().reset(&params.item_id))
        }
        Action::ResetAllTimers => {
            state.coordinator().reset_all();
            Response::success(id, true)
        }
        Action::ViewClosed => Response::success(id, state.coordinator().close_view()),
        Action::GetTimerState => {
            let view = state.coordinator().timer_state();
            to_response(id, &view, "timer state")
        }
        Action::SyncData => {
            let mut coordinator = state.coordinator();
            coordinator.reload();
            let notified = coordinator.sync();
            Response::ok(
                id,
                serde_json::json!({ "success": true, "notified": notified }),
            )
        }
        Action::RefreshTimers => match state.run_scan("requested") {
            Ok(summary) => to_response(id, &ScanSummaryView::from(&summary), "scan summary"),
            Err(err) => Response::error(id, "scan_error", format!("Board scan failed: {}", err)),
        },
        Action::ExportTimerReport => {
            let report = state.coordinator().export_report();
            match write_report(&state.storage().exports_dir(), &report) {
                Ok(path) => {
                    let view = ExportView {
                        file_name: report.file_name,
                        path: path.to_string_lossy().to_string(),
                        rows: report.rows,
                    };
                    to_response(id, &view, "export")
                }
                Err(err) => Response::error(
                    id,
                    "export_error",
                    format!("Failed to write report: {}", err),
                ),
            }
        }
        Action::GetColorSettings => {
            let settings = state.coordinator().color_settings().clone();
            to_response(id, &settings, "color settings")
        }
        Action::SetColorSettings => {
            let settings = match parse_color_settings(params) {
                Ok(settings) => settings,
                Err(err) => return Response::error_with_info(id, err),
            };
            state.coordinator().update_color_settings(settings);
            Response::success(id, true)
        }
    }
}

fn health(id: Option<String>, state: &SharedState) -> Response {
    let (active_item, instance) = {
        let coordinator = state.coordinator();
        (
            coordinator
                .time()
                .active()
                .map(|active| active.item_id.clone()),
            coordinator.instance_id().to_string(),
        )
    };

    let mut data = serde_json::json!({
        "status": "ok",
        "pid": std::process::id(),
        "version": env!("CARGO_PKG_VERSION"),
        "protocol_version": PROTOCOL_VERSION,
        "instance": instance,
        "root": state.storage().root().to_string_lossy(),
        "started_at": state.started_at().to_rfc3339(),
        "scan_interval_secs": state.config().scan_interval_secs,
        "active_item": active_item,
    });
    if let Ok(value) = serde_json::to_value(state.scan_stats()) {
        data["scan"] = value;
    }
    if let Some(frame) = state.display().get() {
        data["badge"] = Value::String(frame.badge);
    }
    Response::ok(id, data)
}

fn parse_color_settings(params: Option<Value>) -> Result<ColorSettings, ErrorInfo> {
    let settings = params
        .as_ref()
        .and_then(|params| params.get("settings"))
        .cloned()
        .ok_or_else(|| ErrorInfo::new("missing_field", "settings is required"))?;
    serde_json::from_value(settings).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("settings are invalid: {}", err),
        )
    })
}

fn to_response<T: serde::Serialize>(id: Option<String>, value: &T, what: &str) -> Response {
    match serde_json::to_value(value) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize {}: {}", what, err),
        ),
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
