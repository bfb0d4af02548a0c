//! IPC protocol types and validation for tickclock-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests and to decode state views.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_ITEM_ID_LEN: usize = 128;

/// Command names accepted by the daemon. Serialized in camelCase so the
/// action strings match the ones the board overlay sends (`startTimer`, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub enum Action {
    GetHealth,
    StartTimer,
    PauseTimer,
    AddTimeManually,
    ResetTicketTimer,
    ResetAllTimers,
    GetTimerState,
    SyncData,
    ExportTimerReport,
    RefreshTimers,
    ViewClosed,
    GetColorSettings,
    SetColorSettings,
}

impl Action {
    /// Whether the action changes persisted state (and therefore triggers a
    /// refresh broadcast).
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Action::StartTimer
                | Action::PauseTimer
                | Action::AddTimeManually
                | Action::ResetTicketTimer
                | Action::ResetAllTimers
                | Action::ViewClosed
                | Action::SetColorSettings
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub action: Action,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(action: Action, id: Option<String>, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            action,
            id,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    /// Reply for mutating actions. Caller errors (empty ids, non-positive
    /// seconds) are not protocol errors; they surface as `success: false`.
    pub fn success(id: Option<String>, success: bool) -> Self {
        Self::ok(id, serde_json::json!({ "success": success }))
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }

    /// Reads the `success` flag of a mutating-action reply.
    pub fn succeeded(&self) -> bool {
        self.ok
            && self
                .data
                .as_ref()
                .and_then(|data| data.get("success"))
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Action parameters
// ─────────────────────────────────────────────────────────────────────────────

pub trait Validate {
    fn validate(&self) -> Result<(), ErrorInfo>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartTimerParams {
    pub item_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Validate for StartTimerParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_item_id(&self.item_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddTimeParams {
    pub item_id: String,
    #[serde(default)]
    pub phase: Option<String>,
    pub seconds: i64,
}

impl Validate for AddTimeParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_item_id(&self.item_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResetTimerParams {
    pub item_id: String,
}

impl Validate for ResetTimerParams {
    fn validate(&self) -> Result<(), ErrorInfo> {
        require_item_id(&self.item_id)
    }
}

/// Decodes and validates the params object of a request.
pub fn parse_params<T>(params: Option<Value>) -> Result<T, ErrorInfo>
where
    T: DeserializeOwned + Validate,
{
    let params = params.ok_or_else(|| ErrorInfo::new("invalid_params", "params are required"))?;
    if !params.is_object() {
        return Err(ErrorInfo::new("invalid_params", "params must be an object"));
    }
    let parsed: T = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("params are invalid: {}", err),
        )
    })?;
    parsed.validate()?;
    Ok(parsed)
}

fn require_item_id(item_id: &str) -> Result<(), ErrorInfo> {
    if item_id.trim().is_empty() {
        return Err(ErrorInfo::new("missing_field", "itemId is required"));
    }
    if item_id.len() > MAX_ITEM_ID_LEN {
        return Err(ErrorInfo::new(
            "invalid_item_id",
            format!("itemId must be {} characters or fewer", MAX_ITEM_ID_LEN),
        ));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// State views
// ─────────────────────────────────────────────────────────────────────────────

/// Reply to `getTimerState`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerStateView {
    pub active_item: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds elapsed in the running session (0 when idle).
    pub live_elapsed_secs: u64,
    /// Stored totals; the active item's entry excludes the live session.
    pub totals: BTreeMap<String, u64>,
    pub titles: BTreeMap<String, String>,
    pub phases: BTreeMap<String, PhaseBreakdownView>,
}

impl TimerStateView {
    /// Total for an item including the live session when it is the active one.
    pub fn current_total(&self, item_id: &str) -> u64 {
        let stored = self.totals.get(item_id).copied().unwrap_or(0);
        if self.active_item.as_deref() == Some(item_id) {
            stored + self.live_elapsed_secs
        } else {
            stored
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBreakdownView {
    pub per_phase_secs: BTreeMap<String, u64>,
    pub current_phase: Option<String>,
    pub last_change_at: Option<DateTime<Utc>>,
}

/// Reply to `refreshTimers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummaryView {
    pub cards: usize,
    pub created: usize,
    pub transitions: usize,
    pub skipped: usize,
}

/// Reply to `exportTimerReport`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportView {
    pub file_name: String,
    pub path: String,
    pub rows: usize,
}
