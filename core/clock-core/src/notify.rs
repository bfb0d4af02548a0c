//! User-facing output of the coordinator: short notices (toasts) and the
//! live session display (badge).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use crate::format::{badge_text, format_hours_minutes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    TimerStarted { item_id: String },
    TimerPaused { item_id: String, elapsed_secs: u64 },
    TimeAdded { item_id: String, phase: Option<String>, seconds: u64 },
    TimerReset { item_id: String, title: Option<String> },
    PhaseChanged { item_id: String, from: String, to: String },
    AllReset,
}

impl Notice {
    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::TimerStarted { .. } | Notice::TimeAdded { .. } | Notice::TimerReset { .. } => {
                NoticeLevel::Success
            }
            Notice::TimerPaused { .. } | Notice::PhaseChanged { .. } => NoticeLevel::Info,
            Notice::AllReset => NoticeLevel::Warning,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::TimerStarted { .. } => write!(f, "Timer started"),
            Notice::TimerPaused { .. } => write!(f, "Timer paused"),
            Notice::TimeAdded {
                phase: Some(phase),
                seconds,
                ..
            } => write!(f, "{} added to phase \"{}\"", format_hours_minutes(*seconds), phase),
            Notice::TimeAdded { seconds, .. } => write!(f, "{} added", format_hours_minutes(*seconds)),
            Notice::TimerReset {
                title: Some(title), ..
            } => write!(f, "Timer for \"{}\" was reset", title),
            Notice::TimerReset { item_id, .. } => write!(f, "Timer for #{} was reset", item_id),
            Notice::PhaseChanged { to, .. } => write!(f, "Item moved to \"{}\"", to),
            Notice::AllReset => write!(f, "All timers were reset"),
        }
    }
}

pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log. Used when no UI surface is attached.
#[derive(Debug, Default)]
pub struct LogNotices;

impl NoticeSink for LogNotices {
    fn notify(&self, notice: Notice) {
        tracing::info!(notice_level = ?notice.level(), notice = ?notice, "{}", notice);
    }
}

/// Keeps the most recent notices for surfaces that poll (and for tests).
#[derive(Debug)]
pub struct RecentNotices {
    capacity: usize,
    notices: Mutex<VecDeque<Notice>>,
}

impl RecentNotices {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            notices: Mutex::new(VecDeque::new()),
        }
    }

    pub fn take(&self) -> Vec<Notice> {
        self.lock().drain(..).collect()
    }

    pub fn snapshot(&self) -> Vec<Notice> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Notice>> {
        self.notices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RecentNotices {
    fn default() -> Self {
        Self::new(50)
    }
}

impl NoticeSink for RecentNotices {
    fn notify(&self, notice: Notice) {
        let mut notices = self.lock();
        if notices.len() == self.capacity {
            notices.pop_front();
        }
        notices.push_back(notice);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Live display
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    pub item_id: String,
    pub total_secs: u64,
    /// `MM:SS`
    pub badge: String,
    pub title_line: String,
}

impl DisplayFrame {
    pub fn new(item_id: &str, title: Option<&str>, total_secs: u64) -> Self {
        let badge = badge_text(total_secs);
        let label = title
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", item_id));
        Self {
            item_id: item_id.to_string(),
            total_secs,
            title_line: format!("Timer running: {} - {}", label, badge),
            badge,
        }
    }
}

/// Receives the live total of the running session once per tick.
pub trait DisplaySink: Send + Sync {
    fn render(&self, frame: DisplayFrame);
    fn clear(&self);
}

/// Tracks the latest frame; the daemon exposes it through the timer state.
#[derive(Debug, Default)]
pub struct LatestFrame {
    frame: Mutex<Option<DisplayFrame>>,
}

impl LatestFrame {
    pub fn get(&self) -> Option<DisplayFrame> {
        self.frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DisplaySink for LatestFrame {
    fn render(&self, frame: DisplayFrame) {
        tracing::trace!(item_id = %frame.item_id, badge = %frame.badge, "Display tick");
        *self.frame.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame);
    }

    fn clear(&self) {
        *self.frame.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
