//! Per-item time totals and the single active session.
//!
//! The time ledger is the only writer of item totals. It owns four store keys
//! (`ticketTimers`, `activeTicket`, `timerStartTime`, `ticketTitles`) and
//! rewrites all of them after every mutation.
//!
//! # Invariants
//!
//! - At most one session runs at a time; `start` pauses any other item first.
//! - Totals only grow, except through `reset`/`reset_all`.
//! - If a session exists, its item has a total (possibly 0).
//! - Elapsed measurements that are negative or at/over the anomaly bound are
//!   discarded, never accounted.
//!
//! Caller mistakes (empty ids, non-positive seconds) return `false`/`None`.
//! Store failures are logged and the in-memory state stays authoritative.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{classify_elapsed, elapsed_secs, Clock, Elapsed};
use crate::store::{self, keys, KeyValueStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub item_id: String,
    pub started_at: DateTime<Utc>,
}

/// Result of committing a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PausedSession {
    pub item_id: String,
    /// Seconds added by this pause (0 when the measurement was an anomaly).
    pub elapsed_secs: u64,
    /// Item total after the pause.
    pub total_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub item_id: String,
    /// The item that was running before and got paused to make room.
    pub paused: Option<PausedSession>,
    /// The item was already the active one; nothing changed.
    pub already_running: bool,
}

/// Full copy of the ledger state, for comparisons and views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSnapshot {
    pub totals: BTreeMap<String, u64>,
    pub titles: BTreeMap<String, String>,
    pub active: Option<ActiveSession>,
}

pub struct TimeLedger {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_elapsed_secs: i64,
    totals: BTreeMap<String, u64>,
    titles: BTreeMap<String, String>,
    active: Option<ActiveSession>,
}

impl TimeLedger {
    /// Creates a ledger and loads whatever the store already holds.
    pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, max_elapsed_secs: i64) -> Self {
        let mut ledger = Self {
            store,
            clock,
            max_elapsed_secs,
            totals: BTreeMap::new(),
            titles: BTreeMap::new(),
            active: None,
        };
        ledger.reload();
        ledger
    }

    /// Replaces the in-memory state with a full re-read of the store.
    pub fn reload(&mut self) {
        let values = store::load(self.store.as_ref(), keys::TIME_KEYS);

        self.totals = store::read_map_with(&values, keys::TICKET_TIMERS, store::seconds_value);
        self.titles = store::read_map(&values, keys::TICKET_TITLES);

        let active_item: Option<String> = store::read_value(&values, keys::ACTIVE_TICKET);
        let started_at: Option<DateTime<Utc>> = store::read_value(&values, keys::TIMER_START_TIME);

        self.active = match (active_item, started_at) {
            (Some(item_id), Some(started_at)) if !item_id.trim().is_empty() => {
                self.totals.entry(item_id.clone()).or_insert(0);
                Some(ActiveSession { item_id, started_at })
            }
            (Some(item_id), None) => {
                tracing::warn!(item_id = %item_id, "Active item without start time; dropping session");
                None
            }
            _ => None,
        };
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts a session for `item_id`, pausing any other running item first.
    ///
    /// Returns `None` for an empty id. Starting the item that is already
    /// running keeps its session and reports `already_running`.
    pub fn start(&mut self, item_id: &str, title: Option<&str>) -> Option<StartOutcome> {
        if item_id.trim().is_empty() {
            return None;
        }

        let title_changed = title.map_or(false, |title| self.record_title(item_id, title));

        if let Some(active) = &self.active {
            if active.item_id == item_id {
                if title_changed {
                    self.persist();
                }
                return Some(StartOutcome {
                    item_id: item_id.to_string(),
                    paused: None,
                    already_running: true,
                });
            }
        }

        let paused = self.commit_active();
        let now = self.clock.now();
        self.totals.entry(item_id.to_string()).or_insert(0);
        self.active = Some(ActiveSession {
            item_id: item_id.to_string(),
            started_at: now,
        });
        self.persist();

        tracing::info!(item_id = %item_id, started_at = %now, "Timer started");
        Some(StartOutcome {
            item_id: item_id.to_string(),
            paused,
            already_running: false,
        })
    }

    /// Commits the running session into its item's total.
    pub fn pause(&mut self) -> Option<PausedSession> {
        let paused = self.commit_active()?;
        self.persist();
        Some(paused)
    }

    pub fn add_manual_time(&mut self, item_id: &str, seconds: i64) -> bool {
        if item_id.trim().is_empty() || seconds <= 0 {
            return false;
        }
        let total = self.totals.entry(item_id.to_string()).or_insert(0);
        *total = total.saturating_add(seconds as u64);
        let total = *total;
        self.persist();
        tracing::info!(item_id = %item_id, seconds, total_secs = total, "Time added");
        true
    }

    /// Deletes an item's total and title. A running session for the item is
    /// dropped without accounting.
    pub fn reset(&mut self, item_id: &str) -> bool {
        if item_id.trim().is_empty() {
            return false;
        }
        if self.is_active(item_id) {
            self.active = None;
        }
        self.totals.remove(item_id);
        self.titles.remove(item_id);
        self.persist();
        tracing::info!(item_id = %item_id, "Timer reset");
        true
    }

    pub fn reset_all(&mut self) {
        self.totals.clear();
        self.titles.clear();
        self.active = None;
        self.persist();
        tracing::info!("All timers reset");
    }

    /// Records titles seen on the board. Persists only when something changed.
    pub fn record_titles<I>(&mut self, titles: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let changed = titles
            .into_iter()
            .filter(|(item_id, title)| !item_id.trim().is_empty() && self.record_title(item_id, title))
            .count();
        if changed > 0 {
            self.persist();
        }
        changed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    pub fn is_active(&self, item_id: &str) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| active.item_id == item_id)
    }

    /// Stored total, excluding any live session.
    pub fn total(&self, item_id: &str) -> u64 {
        self.totals.get(item_id).copied().unwrap_or(0)
    }

    pub fn totals(&self) -> &BTreeMap<String, u64> {
        &self.totals
    }

    pub fn title(&self, item_id: &str) -> Option<&str> {
        self.titles.get(item_id).map(String::as_str)
    }

    pub fn titles(&self) -> &BTreeMap<String, String> {
        &self.titles
    }

    /// Seconds elapsed in the running session, 0 when idle or anomalous.
    pub fn live_elapsed(&self) -> u64 {
        self.active
            .as_ref()
            .map_or(0, |active| match self.measure(active.started_at) {
                Elapsed::Valid(secs) => secs,
                Elapsed::Anomaly(_) => 0,
            })
    }

    /// Stored total plus the live session when `item_id` is running.
    pub fn current_elapsed(&self, item_id: &str) -> u64 {
        let stored = self.total(item_id);
        if self.is_active(item_id) {
            stored.saturating_add(self.live_elapsed())
        } else {
            stored
        }
    }

    pub fn snapshot(&self) -> TimeSnapshot {
        TimeSnapshot {
            totals: self.totals.clone(),
            titles: self.titles.clone(),
            active: self.active.clone(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn measure(&self, since: DateTime<Utc>) -> Elapsed {
        classify_elapsed(elapsed_secs(since, self.clock.now()), self.max_elapsed_secs)
    }

    /// Ends the session in memory and adds its elapsed time. Does not persist.
    fn commit_active(&mut self) -> Option<PausedSession> {
        let active = self.active.take()?;
        let elapsed = match self.measure(active.started_at) {
            Elapsed::Valid(secs) => secs,
            Elapsed::Anomaly(secs) => {
                tracing::warn!(
                    item_id = %active.item_id,
                    elapsed_secs = secs,
                    bound_secs = self.max_elapsed_secs,
                    "Discarding anomalous session time"
                );
                0
            }
        };

        let total = self.totals.entry(active.item_id.clone()).or_insert(0);
        *total = total.saturating_add(elapsed);
        let total = *total;

        tracing::info!(
            item_id = %active.item_id,
            elapsed_secs = elapsed,
            total_secs = total,
            "Timer paused"
        );
        Some(PausedSession {
            item_id: active.item_id,
            elapsed_secs: elapsed,
            total_secs: total,
        })
    }

    fn record_title(&mut self, item_id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() || self.titles.get(item_id).map(String::as_str) == Some(title) {
            return false;
        }
        self.titles.insert(item_id.to_string(), title.to_string());
        true
    }

    fn persist(&self) {
        let active_item = self.active.as_ref().map(|active| active.item_id.clone());
        let started_at = self.active.as_ref().map(|active| active.started_at);
        store::persist(
            self.store.as_ref(),
            vec![
                store::entry(keys::TICKET_TIMERS, &self.totals),
                store::entry(keys::ACTIVE_TICKET, &active_item),
                store::entry(keys::TIMER_START_TIME, &started_at),
                store::entry(keys::TICKET_TITLES, &self.titles),
            ],
        );
    }
}
