//! Coordinator - the entry point each view (or the daemon) talks to.
//!
//! A coordinator owns one time ledger, one phase ledger and the color
//! settings, all backed by the same store. It:
//! - relays commands to both ledgers
//! - reconciles phases from board scans and reacts to phase changes
//! - drives the live display while a session runs
//! - tells other coordinators to reload after every mutation
//!
//! Construct one with [`Coordinator::new`]; there are no globals, so tests can
//! run several coordinators over one shared store and bus.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let mut coordinator = Coordinator::new(deps);
//! coordinator.start("T1", Some("Fix login"));
//! let state = coordinator.timer_state();
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tickclock_daemon_protocol::{PhaseBreakdownView, ScanSummaryView, TimerStateView};

use crate::clock::{classify_elapsed, elapsed_secs, Clock, Elapsed};
use crate::colors::{ColorSettings, Highlight};
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::export::{render_csv, report_file_name, ExportRow, ExportedReport};
use crate::notify::{DisplayFrame, DisplaySink, Notice, NoticeSink};
use crate::phase_ledger::{Observation, PhaseLedger, PhaseTransition};
use crate::scanner::{BoardScanner, Sighting};
use crate::store::{keys, KeyValueStore};
use crate::sync::{InstanceId, SignalKind, SyncBus, SyncEndpoint};
use crate::ticker::Ticker;
use crate::time_ledger::TimeLedger;

const MIN_TICK_MS: u64 = 10;

/// Everything a coordinator needs, injected by the caller.
pub struct CoordinatorDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
    pub scanner: Box<dyn BoardScanner>,
    pub bus: SyncBus,
    pub notices: Arc<dyn NoticeSink>,
    pub display: Arc<dyn DisplaySink>,
    pub config: TrackerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub cards: usize,
    pub created: usize,
    pub skipped: usize,
    pub transitions: Vec<PhaseTransition>,
}

impl From<&ScanSummary> for ScanSummaryView {
    fn from(summary: &ScanSummary) -> Self {
        ScanSummaryView {
            cards: summary.cards,
            created: summary.created,
            transitions: summary.transitions.len(),
            skipped: summary.skipped,
        }
    }
}

/// Total time versus the sum of its phase buckets for one item.
///
/// The two are kept by separate ledgers and can drift apart (manual total
/// edits, time spent in the current phase not yet closed by a transition).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub item_id: String,
    /// Including the live session.
    pub total_secs: u64,
    pub phase_sum_secs: u64,
}

impl AuditEntry {
    /// `total - phase_sum`; negative when the phases claim more time than the total.
    pub fn drift_secs(&self) -> i64 {
        self.total_secs as i64 - self.phase_sum_secs as i64
    }

    pub fn is_consistent(&self) -> bool {
        self.phase_sum_secs <= self.total_secs
    }
}

pub struct Coordinator {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    scanner: Box<dyn BoardScanner>,
    endpoint: SyncEndpoint,
    notices: Arc<dyn NoticeSink>,
    display: Arc<dyn DisplaySink>,
    config: TrackerConfig,
    time: TimeLedger,
    phases: PhaseLedger,
    colors: ColorSettings,
    /// Cards from the latest successful scan, by item id.
    board: BTreeMap<String, Sighting>,
    ticker: Option<Ticker>,
}

impl Coordinator {
    pub fn new(deps: CoordinatorDeps) -> Self {
        let CoordinatorDeps {
            store,
            clock,
            scanner,
            bus,
            notices,
            display,
            config,
        } = deps;

        let time = TimeLedger::load(store.clone(), clock.clone(), config.max_elapsed_secs);
        let phases = PhaseLedger::load(store.clone(), clock.clone(), config.max_elapsed_secs);
        let colors = ColorSettings::load(store.as_ref());
        let endpoint = bus.subscribe();

        tracing::info!(
            instance = %endpoint.id(),
            backend = store.name(),
            items = time.totals().len(),
            active = ?time.active().map(|active| active.item_id.as_str()),
            "Coordinator ready"
        );

        let mut coordinator = Self {
            store,
            clock,
            scanner,
            endpoint,
            notices,
            display,
            config,
            time,
            phases,
            colors,
            board: BTreeMap::new(),
            ticker: None,
        };
        // A session restored from the store keeps running.
        coordinator.sync_display();
        coordinator
    }

    pub fn instance_id(&self) -> InstanceId {
        self.endpoint.id()
    }

    pub fn time(&self) -> &TimeLedger {
        &self.time
    }

    pub fn phases(&self) -> &PhaseLedger {
        &self.phases
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn display_running(&self) -> bool {
        self.ticker.as_ref().map_or(false, Ticker::is_running)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    pub fn start(&mut self, item_id: &str, title: Option<&str>) -> bool {
        let Some(outcome) = self.time.start(item_id, title) else {
            return false;
        };
        if outcome.already_running {
            return true;
        }

        if let Some(paused) = outcome.paused {
            self.notices.notify(Notice::TimerPaused {
                item_id: paused.item_id,
                elapsed_secs: paused.elapsed_secs,
            });
        }
        self.notices.notify(Notice::TimerStarted {
            item_id: outcome.item_id,
        });
        self.sync_display();
        self.broadcast(SignalKind::Refresh, keys::TIME_KEYS);
        true
    }

    /// Commits the running session. Returns whether one was running.
    pub fn pause(&mut self) -> bool {
        let Some(paused) = self.time.pause() else {
            return false;
        };
        self.stop_display();
        self.notices.notify(Notice::TimerPaused {
            item_id: paused.item_id,
            elapsed_secs: paused.elapsed_secs,
        });
        self.broadcast(SignalKind::Refresh, keys::TIME_KEYS);
        true
    }

    /// Forced pause when the view goes away; same accounting as `pause`.
    pub fn close_view(&mut self) -> bool {
        let was_running = self.pause();
        if was_running {
            tracing::info!(instance = %self.instance_id(), "View closed; running session committed");
        }
        was_running
    }

    /// Adds time to an item and, when `phase` is given, to that phase too.
    /// Either both are recorded or neither is.
    pub fn add_time(&mut self, item_id: &str, phase: Option<&str>, seconds: i64) -> bool {
        let phase = phase.map(str::trim).filter(|phase| !phase.is_empty());
        if item_id.trim().is_empty() || seconds <= 0 {
            return false;
        }

        if !self.time.add_manual_time(item_id, seconds) {
            return false;
        }
        let mut changed_keys: Vec<&str> = keys::TIME_KEYS.to_vec();
        if let Some(phase) = phase {
            if !self.phases.add_time_to_phase(item_id, phase, seconds) {
                tracing::warn!(item_id = %item_id, phase = %phase, "Phase time rejected after total was updated");
                return false;
            }
            changed_keys.extend_from_slice(keys::PHASE_KEYS);
        }

        if self.time.is_active(item_id) {
            self.sync_display();
        }
        self.notices.notify(Notice::TimeAdded {
            item_id: item_id.to_string(),
            phase: phase.map(crate::phase_ledger::normalize_phase),
            seconds: seconds as u64,
        });
        self.broadcast(SignalKind::Refresh, &changed_keys);
        true
    }

    /// Adds time to the item's current phase and its total.
    pub fn add_time_to_current_phase(&mut self, item_id: &str, seconds: i64) -> bool {
        match self.phases.current_phase(item_id).map(str::to_string) {
            Some(phase) => self.add_time(item_id, Some(&phase), seconds),
            None => false,
        }
    }

    /// Deletes an item's total, title and phase data.
    pub fn reset(&mut self, item_id: &str) -> bool {
        if item_id.trim().is_empty() {
            return false;
        }
        let was_active = self.time.is_active(item_id);
        let title = self.time.title(item_id).map(str::to_string);

        self.time.reset(item_id);
        self.phases.reset_phases(item_id);
        if was_active {
            self.stop_display();
        }

        self.notices.notify(Notice::TimerReset {
            item_id: item_id.to_string(),
            title,
        });
        self.broadcast(SignalKind::Refresh, keys::LEDGER_KEYS);
        true
    }

    pub fn reset_all(&mut self) {
        self.time.reset_all();
        self.phases.reset_all();
        self.stop_display();
        self.notices.notify(Notice::AllReset);
        self.broadcast(SignalKind::Refresh, keys::LEDGER_KEYS);
    }

    /// Asks every other coordinator to reload. Returns how many were told.
    pub fn sync(&self) -> usize {
        self.broadcast(SignalKind::Refresh, keys::LEDGER_KEYS)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Board reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    /// Scans the board and reconciles every card's phase.
    ///
    /// A scanner failure aborts only this cycle. When the running item moved
    /// and `pause_on_phase_change` is set, its session is paused after the
    /// transition has been accounted.
    pub fn scan(&mut self) -> Result<ScanSummary> {
        let board = self.scanner.scan()?;
        let (sightings, skipped) = board.sightings();

        let mut summary = ScanSummary {
            cards: sightings.len(),
            skipped,
            ..Default::default()
        };
        let mut pause_active = false;

        for sighting in &sightings {
            match self
                .phases
                .observe(&sighting.item_id, &sighting.phase, &mut self.time)
            {
                Observation::Created { .. } => summary.created += 1,
                Observation::Transitioned(transition) => {
                    if self.config.pause_on_phase_change && self.time.is_active(&transition.item_id) {
                        pause_active = true;
                    }
                    self.notices.notify(Notice::PhaseChanged {
                        item_id: transition.item_id.clone(),
                        from: transition.from.clone(),
                        to: transition.to.clone(),
                    });
                    self.broadcast(
                        SignalKind::PhaseChanged {
                            item_id: transition.item_id.clone(),
                            from: transition.from.clone(),
                            to: transition.to.clone(),
                        },
                        keys::PHASE_KEYS,
                    );
                    summary.transitions.push(transition);
                }
                Observation::Unchanged | Observation::Ignored => {}
            }
        }

        let titles_changed = self.time.record_titles(
            sightings
                .iter()
                .filter_map(|s| s.title.clone().map(|title| (s.item_id.clone(), title))),
        );

        let visible: BTreeSet<&str> = sightings.iter().map(|s| s.item_id.as_str()).collect();
        let missing = self
            .phases
            .tracked_items()
            .into_iter()
            .filter(|item_id| !visible.contains(item_id.as_str()))
            .count();
        if missing > 0 {
            tracing::debug!(missing, "Tracked items not visible on the board");
        }

        self.board = sightings
            .into_iter()
            .map(|sighting| (sighting.item_id.clone(), sighting))
            .collect();

        if pause_active {
            tracing::info!("Running item changed phase; pausing");
            self.pause();
        }
        if summary.created > 0 || !summary.transitions.is_empty() || titles_changed > 0 {
            self.broadcast(SignalKind::Refresh, keys::LEDGER_KEYS);
        }

        tracing::debug!(
            cards = summary.cards,
            created = summary.created,
            transitions = summary.transitions.len(),
            skipped = summary.skipped,
            "Board scanned"
        );
        Ok(summary)
    }

    /// Scan on demand (`refreshTimers`).
    pub fn refresh(&mut self) -> Result<ScanSummary> {
        self.scan()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Synchronization
    // ─────────────────────────────────────────────────────────────────────────

    /// Handles pending signals from other coordinators: reloads everything
    /// from the store and brings the display in line. Returns the number of
    /// signals handled.
    pub fn poll_sync(&mut self) -> usize {
        let signals = self.endpoint.drain();
        if signals.is_empty() {
            return 0;
        }

        self.reload();

        for signal in &signals {
            if let SignalKind::PhaseChanged { item_id, from, to } = &signal.kind {
                self.notices.notify(Notice::PhaseChanged {
                    item_id: item_id.clone(),
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }

        tracing::debug!(
            instance = %self.instance_id(),
            signals = signals.len(),
            "Reloaded after sync signal"
        );
        signals.len()
    }

    /// Full re-read of both ledgers and the color settings from the store.
    pub fn reload(&mut self) {
        self.time.reload();
        self.phases.reload();
        self.colors = ColorSettings::load(self.store.as_ref());
        self.sync_display();
    }

    fn broadcast(&self, kind: SignalKind, keys: &[&str]) -> usize {
        self.endpoint.publish(kind, keys)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    pub fn timer_state(&self) -> TimerStateView {
        let active = self.time.active();
        let phases = self
            .phases
            .tracked_items()
            .into_iter()
            .map(|item_id| {
                let breakdown = PhaseBreakdownView::from(self.phases.breakdown(&item_id));
                (item_id, breakdown)
            })
            .collect();

        TimerStateView {
            active_item: active.map(|active| active.item_id.clone()),
            started_at: active.map(|active| active.started_at),
            live_elapsed_secs: self.time.live_elapsed(),
            totals: self.time.totals().clone(),
            titles: self.time.titles().clone(),
            phases,
        }
    }

    pub fn export_report(&self) -> ExportedReport {
        let rows: Vec<ExportRow> = self
            .time
            .totals()
            .keys()
            .map(|item_id| {
                let card = self.board.get(item_id);
                ExportRow {
                    item_id: item_id.clone(),
                    title: self
                        .time
                        .title(item_id)
                        .map(str::to_string)
                        .or_else(|| card.and_then(|card| card.title.clone())),
                    owner: card.and_then(|card| card.owner.clone()),
                    secondary_owner: card.and_then(|card| card.secondary_owner.clone()),
                    status: self.phases.current_phase(item_id).map(str::to_string),
                    total_secs: self.time.current_elapsed(item_id),
                    phase_secs: self.phases.breakdown(item_id).per_phase_secs,
                }
            })
            .collect();

        let date = self.clock.now().with_timezone(&Local).date_naive();
        ExportedReport {
            file_name: report_file_name(&self.config.export_prefix, date),
            csv: render_csv(&self.config.known_phases, &rows),
            rows: rows.len(),
        }
    }

    pub fn audit(&self, item_id: &str) -> AuditEntry {
        AuditEntry {
            item_id: item_id.to_string(),
            total_secs: self.time.current_elapsed(item_id),
            phase_sum_secs: self.phases.breakdown(item_id).total_secs(),
        }
    }

    /// Audit of every item known to either ledger.
    pub fn audit_all(&self) -> Vec<AuditEntry> {
        let items: BTreeSet<String> = self
            .time
            .totals()
            .keys()
            .cloned()
            .chain(self.phases.tracked_items())
            .collect();
        items.iter().map(|item_id| self.audit(item_id)).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Colors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn color_settings(&self) -> &ColorSettings {
        &self.colors
    }

    pub fn update_color_settings(&mut self, settings: ColorSettings) {
        settings.save(self.store.as_ref());
        self.colors = settings;
        self.broadcast(SignalKind::Refresh, &[keys::COLOR_SETTINGS]);
    }

    /// Highlight for an item as last seen on the board.
    pub fn highlight_for(&self, item_id: &str) -> Option<Highlight> {
        let card = self.board.get(item_id);
        let phase = self
            .phases
            .current_phase(item_id)
            .or_else(|| card.map(|card| card.phase.as_str()));
        let owner = card.and_then(|card| card.owner.as_deref());
        self.colors.highlight_for(phase, owner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Display
    // ─────────────────────────────────────────────────────────────────────────

    /// Restarts the display ticker for the current session, or stops it when
    /// nothing runs. Renders once immediately.
    fn sync_display(&mut self) {
        self.cancel_ticker();
        let Some(active) = self.time.active().cloned() else {
            self.display.clear();
            return;
        };

        let base_secs = self.time.total(&active.item_id);
        let title = self.time.title(&active.item_id).map(str::to_string);
        let clock = self.clock.clone();
        let display = self.display.clone();
        let max_elapsed_secs = self.config.max_elapsed_secs;

        let render = move || {
            let live = match classify_elapsed(elapsed_secs(active.started_at, clock.now()), max_elapsed_secs) {
                Elapsed::Valid(secs) => secs,
                Elapsed::Anomaly(_) => 0,
            };
            display.render(DisplayFrame::new(
                &active.item_id,
                title.as_deref(),
                base_secs + live,
            ));
        };
        render();

        let interval = Duration::from_millis(self.config.tick_interval_ms.max(MIN_TICK_MS));
        self.ticker = Some(Ticker::spawn("tickclock-display", interval, render));
    }

    fn stop_display(&mut self) {
        self.cancel_ticker();
        self.display.clear();
    }

    fn cancel_ticker(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::{LatestFrame, RecentNotices};
    use crate::scanner::{BoardCard, BoardSnapshot, StaticScanner};
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    struct Fixture {
        clock: ManualClock,
        scanner: Arc<StaticScanner>,
        notices: Arc<RecentNotices>,
        display: Arc<LatestFrame>,
        coordinator: Coordinator,
    }

    fn setup() -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap());
        let scanner = Arc::new(StaticScanner::default());
        let notices = Arc::new(RecentNotices::default());
        let display = Arc::new(LatestFrame::default());
        let coordinator = Coordinator::new(CoordinatorDeps {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(clock.clone()),
            scanner: Box::new(scanner.clone()),
            bus: SyncBus::new(),
            notices: notices.clone(),
            display: display.clone(),
            config: TrackerConfig {
                tick_interval_ms: 60_000,
                ..Default::default()
            },
        });
        Fixture {
            clock,
            scanner,
            notices,
            display,
            coordinator,
        }
    }

    fn board(columns: &[(&str, &[&str])]) -> BoardSnapshot {
        BoardSnapshot {
            columns: columns
                .iter()
                .map(|(label, ids)| {
                    BoardSnapshot::column(
                        label,
                        ids.iter().map(|id| BoardCard::new(id, &format!("Title {}", id))).collect(),
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn start_renders_display_and_pause_clears_it() {
        let mut f = setup();
        assert!(f.coordinator.start("T1", Some("One")));
        assert!(f.coordinator.display_running());
        assert_eq!(f.display.get().unwrap().badge, "00:00");

        f.clock.advance_secs(65);
        assert!(f.coordinator.pause());
        assert!(!f.coordinator.display_running());
        assert!(f.display.get().is_none());
        assert!(!f.coordinator.pause());
    }

    #[test]
    fn start_notices_implicit_pause() {
        let mut f = setup();
        f.coordinator.start("T1", None);
        f.clock.advance_secs(10);
        f.notices.take();

        f.coordinator.start("T2", None);

        assert_eq!(
            f.notices.take(),
            vec![
                Notice::TimerPaused {
                    item_id: "T1".to_string(),
                    elapsed_secs: 10
                },
                Notice::TimerStarted {
                    item_id: "T2".to_string()
                },
            ]
        );
    }

    #[test]
    fn add_time_with_phase_updates_both_ledgers() {
        let mut f = setup();
        assert!(f.coordinator.add_time("T1", Some("novo"), 120));
        assert_eq!(f.coordinator.time().total("T1"), 120);
        assert_eq!(f.coordinator.phases().breakdown("T1").per_phase_secs["NOVO"], 120);

        assert!(f.coordinator.add_time("T1", Some("  "), 30));
        assert_eq!(f.coordinator.time().total("T1"), 150);

        assert!(!f.coordinator.add_time("T1", Some("NOVO"), 0));
        assert!(!f.coordinator.add_time("", None, 10));
    }

    #[test]
    fn add_time_to_current_phase_needs_a_phase() {
        let mut f = setup();
        assert!(!f.coordinator.add_time_to_current_phase("T1", 30));

        f.scanner.set(board(&[("Novo", &["T1"])]));
        f.coordinator.scan().unwrap();

        assert!(f.coordinator.add_time_to_current_phase("T1", 30));
        assert_eq!(f.coordinator.audit("T1").phase_sum_secs, 30);
    }

    #[test]
    fn reset_clears_time_and_phases() {
        let mut f = setup();
        f.scanner.set(board(&[("Novo", &["T1"])]));
        f.coordinator.scan().unwrap();
        f.coordinator.start("T1", Some("One"));
        f.clock.advance_secs(30);

        assert!(f.coordinator.reset("T1"));

        let state = f.coordinator.timer_state();
        assert!(state.active_item.is_none());
        assert!(state.totals.is_empty());
        assert!(state.phases.is_empty());
        assert!(!f.coordinator.display_running());
        assert!(!f.coordinator.reset(""));
    }

    #[test]
    fn phase_change_of_running_item_pauses_it() {
        let mut f = setup();
        f.scanner.set(board(&[("Novo", &["T1"])]));
        f.coordinator.scan().unwrap();
        f.coordinator.start("T1", None);
        f.clock.advance_secs(45);

        f.scanner.set(board(&[("Novo", &[]), ("Backlog", &["T1"])]));
        let summary = f.coordinator.scan().unwrap();

        assert_eq!(summary.transitions.len(), 1);
        assert!(f.coordinator.time().active().is_none());
        assert_eq!(f.coordinator.time().total("T1"), 45);
        assert_eq!(f.coordinator.phases().breakdown("T1").per_phase_secs["NOVO"], 45);
        assert!(f.notices.snapshot().contains(&Notice::PhaseChanged {
            item_id: "T1".to_string(),
            from: "NOVO".to_string(),
            to: "BACKLOG".to_string(),
        }));
    }

    #[test]
    fn phase_change_keeps_session_when_configured() {
        let mut f = setup();
        f.coordinator.config.pause_on_phase_change = false;
        f.scanner.set(board(&[("Novo", &["T1"])]));
        f.coordinator.scan().unwrap();
        f.coordinator.start("T1", None);
        f.clock.advance_secs(45);

        f.scanner.set(board(&[("Backlog", &["T1"])]));
        f.coordinator.scan().unwrap();

        assert!(f.coordinator.time().is_active("T1"));
        assert_eq!(f.coordinator.time().total("T1"), 0);
        assert_eq!(f.coordinator.time().current_elapsed("T1"), 45);
    }

    #[test]
    fn scan_records_titles_and_counts_skipped_cards() {
        let mut f = setup();
        let mut snapshot = board(&[("Novo", &["T1"])]);
        snapshot.columns[0].cards.push(BoardCard::default());
        f.scanner.set(snapshot);

        let summary = f.coordinator.scan().unwrap();

        assert_eq!(summary.cards, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(f.coordinator.time().title("T1"), Some("Title T1"));
        assert_eq!(ScanSummaryView::from(&summary).created, 1);
    }

    #[test]
    fn export_includes_live_session_and_board_info() {
        let mut f = setup();
        let mut snapshot = board(&[("Novo", &["T1"])]);
        snapshot.columns[0].cards[0].owner = Some("Ana".to_string());
        f.scanner.set(snapshot);
        f.coordinator.scan().unwrap();
        f.coordinator.start("T1", None);
        f.clock.advance_secs(65);

        let report = f.coordinator.export_report();

        assert_eq!(report.rows, 1);
        assert!(report.file_name.starts_with("timeMyTicket-"));
        let row = report.csv.lines().nth(1).unwrap();
        assert!(row.starts_with("T1,\"Title T1\",\"Ana\",\"\",\"NOVO\",00:01:05,"));
    }

    #[test]
    fn audit_reports_drift() {
        let mut f = setup();
        f.coordinator.add_time("T1", None, 100);
        f.coordinator.add_time("T1", Some("NOVO"), 20);

        let entry = f.coordinator.audit("T1");
        assert_eq!(entry.total_secs, 120);
        assert_eq!(entry.phase_sum_secs, 20);
        assert_eq!(entry.drift_secs(), 100);
        assert!(entry.is_consistent());
        assert_eq!(f.coordinator.audit_all().len(), 1);
    }

    #[test]
    fn highlight_uses_board_lane_and_owner() {
        let mut f = setup();
        let mut snapshot = board(&[("Entregues", &["T1"]), ("Novo", &["T2"])]);
        snapshot.columns[1].cards[0].owner = Some("ana.souza@example.com".to_string());
        f.scanner.set(snapshot);
        f.coordinator.scan().unwrap();

        let mut settings = f.coordinator.color_settings().clone();
        settings.custom_owners.insert("Ana".to_string(), "#123456".to_string());
        f.coordinator.update_color_settings(settings);

        assert_eq!(f.coordinator.highlight_for("T1").unwrap().color, "#00bda5");
        assert_eq!(f.coordinator.highlight_for("T2").unwrap().color, "#123456");
        assert!(f.coordinator.highlight_for("T9").is_none());
    }
}
