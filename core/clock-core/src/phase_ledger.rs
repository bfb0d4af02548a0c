//! Per-item phase tracking: the column an item sits in, when it got there,
//! and how long it spent in each column before.
//!
//! Owns `phaseTimers`, `currentPhases` and `lastPhaseChange`. Phase names are
//! canonical everywhere (see [`normalize_phase`]).
//!
//! # Transition Accounting
//!
//! When an item is seen in a new column, the time since its last change goes
//! to the bucket of the column it left. If the item is not the one being
//! timed, the same seconds are added to its total through the time ledger,
//! so untracked items still accumulate time from board movement alone. The
//! running item's total is left to its session.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tickclock_daemon_protocol::PhaseBreakdownView;

use crate::clock::{classify_elapsed, elapsed_secs, Clock, Elapsed};
use crate::store::{self, keys, KeyValueStore};
use crate::time_ledger::TimeLedger;

/// Canonical form of a column label: trimmed, inner whitespace collapsed to
/// single spaces, uppercased. `"  em   Progresso "` becomes `"EM PROGRESSO"`.
pub fn normalize_phase(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTransition {
    pub item_id: String,
    pub from: String,
    pub to: String,
    /// Seconds credited to `from` (0 when the measurement was discarded).
    pub accounted_secs: u64,
    /// Whether the accounted seconds were also added to the item total.
    pub added_to_total: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// First sighting; no time is credited retroactively.
    Created { phase: String },
    Unchanged,
    Transitioned(PhaseTransition),
    /// Empty id or label.
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseBreakdown {
    pub per_phase_secs: BTreeMap<String, u64>,
    pub current_phase: Option<String>,
    pub last_change_at: Option<DateTime<Utc>>,
}

impl PhaseBreakdown {
    pub fn total_secs(&self) -> u64 {
        self.per_phase_secs
            .values()
            .fold(0u64, |total, secs| total.saturating_add(*secs))
    }
}

impl From<PhaseBreakdown> for PhaseBreakdownView {
    fn from(breakdown: PhaseBreakdown) -> Self {
        PhaseBreakdownView {
            per_phase_secs: breakdown.per_phase_secs,
            current_phase: breakdown.current_phase,
            last_change_at: breakdown.last_change_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseSnapshot {
    pub phase_secs: BTreeMap<String, BTreeMap<String, u64>>,
    pub current: BTreeMap<String, String>,
    pub last_change: BTreeMap<String, DateTime<Utc>>,
}

pub struct PhaseLedger {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_elapsed_secs: i64,
    phase_secs: BTreeMap<String, BTreeMap<String, u64>>,
    current: BTreeMap<String, String>,
    last_change: BTreeMap<String, DateTime<Utc>>,
}

impl PhaseLedger {
    pub fn load(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, max_elapsed_secs: i64) -> Self {
        let mut ledger = Self {
            store,
            clock,
            max_elapsed_secs,
            phase_secs: BTreeMap::new(),
            current: BTreeMap::new(),
            last_change: BTreeMap::new(),
        };
        ledger.reload();
        ledger
    }

    /// Full re-read of the phase keys. Legacy non-canonical phase names are
    /// merged into their canonical bucket and written back.
    pub fn reload(&mut self) {
        let values = store::load(self.store.as_ref(), keys::PHASE_KEYS);

        let raw_secs = store::read_map_with(&values, keys::PHASE_TIMERS, phase_buckets);
        let raw_current: BTreeMap<String, String> = store::read_map(&values, keys::CURRENT_PHASES);
        self.last_change = store::read_map(&values, keys::LAST_PHASE_CHANGE);

        let mut merged = 0usize;
        self.phase_secs = raw_secs
            .into_iter()
            .map(|(item_id, buckets)| {
                let mut canonical: BTreeMap<String, u64> = BTreeMap::new();
                for (phase, secs) in buckets {
                    let name = normalize_phase(&phase);
                    if name.is_empty() {
                        continue;
                    }
                    if name != phase {
                        merged += 1;
                    }
                    let bucket = canonical.entry(name).or_insert(0);
                    *bucket = bucket.saturating_add(secs);
                }
                (item_id, canonical)
            })
            .collect();

        self.current = raw_current
            .into_iter()
            .filter_map(|(item_id, phase)| {
                let name = normalize_phase(&phase);
                if name != phase {
                    merged += 1;
                }
                (!name.is_empty()).then_some((item_id, name))
            })
            .collect();

        if merged > 0 {
            tracing::info!(merged, "Merged legacy phase names into canonical form");
            self.persist();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Detection
    // ─────────────────────────────────────────────────────────────────────────

    /// Records that `item_id` was seen in the column labelled `phase_label`.
    pub fn observe(&mut self, item_id: &str, phase_label: &str, time: &mut TimeLedger) -> Observation {
        let phase = normalize_phase(phase_label);
        if item_id.trim().is_empty() || phase.is_empty() {
            return Observation::Ignored;
        }

        let previous = match self.current.get(item_id) {
            None => {
                let now = self.clock.now();
                self.current.insert(item_id.to_string(), phase.clone());
                self.last_change.insert(item_id.to_string(), now);
                self.persist();
                tracing::debug!(item_id = %item_id, phase = %phase, "Phase recorded");
                return Observation::Created { phase };
            }
            Some(current) if *current == phase => return Observation::Unchanged,
            Some(current) => current.clone(),
        };

        Observation::Transitioned(self.transition(item_id, previous, phase, time))
    }

    fn transition(&mut self, item_id: &str, from: String, to: String, time: &mut TimeLedger) -> PhaseTransition {
        let now = self.clock.now();
        let measured = self
            .last_change
            .get(item_id)
            .map(|since| classify_elapsed(elapsed_secs(*since, now), self.max_elapsed_secs));

        let accounted_secs = match measured {
            Some(Elapsed::Valid(secs)) if secs > 0 => secs,
            Some(Elapsed::Valid(_)) => 0,
            Some(Elapsed::Anomaly(secs)) => {
                tracing::warn!(
                    item_id = %item_id,
                    from = %from,
                    elapsed_secs = secs,
                    "Discarding anomalous phase time"
                );
                0
            }
            None => {
                tracing::warn!(item_id = %item_id, from = %from, "No phase change timestamp; nothing to account");
                0
            }
        };

        if accounted_secs > 0 {
            let bucket = self
                .phase_secs
                .entry(item_id.to_string())
                .or_default()
                .entry(from.clone())
                .or_insert(0);
            *bucket = bucket.saturating_add(accounted_secs);
        }

        let added_to_total = accounted_secs > 0
            && !time.is_active(item_id)
            && time.add_manual_time(item_id, accounted_secs as i64);

        self.current.insert(item_id.to_string(), to.clone());
        self.last_change.insert(item_id.to_string(), now);
        self.persist();

        tracing::info!(
            item_id = %item_id,
            from = %from,
            to = %to,
            accounted_secs,
            added_to_total,
            "Phase changed"
        );
        PhaseTransition {
            item_id: item_id.to_string(),
            from,
            to,
            accounted_secs,
            added_to_total,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Manual edits
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_time_to_phase(&mut self, item_id: &str, phase: &str, seconds: i64) -> bool {
        let phase = normalize_phase(phase);
        if item_id.trim().is_empty() || phase.is_empty() || seconds <= 0 {
            return false;
        }
        let bucket = self
            .phase_secs
            .entry(item_id.to_string())
            .or_default()
            .entry(phase.clone())
            .or_insert(0);
        *bucket = bucket.saturating_add(seconds as u64);
        self.persist();
        tracing::info!(item_id = %item_id, phase = %phase, seconds, "Phase time added");
        true
    }

    pub fn add_time_to_current_phase(&mut self, item_id: &str, seconds: i64) -> bool {
        match self.current.get(item_id).cloned() {
            Some(phase) => self.add_time_to_phase(item_id, &phase, seconds),
            None => false,
        }
    }

    pub fn reset_phases(&mut self, item_id: &str) -> bool {
        if item_id.trim().is_empty() {
            return false;
        }
        self.phase_secs.remove(item_id);
        self.current.remove(item_id);
        self.last_change.remove(item_id);
        self.persist();
        true
    }

    pub fn reset_all(&mut self) {
        self.phase_secs.clear();
        self.current.clear();
        self.last_change.clear();
        self.persist();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn current_phase(&self, item_id: &str) -> Option<&str> {
        self.current.get(item_id).map(String::as_str)
    }

    pub fn breakdown(&self, item_id: &str) -> PhaseBreakdown {
        PhaseBreakdown {
            per_phase_secs: self.phase_secs.get(item_id).cloned().unwrap_or_default(),
            current_phase: self.current.get(item_id).cloned(),
            last_change_at: self.last_change.get(item_id).copied(),
        }
    }

    /// Every item with any phase data.
    pub fn tracked_items(&self) -> BTreeSet<String> {
        self.phase_secs
            .keys()
            .chain(self.current.keys())
            .cloned()
            .collect()
    }

    /// Every phase name present in a breakdown or as a current phase.
    pub fn known_phases(&self) -> BTreeSet<String> {
        self.phase_secs
            .values()
            .flat_map(|buckets| buckets.keys())
            .chain(self.current.values())
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> PhaseSnapshot {
        PhaseSnapshot {
            phase_secs: self.phase_secs.clone(),
            current: self.current.clone(),
            last_change: self.last_change.clone(),
        }
    }

    fn persist(&self) {
        store::persist(
            self.store.as_ref(),
            vec![
                store::entry(keys::PHASE_TIMERS, &self.phase_secs),
                store::entry(keys::CURRENT_PHASES, &self.current),
                store::entry(keys::LAST_PHASE_CHANGE, &self.last_change),
            ],
        );
    }
}

/// One item's stored buckets. Unreadable bucket values are dropped so the
/// item's other phases survive.
fn phase_buckets(value: &Value) -> Option<BTreeMap<String, u64>> {
    let buckets = value.as_object()?;
    Some(
        buckets
            .iter()
            .filter_map(|(phase, secs)| match store::seconds_value(secs) {
                Some(secs) => Some((phase.clone(), secs)),
                None => {
                    tracing::warn!(phase = %phase, value = %secs, "Skipping malformed phase bucket");
                    None
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::DEFAULT_MAX_ELAPSED_SECS;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    struct Fixture {
        clock: ManualClock,
        store: Arc<MemoryStore>,
        time: TimeLedger,
        phases: PhaseLedger,
    }

    fn setup() -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap());
        let store = Arc::new(MemoryStore::new());
        let time = TimeLedger::load(store.clone(), Arc::new(clock.clone()), DEFAULT_MAX_ELAPSED_SECS);
        let phases = PhaseLedger::load(store.clone(), Arc::new(clock.clone()), DEFAULT_MAX_ELAPSED_SECS);
        Fixture {
            clock,
            store,
            time,
            phases,
        }
    }

    #[test]
    fn normalizes_labels() {
        assert_eq!(normalize_phase("  em   Progresso "), "EM PROGRESSO");
        assert_eq!(normalize_phase("Novo"), "NOVO");
        assert_eq!(normalize_phase("\t\n"), "");
    }

    #[test]
    fn first_sighting_credits_nothing() {
        let mut f = setup();
        let observation = f.phases.observe("T1", "Novo", &mut f.time);
        assert_eq!(observation, Observation::Created { phase: "NOVO".to_string() });
        assert_eq!(f.phases.breakdown("T1").total_secs(), 0);
        assert_eq!(f.time.total("T1"), 0);
    }

    #[test]
    fn repeated_phase_keeps_timestamp() {
        let mut f = setup();
        f.phases.observe("T4", "NOVO", &mut f.time);
        let first = f.phases.breakdown("T4").last_change_at;
        f.clock.advance_secs(300);

        assert_eq!(f.phases.observe("T4", "novo ", &mut f.time), Observation::Unchanged);
        assert_eq!(f.phases.breakdown("T4").last_change_at, first);
    }

    #[test]
    fn transition_credits_previous_phase_and_idle_total() {
        let mut f = setup();
        f.phases.observe("T1", "NOVO", &mut f.time);
        f.clock.advance_secs(120);

        let Observation::Transitioned(transition) = f.phases.observe("T1", "Backlog", &mut f.time) else {
            panic!("expected a transition");
        };

        assert_eq!(transition.from, "NOVO");
        assert_eq!(transition.to, "BACKLOG");
        assert_eq!(transition.accounted_secs, 120);
        assert!(transition.added_to_total);
        assert_eq!(f.phases.breakdown("T1").per_phase_secs["NOVO"], 120);
        assert_eq!(f.time.total("T1"), 120);
        assert_eq!(f.phases.current_phase("T1"), Some("BACKLOG"));
    }

    #[test]
    fn transition_leaves_active_total_to_its_session() {
        let mut f = setup();
        f.phases.observe("T1", "NOVO", &mut f.time);
        f.time.start("T1", None);
        f.clock.advance_secs(60);

        let Observation::Transitioned(transition) = f.phases.observe("T1", "TRIAGEM", &mut f.time) else {
            panic!("expected a transition");
        };

        assert!(!transition.added_to_total);
        assert_eq!(f.time.total("T1"), 0);
        assert_eq!(f.phases.breakdown("T1").per_phase_secs["NOVO"], 60);
    }

    #[test]
    fn anomalous_transition_is_not_accounted() {
        let mut f = setup();
        f.phases.observe("T1", "NOVO", &mut f.time);
        f.clock.advance_secs(DEFAULT_MAX_ELAPSED_SECS + 10);

        let Observation::Transitioned(transition) = f.phases.observe("T1", "TRIAGEM", &mut f.time) else {
            panic!("expected a transition");
        };

        assert_eq!(transition.accounted_secs, 0);
        assert!(f.phases.breakdown("T1").per_phase_secs.is_empty());
        assert_eq!(f.time.total("T1"), 0);
        assert_eq!(f.phases.current_phase("T1"), Some("TRIAGEM"));
    }

    #[test]
    fn ignores_blank_input() {
        let mut f = setup();
        assert_eq!(f.phases.observe("", "NOVO", &mut f.time), Observation::Ignored);
        assert_eq!(f.phases.observe("T1", "  ", &mut f.time), Observation::Ignored);
        assert!(f.phases.tracked_items().is_empty());
    }

    #[test]
    fn manual_phase_time_validates_input() {
        let mut f = setup();
        assert!(!f.phases.add_time_to_phase("T1", "", 10));
        assert!(!f.phases.add_time_to_phase("T1", "NOVO", 0));
        assert!(!f.phases.add_time_to_current_phase("T1", 10));

        assert!(f.phases.add_time_to_phase("T1", "novo", 10));
        f.phases.observe("T1", "Novo", &mut f.time);
        assert!(f.phases.add_time_to_current_phase("T1", 5));
        assert_eq!(f.phases.breakdown("T1").per_phase_secs["NOVO"], 15);
    }

    #[test]
    fn reset_removes_item_phase_state() {
        let mut f = setup();
        f.phases.observe("T1", "NOVO", &mut f.time);
        f.phases.add_time_to_phase("T1", "NOVO", 10);
        f.phases.observe("T2", "NOVO", &mut f.time);

        assert!(f.phases.reset_phases("T1"));
        assert_eq!(f.phases.breakdown("T1"), PhaseBreakdown::default());
        assert_eq!(f.phases.tracked_items().len(), 1);

        f.phases.reset_all();
        assert_eq!(f.phases.snapshot(), PhaseSnapshot::default());
    }

    #[test]
    fn legacy_phase_names_are_merged_on_load() {
        let f = setup();
        f.store
            .set(vec![
                (
                    keys::PHASE_TIMERS.to_string(),
                    json!({"T1": {"Novo": 10, "NOVO": 5, " backlog ": 7}}),
                ),
                (keys::CURRENT_PHASES.to_string(), json!({"T1": "Backlog"})),
            ])
            .unwrap();

        let phases = PhaseLedger::load(f.store.clone(), Arc::new(f.clock.clone()), DEFAULT_MAX_ELAPSED_SECS);

        let breakdown = phases.breakdown("T1");
        assert_eq!(breakdown.per_phase_secs["NOVO"], 15);
        assert_eq!(breakdown.per_phase_secs["BACKLOG"], 7);
        assert_eq!(breakdown.current_phase.as_deref(), Some("BACKLOG"));
        assert_eq!(f.store.dump()[keys::CURRENT_PHASES], json!({"T1": "BACKLOG"}));
    }

    #[test]
    fn malformed_phase_entries_are_skipped_individually() {
        let f = setup();
        f.store
            .set(vec![
                (
                    keys::PHASE_TIMERS.to_string(),
                    json!({"T1": {"NOVO": 60, "BACKLOG": 2.9, "DONE": "x"}, "T2": "garbage", "T3": {"NOVO": 5}}),
                ),
                (keys::CURRENT_PHASES.to_string(), json!({"T1": "NOVO", "T2": 4})),
                (
                    keys::LAST_PHASE_CHANGE.to_string(),
                    json!({"T1": "2026-01-05T09:00:00Z", "T3": "yesterday"}),
                ),
            ])
            .unwrap();

        let phases = PhaseLedger::load(f.store.clone(), Arc::new(f.clock.clone()), DEFAULT_MAX_ELAPSED_SECS);

        let first = phases.breakdown("T1");
        assert_eq!(first.per_phase_secs, BTreeMap::from([("BACKLOG".to_string(), 2), ("NOVO".to_string(), 60)]));
        assert_eq!(first.current_phase.as_deref(), Some("NOVO"));
        assert!(first.last_change_at.is_some());
        assert!(phases.breakdown("T2").per_phase_secs.is_empty());
        assert_eq!(phases.breakdown("T3").per_phase_secs["NOVO"], 5);
        assert!(phases.breakdown("T3").last_change_at.is_none());
    }

    #[test]
    fn legacy_merge_saturates_instead_of_overflowing() {
        let f = setup();
        f.store
            .set(vec![(
                keys::PHASE_TIMERS.to_string(),
                json!({"T1": {"Novo": u64::MAX, "NOVO": 10}}),
            )])
            .unwrap();

        let phases = PhaseLedger::load(f.store.clone(), Arc::new(f.clock.clone()), DEFAULT_MAX_ELAPSED_SECS);

        assert_eq!(phases.breakdown("T1").per_phase_secs["NOVO"], u64::MAX);
        assert_eq!(phases.breakdown("T1").total_secs(), u64::MAX);
    }

    #[test]
    fn state_survives_reload() {
        let mut f = setup();
        f.phases.observe("T1", "NOVO", &mut f.time);
        f.clock.advance_secs(30);
        f.phases.observe("T1", "BACKLOG", &mut f.time);

        let reloaded = PhaseLedger::load(f.store.clone(), Arc::new(f.clock.clone()), DEFAULT_MAX_ELAPSED_SECS);
        assert_eq!(reloaded.snapshot(), f.phases.snapshot());
        assert!(reloaded.known_phases().contains("NOVO"));
        assert!(reloaded.known_phases().contains("BACKLOG"));
    }
}
