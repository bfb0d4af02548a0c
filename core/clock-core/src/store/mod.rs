//! Key-value persistence.
//!
//! Every ledger persists through a [`KeyValueStore`]: string keys, whole JSON
//! values, no field-level updates. Writing a key replaces its previous value
//! entirely, so a ledger always writes the complete mapping it owns.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process map, used by tests and as a last resort
//! - [`JsonFileStore`]: one JSON document on disk, atomic temp-file writes
//! - [`FallbackStore`]: ordered chain; a failing backend hands over to the next
//!
//! # Keys
//!
//! The key names are shared with the board overlay, so they stay camelCase.

mod chain;
mod file;
mod memory;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

pub use chain::FallbackStore;
pub use file::JsonFileStore;
pub use memory::MemoryStore;

pub mod keys {
    pub const TICKET_TIMERS: &str = "ticketTimers";
    pub const ACTIVE_TICKET: &str = "activeTicket";
    pub const TIMER_START_TIME: &str = "timerStartTime";
    pub const TICKET_TITLES: &str = "ticketTitles";
    pub const PHASE_TIMERS: &str = "phaseTimers";
    pub const CURRENT_PHASES: &str = "currentPhases";
    pub const LAST_PHASE_CHANGE: &str = "lastPhaseChange";
    pub const COLOR_SETTINGS: &str = "colorSettings";

    /// Keys owned by the time ledger.
    pub const TIME_KEYS: &[&str] = &[TICKET_TIMERS, ACTIVE_TICKET, TIMER_START_TIME, TICKET_TITLES];
    /// Keys owned by the phase ledger.
    pub const PHASE_KEYS: &[&str] = &[PHASE_TIMERS, CURRENT_PHASES, LAST_PHASE_CHANGE];
    /// Both ledgers' keys, the ones a full refresh re-reads.
    pub const LEDGER_KEYS: &[&str] = &[
        TICKET_TIMERS,
        ACTIVE_TICKET,
        TIMER_START_TIME,
        TICKET_TITLES,
        PHASE_TIMERS,
        CURRENT_PHASES,
        LAST_PHASE_CHANGE,
    ];
}

pub trait KeyValueStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Returns the values present for `keys`. Absent keys are simply missing
    /// from the map.
    fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>>;

    /// Writes every entry, replacing whole values.
    fn set(&self, entries: Vec<(String, Value)>) -> Result<()>;
}

/// Reads one typed value out of a `get` result. Missing keys and `null` give
/// the default; a value of the wrong shape is logged and also gives the
/// default, so one corrupt key never blocks loading the rest.
pub(crate) fn read_value<T>(values: &BTreeMap<String, Value>, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match values.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => match serde_json::from_value::<T>(value.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(key, error = %err, "Ignoring malformed store value");
                T::default()
            }
        },
    }
}

/// Reads a keyed map entry by entry. An entry `convert` rejects is logged and
/// dropped on its own; the rest of the map still loads.
pub(crate) fn read_map_with<T, F>(values: &BTreeMap<String, Value>, key: &str, convert: F) -> BTreeMap<String, T>
where
    F: Fn(&Value) -> Option<T>,
{
    let raw: BTreeMap<String, Value> = read_value(values, key);
    raw.into_iter()
        .filter_map(|(entry_key, value)| match convert(&value) {
            Some(parsed) => Some((entry_key, parsed)),
            None => {
                tracing::warn!(key, entry = %entry_key, value = %value, "Skipping malformed store entry");
                None
            }
        })
        .collect()
}

/// [`read_map_with`] using the value's serde representation.
pub(crate) fn read_map<T: DeserializeOwned>(values: &BTreeMap<String, Value>, key: &str) -> BTreeMap<String, T> {
    read_map_with(values, key, |value| serde_json::from_value(value.clone()).ok())
}

/// A stored second count. Fractions are floored and negatives clamp to 0;
/// anything that is not a number is rejected.
pub(crate) fn seconds_value(value: &Value) -> Option<u64> {
    if let Some(secs) = value.as_u64() {
        return Some(secs);
    }
    match value.as_f64() {
        Some(secs) if secs.is_finite() => Some(if secs > 0.0 { secs.floor() as u64 } else { 0 }),
        _ => None,
    }
}

/// Serializes a value for `set`. Serialization of the ledger maps cannot fail
/// in practice; if it does, the key is written as `null` and logged.
pub(crate) fn entry<T: Serialize>(key: &str, value: &T) -> (String, Value) {
    let value = serde_json::to_value(value).unwrap_or_else(|err| {
        tracing::warn!(key, error = %err, "Failed to serialize store value");
        Value::Null
    });
    (key.to_string(), value)
}

/// Best-effort write used by the ledgers: errors are logged, never returned.
pub(crate) fn persist(store: &dyn KeyValueStore, entries: Vec<(String, Value)>) {
    let keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
    if let Err(err) = store.set(entries) {
        tracing::warn!(
            backend = store.name(),
            keys = ?keys,
            error = %err,
            "Failed to persist ledger state"
        );
    }
}

/// Best-effort read used by the ledgers.
pub(crate) fn load(store: &dyn KeyValueStore, keys: &[&str]) -> BTreeMap<String, Value> {
    match store.get(keys) {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!(
                backend = store.name(),
                error = %err,
                "Failed to load ledger state; starting empty"
            );
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_value_defaults_on_missing_null_and_malformed() {
        let mut values = BTreeMap::new();
        values.insert("null".to_string(), Value::Null);
        values.insert("bad".to_string(), json!("not a map"));
        values.insert("good".to_string(), json!({"T1": 5}));

        let missing: BTreeMap<String, u64> = read_value(&values, "missing");
        let null: BTreeMap<String, u64> = read_value(&values, "null");
        let bad: BTreeMap<String, u64> = read_value(&values, "bad");
        let good: BTreeMap<String, u64> = read_value(&values, "good");

        assert!(missing.is_empty());
        assert!(null.is_empty());
        assert!(bad.is_empty());
        assert_eq!(good.get("T1"), Some(&5));
    }

    #[test]
    fn read_map_drops_only_bad_entries() {
        let mut values = BTreeMap::new();
        values.insert(
            "timers".to_string(),
            json!({"T1": 3600, "T2": 12.5, "T3": -40, "T4": "soon", "T5": null}),
        );
        values.insert("titles".to_string(), json!({"T1": "One", "T2": 7}));

        let timers = read_map_with(&values, "timers", seconds_value);
        let titles: BTreeMap<String, String> = read_map(&values, "titles");

        assert_eq!(
            timers,
            BTreeMap::from([("T1".to_string(), 3600), ("T2".to_string(), 12), ("T3".to_string(), 0)])
        );
        assert_eq!(titles, BTreeMap::from([("T1".to_string(), "One".to_string())]));
        assert!(read_map::<String>(&values, "missing").is_empty());
    }
}
