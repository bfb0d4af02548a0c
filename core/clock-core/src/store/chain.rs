//! Ordered chain of store backends.
//!
//! Writes go to the first backend that accepts them. Each backend also keeps
//! a `storeWriteStamps` map recording when the chain last wrote every key
//! there. Reads ask every backend and take each key from the copy with the
//! newest stamp, so a value written to a fallback during an outage still
//! wins over the primary's older copy once the primary is back. Unstamped
//! copies rank oldest, and ties go to the earlier backend. Only when every
//! backend errors is an error returned.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;

use super::KeyValueStore;
use crate::error::{Result, TrackerError};

const WRITE_STAMPS_KEY: &str = "storeWriteStamps";

pub struct FallbackStore {
    backends: Vec<Arc<dyn KeyValueStore>>,
    // Highest stamp issued or seen; new stamps always exceed it.
    last_stamp: AtomicI64,
    // Serializes the stamp read-modify-write within this process.
    write_lock: Mutex<()>,
}

impl FallbackStore {
    pub fn new(backends: Vec<Arc<dyn KeyValueStore>>) -> Self {
        Self {
            backends,
            last_stamp: AtomicI64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Millisecond wall-clock stamp, bumped past anything already seen so a
    /// clock step backwards cannot reorder writes.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now.max(previous.saturating_add(1))
    }

    fn observe_stamp(&self, stamp: i64) {
        self.last_stamp.fetch_max(stamp, Ordering::SeqCst);
    }
}

/// Pulls the stamp map out of a backend's `get` result.
fn take_stamps(values: &mut BTreeMap<String, Value>) -> BTreeMap<String, i64> {
    values
        .remove(WRITE_STAMPS_KEY)
        .and_then(|stamps| serde_json::from_value(stamps).ok())
        .unwrap_or_default()
}

impl KeyValueStore for FallbackStore {
    fn name(&self) -> &str {
        "fallback-chain"
    }

    fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>> {
        let mut query: Vec<&str> = keys.iter().copied().filter(|key| *key != WRITE_STAMPS_KEY).collect();
        let wanted = query.len();
        query.push(WRITE_STAMPS_KEY);

        let mut found: BTreeMap<String, (i64, Value)> = BTreeMap::new();
        let mut last_error = None;
        let mut any_ok = false;

        for backend in &self.backends {
            match backend.get(&query) {
                Ok(mut values) => {
                    any_ok = true;
                    let stamps = take_stamps(&mut values);
                    for (key, value) in values {
                        if !query[..wanted].contains(&key.as_str()) {
                            continue;
                        }
                        let stamp = stamps.get(&key).copied().unwrap_or(0);
                        self.observe_stamp(stamp);
                        let newer = found.get(&key).map_or(true, |(seen, _)| stamp > *seen);
                        if newer {
                            found.insert(key, (stamp, value));
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(backend = backend.name(), error = %err, "Store read failed, trying next backend");
                    last_error = Some(err.to_string());
                }
            }
        }

        if any_ok || self.backends.is_empty() {
            Ok(found.into_iter().map(|(key, (_, value))| (key, value)).collect())
        } else {
            Err(TrackerError::AllBackendsFailed {
                last: last_error.unwrap_or_default(),
            })
        }
    }

    fn set(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let stamp = self.next_stamp();
        let mut last_error = None;

        for (index, backend) in self.backends.iter().enumerate() {
            // A backend whose stamps cannot be read is treated as down.
            let mut stamps = match backend.get(&[WRITE_STAMPS_KEY]) {
                Ok(mut values) => take_stamps(&mut values),
                Err(err) => {
                    tracing::warn!(backend = backend.name(), error = %err, "Store write skipped, trying next backend");
                    last_error = Some(err.to_string());
                    continue;
                }
            };
            for (key, _) in &entries {
                stamps.insert(key.clone(), stamp);
            }
            let mut stamped = entries.clone();
            stamped.push(super::entry(WRITE_STAMPS_KEY, &stamps));

            match backend.set(stamped) {
                Ok(()) => {
                    if index > 0 {
                        tracing::info!(backend = backend.name(), "Stored with fallback backend");
                    }
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(backend = backend.name(), error = %err, "Store write failed, trying next backend");
                    last_error = Some(err.to_string());
                }
            }
        }
        Err(TrackerError::AllBackendsFailed {
            last: last_error.unwrap_or_else(|| "no backends configured".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        fn get(&self, _keys: &[&str]) -> Result<BTreeMap<String, Value>> {
            Err(TrackerError::StoreUnavailable {
                backend: "broken".to_string(),
                reason: "offline".to_string(),
            })
        }

        fn set(&self, _entries: Vec<(String, Value)>) -> Result<()> {
            Err(TrackerError::StoreUnavailable {
                backend: "broken".to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    /// Memory store whose writes (and optionally reads) can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        writes_down: AtomicBool,
        reads_down: AtomicBool,
    }

    impl FlakyStore {
        fn set_down(&self, writes: bool, reads: bool) {
            self.writes_down.store(writes, Ordering::SeqCst);
            self.reads_down.store(reads, Ordering::SeqCst);
        }

        fn offline() -> TrackerError {
            TrackerError::StoreUnavailable {
                backend: "flaky".to_string(),
                reason: "offline".to_string(),
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }

        fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>> {
            if self.reads_down.load(Ordering::SeqCst) {
                return Err(Self::offline());
            }
            self.inner.get(keys)
        }

        fn set(&self, entries: Vec<(String, Value)>) -> Result<()> {
            if self.writes_down.load(Ordering::SeqCst) {
                return Err(Self::offline());
            }
            self.inner.set(entries)
        }
    }

    #[test]
    fn writes_fall_through_to_next_backend() {
        let fallback = Arc::new(MemoryStore::new());
        let chain = FallbackStore::new(vec![Arc::new(BrokenStore), fallback.clone()]);

        chain.set(vec![("a".to_string(), json!(1))]).unwrap();

        assert_eq!(fallback.dump()["a"], json!(1));
        assert_eq!(chain.get(&["a"]).unwrap()["a"], json!(1));
        assert!(!chain.get(&["a"]).unwrap().contains_key(WRITE_STAMPS_KEY));
    }

    #[test]
    fn fallback_write_outlives_primary_recovery() {
        let primary = Arc::new(FlakyStore::default());
        let fallback = Arc::new(MemoryStore::new());
        let chain = FallbackStore::new(vec![primary.clone(), fallback.clone()]);

        chain.set(vec![("a".to_string(), json!(100))]).unwrap();
        primary.set_down(true, true);
        chain.set(vec![("a".to_string(), json!(150))]).unwrap();
        primary.set_down(false, false);

        assert_eq!(primary.inner.dump()["a"], json!(100));
        assert_eq!(chain.get(&["a"]).unwrap()["a"], json!(150));

        chain.set(vec![("a".to_string(), json!(160))]).unwrap();
        assert_eq!(primary.inner.dump()["a"], json!(160));
        assert_eq!(chain.get(&["a"]).unwrap()["a"], json!(160));
    }

    #[test]
    fn read_only_primary_does_not_shadow_fallback_writes() {
        let primary = Arc::new(FlakyStore::default());
        let fallback = Arc::new(MemoryStore::new());
        let chain = FallbackStore::new(vec![primary.clone(), fallback.clone()]);

        chain.set(vec![("a".to_string(), json!("old"))]).unwrap();
        primary.set_down(true, false);
        chain.set(vec![("a".to_string(), json!("new"))]).unwrap();

        assert_eq!(chain.get(&["a"]).unwrap()["a"], json!("new"));

        // A fresh chain over the same backends agrees.
        let restarted = FallbackStore::new(vec![primary, fallback]);
        assert_eq!(restarted.get(&["a"]).unwrap()["a"], json!("new"));
    }

    #[test]
    fn reads_merge_keys_across_backends() {
        let primary = Arc::new(MemoryStore::new());
        let fallback = Arc::new(MemoryStore::new());
        primary.set(vec![("a".to_string(), json!("primary"))]).unwrap();
        fallback
            .set(vec![
                ("a".to_string(), json!("stale")),
                ("b".to_string(), json!("fallback")),
            ])
            .unwrap();

        let chain = FallbackStore::new(vec![primary, fallback]);
        let values = chain.get(&["a", "b"]).unwrap();

        assert_eq!(values["a"], json!("primary"));
        assert_eq!(values["b"], json!("fallback"));
    }

    #[test]
    fn primary_wins_when_healthy() {
        let primary = Arc::new(MemoryStore::new());
        let fallback = Arc::new(MemoryStore::new());
        let chain = FallbackStore::new(vec![primary.clone(), fallback.clone()]);

        chain.set(vec![("a".to_string(), json!(1))]).unwrap();

        assert!(primary.dump().contains_key("a"));
        assert!(fallback.dump().is_empty());
    }

    #[test]
    fn errors_only_when_every_backend_fails() {
        let chain = FallbackStore::new(vec![Arc::new(BrokenStore), Arc::new(BrokenStore)]);
        assert!(matches!(
            chain.set(vec![("a".to_string(), json!(1))]),
            Err(TrackerError::AllBackendsFailed { .. })
        ));
        assert!(chain.get(&["a"]).is_err());
    }
}
