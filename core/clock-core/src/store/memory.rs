use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use super::KeyValueStore;
use crate::error::Result;

/// In-process store. Shared between ledgers (and between coordinators in
/// tests) through an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything currently stored.
    pub fn dump(&self) -> BTreeMap<String, Value> {
        self.values
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>> {
        let values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    fn set(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.extend(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_returns_only_present_keys() {
        let store = MemoryStore::new();
        store
            .set(vec![("a".to_string(), json!(1)), ("b".to_string(), json!({"x": 2}))])
            .unwrap();

        let values = store.get(&["a", "missing"]).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["a"], json!(1));
    }

    #[test]
    fn set_replaces_whole_value() {
        let store = MemoryStore::new();
        store.set(vec![("m".to_string(), json!({"x": 1, "y": 2}))]).unwrap();
        store.set(vec![("m".to_string(), json!({"x": 3}))]).unwrap();

        assert_eq!(store.get(&["m"]).unwrap()["m"], json!({"x": 3}));
    }
}
