//! Card highlighting rules.
//!
//! A card is colored by its lane when the lane has a color, otherwise by its
//! owner. Owner lookup order: predefined owners (exact), custom owners
//! (exact), then custom owners by case-insensitive containment in either
//! direction, which lets `"ana"` match `"ana.souza@example.com"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::phase_ledger::normalize_phase;
use crate::store::{self, keys, KeyValueStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorSettings {
    pub lanes_enabled: bool,
    pub owners_enabled: bool,
    /// Lane label → CSS color.
    pub lanes: BTreeMap<String, String>,
    /// Owner name → CSS color.
    pub owners: BTreeMap<String, String>,
    pub custom_owners: BTreeMap<String, String>,
}

impl Default for ColorSettings {
    fn default() -> Self {
        let lanes = [
            ("Entregues", "#00bda5"),
            ("Dispensados", "#ff5c35"),
            ("Impedidos", "#ffab00"),
        ]
        .into_iter()
        .map(|(lane, color)| (lane.to_string(), color.to_string()))
        .collect();
        Self {
            lanes_enabled: true,
            owners_enabled: true,
            lanes,
            owners: BTreeMap::new(),
            custom_owners: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightSource {
    Lane(String),
    Owner(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub source: HighlightSource,
    pub color: String,
}

impl ColorSettings {
    /// Stored settings layered over the defaults: stored lanes and owners
    /// override default entries with the same name, defaults fill the rest.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let values = store::load(store, &[keys::COLOR_SETTINGS]);
        let stored: Option<ColorSettings> = store::read_value(&values, keys::COLOR_SETTINGS);
        let mut settings = Self::default();
        if let Some(stored) = stored {
            settings.lanes_enabled = stored.lanes_enabled;
            settings.owners_enabled = stored.owners_enabled;
            settings.lanes.extend(stored.lanes);
            settings.owners.extend(stored.owners);
            settings.custom_owners = stored.custom_owners;
        }
        settings
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        store::persist(store, vec![store::entry(keys::COLOR_SETTINGS, self)]);
    }

    pub fn highlight_for(&self, phase: Option<&str>, owner: Option<&str>) -> Option<Highlight> {
        if self.lanes_enabled {
            if let Some(highlight) = phase.and_then(|phase| self.lane_color(phase)) {
                return Some(highlight);
            }
        }
        if self.owners_enabled {
            return owner.and_then(|owner| self.owner_color(owner));
        }
        None
    }

    fn lane_color(&self, phase: &str) -> Option<Highlight> {
        let phase = normalize_phase(phase);
        self.lanes
            .iter()
            .find(|(lane, color)| normalize_phase(lane) == phase && !color.is_empty())
            .map(|(lane, color)| Highlight {
                source: HighlightSource::Lane(lane.clone()),
                color: color.clone(),
            })
    }

    fn owner_color(&self, owner: &str) -> Option<Highlight> {
        let owner = owner.trim();
        if owner.is_empty() {
            return None;
        }
        let found = |name: &String, color: &String| Highlight {
            source: HighlightSource::Owner(name.clone()),
            color: color.clone(),
        };

        if let Some((name, color)) = self.owners.get_key_value(owner) {
            return Some(found(name, color));
        }
        if let Some((name, color)) = self.custom_owners.get_key_value(owner) {
            return Some(found(name, color));
        }
        let owner_lower = owner.to_lowercase();
        self.custom_owners
            .iter()
            .filter(|(name, _)| !name.trim().is_empty())
            .find(|(name, _)| {
                let name_lower = name.to_lowercase();
                owner_lower.contains(&name_lower) || name_lower.contains(&owner_lower)
            })
            .map(|(name, color)| found(name, color))
    }
}
