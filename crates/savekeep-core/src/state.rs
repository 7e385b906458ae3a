// ABOUTME: CollectedState, the transient map of per-subsystem payloads gathered during a save.
// ABOUTME: Keys are unique system names; the first payload received for a name wins.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};

/// System name used for the placeholder entry written when nobody responded.
pub const EMPTY_SENTINEL_NAME: &str = "_empty";

/// Payload of the placeholder entry.
pub const EMPTY_SENTINEL_PAYLOAD: &str = "{}";

/// Map from system name to the opaque payload that system produced.
///
/// Iteration order is unspecified. Consumers look entries up by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectedState {
    entries: HashMap<String, String>,
}

impl CollectedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a response into the map. Returns false (and keeps the existing
    /// payload) if this system name was already present.
    pub fn insert_first(&mut self, system_name: impl Into<String>, payload: impl Into<String>) -> bool {
        match self.entries.entry(system_name.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(payload.into());
                true
            }
        }
    }

    /// Insert the `_empty` sentinel if no system contributed anything.
    /// Returns true if the sentinel was added.
    pub fn ensure_not_empty(&mut self) -> bool {
        if self.entries.is_empty() {
            self.entries
                .insert(EMPTY_SENTINEL_NAME.to_string(), EMPTY_SENTINEL_PAYLOAD.to_string());
            true
        } else {
            false
        }
    }

    pub fn get(&self, system_name: &str) -> Option<&str> {
        self.entries.get(system_name).map(String::as_str)
    }

    pub fn contains(&self, system_name: &str) -> bool {
        self.entries.contains_key(system_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.entries
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.entries
    }
}

impl From<HashMap<String, String>> for CollectedState {
    fn from(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CollectedState {
    /// Builds a state keeping the first payload seen for each name.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut state = Self::new();
        for (name, payload) in iter {
            state.insert_first(name, payload);
        }
        state
    }
}
