// ABOUTME: SavePackage, the canonical on-disk record for one save slot.
// ABOUTME: Encodes CollectedState as two parallel arrays and decodes them tolerantly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::slot::SlotId;
use crate::state::CollectedState;

/// Textual format of `saveTime`.
pub const SAVE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current on-disk format version.
pub const PACKAGE_VERSION: u32 = 1;

fn default_version() -> u32 {
    PACKAGE_VERSION
}

/// Format a timestamp the way `saveTime` is written.
pub fn format_save_time(at: DateTime<Utc>) -> String {
    at.format(SAVE_TIME_FORMAT).to_string()
}

/// One complete save. Immutable once serialized.
///
/// `system_names[i]` and `system_data_array[i]` together form one entry of
/// the collected state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePackage {
    #[serde(default = "default_version")]
    pub version: u32,
    pub save_slot: SlotId,
    pub save_time: String,
    #[serde(default)]
    pub scene_name: String,
    #[serde(default)]
    pub total_systems: usize,
    #[serde(default)]
    pub systems_responded: usize,
    #[serde(default)]
    pub operation_id: String,
    #[serde(default)]
    pub system_names: Vec<String>,
    #[serde(default)]
    pub system_data_array: Vec<String>,
}

impl SavePackage {
    /// Build a package from collected state, stamping the current time.
    pub fn build(
        slot: SlotId,
        scene_name: impl Into<String>,
        operation_id: Ulid,
        state: &CollectedState,
    ) -> Self {
        Self::build_at(slot, scene_name, operation_id, state, Utc::now())
    }

    /// Build a package with an explicit timestamp.
    pub fn build_at(
        slot: SlotId,
        scene_name: impl Into<String>,
        operation_id: Ulid,
        state: &CollectedState,
        at: DateTime<Utc>,
    ) -> Self {
        let (system_names, system_data_array): (Vec<String>, Vec<String>) = state
            .iter()
            .map(|(name, payload)| (name.to_string(), payload.to_string()))
            .unzip();

        Self {
            version: PACKAGE_VERSION,
            save_slot: slot,
            save_time: format_save_time(at),
            scene_name: scene_name.into(),
            total_systems: state.len(),
            systems_responded: state.len(),
            operation_id: operation_id.to_string(),
            system_names,
            system_data_array,
        }
    }

    /// True when the parallel arrays have matching lengths.
    pub fn is_consistent(&self) -> bool {
        self.system_names.len() == self.system_data_array.len()
    }

    /// Reconstruct the collected state. Mismatched arrays are truncated to the
    /// shorter length; a repeated name keeps its first payload.
    pub fn collected_state(&self) -> CollectedState {
        let usable = self.system_names.len().min(self.system_data_array.len());
        if !self.is_consistent() {
            tracing::warn!(
                slot = %self.save_slot,
                names = self.system_names.len(),
                payloads = self.system_data_array.len(),
                usable,
                "save package arrays differ in length, truncating"
            );
        }

        self.system_names
            .iter()
            .zip(self.system_data_array.iter())
            .take(usable)
            .map(|(name, payload)| (name.as_str(), payload.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot(n: u32) -> SlotId {
        SlotId::new(n).unwrap()
    }

    #[test]
    fn build_fills_counts_and_parallel_arrays() {
        let state: CollectedState = [("Player", "p"), ("World", "w"), ("Inventory", "i")]
            .into_iter()
            .collect();
        let pkg = SavePackage::build(slot(1), "Town", Ulid::new(), &state);

        assert_eq!(pkg.total_systems, 3);
        assert_eq!(pkg.systems_responded, 3);
        assert_eq!(pkg.system_names.len(), 3);
        assert!(pkg.is_consistent());

        for (name, payload) in pkg.system_names.iter().zip(&pkg.system_data_array) {
            assert_eq!(state.get(name), Some(payload.as_str()));
        }
    }

    #[test]
    fn save_time_uses_fixed_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let pkg = SavePackage::build_at(slot(2), "Town", Ulid::new(), &CollectedState::new(), at);
        assert_eq!(pkg.save_time, "2024-03-09 07:05:01");
    }

    #[test]
    fn longer_names_array_is_truncated_to_payloads() {
        let pkg = SavePackage {
            version: PACKAGE_VERSION,
            save_slot: slot(1),
            save_time: String::new(),
            scene_name: String::new(),
            total_systems: 4,
            systems_responded: 4,
            operation_id: String::new(),
            system_names: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            system_data_array: vec!["1".into(), "2".into()],
        };

        let state = pkg.collected_state();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("A"), Some("1"));
        assert_eq!(state.get("B"), Some("2"));
        assert!(!state.contains("C"));
    }

    #[test]
    fn repeated_names_keep_first_payload() {
        let pkg = SavePackage {
            version: PACKAGE_VERSION,
            save_slot: slot(1),
            save_time: String::new(),
            scene_name: String::new(),
            total_systems: 2,
            systems_responded: 2,
            operation_id: String::new(),
            system_names: vec!["A".into(), "A".into()],
            system_data_array: vec!["first".into(), "second".into()],
        };

        assert_eq!(pkg.collected_state().get("A"), Some("first"));
    }

    #[test]
    fn serializes_with_camel_case_field_names() {
        let pkg = SavePackage::build(slot(5), "Cave", Ulid::new(), &CollectedState::new());
        let json = serde_json::to_value(&pkg).unwrap();
        assert_eq!(json["saveSlot"], 5);
        assert_eq!(json["sceneName"], "Cave");
        assert!(json.get("systemNames").is_some());
        assert!(json.get("systemDataArray").is_some());
    }

    #[test]
    fn missing_version_defaults_to_current() {
        let json = r#"{"saveSlot":1,"saveTime":"2024-01-01 00:00:00","systemNames":["A"],"systemDataArray":["x"]}"#;
        let pkg: SavePackage = serde_json::from_str(json).unwrap();
        assert_eq!(pkg.version, PACKAGE_VERSION);
        assert_eq!(pkg.collected_state().get("A"), Some("x"));
    }
}
