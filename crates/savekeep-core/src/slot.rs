// ABOUTME: Save slot identity and the derived per-slot metadata returned by queries.
// ABOUTME: A SlotId is a positive integer that maps 1:1 onto a `save_NNN.dat` file name.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when constructing a slot identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot number must be positive, got {0}")]
    NotPositive(u32),
}

/// A numbered, independently addressable save location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SlotId(NonZeroU32);

impl SlotId {
    pub const FIRST: SlotId = SlotId(NonZeroU32::MIN);

    /// Build a slot id, rejecting zero.
    pub fn new(slot: u32) -> Result<Self, SlotError> {
        NonZeroU32::new(slot)
            .map(Self)
            .ok_or(SlotError::NotPositive(slot))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The committed file name for this slot, e.g. `save_001.dat`.
    pub fn file_name(self) -> String {
        format!("save_{:03}.dat", self.get())
    }
}

impl TryFrom<u32> for SlotId {
    type Error = SlotError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SlotId> for u32 {
    fn from(slot: SlotId) -> Self {
        slot.get()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Best-effort metadata for one slot. Derived on demand, never stored.
///
/// When the stored package cannot be decoded, `save_time` falls back to the
/// file's last-modified time and `scene_name`/`system_count` stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSlotInfo {
    pub slot_number: u32,
    pub exists: bool,
    pub save_time: String,
    #[serde(rename = "fileSizeKB")]
    pub file_size_kb: f64,
    pub scene_name: String,
    pub system_count: usize,
}

impl SaveSlotInfo {
    /// An info record for a slot with nothing on disk.
    pub fn missing(slot: SlotId) -> Self {
        Self {
            slot_number: slot.get(),
            exists: false,
            save_time: String::new(),
            file_size_kb: 0.0,
            scene_name: String::new(),
            system_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert_eq!(SlotId::new(0), Err(SlotError::NotPositive(0)));
    }

    #[test]
    fn file_name_is_zero_padded() {
        assert_eq!(SlotId::new(1).unwrap().file_name(), "save_001.dat");
        assert_eq!(SlotId::new(42).unwrap().file_name(), "save_042.dat");
        assert_eq!(SlotId::new(1234).unwrap().file_name(), "save_1234.dat");
    }

    #[test]
    fn deserializing_zero_slot_fails() {
        let result: Result<SlotId, _> = serde_json::from_str("0");
        assert!(result.is_err());

        let slot: SlotId = serde_json::from_str("7").unwrap();
        assert_eq!(slot.get(), 7);
    }

    #[test]
    fn info_uses_wire_field_names() {
        let info = SaveSlotInfo::missing(SlotId::new(3).unwrap());
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["slotNumber"], 3);
        assert_eq!(json["exists"], false);
        assert!(json.get("fileSizeKB").is_some());
    }
}
