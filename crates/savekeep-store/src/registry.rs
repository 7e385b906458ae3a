// ABOUTME: Read-only and maintenance queries over save slots: existence, info, delete, validation.
// ABOUTME: Queries never fail; they degrade to filesystem metadata when a save cannot be decoded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use savekeep_core::{CodecError, Obfuscator, SavePackage, SaveSlotInfo, SlotId, decode, format_save_time};
use serde::Serialize;

use crate::atomic::{AtomicFileStore, StoreError};

/// Outcome of validating one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SlotHealth {
    Missing,
    Ok { systems: usize, save_time: String },
    Corrupt(String),
    Error(String),
}

/// Validation result for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub slot: SlotId,
    pub health: SlotHealth,
}

enum PackageReadError {
    Store(StoreError),
    Codec(CodecError),
}

/// Stateless slot queries layered over an `AtomicFileStore`.
#[derive(Clone)]
pub struct SlotRegistry {
    store: AtomicFileStore,
    obfuscator: Arc<dyn Obfuscator>,
    max_slots: u32,
}

impl SlotRegistry {
    pub fn new(store: AtomicFileStore, obfuscator: Arc<dyn Obfuscator>, max_slots: u32) -> Self {
        Self {
            store,
            obfuscator,
            max_slots,
        }
    }

    pub fn store(&self) -> &AtomicFileStore {
        &self.store
    }

    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    /// True if the primary file or its backup is present.
    pub fn exists(&self, slot: SlotId) -> bool {
        self.store.exists(slot)
    }

    /// Metadata for a slot. Uses the decoded package when possible and the
    /// file's modification time otherwise.
    pub fn info(&self, slot: SlotId) -> SaveSlotInfo {
        let Some((path, meta)) = self.store.stat(slot) else {
            return SaveSlotInfo::missing(slot);
        };

        let mut info = SaveSlotInfo {
            slot_number: slot.get(),
            exists: true,
            save_time: String::new(),
            file_size_kb: meta.len() as f64 / 1024.0,
            scene_name: String::new(),
            system_count: 0,
        };

        match self.read_package(slot) {
            Ok(package) => {
                info.save_time = package.save_time.clone();
                info.scene_name = package.scene_name.clone();
                info.system_count = package.collected_state().len();
            }
            Err(_) => {
                tracing::debug!(slot = %slot, path = %path.display(), "save unreadable, using file timestamp");
                info.save_time = meta
                    .modified()
                    .map(|t| format_save_time(DateTime::<Utc>::from(t)))
                    .unwrap_or_else(|_| "Unknown".to_string());
            }
        }

        info
    }

    /// Remove every file belonging to the slot. Returns true if anything was deleted.
    pub fn delete(&self, slot: SlotId) -> bool {
        let removed = self.store.remove_all(slot);
        if removed > 0 {
            tracing::info!(slot = %slot, files = removed, "deleted save slot");
        } else {
            tracing::debug!(slot = %slot, "nothing to delete");
        }
        removed > 0
    }

    /// Info for every existing slot in `1..=max_slots`.
    pub fn list(&self) -> Vec<SaveSlotInfo> {
        self.slots()
            .filter(|slot| self.exists(*slot))
            .map(|slot| self.info(slot))
            .collect()
    }

    /// Fully read and decode each slot in `1..=max_slots`, logging the result.
    /// Nothing on disk is modified.
    pub fn validate_all(&self) -> Vec<SlotReport> {
        let reports: Vec<SlotReport> = self
            .slots()
            .map(|slot| SlotReport {
                slot,
                health: self.validate(slot),
            })
            .collect();

        for report in &reports {
            match &report.health {
                SlotHealth::Missing => {}
                SlotHealth::Ok { systems, save_time } => {
                    tracing::info!(slot = %report.slot, systems, save_time = %save_time, "slot OK");
                }
                SlotHealth::Corrupt(reason) => {
                    tracing::warn!(slot = %report.slot, reason = %reason, "slot CORRUPT");
                }
                SlotHealth::Error(reason) => {
                    tracing::error!(slot = %report.slot, reason = %reason, "slot ERROR");
                }
            }
        }

        reports
    }

    fn validate(&self, slot: SlotId) -> SlotHealth {
        match self.read_package(slot) {
            Ok(package) => SlotHealth::Ok {
                systems: package.collected_state().len(),
                save_time: package.save_time,
            },
            Err(PackageReadError::Store(StoreError::NotFound(_))) => SlotHealth::Missing,
            Err(PackageReadError::Store(e @ StoreError::Empty(_))) => SlotHealth::Corrupt(e.to_string()),
            Err(PackageReadError::Store(e)) => SlotHealth::Error(e.to_string()),
            Err(PackageReadError::Codec(e)) => SlotHealth::Corrupt(e.to_string()),
        }
    }

    fn read_package(&self, slot: SlotId) -> Result<SavePackage, PackageReadError> {
        let text = self.store.peek(slot).map_err(PackageReadError::Store)?;
        decode(&text, self.obfuscator.as_ref()).map_err(PackageReadError::Codec)
    }

    fn slots(&self) -> impl Iterator<Item = SlotId> {
        (1..=self.max_slots).filter_map(|n| SlotId::new(n).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use savekeep_core::{CollectedState, XorObfuscator, encode};
    use std::fs::{self, File};
    use tempfile::TempDir;
    use ulid::Ulid;

    fn slot(n: u32) -> SlotId {
        SlotId::new(n).unwrap()
    }

    fn registry(dir: &TempDir) -> SlotRegistry {
        SlotRegistry::new(
            AtomicFileStore::new(dir.path()),
            Arc::new(XorObfuscator::new("test-key")),
            5,
        )
    }

    fn write_save(reg: &SlotRegistry, n: u32, state: &CollectedState) -> SavePackage {
        let package = SavePackage::build(slot(n), "Town", Ulid::new(), state);
        let encoded = encode(&package, reg.obfuscator.as_ref()).unwrap();
        reg.store().write(slot(n), &encoded.text).unwrap();
        package
    }

    #[test]
    fn info_reads_package_metadata() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let state: CollectedState = [("Player", "{}"), ("World", "{}")].into_iter().collect();
        let package = write_save(&reg, 1, &state);

        let info = reg.info(slot(1));
        assert!(info.exists);
        assert_eq!(info.save_time, package.save_time);
        assert_eq!(info.scene_name, "Town");
        assert_eq!(info.system_count, 2);
        assert!(info.file_size_kb > 0.0);
    }

    #[test]
    fn info_for_missing_slot() {
        let dir = TempDir::new().unwrap();
        let info = registry(&dir).info(slot(3));
        assert!(!info.exists);
        assert_eq!(info.slot_number, 3);
    }

    #[test]
    fn info_degrades_to_file_timestamp() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        File::create(dir.path().join("save_002.dat")).unwrap();

        let info = reg.info(slot(2));
        assert!(info.exists);
        assert!(!info.save_time.is_empty());
        assert_eq!(info.system_count, 0);
        assert_eq!(info.file_size_kb, 0.0);
    }

    #[test]
    fn info_size_comes_from_backup_when_primary_is_empty() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let state: CollectedState = [("Player", "{}")].into_iter().collect();
        let package = write_save(&reg, 2, &state);

        let paths = reg.store().paths(slot(2));
        fs::rename(&paths.file, &paths.backup).unwrap();
        File::create(&paths.file).unwrap();
        let backup_len = fs::metadata(&paths.backup).unwrap().len();

        let info = reg.info(slot(2));
        assert_eq!(info.save_time, package.save_time);
        assert_eq!(info.system_count, 1);
        assert_eq!(info.file_size_kb, backup_len as f64 / 1024.0);
        assert!(info.file_size_kb > 0.0);
    }

    #[test]
    fn delete_removes_slot() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        write_save(&reg, 1, &CollectedState::new());

        assert!(reg.exists(slot(1)));
        assert!(reg.delete(slot(1)));
        assert!(!reg.exists(slot(1)));
        assert!(!reg.delete(slot(1)));
    }

    #[test]
    fn validate_all_classifies_each_slot() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        write_save(&reg, 1, &[("Player", "x")].into_iter().collect());
        fs::write(dir.path().join("save_002.dat"), "garbage").unwrap();
        File::create(dir.path().join("save_003.dat")).unwrap();

        let before = fs::read_dir(dir.path()).unwrap().count();
        let reports = reg.validate_all();
        let after = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(before, after, "validation must not touch the disk");

        assert_eq!(reports.len(), 5);
        assert!(matches!(reports[0].health, SlotHealth::Ok { systems: 1, .. }));
        assert!(matches!(reports[1].health, SlotHealth::Corrupt(_)));
        assert!(matches!(reports[2].health, SlotHealth::Corrupt(_)));
        assert_eq!(reports[3].health, SlotHealth::Missing);
    }

    #[test]
    fn list_only_includes_existing_slots() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        write_save(&reg, 2, &CollectedState::new());
        write_save(&reg, 4, &CollectedState::new());

        let numbers: Vec<u32> = reg.list().iter().map(|i| i.slot_number).collect();
        assert_eq!(numbers, vec![2, 4]);
    }
}
