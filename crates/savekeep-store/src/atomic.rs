// ABOUTME: Crash-safe single-file writes for save slots using temp-write, verify, and rename.
// ABOUTME: Keeps one transient backup, restores it on failure, and quarantines irrecoverable files.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use savekeep_core::SlotId;
use thiserror::Error;

/// Errors that can occur during slot file operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("no save file or backup for slot {0}")]
    NotFound(SlotId),

    #[error("save file for slot {0} is empty")]
    Empty(SlotId),

    #[error("backup copy {path} has {copied} bytes, source has {expected}")]
    BackupMismatch {
        path: PathBuf,
        copied: u64,
        expected: u64,
    },

    #[error("verification of {path} failed: {reason}")]
    Verification { path: PathBuf, reason: String },
}

/// The committed file for a slot and its sibling artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPaths {
    pub file: PathBuf,
    pub temp: PathBuf,
    pub backup: PathBuf,
}

impl SlotPaths {
    fn new(dir: &Path, slot: SlotId) -> Self {
        let file = dir.join(slot.file_name());
        Self {
            temp: with_suffix(&file, ".temp"),
            backup: with_suffix(&file, ".backup"),
            file,
        }
    }

    /// The file a read should come from: the primary unless it is empty and a backup exists.
    fn readable(&self) -> &Path {
        if has_content(&self.file) || !self.backup.exists() {
            &self.file
        } else {
            &self.backup
        }
    }

    /// A fresh, unused quarantine path: `<file>.corrupt<ticks>`.
    fn quarantine(&self) -> PathBuf {
        let mut ticks = Utc::now().timestamp_micros();
        loop {
            let candidate = with_suffix(&self.file, &format!(".corrupt{}", ticks));
            if !candidate.exists() {
                return candidate;
            }
            ticks += 1;
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// How far a write got before failing; decides what recovery may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStage {
    /// Clearing the temp file. Destination and any existing backup untouched.
    Preparing,
    /// Copying the destination to the backup path.
    BackingUp,
    /// Backup verified, writing and checking the temp file. Destination untouched.
    Staged,
    /// Destination deleted or being replaced.
    Replacing,
}

/// What `repair` found and fixed for one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub removed_temp: bool,
    pub restored_backup: bool,
    pub discarded_backup: bool,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Atomic read/write of slot files inside one directory.
///
/// Exclusive access is the caller's job; concurrent writers to the same slot
/// are not supported.
#[derive(Debug, Clone)]
pub struct AtomicFileStore {
    dir: PathBuf,
}

impl AtomicFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self, slot: SlotId) -> SlotPaths {
        SlotPaths::new(&self.dir, slot)
    }

    /// Replace the slot's file with `content`. On failure the previous
    /// committed file is restored (or quarantined) and the error returned.
    pub fn write(&self, slot: SlotId, content: &str) -> Result<PathBuf, StoreError> {
        let paths = self.paths(slot);
        let mut stage = WriteStage::Preparing;

        match self.write_steps(&paths, content.as_bytes(), &mut stage) {
            Ok(()) => {
                remove_if_exists(&paths.temp).ok();
                if let Err(e) = remove_if_exists(&paths.backup) {
                    tracing::warn!(slot = %slot, error = %e, "could not remove backup after write");
                }
                tracing::info!(slot = %slot, bytes = content.len(), path = %paths.file.display(), "slot written");
                Ok(paths.file)
            }
            Err(e) => {
                tracing::error!(slot = %slot, stage = ?stage, error = %e, "slot write failed, recovering");
                recover(&paths, stage);
                Err(e)
            }
        }
    }

    fn write_steps(
        &self,
        paths: &SlotPaths,
        bytes: &[u8],
        stage: &mut WriteStage,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        remove_if_exists(&paths.temp)?;
        if has_content(&paths.file) {
            *stage = WriteStage::BackingUp;
            copy_verified(&paths.file, &paths.backup)?;
        } else if paths.backup.exists() {
            // An empty primary must not overwrite the last good generation.
            tracing::warn!(path = %paths.backup.display(), "primary is empty, keeping existing backup");
        }

        *stage = WriteStage::Staged;
        write_synced(&paths.temp, bytes)?;
        verify_contents(&paths.temp, bytes)?;

        *stage = WriteStage::Replacing;
        replace_file(&paths.temp, &paths.file)?;

        let len = fs::metadata(&paths.file)?.len();
        if len == 0 {
            return Err(StoreError::Verification {
                path: paths.file.clone(),
                reason: "committed file is empty".to_string(),
            });
        }
        sync_parent(&paths.file);
        Ok(())
    }

    /// Read the slot's committed content. A missing or empty primary file is
    /// repaired from the backup when one exists.
    pub fn read(&self, slot: SlotId) -> Result<String, StoreError> {
        let paths = self.paths(slot);

        if !has_content(&paths.file) && paths.backup.exists() {
            tracing::warn!(slot = %slot, "primary save unusable, restoring from backup");
            fs::copy(&paths.backup, &paths.file)?;
        } else if !paths.file.exists() {
            return Err(StoreError::NotFound(slot));
        }

        let content = fs::read_to_string(&paths.file)?;
        if content.is_empty() {
            return Err(StoreError::Empty(slot));
        }
        Ok(content)
    }

    /// Read primary-or-backup content without modifying anything on disk.
    pub fn peek(&self, slot: SlotId) -> Result<String, StoreError> {
        let paths = self.paths(slot);
        let source = paths.readable();

        if !source.exists() {
            return Err(StoreError::NotFound(slot));
        }
        let content = fs::read_to_string(source)?;
        if content.is_empty() {
            return Err(StoreError::Empty(slot));
        }
        Ok(content)
    }

    /// True if the primary file or its backup is present.
    pub fn exists(&self, slot: SlotId) -> bool {
        let paths = self.paths(slot);
        paths.file.exists() || paths.backup.exists()
    }

    /// True if the primary file holds any bytes.
    pub fn has_primary(&self, slot: SlotId) -> bool {
        has_content(&self.paths(slot).file)
    }

    /// Metadata of the file `peek` would read, if any.
    pub fn stat(&self, slot: SlotId) -> Option<(PathBuf, fs::Metadata)> {
        let paths = self.paths(slot);
        let source = paths.readable().to_path_buf();
        fs::metadata(&source).ok().map(|m| (source, m))
    }

    /// Remove the primary, backup, and temp files. Returns how many were removed.
    pub fn remove_all(&self, slot: SlotId) -> usize {
        let paths = self.paths(slot);
        let mut removed = 0;
        for path in [&paths.file, &paths.backup, &paths.temp] {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(slot = %slot, path = %path.display(), error = %e, "could not delete slot file");
                }
            }
        }
        removed
    }

    /// Put the backup back over the primary file. Returns false if there is no backup.
    pub fn restore_backup(&self, slot: SlotId) -> Result<bool, StoreError> {
        let paths = self.paths(slot);
        if !paths.backup.exists() {
            return Ok(false);
        }
        replace_file(&paths.backup, &paths.file)?;
        tracing::info!(slot = %slot, "restored slot from backup");
        Ok(true)
    }

    /// Clean up leftovers from a write that was interrupted by a crash.
    pub fn repair(&self, slot: SlotId) -> Result<RepairReport, StoreError> {
        let paths = self.paths(slot);
        let mut report = RepairReport::default();

        if paths.temp.exists() {
            fs::remove_file(&paths.temp)?;
            report.removed_temp = true;
        }

        if paths.backup.exists() {
            if has_content(&paths.file) {
                // Primary is either the old file (crash before replace) or
                // the verified new one (crash before cleanup).
                fs::remove_file(&paths.backup)?;
                report.discarded_backup = true;
            } else {
                replace_file(&paths.backup, &paths.file)?;
                report.restored_backup = true;
            }
        }

        if !report.is_clean() {
            tracing::warn!(slot = %slot, ?report, "repaired interrupted write");
        }
        Ok(report)
    }

    /// Quarantined files for this slot, oldest name first.
    pub fn quarantined(&self, slot: SlotId) -> Vec<PathBuf> {
        let prefix = format!("{}.corrupt", slot.file_name());
        let mut found: Vec<PathBuf> = match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
                .map(|e| e.path())
                .collect(),
            Err(_) => Vec::new(),
        };
        found.sort();
        found
    }
}

/// Undo a failed write according to how far it got.
fn recover(paths: &SlotPaths, stage: WriteStage) {
    if let Err(e) = remove_if_exists(&paths.temp) {
        tracing::warn!(path = %paths.temp.display(), error = %e, "could not remove temp file");
    }

    if stage == WriteStage::Preparing {
        return;
    }
    if stage == WriteStage::BackingUp {
        // The backup may be a partial copy; the destination was never touched.
        if let Err(e) = remove_if_exists(&paths.backup) {
            tracing::warn!(path = %paths.backup.display(), error = %e, "could not remove partial backup");
        }
        return;
    }

    if paths.backup.exists() {
        match replace_file(&paths.backup, &paths.file) {
            Ok(()) => tracing::info!(path = %paths.file.display(), "restored previous save from backup"),
            Err(e) => tracing::error!(path = %paths.file.display(), error = %e, "backup restore failed"),
        }
    } else if stage == WriteStage::Replacing && paths.file.exists() {
        let target = paths.quarantine();
        match fs::rename(&paths.file, &target) {
            Ok(()) => tracing::warn!(path = %target.display(), "quarantined unverified save file"),
            Err(e) => tracing::error!(path = %paths.file.display(), error = %e, "quarantine failed"),
        }
    }
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn copy_verified(src: &Path, dst: &Path) -> Result<(), StoreError> {
    let expected = fs::metadata(src)?.len();
    let copied = fs::copy(src, dst)?;
    let on_disk = fs::metadata(dst)?.len();
    if copied != expected || on_disk != expected {
        return Err(StoreError::BackupMismatch {
            path: dst.to_path_buf(),
            copied: on_disk,
            expected,
        });
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn verify_contents(path: &Path, expected: &[u8]) -> Result<(), StoreError> {
    let fail = |reason: &str| StoreError::Verification {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if !path.exists() {
        return Err(fail("file missing after write"));
    }
    let actual = fs::read(path)?;
    if actual.is_empty() {
        return Err(fail("file is empty after write"));
    }
    if actual != expected {
        return Err(fail("read-back does not match written bytes"));
    }
    Ok(())
}

fn replace_file(src: &Path, dst: &Path) -> io::Result<()> {
    remove_if_exists(dst)?;
    fs::rename(src, dst)
}

/// Best-effort fsync of the parent directory so the rename is durable.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}
