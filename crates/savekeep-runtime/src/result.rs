// ABOUTME: Structured outcome of a save or load and the failures that can end one.
// ABOUTME: Every failure maps to a stable FailureKind that callers and logs can match on.

use std::path::PathBuf;
use std::time::Duration;

use savekeep_core::{CodecError, SlotError, SlotId};
use savekeep_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scene::SceneError;
use crate::shutdown::ShuttingDown;
use crate::supervisor::{AttemptError, Retryable};

/// Stable classification of operation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PathError,
    SerializeError,
    WriteError,
    ReadError,
    NotFound,
    DecodeError,
    SceneLoadTimeout,
    SceneLoadFailed,
    TimedOut,
    ShuttingDown,
    Busy,
}

/// Errors that end a save or load attempt.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("invalid slot: {0}")]
    Path(#[from] SlotError),

    #[error("could not serialize save: {0}")]
    Serialize(#[source] CodecError),

    #[error("could not write save: {0}")]
    Write(#[source] StoreError),

    #[error("could not read save: {0}")]
    Read(#[source] StoreError),

    #[error("no save in slot {0}")]
    NotFound(SlotId),

    #[error("save data is corrupt: {0}")]
    Decode(#[source] CodecError),

    #[error("scene '{scene}' did not finish loading within {timeout:?}")]
    SceneLoadTimeout { scene: String, timeout: Duration },

    #[error("scene transition failed: {0}")]
    SceneLoad(#[from] SceneError),

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("shutting down")]
    ShuttingDown,

    #[error("another save or load is already in progress")]
    Busy,
}

impl OperationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            OperationError::Path(_) => FailureKind::PathError,
            OperationError::Serialize(_) => FailureKind::SerializeError,
            OperationError::Write(_) => FailureKind::WriteError,
            OperationError::Read(_) => FailureKind::ReadError,
            OperationError::NotFound(_) => FailureKind::NotFound,
            OperationError::Decode(_) => FailureKind::DecodeError,
            OperationError::SceneLoadTimeout { .. } => FailureKind::SceneLoadTimeout,
            OperationError::SceneLoad(_) => FailureKind::SceneLoadFailed,
            OperationError::TimedOut(_) => FailureKind::TimedOut,
            OperationError::ShuttingDown => FailureKind::ShuttingDown,
            OperationError::Busy => FailureKind::Busy,
        }
    }

    /// Map a store read error, separating "nothing there" from real failures.
    pub(crate) fn from_read(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(slot) => OperationError::NotFound(slot),
            other => OperationError::Read(other),
        }
    }
}

impl Retryable for OperationError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            OperationError::ShuttingDown | OperationError::Busy | OperationError::Path(_)
        )
    }
}

impl From<ShuttingDown> for OperationError {
    fn from(_: ShuttingDown) -> Self {
        OperationError::ShuttingDown
    }
}

impl From<AttemptError<OperationError>> for OperationError {
    fn from(err: AttemptError<OperationError>) -> Self {
        match err {
            AttemptError::Failed(e) => e,
            AttemptError::TimedOut(limit) => OperationError::TimedOut(limit),
            AttemptError::ShuttingDown => OperationError::ShuttingDown,
        }
    }
}

/// What a caller gets back from save or load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    pub slot_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Systems saved or restored.
    pub systems: usize,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl OperationResult {
    pub(crate) fn succeeded(
        slot: SlotId,
        message: String,
        file_path: PathBuf,
        systems: usize,
        attempts: u32,
    ) -> Self {
        Self {
            success: true,
            message,
            slot_number: slot.get(),
            file_path: Some(file_path),
            systems,
            attempts,
            failure: None,
        }
    }

    pub(crate) fn failed(slot_number: u32, error: &OperationError, attempts: u32) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            slot_number,
            file_path: None,
            systems: 0,
            attempts,
            failure: Some(error.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn read_errors_split_not_found_from_io() {
        let slot = SlotId::new(2).unwrap();
        assert_eq!(
            OperationError::from_read(StoreError::NotFound(slot)).kind(),
            FailureKind::NotFound
        );
        assert_eq!(
            OperationError::from_read(StoreError::Empty(slot)).kind(),
            FailureKind::ReadError
        );
        assert_eq!(
            OperationError::from_read(StoreError::Io(io::Error::other("disk"))).kind(),
            FailureKind::ReadError
        );
    }

    #[test]
    fn shutdown_and_busy_are_not_retried() {
        assert!(!OperationError::ShuttingDown.is_retryable());
        assert!(!OperationError::Busy.is_retryable());
        assert!(OperationError::TimedOut(Duration::from_secs(1)).is_retryable());
        assert!(OperationError::Write(StoreError::Io(io::Error::other("full"))).is_retryable());
    }

    #[test]
    fn failed_result_serializes_kind() {
        let result = OperationResult::failed(4, &OperationError::Busy, 0);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["slotNumber"], 4);
        assert_eq!(json["failure"], "busy");
        assert!(json.get("filePath").is_none());
    }
}
