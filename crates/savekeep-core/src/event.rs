// ABOUTME: Events exchanged between the save coordinator and subsystems over the bus.
// ABOUTME: Covers save requests, per-system responses, load data, and completion notices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::slot::SlotId;
use crate::state::CollectedState;

/// Which top-level protocol a completion notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Save,
    Load,
}

/// Outcome of a finished save or load, broadcast for UI and subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub slot: SlotId,
    pub success: bool,
    /// Systems saved (for a save) or restored (for a load).
    pub count: usize,
    pub save_time: String,
    pub operation_id: Ulid,
    pub message: String,
}

/// Everything that travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    /// Coordinator asks every subsystem for its current state.
    SaveRequested {
        slot: SlotId,
        operation_id: Ulid,
        request_time: DateTime<Utc>,
    },
    /// A subsystem answers a save request.
    SaveDataResponse {
        system_name: String,
        payload: String,
    },
    /// Coordinator hands restored state to every subsystem.
    LoadData {
        slot: SlotId,
        state: CollectedState,
        save_time: String,
        operation_id: Ulid,
    },
    SaveCompleted(Completion),
    LoadCompleted(Completion),
}

impl BusEvent {
    /// Short name used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            BusEvent::SaveRequested { .. } => "save_requested",
            BusEvent::SaveDataResponse { .. } => "save_data_response",
            BusEvent::LoadData { .. } => "load_data",
            BusEvent::SaveCompleted(_) => "save_completed",
            BusEvent::LoadCompleted(_) => "load_completed",
        }
    }

    /// Wrap a completion in the event matching its operation.
    pub fn completed(kind: OperationKind, completion: Completion) -> Self {
        match kind {
            OperationKind::Save => BusEvent::SaveCompleted(completion),
            OperationKind::Load => BusEvent::LoadCompleted(completion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_round_trip_through_json() {
        let slot = SlotId::new(1).unwrap();
        let events = vec![
            BusEvent::SaveRequested {
                slot,
                operation_id: Ulid::new(),
                request_time: Utc::now(),
            },
            BusEvent::SaveDataResponse {
                system_name: "Player".to_string(),
                payload: r#"{"hp":80}"#.to_string(),
            },
            BusEvent::LoadData {
                slot,
                state: [("Player", "x")].into_iter().collect(),
                save_time: "2024-01-01 00:00:00".to_string(),
                operation_id: Ulid::new(),
            },
        ];

        for event in events {
            let json = serde_json::to_string(&event).expect("serialize event");
            let back: BusEvent = serde_json::from_str(&json).expect("deserialize event");
            assert_eq!(back, event);
        }
    }

    #[test]
    fn completed_picks_variant_by_kind() {
        let completion = Completion {
            slot: SlotId::new(2).unwrap(),
            success: true,
            count: 3,
            save_time: String::new(),
            operation_id: Ulid::new(),
            message: "ok".to_string(),
        };

        let save = BusEvent::completed(OperationKind::Save, completion.clone());
        assert_eq!(save.label(), "save_completed");
        let load = BusEvent::completed(OperationKind::Load, completion);
        assert_eq!(load.label(), "load_completed");
    }
}
