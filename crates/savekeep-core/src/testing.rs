// ABOUTME: Test utilities for savekeep, including a bus that records everything published.
// ABOUTME: Used by coordinator and integration tests to assert on emitted events.

use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::bus::{EventBus, InMemoryEventBus};
use crate::event::{BusEvent, Completion};
use crate::state::CollectedState;

/// An event bus that delivers like `InMemoryEventBus` and also keeps a log
/// of every published event with the instant it was published.
#[derive(Default)]
pub struct RecordingBus {
    inner: InMemoryEventBus,
    log: Mutex<Vec<(Instant, BusEvent)>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<BusEvent> {
        self.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Publish instants of every save request, in order.
    pub fn save_request_times(&self) -> Vec<Instant> {
        self.lock()
            .iter()
            .filter(|(_, e)| matches!(e, BusEvent::SaveRequested { .. }))
            .map(|(at, _)| *at)
            .collect()
    }

    /// The state carried by the most recent load-data event.
    pub fn last_load_data(&self) -> Option<CollectedState> {
        self.lock().iter().rev().find_map(|(_, e)| match e {
            BusEvent::LoadData { state, .. } => Some(state.clone()),
            _ => None,
        })
    }

    pub fn save_completions(&self) -> Vec<Completion> {
        self.lock()
            .iter()
            .filter_map(|(_, e)| match e {
                BusEvent::SaveCompleted(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn load_completions(&self) -> Vec<Completion> {
        self.lock()
            .iter()
            .filter_map(|(_, e)| match e {
                BusEvent::LoadCompleted(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Instant, BusEvent)>> {
        // A panicking test thread must not hide the log from the others.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventBus for RecordingBus {
    fn publish(&self, event: BusEvent) -> usize {
        self.lock().push((Instant::now(), event.clone()));
        self.inner.publish(event)
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_delivers() {
        let bus = RecordingBus::new();
        let mut rx = bus.subscribe();

        let event = BusEvent::SaveDataResponse {
            system_name: "A".to_string(),
            payload: "1".to_string(),
        };
        assert_eq!(bus.publish(event.clone()), 1);

        assert_eq!(rx.recv().await.unwrap(), event);
        assert_eq!(bus.events(), vec![event]);
    }
}
