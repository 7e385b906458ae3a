// ABOUTME: Adapter that lets a subsystem take part in saves and loads without knowing the coordinator.
// ABOUTME: Answers every save request with its payload and applies its own entry from load data.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::bus::EventBus;
use crate::event::BusEvent;

/// A subsystem that owns a piece of state and can serialize it to an opaque string.
pub trait Persistable: Send + Sync {
    /// Unique name used as the key in the collected state.
    fn system_name(&self) -> &str;

    /// Serialize current state.
    fn capture(&self) -> String;

    /// Replace current state with a previously captured payload.
    fn restore(&self, payload: &str);
}

/// Subscribe `participant` to the bus and serve it on a background task.
///
/// The subscription is taken before this function returns, so a save request
/// published immediately afterwards is seen. The task ends when the bus is
/// dropped or the handle is aborted.
pub fn spawn_participant(
    bus: Arc<dyn EventBus>,
    participant: Arc<dyn Persistable>,
) -> JoinHandle<()> {
    let mut events = BroadcastStream::new(bus.subscribe());

    tokio::spawn(async move {
        while let Some(item) = events.next().await {
            match item {
                Ok(BusEvent::SaveRequested {
                    slot, operation_id, ..
                }) => {
                    tracing::debug!(
                        system = participant.system_name(),
                        slot = %slot,
                        operation_id = %operation_id,
                        "answering save request"
                    );
                    bus.publish(BusEvent::SaveDataResponse {
                        system_name: participant.system_name().to_string(),
                        payload: participant.capture(),
                    });
                }
                Ok(BusEvent::LoadData { state, slot, .. }) => {
                    match state.get(participant.system_name()) {
                        Some(payload) => participant.restore(payload),
                        None => tracing::debug!(
                            system = participant.system_name(),
                            slot = %slot,
                            "no saved data for system"
                        ),
                    }
                }
                Ok(_) => {}
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    tracing::warn!(
                        system = participant.system_name(),
                        missed,
                        "participant lagged behind the bus"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryEventBus;
    use crate::slot::SlotId;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;
    use ulid::Ulid;

    struct Counter {
        value: Mutex<String>,
    }

    impl Persistable for Counter {
        fn system_name(&self) -> &str {
            "Counter"
        }

        fn capture(&self) -> String {
            self.value.lock().unwrap().clone()
        }

        fn restore(&self, payload: &str) {
            *self.value.lock().unwrap() = payload.to_string();
        }
    }

    #[tokio::test]
    async fn answers_save_requests() {
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let counter = Arc::new(Counter {
            value: Mutex::new("7".to_string()),
        });
        let task = spawn_participant(Arc::clone(&bus), counter);

        let mut rx = bus.subscribe();
        bus.publish(BusEvent::SaveRequested {
            slot: SlotId::new(1).unwrap(),
            operation_id: Ulid::new(),
            request_time: Utc::now(),
        });

        let response = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let BusEvent::SaveDataResponse {
                    system_name,
                    payload,
                } = rx.recv().await.unwrap()
                {
                    return (system_name, payload);
                }
            }
        })
        .await
        .expect("should respond within timeout");

        assert_eq!(response, ("Counter".to_string(), "7".to_string()));
        task.abort();
    }

    #[tokio::test]
    async fn restores_own_entry_from_load_data() {
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let counter = Arc::new(Counter {
            value: Mutex::new("0".to_string()),
        });
        let task = spawn_participant(Arc::clone(&bus), counter.clone());

        bus.publish(BusEvent::LoadData {
            slot: SlotId::new(1).unwrap(),
            state: [("Counter", "42"), ("Other", "x")].into_iter().collect(),
            save_time: String::new(),
            operation_id: Ulid::new(),
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.capture() != "42" {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("should restore within timeout");

        task.abort();
    }
}
