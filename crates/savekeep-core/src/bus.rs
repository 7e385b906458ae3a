// ABOUTME: The publish/subscribe seam between the coordinator and the subsystems it serves.
// ABOUTME: Provides the EventBus trait and a tokio broadcast-backed in-memory implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use crate::event::BusEvent;

/// Default number of events buffered per subscriber before lagging.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Fire-and-forget broadcast transport.
///
/// Delivery is not guaranteed: events published with no subscribers are
/// dropped, and a slow subscriber may lag and miss events. Nothing is
/// promised about the order in which different subscribers observe an event.
/// Dropping a receiver unsubscribes it.
pub trait EventBus: Send + Sync {
    /// Publish an event. Returns the number of subscribers it reached.
    fn publish(&self, event: BusEvent) -> usize;

    /// Start receiving events published from now on.
    fn subscribe(&self) -> broadcast::Receiver<BusEvent>;
}

/// Single-process bus built on `tokio::sync::broadcast`.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<BusEvent>,
    published: AtomicU64,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    /// Total events published, including ones nobody received.
    pub fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, event: BusEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let label = event.label();

        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = label, receivers, "event published");
                receivers
            }
            Err(_) => {
                tracing::debug!(event = label, "event dropped, no subscribers");
                0
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }
}
