//! Change notifications published by the store over a
//! `tokio::sync::broadcast` channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{CategoryId, EntityRef, OwnerScope};

/// Something observable changed in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A load replaced the whole snapshot.
    Loaded { scope: OwnerScope, generation: u64 },
    /// The category forest changed shape or content.
    ForestChanged,
    /// The content list of one category changed.
    ContentsChanged { category_id: CategoryId },
    /// An optimistic change was reverted after a persistence failure.
    RolledBack {
        reason: String,
        entities: Vec<EntityRef>,
    },
}

/// Fan-out sender. Publishing with no subscribers is not an error.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: StoreEvent) {
        tracing::trace!(?event, "store event");
        // Only fails when there are no receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::{EventBus, StoreEvent};

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(StoreEvent::ForestChanged);
        bus.publish(StoreEvent::ContentsChanged { category_id: 3 });
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::ForestChanged);
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::ContentsChanged { category_id: 3 }
        );
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        EventBus::new(1).publish(StoreEvent::ForestChanged);
    }

    #[test]
    fn serializes_with_event_tag() {
        let json = serde_json::to_value(StoreEvent::ContentsChanged { category_id: 3 }).unwrap();
        assert_eq!(json["event"], "contents_changed");
    }
}
