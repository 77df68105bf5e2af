use tokio::sync::broadcast;

use crate::dto::events::RoomChangedEvent;

/// Broadcast hub fanning room change notifications out to subscribers.
pub struct RoomEventHub {
    sender: broadcast::Sender<RoomChangedEvent>,
}

impl RoomEventHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomChangedEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, returning how many received it.
    pub fn publish(&self, event: RoomChangedEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
