use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::DomainEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for reservation notifications, one channel per user.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<DomainEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events concerning `user_id`. Creates the channel if needed.
    pub fn subscribe(&self, user_id: Ulid) -> broadcast::Receiver<DomainEvent> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Deliver to the learner and the instructor. Fire-and-forget.
    pub fn publish(&self, event: &DomainEvent) {
        for user_id in event.parties() {
            self.send(user_id, event);
        }
    }

    /// Send to one user. No-op if nobody is listening.
    pub fn send(&self, user_id: Ulid, event: &DomainEvent) {
        let Some(sender) = self.channels.get(&user_id) else {
            return;
        };
        if sender.send(event.clone()).is_err() {
            drop(sender);
            // Last receiver went away; drop the channel so the map doesn't grow.
            self.channels.remove_if(&user_id, |_, s| s.receiver_count() == 0);
        }
    }
}
