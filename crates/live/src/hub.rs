//! Server-side fan-out of live events to connected clients.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::event::LiveEvent;

/// Per-user broadcast channels for live message delivery.
///
/// One sender exists per user with at least one open stream; events
/// published while nobody is subscribed are dropped. There is no replay:
/// a subscriber only sees events that arrive after it subscribed.
#[derive(Clone)]
pub struct LiveHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<LiveEvent>>>>,
    capacity: usize,
}

impl LiveHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to events addressed to `user_id`.
    pub async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<LiveEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver an event to every open stream of `user_id`.
    ///
    /// Returns the number of receivers the event reached. Channels with no
    /// remaining receivers are pruned.
    pub async fn publish(&self, user_id: &str, event: LiveEvent) -> usize {
        let mut channels = self.channels.write().await;
        let Some(sender) = channels.get(user_id) else {
            return 0;
        };

        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                channels.remove(user_id);
                debug!(user_id, "pruned live channel with no subscribers");
                0
            }
        }
    }
}

impl Default for LiveHub {
    fn default() -> Self {
        Self::new(100)
    }
}
