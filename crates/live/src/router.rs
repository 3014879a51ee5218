//! Routing of incoming messages: merge into an open conversation or notify.

use std::sync::{Arc, RwLock};

use crate::event::MessagePayload;

/// What to do with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Append to the conversation the user is currently looking at.
    Merge,
    /// Surface as a transient notification.
    Notify,
}

/// Decide how to handle `message` given the conversation open right now.
///
/// Pure function of its inputs: merge if and only if the open
/// conversation's counterpart is the message sender.
pub fn route(message: &MessagePayload, open_conversation: Option<&str>) -> Routing {
    match open_conversation {
        Some(peer) if peer == message.from_user_id => Routing::Merge,
        _ => Routing::Notify,
    }
}

/// The conversation the user currently has open, if any.
///
/// Written by navigation, read by the delivery path at dispatch time. The
/// cell is shared so the connection always sees the latest route instead of
/// a value captured when the stream was opened.
#[derive(Clone, Default)]
pub struct ActiveConversation {
    inner: Arc<RwLock<Option<String>>>,
}

impl ActiveConversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigate into the conversation with `user_id`.
    pub fn open(&self, user_id: impl Into<String>) {
        *self.inner.write().expect("active conversation lock poisoned") = Some(user_id.into());
    }

    /// Navigate away from any conversation.
    pub fn clear(&self) {
        *self.inner.write().expect("active conversation lock poisoned") = None;
    }

    pub fn current(&self) -> Option<String> {
        self.inner
            .read()
            .expect("active conversation lock poisoned")
            .clone()
    }
}
