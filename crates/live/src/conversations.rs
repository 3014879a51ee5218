//! In-memory conversation views keyed by the peer user.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::event::MessagePayload;

/// Ordered message lists for the conversations the client has on screen.
///
/// Appends keep arrival order and drop messages whose id is already present
/// in that conversation, so a double-delivered event cannot show up twice.
#[derive(Clone, Default)]
pub struct ConversationStore {
    inner: Arc<Mutex<HashMap<String, Vec<MessagePayload>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` to the conversation with `peer_user_id`.
    ///
    /// Returns `false` when the message id was already present and nothing
    /// was appended.
    pub fn append(&self, peer_user_id: &str, message: MessagePayload) -> bool {
        let mut conversations = self.inner.lock().expect("conversation store lock poisoned");
        let list = conversations.entry(peer_user_id.to_string()).or_default();

        if list.iter().any(|existing| existing.id == message.id) {
            return false;
        }

        list.push(message);
        true
    }

    /// Replace the conversation with `peer_user_id`, e.g. from a history fetch.
    pub fn replace(&self, peer_user_id: &str, messages: Vec<MessagePayload>) {
        let mut conversations = self.inner.lock().expect("conversation store lock poisoned");
        conversations.insert(peer_user_id.to_string(), messages);
    }

    pub fn messages(&self, peer_user_id: &str) -> Vec<MessagePayload> {
        self.inner
            .lock()
            .expect("conversation store lock poisoned")
            .get(peer_user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, peer_user_id: &str) -> usize {
        self.inner
            .lock()
            .expect("conversation store lock poisoned")
            .get(peer_user_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, peer_user_id: &str) -> bool {
        self.len(peer_user_id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, content: &str) -> MessagePayload {
        MessagePayload {
            id: id.to_string(),
            from_user_id: "bob".to_string(),
            to_user_id: "me".to_string(),
            content: content.to_string(),
            media_url: None,
            message_type: "text".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn append_keeps_arrival_order() {
        let store = ConversationStore::new();
        assert!(store.append("bob", message("m1", "one")));
        assert!(store.append("bob", message("m2", "two")));

        let messages = store.messages("bob");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "one");
        assert_eq!(messages[1].content, "two");
    }

    #[test]
    fn append_ignores_duplicate_ids() {
        let store = ConversationStore::new();
        assert!(store.append("bob", message("m1", "one")));
        assert!(!store.append("bob", message("m1", "one again")));

        assert_eq!(store.len("bob"), 1);
        assert_eq!(store.messages("bob")[0].content, "one");
    }

    #[test]
    fn replace_swaps_in_fetched_history() {
        let store = ConversationStore::new();
        store.append("bob", message("m9", "live"));

        store.replace(
            "bob",
            vec![message("m1", "from history"), message("m2", "also history")],
        );

        let messages = store.messages("bob");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "from history");
    }

    #[test]
    fn conversations_are_independent() {
        let store = ConversationStore::new();
        store.append("bob", message("m1", "to bob view"));

        assert!(store.is_empty("carol"));
        assert_eq!(store.len("bob"), 1);
    }
}
