//! Event types delivered over the live channel.

use serde::{Deserialize, Serialize};

/// Events the server pushes to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A direct message addressed to the subscribed user was created.
    Message { message: MessagePayload },
}

/// Wire shape of a direct message.
///
/// Immutable once created; the channel forwards it opaquely into either a
/// conversation list or a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub message_type: String,
    pub created_at: String,
}
