//! Live update channel for Linkup.
//!
//! The server side ([`LiveHub`]) fans newly created direct messages out to
//! per-user broadcast channels; the client side ([`LiveConnection`]) drains
//! one such stream and routes every incoming message either into an open
//! conversation ([`ConversationStore`]) or onto a transient toast stack
//! ([`ToastStack`]), depending on which conversation is open at the moment
//! the message arrives.
//!
//! Delivery is best effort: nothing is buffered for closed connections and
//! a dropped transport is simply closed, with history recovered through the
//! ordinary fetch endpoints on the next mount.

mod connection;
mod conversations;
mod event;
mod hub;
mod notifier;
mod router;
mod sse;

pub use connection::{LiveConnection, LiveError};
pub use conversations::ConversationStore;
pub use event::{LiveEvent, MessagePayload};
pub use hub::LiveHub;
pub use notifier::{Toast, ToastStack};
pub use router::{route, ActiveConversation, Routing};
pub use sse::open_message_stream;
