//! Client-side connection lifecycle for the live update channel.

use std::sync::{Arc, Mutex};

use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::conversations::ConversationStore;
use crate::event::LiveEvent;
use crate::notifier::ToastStack;
use crate::router::{route, ActiveConversation, Routing};

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("live connection is already open")]
    AlreadyOpen,
    #[error("transport error: {0}")]
    Transport(String),
}

/// A client's live connection, modeled as an explicit state machine.
///
/// States and transitions:
///
/// | state  | `open`             | `close`  | transport error / end |
/// |--------|--------------------|----------|-----------------------|
/// | Closed | Open (fresh gate)  | Closed   | —                     |
/// | Open   | `AlreadyOpen`      | Closed   | Closed                |
///
/// At most one transport is live per connection. `close` is idempotent and
/// detaches the dispatch gate before releasing the transport, so once it
/// returns no merge or notify effect can land, even for events that were
/// already in flight. A transport error closes the connection; reconnecting
/// is the owner's job on its next mount.
#[derive(Clone, Default)]
pub struct LiveConnection {
    inner: Arc<ConnectionInner>,
}

#[derive(Default)]
struct ConnectionInner {
    state: Mutex<State>,
}

#[derive(Default)]
enum State {
    #[default]
    Closed,
    Open {
        gate: Arc<DispatchGate>,
        task: JoinHandle<()>,
    },
}

impl LiveConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start draining `events` and routing them into the given sinks.
    ///
    /// `active` is read at dispatch time, so navigating between
    /// conversations while the stream is open changes routing immediately.
    /// Fails with [`LiveError::AlreadyOpen`] if a transport is already live;
    /// opening again after a `close` establishes a fresh stream.
    pub fn open<S>(
        &self,
        user_id: impl Into<String>,
        events: S,
        active: ActiveConversation,
        conversations: ConversationStore,
        toasts: ToastStack,
    ) -> Result<(), LiveError>
    where
        S: Stream<Item = Result<String, LiveError>> + Send + Unpin + 'static,
    {
        let user_id = user_id.into();
        let mut state = self.inner.state.lock().expect("connection state lock poisoned");

        if let State::Open { .. } = *state {
            return Err(LiveError::AlreadyOpen);
        }

        let gate = Arc::new(DispatchGate {
            detached: Mutex::new(false),
            active,
            conversations,
            toasts,
        });

        let task = tokio::spawn({
            let gate = Arc::clone(&gate);
            let inner = Arc::downgrade(&self.inner);
            let mut events = events;
            async move {
                while let Some(item) = events.next().await {
                    match item {
                        Ok(payload) => gate.dispatch(&payload),
                        Err(error) => {
                            warn!(user_id = %user_id, %error, "live transport failed, closing connection");
                            break;
                        }
                    }
                }

                // Stream ended or failed: fold back to Closed unless a
                // newer open has already replaced this transport.
                if let Some(inner) = inner.upgrade() {
                    let mut state =
                        inner.state.lock().expect("connection state lock poisoned");
                    if let State::Open { gate: current, .. } = &*state {
                        if Arc::ptr_eq(current, &gate) {
                            *state = State::Closed;
                        }
                    }
                }
                gate.detach();
                debug!(user_id = %user_id, "live stream drained");
            }
        });

        *state = State::Open { gate, task };
        Ok(())
    }

    /// Tear down the transport. Safe to call repeatedly; later calls are
    /// no-ops.
    pub fn close(&self) {
        let previous = {
            let mut state = self.inner.state.lock().expect("connection state lock poisoned");
            std::mem::take(&mut *state)
        };

        if let State::Open { gate, task } = previous {
            gate.detach();
            task.abort();
            debug!("live connection closed");
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            *self.inner.state.lock().expect("connection state lock poisoned"),
            State::Open { .. }
        )
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let State::Open { gate, task } = std::mem::take(
            self.state.get_mut().expect("connection state lock poisoned"),
        ) {
            gate.detach();
            task.abort();
        }
    }
}

/// Gate between the transport and the effect sinks.
///
/// Effects run while the gate lock is held; `detach` takes the same lock,
/// so it cannot return while a dispatch is mid-effect, and every dispatch
/// after it observes the detached flag and does nothing.
struct DispatchGate {
    detached: Mutex<bool>,
    active: ActiveConversation,
    conversations: ConversationStore,
    toasts: ToastStack,
}

impl DispatchGate {
    fn dispatch(&self, payload: &str) {
        let detached = self.detached.lock().expect("dispatch gate lock poisoned");
        if *detached {
            return;
        }

        let event: LiveEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(error) => {
                // Malformed events are dropped; the stream keeps going.
                warn!(%error, "dropping malformed live event");
                return;
            }
        };

        let LiveEvent::Message { message } = event;
        match route(&message, self.active.current().as_deref()) {
            Routing::Merge => {
                let peer = message.from_user_id.clone();
                if !self.conversations.append(&peer, message) {
                    debug!(peer = %peer, "ignored duplicate live message");
                }
            }
            Routing::Notify => {
                self.toasts.present(&message);
            }
        }
    }

    fn detach(&self) {
        *self.detached.lock().expect("dispatch gate lock poisoned") = true;
    }
}
