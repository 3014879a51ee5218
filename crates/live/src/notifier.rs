//! Transient message notifications.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::event::MessagePayload;

const DEFAULT_TTL: Duration = Duration::from_secs(5);
const DEFAULT_VISIBLE_CAP: usize = 4;

/// A single visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub from_user_id: String,
    pub preview: String,
}

/// Stack of transient, auto-dismissing message notifications.
///
/// Toasts stack in arrival order, disappear after a fixed duration unless
/// dismissed earlier, and activating one yields the conversation to
/// navigate to. At most a small number are visible at once; presenting
/// beyond the cap evicts the oldest.
#[derive(Clone)]
pub struct ToastStack {
    inner: Arc<Mutex<ToastState>>,
    ttl: Duration,
    cap: usize,
}

struct ToastState {
    next_id: u64,
    toasts: Vec<Toast>,
}

impl ToastStack {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ToastState {
                next_id: 1,
                toasts: Vec::new(),
            })),
            ttl,
            cap: cap.max(1),
        }
    }

    /// Present a notification for `message` and schedule its dismissal.
    ///
    /// Must be called from within a tokio runtime; the dismissal timer is a
    /// spawned task.
    pub fn present(&self, message: &MessagePayload) -> u64 {
        let id = {
            let mut state = self.inner.lock().expect("toast stack lock poisoned");
            let id = state.next_id;
            state.next_id += 1;

            state.toasts.push(Toast {
                id,
                from_user_id: message.from_user_id.clone(),
                preview: message.content.clone(),
            });

            if state.toasts.len() > self.cap {
                state.toasts.remove(0);
            }

            id
        };

        let stack = self.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            stack.dismiss(id);
        });

        id
    }

    /// Remove a toast early. Dismissing twice is a no-op.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut state = self.inner.lock().expect("toast stack lock poisoned");
        let before = state.toasts.len();
        state.toasts.retain(|toast| toast.id != id);
        state.toasts.len() != before
    }

    /// Activate a toast: dismiss it and return the conversation to open.
    pub fn activate(&self, id: u64) -> Option<String> {
        let mut state = self.inner.lock().expect("toast stack lock poisoned");
        let position = state.toasts.iter().position(|toast| toast.id == id)?;
        let toast = state.toasts.remove(position);
        Some(toast.from_user_id)
    }

    pub fn visible(&self) -> Vec<Toast> {
        self.inner
            .lock()
            .expect("toast stack lock poisoned")
            .toasts
            .clone()
    }
}

impl Default for ToastStack {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_VISIBLE_CAP)
    }
}
