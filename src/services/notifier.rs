//! Broadcast-channel notifier for the UI layer
//!
//! Delivery semantics are at-least-once-or-dropped: a slow subscriber that
//! falls behind the channel capacity loses the oldest events, and with no
//! subscriber at all every event is dropped silently. The supervisor treats
//! the UI as a lossy, best-effort observer and never blocks on it.

use tokio::sync::broadcast;

use crate::traits::Notifier;
use crate::types::UiEvent;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub struct BroadcastNotifier {
    tx: broadcast::Sender<UiEvent>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attach a new UI subscriber. Events pushed before subscription are not
    /// replayed; consumers should call `status()` for the current state.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: UiEvent) {
        // Send fails only when there is no subscriber; that is fine.
        let _ = self.tx.send(event);
    }
}
