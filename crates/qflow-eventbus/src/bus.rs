//! Broadcast-based fan-out for [`QflowEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use crate::event::QflowEvent;

/// Fan-out event bus. Delivers to every active subscriber; if none are
/// listening an event is silently dropped — emission is fire-and-forget,
/// never the source of truth.
///
/// A lagging subscriber that falls behind the channel capacity skips the
/// missed events rather than blocking the publisher; [`EventBus::emit`]
/// never waits on a slow reader.
pub struct EventBus {
    sender: broadcast::Sender<QflowEvent>,
    emitted: AtomicU64,
}

impl EventBus {
    /// Create a bus with the given per-subscriber channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            emitted: AtomicU64::new(0),
        }
    }

    /// Publish an event to all current subscribers.
    pub fn emit(&self, event: QflowEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published from this point on.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Total events published since creation (including ones no subscriber
    /// received).
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Number of currently active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A subscription handle returned by [`EventBus::subscribe`].
pub struct EventSubscriber {
    receiver: broadcast::Receiver<QflowEvent>,
}

impl EventSubscriber {
    /// Wait for the next event. Transparently skips past a lag (the caller
    /// never observes `RecvError::Lagged`); returns `None` once the bus
    /// itself is dropped.
    pub async fn recv(&mut self) -> Option<QflowEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` if nothing is queued right now.
    pub fn try_recv(&mut self) -> Option<QflowEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
