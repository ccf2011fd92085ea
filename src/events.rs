//! Typed application event bus.
//!
//! Components publish refresh and navigation signals here instead of
//! broadcasting untyped events. Delivery is best effort: a subscriber that
//! falls more than [`EVENT_BUS_CAPACITY`] events behind skips the oldest.

use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered events per subscriber.
pub const EVENT_BUS_CAPACITY: usize = 64;

/// Every event a component may publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AppEvent {
    /// Route to an in-app page, in the current view or a new tab.
    Navigate { path: String, new_tab: bool },
    /// The assistant was asked to stop working on the current request.
    AgentStopped,
    /// The assistant abandoned the action it was performing.
    ActionCancelled,
    /// Book instances changed; lists showing them should re-fetch.
    BookInstancesUpdated { endpoint: String },
    /// A reservation changed, which changes an instance's availability status.
    InstanceStatusUpdate { endpoint: String },
}

/// Cloneable handle to the shared broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn publish(&self, event: AppEvent) -> usize {
        tracing::debug!(event = ?event, "publishing app event");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
