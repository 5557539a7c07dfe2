//! Event bus for session notifications
//!
//! Uses tokio::sync::broadcast for pub/sub pattern.
//! Events are published from the receive loop in frame order; a lagging
//! subscriber drops old events instead of stalling the loop.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::player::{PlayerSnapshot, TrackInfo};

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 256;

/// Event types that can be published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BusEvent {
    /// Session reached `Connected`
    Connected { endpoint: String },
    /// Session returned to `Disconnected`, for whatever reason
    Disconnected { endpoint: String },
    /// A merge produced a new snapshot
    PlayerStateChanged { snapshot: Arc<PlayerSnapshot> },
    /// A merge changed the loaded track; published before the matching
    /// `PlayerStateChanged`
    SongChanged { track: TrackInfo },
    /// Host is shutting down; long-running watchers should exit
    ShuttingDown,
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BusEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}
