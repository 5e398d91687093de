//! Domain event system: decoupled communication between bounded contexts.
//!
//! Events are published when something interesting happens in the turn
//! pipeline. UIs and diagnostics subscribe without coupling to the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The agent generated a reply
    ResponseGenerated {
        user_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A turn was durably appended to the short-term window
    TurnRecorded {
        user_id: String,
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// A consolidation ran; `changed` is false for no-op and fallback runs
    ConsolidationAttempted {
        user_id: String,
        changed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Overflowing turns were evicted from the short-term window
    ShortTermTrimmed {
        user_id: String,
        removed: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
