//! Domain event system — decoupled notification of observable state changes.
//!
//! Events are published when something a UI layer might care about happens.
//! Subscribers react without coupling to the coordinator's internals.

use crate::error::ErrorKind;
use crate::message::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A conversation was created and registered
    ConversationCreated {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The current conversation changed
    ConversationSelected {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A conversation was removed from the registry
    ConversationDeleted {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was appended to a conversation
    MessageAppended {
        conversation_id: String,
        role: Role,
        timestamp: DateTime<Utc>,
    },

    /// A generation attempt failed after classification and retries
    GenerationFailed {
        conversation_id: String,
        kind: ErrorKind,
        timestamp: DateTime<Utc>,
    },

    /// A best-effort save did not reach storage
    SaveFailed {
        conversation_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A retention pass completed
    RetentionCompleted {
        conversations_pruned: usize,
        messages_removed: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Components
/// subscribe to receive all events and filter for what they care about.
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
