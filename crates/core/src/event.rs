//! Domain event system: the pipeline's observability collaborator.
//!
//! Every degraded component, clarification transition and consolidation is
//! published here. Subscribers (CLI renderers, log sinks, tests) react
//! without the pipeline knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A user input entered the pipeline
    TurnReceived {
        session_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The guardrail found the input ambiguous
    ClarificationRequested {
        session_id: String,
        candidates: usize,
        timestamp: DateTime<Utc>,
    },

    /// The user picked one of the pending interpretations
    ClarificationResolved {
        session_id: String,
        interpretation: String,
        timestamp: DateTime<Utc>,
    },

    /// The user moved on; the pending interpretations were discarded
    ClarificationAbandoned {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A component failed and fell back to its documented default
    ComponentDegraded {
        component: String,
        error_kind: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// An assistant answer was produced
    ResponseGenerated {
        session_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// The token budget was checked after a turn
    BudgetChecked {
        used: usize,
        limit: usize,
        timestamp: DateTime<Utc>,
    },

    /// The buffer was folded into persisted state
    ConsolidationCompleted {
        batch: u64,
        consumed_turns: usize,
        updated_keys: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A due consolidation was abandoned; the buffer was left intact
    ConsolidationSkipped {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
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
