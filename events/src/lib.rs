//! Engine events.
//!
//! Segment refreshes, scheduling and dispatch outcomes are published as [`EngineEvent`]s so
//! that observers (the worker's log handler, a future notification channel) stay decoupled
//! from the domain crate.
//!
//! This crate has no dependencies on internal crates (entity, domain, etc.),
//! avoiding circular dependencies. Entity data is carried as serialized JSON values.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// A type alias that represents any Entity's internal id field data type.
/// This matches the definition in the entity crate to maintain compatibility.
pub type Id = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A segment's member set was replaced.
    SegmentRefreshed {
        profile_id: Id,
        segment_id: Id,
        membership_version: i64,
        joined: Vec<Id>,
        left: Vec<Id>,
    },
    /// A new pending execution was stored. Duplicates never produce this event.
    ExecutionScheduled {
        profile_id: Id,
        execution_id: Id,
        /// Complete serialized execution row.
        execution: Value,
    },
    /// A claimed execution reached `sent`, `failed` or `skipped`.
    ExecutionResolved {
        profile_id: Id,
        execution_id: Id,
        status: String,
        reason: Option<String>,
    },
}

impl EngineEvent {
    pub fn profile_id(&self) -> Id {
        match self {
            EngineEvent::SegmentRefreshed { profile_id, .. }
            | EngineEvent::ExecutionScheduled { profile_id, .. }
            | EngineEvent::ExecutionResolved { profile_id, .. } => *profile_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::SegmentRefreshed { .. } => "segment_refreshed",
            EngineEvent::ExecutionScheduled { .. } => "execution_scheduled",
            EngineEvent::ExecutionResolved { .. } => "execution_resolved",
        }
    }
}

/// Trait for handling engine events.
/// Implementations can perform side effects like logging or forwarding to a queue.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EngineEvent);
}

/// Publishes engine events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Publish an event to all registered handlers.
    pub async fn publish(&self, event: EngineEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
