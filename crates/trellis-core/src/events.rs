//! Persistence events dispatched by a session around saves and deletes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::object::ObjectRef;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which lifecycle point the event marks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PreSave,
    PostSave,
    PreDelete,
    PostDelete,
}

/// An event about one domain object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub object: ObjectRef,
    pub class: String,
}

impl PersistenceEvent {
    pub fn new(kind: EventKind, object: ObjectRef, class: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            kind,
            object,
            class: class.into(),
        }
    }
}

/// Receives persistence events from a session.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &PersistenceEvent);
}

impl<F> EventListener for F
where
    F: Fn(&PersistenceEvent) + Send + Sync,
{
    fn on_event(&self, event: &PersistenceEvent) {
        self(event)
    }
}
