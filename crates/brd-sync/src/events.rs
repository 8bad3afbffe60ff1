//! Events the engine emits to the view layer
//!
//! One broadcast bus carries everything: change sets for highlight
//! scheduling, selection changes, list refreshes and transient notices.
//! Emitting with no subscriber is not an error.

use brd_model::{ChangeSet, EntityId, EntitySummary};
use serde::Serialize;
use tokio::sync::broadcast;

/// Notice severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Engine event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Fields of `entity_id` changed; highlight them for `highlight_ms`
    ChangeSetComputed {
        entity_id: EntityId,
        changes: ChangeSet,
        highlight_ms: u64,
    },
    /// Active entity changed
    SelectionChanged { entity_id: Option<EntityId> },
    /// List view data refreshed
    ListRefreshed {
        parent_id: EntityId,
        items: Vec<EntitySummary>,
    },
    /// Transient notification
    Notice {
        level: NoticeLevel,
        entity_id: Option<EntityId>,
        message: String,
    },
}

/// Broadcast bus for [`SyncEvent`]
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create bus with the given buffer size
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future events
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Emit an event
    pub fn emit(&self, event: SyncEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    /// Emit a notice
    pub fn notice(&self, level: NoticeLevel, entity_id: Option<&EntityId>, message: impl Into<String>) {
        self.emit(SyncEvent::Notice {
            level,
            entity_id: entity_id.cloned(),
            message: message.into(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
