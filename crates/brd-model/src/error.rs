//! Error types for the entity model

use crate::entity::EntityId;

/// Errors raised by model-level operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Unknown confirmation status string
    #[error("unknown confirmation status: {0}")]
    UnknownStatus(String),

    /// Snapshot identifier does not match the slot it is written to
    #[error("identifier mismatch: expected {expected}, got {actual}")]
    IdentifierMismatch { expected: EntityId, actual: EntityId },

    /// Targeted question patch could not locate its question
    #[error("question not found on {entity}: {question:?}")]
    QuestionNotFound { entity: EntityId, question: String },
}

impl ModelError {
    /// Whether a targeted patch should fall back to a full refetch
    #[inline]
    #[must_use]
    pub fn is_patch_miss(&self) -> bool {
        matches!(self, Self::QuestionNotFound { .. })
    }
}
