//! Error types for the sync engine
//!
//! Everything here is recovered locally:
//! - `FetchFailure`: keep the last known snapshot, surface a transient notice
//! - `MutationRejected`: roll back the optimistic status change
//! - `PollExhausted`: treat the job as abandoned ("still processing")
//! - `PatchMismatch`: downgrade to invalidate-and-refetch

use brd_model::{EntityId, ModelError};

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Detail or list fetch failed
    #[error("fetch failed for {entity}: {source}")]
    FetchFailure {
        entity: EntityId,
        #[source]
        source: BackendError,
    },

    /// Backend refused a confirm/review/edit call
    #[error("mutation rejected for {entity}: {reason}")]
    MutationRejected { entity: EntityId, reason: String },

    /// Poller ran out of attempts without a terminal status
    #[error("job for {resource} still processing after {attempts} checks")]
    PollExhausted { resource: EntityId, attempts: u32 },

    /// Targeted local patch could not find its target
    #[error("patch mismatch on {entity}: {detail}")]
    PatchMismatch { entity: EntityId, detail: String },

    /// Tool result payload could not be interpreted
    #[error("invalid payload for {tool}: {reason}")]
    InvalidPayload { tool: String, reason: String },

    /// Entity not present where the operation requires it
    #[error("entity not cached: {0}")]
    NotCached(EntityId),

    /// Model-level failure
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Collaborator failure outside a fetch
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the engine recovers by refetching
    #[inline]
    #[must_use]
    pub fn falls_back_to_refetch(&self) -> bool {
        matches!(self, Self::PatchMismatch { .. } | Self::NotCached(_))
            || matches!(self, Self::Model(e) if e.is_patch_miss())
    }

    /// Whether retrying the same call may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::FetchFailure { source, .. } | Self::Backend(source) => source.is_retryable(),
            Self::PollExhausted { .. } => true,
            _ => false,
        }
    }

    /// Build a `FetchFailure`
    #[inline]
    pub fn fetch(entity: impl Into<EntityId>, source: BackendError) -> Self {
        Self::FetchFailure {
            entity: entity.into(),
            source,
        }
    }
}

/// Errors returned by the backend collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Network or server failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Backend refused the request
    #[error("rejected: {0}")]
    Rejected(String),

    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl BackendError {
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
