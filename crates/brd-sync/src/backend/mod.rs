//! Backend collaborator contract
//!
//! The engine never talks to the network directly. Everything it needs from
//! the REST-style backend goes through [`WorkspaceBackend`]; trigger calls are
//! fire-and-forget and their effects are observed through later fetches.

mod memory;

pub use memory::{CallCounts, InMemoryBackend};

use crate::error::BackendError;
use crate::poller::{JobId, JobStatus};
use async_trait::async_trait;
use brd_model::{ConfirmationStatus, EntityDetail, EntityId, EntitySummary};

/// Backend operations consumed by the engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkspaceBackend: Send + Sync {
    /// Full snapshot fetch
    async fn fetch_detail(&self, entity: &EntityId) -> Result<EntityDetail, BackendError>;

    /// Lightweight list of the children of `parent`
    async fn fetch_list(&self, parent: &EntityId) -> Result<Vec<EntitySummary>, BackendError>;

    /// Status of a long-running job
    async fn check_job_status(&self, job: &JobId) -> Result<JobStatus, BackendError>;

    /// Kick off (re)generation of the children of `parent`
    async fn trigger_generation(&self, parent: &EntityId, force: bool) -> Result<(), BackendError>;

    /// Kick off enrichment of one entity
    async fn trigger_enrichment(&self, entity: &EntityId) -> Result<(), BackendError>;

    /// Persist a confirmation status change
    async fn update_confirmation(
        &self,
        entity: &EntityId,
        status: ConfirmationStatus,
    ) -> Result<(), BackendError>;
}

impl std::fmt::Debug for dyn WorkspaceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WorkspaceBackend")
    }
}
