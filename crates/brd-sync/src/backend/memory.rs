//! In-memory backend
//!
//! Serves snapshots and lists from maps, replays scripted job status
//! sequences and can be told to fail. Backs the replay binary and tests.

use super::WorkspaceBackend;
use crate::error::BackendError;
use crate::poller::{JobId, JobStatus};
use async_trait::async_trait;
use brd_model::{ConfirmationStatus, EntityDetail, EntityId, EntitySummary};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

/// Number of calls per backend operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub fetch_detail: usize,
    pub fetch_list: usize,
    pub check_job_status: usize,
    pub trigger_generation: usize,
    pub trigger_enrichment: usize,
    pub update_confirmation: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    details: HashMap<EntityId, EntityDetail>,
    lists: HashMap<EntityId, Vec<EntitySummary>>,
    jobs: HashMap<JobId, VecDeque<JobStatus>>,
    failing: HashSet<EntityId>,
    reject_confirmations: Option<String>,
    fetch_delay: Option<Duration>,
    confirmations: Vec<(EntityId, ConfirmationStatus)>,
    calls: CallCounts,
}

/// Map-backed [`WorkspaceBackend`]
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl InMemoryBackend {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot, replacing any previous one
    pub fn put_detail(&self, detail: EntityDetail) {
        self.state
            .lock()
            .details
            .insert(detail.id().clone(), detail);
    }

    /// Set the child list of `parent`
    pub fn set_list(&self, parent: impl Into<EntityId>, items: Vec<EntitySummary>) {
        self.state.lock().lists.insert(parent.into(), items);
    }

    /// Store snapshots and derive the child list of `parent` from them
    pub fn seed(&self, parent: impl Into<EntityId>, details: Vec<EntityDetail>) {
        let items = details.iter().map(EntityDetail::summary).collect();
        let mut state = self.state.lock();
        for detail in details {
            state.details.insert(detail.id().clone(), detail);
        }
        state.lists.insert(parent.into(), items);
    }

    /// Delete an entity as the backend would after a remove tool call
    pub fn remove_entity(&self, parent: &EntityId, entity: &EntityId) {
        let mut state = self.state.lock();
        state.details.remove(entity);
        if let Some(list) = state.lists.get_mut(parent) {
            list.retain(|item| &item.id != entity);
        }
    }

    /// Script the statuses a job reports; the last one repeats
    pub fn script_job(&self, job: impl Into<JobId>, statuses: impl IntoIterator<Item = JobStatus>) {
        self.state
            .lock()
            .jobs
            .insert(job.into(), statuses.into_iter().collect());
    }

    /// Make fetches of `id` (detail or list) fail with a transport error
    pub fn fail_fetches(&self, id: impl Into<EntityId>) {
        self.state.lock().failing.insert(id.into());
    }

    /// Undo [`fail_fetches`](Self::fail_fetches)
    pub fn heal(&self, id: &EntityId) {
        self.state.lock().failing.remove(id);
    }

    /// Reject confirmation updates with `reason`, or accept them again with `None`
    pub fn reject_confirmations(&self, reason: Option<&str>) {
        self.state.lock().reject_confirmations = reason.map(str::to_string);
    }

    /// Delay every detail fetch
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state.lock().fetch_delay = delay;
    }

    /// Snapshot of the call counters
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    /// Accepted confirmation updates, in order
    #[must_use]
    pub fn confirmations(&self) -> Vec<(EntityId, ConfirmationStatus)> {
        self.state.lock().confirmations.clone()
    }

    /// Stored snapshot, bypassing call accounting
    #[must_use]
    pub fn stored(&self, entity: &EntityId) -> Option<EntityDetail> {
        self.state.lock().details.get(entity).cloned()
    }
}

#[async_trait]
impl WorkspaceBackend for InMemoryBackend {
    async fn fetch_detail(&self, entity: &EntityId) -> Result<EntityDetail, BackendError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.fetch_detail += 1;
            state.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if state.failing.contains(entity) {
            return Err(BackendError::Transport(format!("fetch {entity} failed")));
        }
        state
            .details
            .get(entity)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(entity.to_string()))
    }

    async fn fetch_list(&self, parent: &EntityId) -> Result<Vec<EntitySummary>, BackendError> {
        let mut state = self.state.lock();
        state.calls.fetch_list += 1;
        if state.failing.contains(parent) {
            return Err(BackendError::Transport(format!("list {parent} failed")));
        }
        Ok(state.lists.get(parent).cloned().unwrap_or_default())
    }

    async fn check_job_status(&self, job: &JobId) -> Result<JobStatus, BackendError> {
        let mut state = self.state.lock();
        state.calls.check_job_status += 1;
        let script = state
            .jobs
            .get_mut(job)
            .ok_or_else(|| BackendError::NotFound(job.to_string()))?;
        let status = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        Ok(status.unwrap_or(JobStatus::Pending))
    }

    async fn trigger_generation(&self, _parent: &EntityId, _force: bool) -> Result<(), BackendError> {
        self.state.lock().calls.trigger_generation += 1;
        Ok(())
    }

    async fn trigger_enrichment(&self, _entity: &EntityId) -> Result<(), BackendError> {
        self.state.lock().calls.trigger_enrichment += 1;
        Ok(())
    }

    async fn update_confirmation(
        &self,
        entity: &EntityId,
        status: ConfirmationStatus,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.calls.update_confirmation += 1;
        if let Some(reason) = &state.reject_confirmations {
            return Err(BackendError::Rejected(reason.clone()));
        }
        if let Some(detail) = state.details.get_mut(entity) {
            detail.confirmation_status = status;
        }
        state.confirmations.push((entity.clone(), status));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brd_model::EntityKind;

    #[tokio::test]
    async fn job_script_repeats_last_status() {
        let backend = InMemoryBackend::new();
        backend.script_job("job-1", [JobStatus::Pending, JobStatus::Completed]);
        let job = JobId::from("job-1");

        assert_eq!(backend.check_job_status(&job).await.unwrap(), JobStatus::Pending);
        assert_eq!(backend.check_job_status(&job).await.unwrap(), JobStatus::Completed);
        assert_eq!(backend.check_job_status(&job).await.unwrap(), JobStatus::Completed);
        assert_eq!(backend.calls().check_job_status, 3);
    }

    #[tokio::test]
    async fn failing_fetch_and_heal() {
        let backend = InMemoryBackend::new();
        backend.put_detail(EntityDetail::new("a", EntityKind::Step));
        let id = EntityId::from("a");

        backend.fail_fetches("a");
        assert!(matches!(
            backend.fetch_detail(&id).await,
            Err(BackendError::Transport(_))
        ));

        backend.heal(&id);
        assert!(backend.fetch_detail(&id).await.is_ok());
    }

    #[tokio::test]
    async fn set_list_replaces_listing_only() {
        let backend = InMemoryBackend::new();
        backend.seed("flow", vec![EntityDetail::new("a", EntityKind::Step)]);
        let b = EntityDetail::new("b", EntityKind::Step);
        backend.set_list("flow", vec![b.summary()]);

        let list = backend.fetch_list(&EntityId::from("flow")).await.unwrap();
        assert_eq!(list, vec![b.summary()]);
        assert!(backend.stored(&EntityId::from("a")).is_some());
        assert!(backend.fetch_list(&EntityId::from("other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_entity_updates_list() {
        let backend = InMemoryBackend::new();
        backend.seed(
            "flow",
            vec![
                EntityDetail::new("a", EntityKind::Step),
                EntityDetail::new("b", EntityKind::Step),
            ],
        );
        let parent = EntityId::from("flow");
        backend.remove_entity(&parent, &EntityId::from("a"));

        let list = backend.fetch_list(&parent).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id.as_str(), "b");
    }
}
