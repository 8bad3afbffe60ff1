//! Engine facade
//!
//! [`SyncEngine`] wires the cache, selection, dispatcher, poller and event
//! bus around one parent entity (the solution flow whose steps are listed).
//! The application talks to this type only.

use crate::backend::WorkspaceBackend;
use crate::cache::DetailCache;
use crate::config::SyncConfig;
use crate::dispatcher::{DispatchReport, ToolEvent, ToolResultDispatcher, REFRESH_TOOL};
use crate::error::{BackendError, SyncError};
use crate::events::{EventBus, NoticeLevel, SyncEvent};
use crate::poller::{AsyncJobPoller, JobHandle, JobId, JobStatus, PollOptions, PollOutcome};
use crate::selection::SelectionController;
use brd_model::confirmation;
use brd_model::{diff, ConfirmationAction, EntityDetail, EntityId, EntitySummary, Transition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Kind of long-running job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Document upload; cancelled when the selection leaves its resource
    Upload,
    DocumentAnalysis,
    CompetitorAnalysis,
}

/// What a job is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobScope {
    pub resource_id: EntityId,
    pub kind: JobKind,
}

impl JobScope {
    #[must_use]
    pub fn new(resource_id: impl Into<EntityId>, kind: JobKind) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind,
        }
    }
}

/// Synchronization engine for one parent entity
#[derive(Debug, Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    config: SyncConfig,
    parent_id: EntityId,
    backend: Arc<dyn WorkspaceBackend>,
    cache: DetailCache,
    events: EventBus,
    selection: Arc<SelectionController>,
    dispatcher: Arc<ToolResultDispatcher>,
}

impl SyncEngine {
    /// Create an engine for the children of `parent_id`
    ///
    /// # Errors
    /// Returns `SyncError::Config` if `config` is invalid
    pub fn new(
        config: SyncConfig,
        parent_id: impl Into<EntityId>,
        backend: Arc<dyn WorkspaceBackend>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let parent_id = parent_id.into();
        let cache = DetailCache::new(config.cache_capacity);
        let events = EventBus::new(config.event_capacity);
        let selection = Arc::new(SelectionController::new(events.clone()));
        let dispatcher = Arc::new(ToolResultDispatcher::new(
            parent_id.clone(),
            cache.clone(),
            Arc::clone(&backend),
            Arc::clone(&selection),
            events.clone(),
            config.highlight_duration_ms,
        ));

        tracing::debug!(parent = %parent_id, "sync engine created");
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                parent_id,
                backend,
                cache,
                events,
                selection,
                dispatcher,
            }),
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    #[inline]
    #[must_use]
    pub fn parent_id(&self) -> &EntityId {
        &self.inner.parent_id
    }

    /// Subscribe to engine events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Cached snapshot; never performs I/O
    #[must_use]
    pub fn get_cached(&self, id: &EntityId) -> Option<Arc<EntityDetail>> {
        self.inner.cache.get(id)
    }

    #[inline]
    #[must_use]
    pub fn current_selection(&self) -> Option<EntityId> {
        self.inner.selection.current()
    }

    #[inline]
    #[must_use]
    pub fn selection(&self) -> &SelectionController {
        &self.inner.selection
    }

    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &ToolResultDispatcher {
        &self.inner.dispatcher
    }

    /// Select `id` and load its snapshot
    ///
    /// A cache hit returns immediately. On a miss the snapshot is fetched;
    /// `Ok(None)` means the selection moved before the response arrived and
    /// the response was discarded.
    ///
    /// # Errors
    /// Returns `FetchFailure` if the fetch fails
    pub async fn open(&self, id: &EntityId) -> Result<Option<Arc<EntityDetail>>, SyncError> {
        let inner = &self.inner;
        inner.selection.select(Some(id.clone()));
        if let Some(hit) = inner.cache.get(id) {
            tracing::trace!(entity = %id, "open served from cache");
            return Ok(Some(hit));
        }

        let ticket = inner.selection.ticket();
        let _writer = inner.dispatcher.lock_entity(id).await;
        if let Some(hit) = inner.cache.get(id) {
            return Ok(Some(hit));
        }
        let detail = match inner.backend.fetch_detail(id).await {
            Ok(detail) => detail,
            Err(source) => {
                let err = SyncError::fetch(id.clone(), source);
                tracing::warn!(error = %err, "detail fetch failed");
                inner
                    .events
                    .notice(NoticeLevel::Warning, Some(id), err.to_string());
                return Err(err);
            }
        };
        if !inner.selection.is_current(&ticket) {
            tracing::debug!(entity = %id, "selection moved during fetch, dropping response");
            return Ok(None);
        }

        inner.cache.set(id, detail)?;
        Ok(inner.cache.get(id))
    }

    /// Clear the selection
    pub fn close(&self) {
        self.inner.selection.select(None);
    }

    /// Fetch the parent list and keep the selection valid against it
    ///
    /// # Errors
    /// Returns `FetchFailure` if the list fetch fails
    pub async fn load_list(&self) -> Result<Vec<EntitySummary>, SyncError> {
        let items = self.inner.dispatcher.refresh_list().await?;
        self.inner.selection.reconcile(&items);
        Ok(items)
    }

    /// Dispatch one completed tool result against the current selection
    pub async fn handle_tool_result(
        &self,
        tool_name: &str,
        result: &serde_json::Value,
    ) -> DispatchReport {
        let selection = self.current_selection();
        self.inner
            .dispatcher
            .handle(tool_name, result, selection.as_ref())
            .await
    }

    /// Dispatch new complete events of a chat session
    pub async fn ingest(&self, session_id: &str, events: &[ToolEvent]) -> Vec<DispatchReport> {
        self.inner.dispatcher.ingest(session_id, events).await
    }

    /// Consultant confirms `id`
    ///
    /// # Errors
    /// `MutationRejected` when the backend refuses; the status is rolled back
    pub async fn confirm(&self, id: &EntityId) -> Result<Transition, SyncError> {
        self.change_status(id, ConfirmationAction::Confirm).await
    }

    /// Ask the client to review `id`
    ///
    /// # Errors
    /// `MutationRejected` when the backend refuses; the status is rolled back
    pub async fn request_review(&self, id: &EntityId) -> Result<Transition, SyncError> {
        self.change_status(id, ConfirmationAction::RequestReview)
            .await
    }

    /// Optimistic status change with rollback on rejection
    async fn change_status(
        &self,
        id: &EntityId,
        action: ConfirmationAction,
    ) -> Result<Transition, SyncError> {
        let inner = &self.inner;
        if !inner.cache.contains(id) {
            let detail = inner
                .backend
                .fetch_detail(id)
                .await
                .map_err(|source| SyncError::fetch(id.clone(), source))?;
            inner.cache.set(id, detail)?;
        }

        let mut applied = None;
        let write = inner.cache.update::<SyncError, _>(id, |current| {
            let current = current.ok_or_else(|| SyncError::NotCached(id.clone()))?;
            let transition = confirmation::apply(current.confirmation_status, action);
            applied = Some(transition);
            if !transition.is_change() {
                return Ok(None);
            }
            let mut next = current.clone();
            next.apply_transition(transition);
            Ok(Some(next))
        })?;
        let transition = applied.ok_or_else(|| SyncError::NotCached(id.clone()))?;
        if !transition.is_change() {
            return Ok(transition);
        }
        if let (Some(previous), Some(current)) = (&write.previous, &write.current) {
            self.emit_changes(id, previous, current);
        }

        match inner.backend.update_confirmation(id, transition.status()).await {
            Ok(()) => {
                tracing::debug!(entity = %id, status = %transition.status(), "status change accepted");
                Ok(transition)
            }
            Err(e) => {
                let reason = match e {
                    BackendError::Rejected(reason) => reason,
                    other => other.to_string(),
                };
                tracing::warn!(entity = %id, %reason, "status change rejected, rolling back");
                self.roll_back(id, transition);
                inner.events.notice(
                    NoticeLevel::Error,
                    Some(id),
                    format!("could not update {id}: {reason}"),
                );
                Err(SyncError::MutationRejected {
                    entity: id.clone(),
                    reason,
                })
            }
        }
    }

    /// Restore the status the transition started from, unless something
    /// newer already replaced it
    fn roll_back(&self, id: &EntityId, transition: Transition) {
        let write = self.inner.cache.update::<SyncError, _>(id, |current| {
            Ok(current
                .filter(|current| current.confirmation_status == transition.status())
                .map(|current| {
                    let mut next = current.clone();
                    next.confirmation_status = transition.previous();
                    next
                }))
        });
        match write {
            Ok(write) => {
                if let (Some(previous), Some(current)) = (&write.previous, &write.current) {
                    self.emit_changes(id, previous, current);
                }
            }
            Err(e) => tracing::warn!(error = %e, "rollback failed"),
        }
    }

    /// (Re)generate the parent's children, then refresh the list
    ///
    /// # Errors
    /// `Backend` if the trigger fails, `FetchFailure` if the list refresh does
    pub async fn generate(&self, force: bool) -> Result<Vec<EntitySummary>, SyncError> {
        let inner = &self.inner;
        inner
            .backend
            .trigger_generation(&inner.parent_id, force)
            .await?;
        tracing::info!(parent = %inner.parent_id, force, "generation triggered");
        self.load_list().await
    }

    /// Enrich `id`, then invalidate and refetch it
    ///
    /// # Errors
    /// `Backend` if the trigger fails
    pub async fn enrich(&self, id: &EntityId) -> Result<DispatchReport, SyncError> {
        self.inner.backend.trigger_enrichment(id).await?;
        tracing::info!(entity = %id, "enrichment triggered");
        Ok(self
            .handle_tool_result(REFRESH_TOOL, &serde_json::json!({ "entity_id": id }))
            .await)
    }

    /// Poll a backend job until it settles
    ///
    /// `completed` refreshes the resource through the dispatcher, `failed`
    /// emits an error notice, running out of attempts emits a "still
    /// processing" notice. Upload jobs are cancelled when the selection
    /// leaves their resource.
    pub fn track_job(&self, job_id: impl Into<JobId>, scope: JobScope) -> JobHandle {
        let job_id = job_id.into();
        let inner = &self.inner;

        let backend = Arc::clone(&inner.backend);
        let job = job_id.clone();
        let check = move || {
            let backend = Arc::clone(&backend);
            let job = job.clone();
            async move { backend.check_job_status(&job).await.map_err(SyncError::from) }
        };

        let dispatcher = Arc::clone(&inner.dispatcher);
        let selection = Arc::clone(&inner.selection);
        let events = inner.events.clone();
        let resource = scope.resource_id.clone();
        let on_terminal = move |status: JobStatus| match status {
            JobStatus::Completed => {
                tokio::spawn(async move {
                    let current = selection.current();
                    dispatcher
                        .handle(
                            REFRESH_TOOL,
                            &serde_json::json!({ "entity_id": resource }),
                            current.as_ref(),
                        )
                        .await;
                });
            }
            JobStatus::Failed => {
                events.notice(NoticeLevel::Error, Some(&resource), format!("job for {resource} failed"));
            }
            JobStatus::Pending | JobStatus::Running => {}
        };

        let options = PollOptions::new(inner.config.poll_interval(), inner.config.max_poll_attempts);
        let handle = AsyncJobPoller::poll(scope.resource_id.clone(), check, options, on_terminal);
        tracing::debug!(job = %job_id, resource = %scope.resource_id, kind = ?scope.kind, "tracking job");

        let watcher = handle.clone();
        let events = inner.events.clone();
        tokio::spawn(async move {
            if let PollOutcome::Exhausted { attempts } = watcher.finished().await {
                let err = SyncError::PollExhausted {
                    resource: watcher.resource_id().clone(),
                    attempts,
                };
                events.notice(NoticeLevel::Info, Some(watcher.resource_id()), err.to_string());
            }
        });

        if scope.kind == JobKind::Upload {
            inner.selection.register_job(handle.clone());
        }
        handle
    }

    fn emit_changes(&self, id: &EntityId, previous: &EntityDetail, current: &EntityDetail) {
        let changes = diff(Some(previous), current);
        if changes.is_empty() {
            return;
        }
        self.inner.events.emit(SyncEvent::ChangeSetComputed {
            entity_id: id.clone(),
            changes,
            highlight_ms: self.inner.config.highlight_duration_ms,
        });
    }
}
