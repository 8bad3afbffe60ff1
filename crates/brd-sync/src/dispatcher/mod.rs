//! Tool-result dispatch
//!
//! Turns the result of a completed agent tool call into cache writes, change
//! sets, list refreshes and selection hand-offs. Every recognized tool falls
//! into one [`MutationCategory`]:
//!
//! - **Field update**: apply the returned snapshot, or invalidate and
//!   refetch; then refresh the list and demote cached dependents
//! - **Question lifecycle**: apply the snapshot, or patch just the matched
//!   question in place; a patch that cannot find its question refetches
//! - **Structural**: never patched locally; invalidate, refresh the list,
//!   keep the selection valid
//!
//! Unrecognized tools are ignored. Failures are logged and surfaced as
//! notices; nothing here returns an error to the caller.
//!
//! Dispatches that target the same entity run one at a time: the per-entity
//! lock is held from the first cache write until the last, across any fetch.

mod tools;

pub use tools::{
    MutationCategory, QuestionAction, StructuralAction, ToolCallStatus, ToolEvent,
    ToolResultPayload, FIELD_UPDATE_TOOLS, QUESTION_TOOLS, REFRESH_TOOL, STRUCTURAL_TOOLS,
};

use crate::backend::WorkspaceBackend;
use crate::cache::DetailCache;
use crate::error::SyncError;
use crate::events::{EventBus, NoticeLevel, SyncEvent};
use crate::selection::{SelectionController, SelectionTicket};
use brd_model::diff::{CONFIRMATION_STATUS, STALENESS};
use brd_model::{diff, ChangeSet, EntityDetail, EntityId, EntitySummary};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// What happened to the cache entry of the target entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheAction {
    /// Nothing written
    #[default]
    Untouched,
    /// Snapshot from the payload stored
    SnapshotApplied,
    /// One question patched in place
    QuestionPatched,
    /// Dropped, not refetched
    Invalidated,
    /// Dropped and replaced by a fresh fetch
    Refetched,
    /// Refetch answered after the selection moved; response discarded
    RefetchDropped,
    /// Refetch failed; last known snapshot kept
    RefetchFailed,
}

/// Outcome of one dispatched tool result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub tool: String,
    /// `None` for ignored tools
    pub category: Option<MutationCategory>,
    pub entity: Option<EntityId>,
    pub action: CacheAction,
    /// Changes computed for `entity`
    pub changes: ChangeSet,
    pub list_refreshed: bool,
    /// Selection after the dispatch, when the dispatch moved it
    pub reselected: Option<Option<EntityId>>,
    /// Dependents demoted because `entity` changed
    pub demoted: Vec<EntityId>,
}

impl DispatchReport {
    fn new(tool: &str, category: Option<MutationCategory>) -> Self {
        Self {
            tool: tool.to_string(),
            category,
            ..Self::default()
        }
    }

    /// Whether the tool was recognized
    #[inline]
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.category.is_some()
    }
}

#[derive(Debug, Default)]
struct SessionCursor {
    session: Option<String>,
    position: usize,
}

/// Routes tool results to cache, list and selection
pub struct ToolResultDispatcher {
    parent_id: EntityId,
    cache: DetailCache,
    backend: Arc<dyn WorkspaceBackend>,
    selection: Arc<SelectionController>,
    events: EventBus,
    highlight_ms: u64,
    list: parking_lot::Mutex<Vec<EntitySummary>>,
    cursor: tokio::sync::Mutex<SessionCursor>,
    writers: DashMap<EntityId, Arc<tokio::sync::Mutex<()>>>,
}

impl std::fmt::Debug for ToolResultDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolResultDispatcher")
            .field("parent_id", &self.parent_id)
            .field("highlight_ms", &self.highlight_ms)
            .finish_non_exhaustive()
    }
}

impl ToolResultDispatcher {
    #[must_use]
    pub fn new(
        parent_id: EntityId,
        cache: DetailCache,
        backend: Arc<dyn WorkspaceBackend>,
        selection: Arc<SelectionController>,
        events: EventBus,
        highlight_ms: u64,
    ) -> Self {
        Self {
            parent_id,
            cache,
            backend,
            selection,
            events,
            highlight_ms,
            list: parking_lot::Mutex::new(Vec::new()),
            cursor: tokio::sync::Mutex::new(SessionCursor::default()),
            writers: DashMap::new(),
        }
    }

    /// Exclusive write access to the cache entry of `id`
    ///
    /// Anything that invalidates or fetches `id` and then writes it back
    /// holds this guard for the whole sequence.
    pub async fn lock_entity(&self, id: &EntityId) -> OwnedMutexGuard<()> {
        let writer = Arc::clone(self.writers.entry(id.clone()).or_default().value());
        writer.lock_owned().await
    }

    /// Last list received for the parent
    #[must_use]
    pub fn last_list(&self) -> Vec<EntitySummary> {
        self.list.lock().clone()
    }

    /// Dispatch one completed tool result
    ///
    /// `current_selection` tags any detail refetch; a response arriving after
    /// the selection moved is discarded.
    pub async fn handle(
        &self,
        tool_name: &str,
        result: &serde_json::Value,
        current_selection: Option<&EntityId>,
    ) -> DispatchReport {
        let category = MutationCategory::classify(tool_name);
        let mut report = DispatchReport::new(tool_name, category);
        let Some(category) = category else {
            tracing::trace!(tool = tool_name, "ignoring unrecognized tool");
            return report;
        };

        let payload = match serde_json::from_value::<ToolResultPayload>(result.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                let err = SyncError::InvalidPayload {
                    tool: tool_name.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "dropping tool result");
                return report;
            }
        };
        if let Some(error) = &payload.error {
            tracing::debug!(tool = tool_name, error = %error, "tool reported failure, nothing to sync");
            return report;
        }

        let ticket = SelectionTicket {
            entity: current_selection.cloned(),
            generation: self.selection.ticket().generation,
        };
        report.entity = payload.target();
        let _writer = match &report.entity {
            Some(id) => Some(self.lock_entity(id).await),
            None => None,
        };
        tracing::debug!(tool = tool_name, ?category, entity = ?report.entity, "dispatching tool result");

        match category {
            MutationCategory::FieldUpdate => self.field_update(payload, &ticket, &mut report).await,
            MutationCategory::QuestionLifecycle(action) => {
                self.question_lifecycle(action, payload, &ticket, &mut report)
                    .await;
            }
            MutationCategory::Structural(action) => {
                self.structural(action, payload, &mut report).await;
            }
            MutationCategory::Refresh => match payload.target() {
                Some(id) => {
                    self.refetch(&id, &ticket, &mut report).await;
                    self.refresh_list_into(&mut report).await;
                }
                None => self.missing_target(tool_name),
            },
        }
        report
    }

    /// Dispatch the new complete events of a chat session, in order
    ///
    /// Events before the session's cursor were already handled. Processing
    /// stops at the first event that has not completed; the next call resumes
    /// there. A different `session_id` resets the cursor.
    pub async fn ingest(&self, session_id: &str, events: &[ToolEvent]) -> Vec<DispatchReport> {
        let mut cursor = self.cursor.lock().await;
        if cursor.session.as_deref() != Some(session_id) {
            tracing::debug!(session = session_id, "new chat session, resetting cursor");
            cursor.session = Some(session_id.to_string());
            cursor.position = 0;
        }

        let mut reports = Vec::new();
        for event in events.iter().skip(cursor.position) {
            if event.status != ToolCallStatus::Complete {
                break;
            }
            let selection = self.selection.current();
            reports.push(
                self.handle(&event.tool_name, &event.result, selection.as_ref())
                    .await,
            );
            cursor.position += 1;
        }
        reports
    }

    /// Refetch the parent list and publish it
    ///
    /// # Errors
    /// Returns `FetchFailure` when the backend call fails; the last known
    /// list is kept and a warning notice is emitted.
    pub async fn refresh_list(&self) -> Result<Vec<EntitySummary>, SyncError> {
        match self.backend.fetch_list(&self.parent_id).await {
            Ok(items) => {
                *self.list.lock() = items.clone();
                self.events.emit(SyncEvent::ListRefreshed {
                    parent_id: self.parent_id.clone(),
                    items: items.clone(),
                });
                Ok(items)
            }
            Err(source) => {
                let err = SyncError::fetch(self.parent_id.clone(), source);
                tracing::warn!(error = %err, "list refresh failed, keeping last list");
                self.events
                    .notice(NoticeLevel::Warning, Some(&self.parent_id), err.to_string());
                Err(err)
            }
        }
    }

    async fn refresh_list_into(&self, report: &mut DispatchReport) -> Vec<EntitySummary> {
        match self.refresh_list().await {
            Ok(items) => {
                report.list_refreshed = true;
                items
            }
            Err(_) => self.last_list(),
        }
    }

    async fn field_update(
        &self,
        payload: ToolResultPayload,
        ticket: &SelectionTicket,
        report: &mut DispatchReport,
    ) {
        let target = match (payload.detail, payload.entity_id) {
            (Some(detail), _) => Some(self.apply_snapshot(detail, report)),
            (None, Some(id)) => {
                self.refetch(&id, ticket, report).await;
                Some(id)
            }
            (None, None) => {
                self.missing_target(&report.tool);
                None
            }
        };

        if let Some(id) = target {
            if touches_content(&report.changes) {
                report.demoted = self.propagate_staleness(&id);
            }
        }
        self.refresh_list_into(report).await;
    }

    async fn question_lifecycle(
        &self,
        action: QuestionAction,
        payload: ToolResultPayload,
        ticket: &SelectionTicket,
        report: &mut DispatchReport,
    ) {
        if let Some(detail) = payload.detail {
            self.apply_snapshot(detail, report);
            return;
        }
        let Some(id) = payload.entity_id else {
            self.missing_target(&report.tool);
            return;
        };
        let Some(text) = payload.question_text else {
            tracing::debug!(entity = %id, "question result without text, refetching");
            self.refetch(&id, ticket, report).await;
            return;
        };

        let patched = self.cache.update::<SyncError, _>(&id, |current| {
            let current = current.ok_or_else(|| SyncError::NotCached(id.clone()))?;
            let mut next = current.clone();
            let question = next.question_mut(&text).map_err(|e| SyncError::PatchMismatch {
                entity: id.clone(),
                detail: e.to_string(),
            })?;
            match action {
                QuestionAction::Resolve => question.resolve(payload.resolution, payload.resolved_at),
                QuestionAction::Escalate => {
                    question.escalate(payload.escalated_to, payload.escalated_at);
                }
            }
            Ok(Some(next))
        });

        match patched {
            Ok(write) => {
                report.action = CacheAction::QuestionPatched;
                if let Some(current) = &write.current {
                    self.publish(&id, diff(write.previous.as_deref(), current), report);
                }
            }
            Err(e) if e.falls_back_to_refetch() => {
                tracing::debug!(error = %e, "question patch missed, refetching");
                self.refetch(&id, ticket, report).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "question patch failed");
            }
        }
    }

    async fn structural(
        &self,
        action: StructuralAction,
        payload: ToolResultPayload,
        report: &mut DispatchReport,
    ) {
        let target = payload.target();
        match action {
            StructuralAction::Remove | StructuralAction::Add => {
                if let Some(id) = &target {
                    if self.cache.invalidate(id).is_some() {
                        report.action = CacheAction::Invalidated;
                    }
                }
            }
            StructuralAction::Reorder => {
                let listed = self.last_list();
                if listed.is_empty() {
                    // no list yet, so any cached snapshot may be a child
                    self.cache.clear();
                    report.action = CacheAction::Invalidated;
                }
                for item in listed {
                    if self.cache.invalidate(&item.id).is_some() {
                        report.action = CacheAction::Invalidated;
                    }
                }
            }
        }

        let mut items = self.refresh_list_into(report).await;
        if action == StructuralAction::Remove {
            if let Some(removed) = &target {
                items.retain(|item| &item.id != removed);
            }
        }

        let before = self.selection.current();
        let after = match (action, &target) {
            (StructuralAction::Remove, Some(removed)) => {
                self.selection.after_removal(removed, &items);
                self.selection.reconcile(&items)
            }
            (StructuralAction::Add, Some(created)) if before.is_none() => {
                self.selection.select(Some(created.clone()));
                Some(created.clone())
            }
            _ => self.selection.reconcile(&items),
        };
        if after != before {
            report.reselected = Some(after);
        }
    }

    /// Store a returned snapshot and publish its change set
    fn apply_snapshot(&self, detail: EntityDetail, report: &mut DispatchReport) -> EntityId {
        let id = detail.id().clone();
        let current = detail.clone();
        match self.cache.set(&id, detail) {
            Ok(previous) => {
                report.action = CacheAction::SnapshotApplied;
                self.publish(&id, diff(previous.as_deref(), &current), report);
            }
            Err(e) => tracing::warn!(error = %e, "snapshot rejected by cache"),
        }
        id
    }

    /// Invalidate `id` and fetch it again
    ///
    /// Diffs against the snapshot that was dropped, so the refetch still
    /// highlights what the tool changed.
    async fn refetch(&self, id: &EntityId, ticket: &SelectionTicket, report: &mut DispatchReport) {
        let previous = self.cache.invalidate(id);
        report.action = CacheAction::Invalidated;

        match self.backend.fetch_detail(id).await {
            Ok(fresh) => {
                if !self.is_current(ticket) {
                    tracing::debug!(entity = %id, "selection moved during refetch, dropping response");
                    report.action = CacheAction::RefetchDropped;
                    return;
                }
                let current = fresh.clone();
                match self.cache.set(id, fresh) {
                    Ok(_) => {
                        report.action = CacheAction::Refetched;
                        self.publish(id, diff(previous.as_deref(), &current), report);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "refetched snapshot rejected");
                        self.restore(previous, report);
                    }
                }
            }
            Err(source) => {
                let err = SyncError::fetch(id.clone(), source);
                tracing::warn!(error = %err, "refetch failed, keeping last known snapshot");
                self.events.notice(NoticeLevel::Warning, Some(id), err.to_string());
                self.restore(previous, report);
            }
        }
    }

    fn restore(&self, previous: Option<Arc<EntityDetail>>, report: &mut DispatchReport) {
        report.action = CacheAction::RefetchFailed;
        if let Some(previous) = previous {
            self.cache.restore_if_vacant(previous);
        }
    }

    fn is_current(&self, ticket: &SelectionTicket) -> bool {
        self.selection.is_current(ticket) && self.selection.current() == ticket.entity
    }

    /// Demote cached entities derived from `upstream`
    fn propagate_staleness(&self, upstream: &EntityId) -> Vec<EntityId> {
        let reason = format!("upstream {upstream} changed");
        let mut demoted = Vec::new();

        for dependent in self.cache.dependents_of(upstream) {
            if &dependent == upstream {
                continue;
            }
            let write = self.cache.update::<SyncError, _>(&dependent, |current| {
                Ok(current.and_then(|current| {
                    let mut next = current.clone();
                    next.demote(reason.as_str()).then_some(next)
                }))
            });
            match write {
                Ok(write) => {
                    if let (Some(previous), Some(current)) = (&write.previous, &write.current) {
                        if !Arc::ptr_eq(previous, current) {
                            self.emit_changes(&dependent, diff(Some(previous), current));
                            demoted.push(dependent);
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "staleness propagation failed"),
            }
        }

        if !demoted.is_empty() {
            tracing::info!(%upstream, count = demoted.len(), "demoted stale dependents");
        }
        demoted
    }

    fn publish(&self, id: &EntityId, changes: ChangeSet, report: &mut DispatchReport) {
        self.emit_changes(id, changes.clone());
        report.changes.extend(changes);
    }

    fn emit_changes(&self, id: &EntityId, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        tracing::debug!(entity = %id, changes = changes.len(), "change set computed");
        self.events.emit(SyncEvent::ChangeSetComputed {
            entity_id: id.clone(),
            changes,
            highlight_ms: self.highlight_ms,
        });
    }

    fn missing_target(&self, tool: &str) {
        let err = SyncError::InvalidPayload {
            tool: tool.to_string(),
            reason: "no entity id or snapshot".into(),
        };
        tracing::warn!(error = %err, "dropping tool result");
    }
}

/// Whether `changes` touch content rather than only review bookkeeping
fn touches_content(changes: &ChangeSet) -> bool {
    changes
        .iter()
        .any(|marker| !matches!(marker.as_str(), CONFIRMATION_STATUS | STALENESS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, MockWorkspaceBackend};
    use crate::error::BackendError;
    use brd_model::{ConfirmationStatus, EntityKind, FieldValue, OpenQuestion, QuestionStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Harness {
        backend: Arc<InMemoryBackend>,
        cache: DetailCache,
        selection: Arc<SelectionController>,
        events: EventBus,
        dispatcher: ToolResultDispatcher,
    }

    fn harness(details: Vec<EntityDetail>) -> Harness {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed("flow", details);
        let cache = DetailCache::new(64);
        let events = EventBus::new(64);
        let selection = Arc::new(SelectionController::new(events.clone()));
        let dispatcher = ToolResultDispatcher::new(
            EntityId::from("flow"),
            cache.clone(),
            backend.clone(),
            Arc::clone(&selection),
            events.clone(),
            4000,
        );
        Harness {
            backend,
            cache,
            selection,
            events,
            dispatcher,
        }
    }

    fn step(id: &str, goal: &str) -> EntityDetail {
        EntityDetail::new(id, EntityKind::Step)
            .with_field("title", FieldValue::text(id))
            .with_field("goal", FieldValue::text(goal))
    }

    #[tokio::test]
    async fn unrecognized_tool_is_ignored() {
        let h = harness(vec![step("a", "x")]);
        let report = h
            .dispatcher
            .handle("search_signals", &json!({"step_id": "a"}), None)
            .await;

        assert!(!report.is_handled());
        assert_eq!(h.backend.calls().fetch_list, 0);
        assert_eq!(h.backend.calls().fetch_detail, 0);
    }

    #[tokio::test]
    async fn snapshot_is_applied_and_diffed() {
        let h = harness(vec![step("a", "old")]);
        h.cache.set(&EntityId::from("a"), step("a", "old")).unwrap();
        let mut rx = h.events.subscribe();

        let report = h
            .dispatcher
            .handle(
                "update_solution_flow_step",
                &json!({"updated_step": step("a", "new")}),
                None,
            )
            .await;

        assert_eq!(report.action, CacheAction::SnapshotApplied);
        assert!(report.changes.contains("goal"));
        assert!(report.list_refreshed);
        assert_eq!(h.backend.calls().fetch_detail, 0);
        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::ChangeSetComputed { highlight_ms: 4000, .. }
        ));
    }

    #[tokio::test]
    async fn field_update_without_snapshot_refetches() {
        let h = harness(vec![step("a", "new")]);
        h.cache.set(&EntityId::from("a"), step("a", "old")).unwrap();

        let report = h
            .dispatcher
            .handle("refine_solution_flow_step", &json!({"step_id": "a"}), None)
            .await;

        assert_eq!(report.action, CacheAction::Refetched);
        assert!(report.changes.contains("goal"));
        assert_eq!(
            h.cache.get(&EntityId::from("a")).unwrap().field("goal"),
            Some(&FieldValue::text("new"))
        );
    }

    #[tokio::test]
    async fn failed_refetch_keeps_last_snapshot() {
        let h = harness(vec![step("a", "new")]);
        h.cache.set(&EntityId::from("a"), step("a", "old")).unwrap();
        h.backend.fail_fetches("a");
        let mut rx = h.events.subscribe();

        let report = h
            .dispatcher
            .handle("update_solution_flow_step", &json!({"step_id": "a"}), None)
            .await;

        assert_eq!(report.action, CacheAction::RefetchFailed);
        assert_eq!(
            h.cache.get(&EntityId::from("a")).unwrap().field("goal"),
            Some(&FieldValue::text("old"))
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            SyncEvent::Notice { level: NoticeLevel::Warning, .. }
        ));
    }

    #[tokio::test]
    async fn question_patch_touches_only_the_question() {
        let original = step("a", "x")
            .with_question(OpenQuestion::new("Q1"))
            .with_question(OpenQuestion::new("Q2"));
        let h = harness(vec![original.clone()]);
        h.cache.set(&EntityId::from("a"), original.clone()).unwrap();

        let report = h
            .dispatcher
            .handle(
                "resolve_solution_flow_question",
                &json!({"step_id": "a", "question_text": "Q1", "resolution": "yes"}),
                None,
            )
            .await;

        assert_eq!(report.action, CacheAction::QuestionPatched);
        assert_eq!(h.backend.calls().fetch_detail, 0);

        let patched = h.cache.get(&EntityId::from("a")).unwrap();
        assert_eq!(patched.open_questions[0].status, QuestionStatus::Resolved);
        assert_eq!(patched.open_questions[1], original.open_questions[1]);
        assert_eq!(patched.fields, original.fields);
        assert_eq!(patched.info_fields, original.info_fields);
        assert_eq!(patched.confirmation_status, original.confirmation_status);
    }

    #[tokio::test]
    async fn question_patch_miss_refetches() {
        let h = harness(vec![step("a", "x").with_question(OpenQuestion::new("Q1"))]);
        h.cache.set(&EntityId::from("a"), step("a", "x")).unwrap();

        let report = h
            .dispatcher
            .handle(
                "escalate_solution_flow_question",
                &json!({"step_id": "a", "question_text": "Q1", "escalated_to": "CFO"}),
                None,
            )
            .await;

        assert_eq!(report.action, CacheAction::Refetched);
        assert_eq!(h.backend.calls().fetch_detail, 1);
        assert_eq!(h.cache.get(&EntityId::from("a")).unwrap().open_questions.len(), 1);
    }

    #[tokio::test]
    async fn reorder_before_any_list_drops_every_snapshot() {
        let h = harness(vec![step("a", "x"), step("b", "y")]);
        h.cache.set(&EntityId::from("a"), step("a", "x")).unwrap();
        h.cache.set(&EntityId::from("b"), step("b", "y")).unwrap();
        assert!(h.dispatcher.last_list().is_empty());

        let report = h
            .dispatcher
            .handle("reorder_solution_flow_steps", &json!({}), None)
            .await;

        assert_eq!(report.action, CacheAction::Invalidated);
        assert!(h.cache.get(&EntityId::from("a")).is_none());
        assert!(h.cache.get(&EntityId::from("b")).is_none());
        assert_eq!(h.dispatcher.last_list().len(), 2);
    }

    #[tokio::test]
    async fn removal_hands_selection_to_first_remaining() {
        let h = harness(vec![step("a", "x"), step("b", "y"), step("c", "z")]);
        h.dispatcher.refresh_list().await.unwrap();
        h.cache.set(&EntityId::from("b"), step("b", "y")).unwrap();
        h.selection.select(Some(EntityId::from("b")));
        h.backend
            .remove_entity(&EntityId::from("flow"), &EntityId::from("b"));

        let report = h
            .dispatcher
            .handle(
                "remove_solution_flow_step",
                &json!({"step_id": "b"}),
                Some(&EntityId::from("b")),
            )
            .await;

        assert_eq!(report.reselected, Some(Some(EntityId::from("a"))));
        assert_eq!(h.selection.current(), Some(EntityId::from("a")));
        assert!(h.cache.get(&EntityId::from("b")).is_none());
    }

    #[tokio::test]
    async fn removal_with_failed_list_uses_last_list() {
        let h = harness(vec![step("a", "x"), step("b", "y")]);
        h.dispatcher.refresh_list().await.unwrap();
        h.selection.select(Some(EntityId::from("a")));
        h.backend.fail_fetches("flow");

        let report = h
            .dispatcher
            .handle("remove_solution_flow_step", &json!({"step_id": "a"}), None)
            .await;

        assert!(!report.list_refreshed);
        assert_eq!(h.selection.current(), Some(EntityId::from("b")));
    }

    #[tokio::test]
    async fn field_update_demotes_dependents() {
        let feature = EntityDetail::new("f1", EntityKind::Feature)
            .with_field("title", FieldValue::text("Intake form"));
        let dependent = step("s1", "x")
            .with_link("f1")
            .with_status(ConfirmationStatus::ConfirmedClient);
        let h = harness(vec![feature.clone(), dependent.clone()]);
        h.cache.set(&EntityId::from("f1"), feature.clone()).unwrap();
        h.cache.set(&EntityId::from("s1"), dependent).unwrap();

        let renamed = feature.with_field("title", FieldValue::text("Intake wizard"));
        let report = h
            .dispatcher
            .handle("update_solution_flow_step", &json!({"detail": renamed}), None)
            .await;

        assert_eq!(report.demoted, vec![EntityId::from("s1")]);
        let s1 = h.cache.get(&EntityId::from("s1")).unwrap();
        assert!(s1.is_stale);
        assert_eq!(s1.stale_reason.as_deref(), Some("upstream f1 changed"));
        assert_eq!(s1.confirmation_status, ConfirmationStatus::NeedsReview);
    }

    #[tokio::test]
    async fn ingest_stops_at_incomplete_event_and_resumes() {
        let h = harness(vec![step("a", "x")]);
        let events = vec![
            ToolEvent::complete("update_solution_flow_step", json!({"step_id": "a"})),
            ToolEvent::running("update_solution_flow_step"),
            ToolEvent::complete("update_solution_flow_step", json!({"step_id": "a"})),
        ];

        let first = h.dispatcher.ingest("chat-1", &events).await;
        assert_eq!(first.len(), 1);

        let mut done = events.clone();
        done[1] = ToolEvent::complete("search_signals", json!({}));
        let second = h.dispatcher.ingest("chat-1", &done).await;
        assert_eq!(second.len(), 2);
        assert!(h.dispatcher.ingest("chat-1", &done).await.is_empty());

        let other = h.dispatcher.ingest("chat-2", &done).await;
        assert_eq!(other.len(), 3);
    }

    #[tokio::test]
    async fn list_failure_from_mock_backend_is_surfaced() {
        let mut backend = MockWorkspaceBackend::new();
        backend
            .expect_fetch_list()
            .returning(|_| Err(BackendError::Transport("down".into())));
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let dispatcher = ToolResultDispatcher::new(
            EntityId::from("flow"),
            DetailCache::new(8),
            Arc::new(backend),
            Arc::new(SelectionController::new(events.clone())),
            events,
            4000,
        );

        assert!(dispatcher.refresh_list().await.is_err());
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::Notice { .. }));
    }
}
