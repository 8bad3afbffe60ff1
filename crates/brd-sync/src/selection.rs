//! Which entity is currently open
//!
//! The controller owns the active selection and a generation counter that
//! bumps on every change. Fetches are tagged with a [`SelectionTicket`];
//! a response whose ticket is no longer current is dropped by the caller.
//! Upload jobs registered against an entity are cancelled when the
//! selection moves away from it.

use crate::events::{EventBus, SyncEvent};
use crate::poller::JobHandle;
use brd_model::{EntityId, EntitySummary};
use dashmap::DashMap;
use parking_lot::Mutex;

/// Selection snapshot used to tag in-flight fetches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    pub entity: Option<EntityId>,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct SelectionState {
    current: Option<EntityId>,
    generation: u64,
}

/// Active-selection owner
#[derive(Debug)]
pub struct SelectionController {
    state: Mutex<SelectionState>,
    jobs: DashMap<EntityId, Vec<JobHandle>>,
    events: EventBus,
}

impl SelectionController {
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(SelectionState::default()),
            jobs: DashMap::new(),
            events,
        }
    }

    /// Currently selected entity
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<EntityId> {
        self.state.lock().current.clone()
    }

    /// Tag for a fetch issued now
    #[must_use]
    pub fn ticket(&self) -> SelectionTicket {
        let state = self.state.lock();
        SelectionTicket {
            entity: state.current.clone(),
            generation: state.generation,
        }
    }

    /// Whether no selection change happened since `ticket` was taken
    #[inline]
    #[must_use]
    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        self.state.lock().generation == ticket.generation
    }

    /// Change the selection
    ///
    /// Returns `false` if `next` is already selected. On change, upload jobs
    /// of the previous entity are cancelled and `SelectionChanged` is emitted.
    pub fn select(&self, next: Option<EntityId>) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if state.current == next {
                return false;
            }
            state.generation += 1;
            std::mem::replace(&mut state.current, next.clone())
        };

        if let Some(previous) = &previous {
            let cancelled = self.cancel_jobs_for(previous);
            if cancelled > 0 {
                tracing::debug!(entity = %previous, cancelled, "cancelled jobs of deselected entity");
            }
        }

        tracing::debug!(from = ?previous, to = ?next, "selection changed");
        self.events.emit(SyncEvent::SelectionChanged { entity_id: next });
        true
    }

    /// Keep the selection valid against a refreshed list
    ///
    /// If the selected entity is gone, selects the first remaining item or
    /// nothing. Returns the selection afterwards.
    pub fn reconcile(&self, items: &[EntitySummary]) -> Option<EntityId> {
        let current = self.current();
        match current {
            Some(id) if !items.iter().any(|item| item.id == id) => {
                let next = items.first().map(|item| item.id.clone());
                self.select(next.clone());
                next
            }
            other => other,
        }
    }

    /// Hand-off after `removed` was deleted
    ///
    /// Only acts when `removed` is the current selection; picks the first
    /// item of `remaining` that is not `removed`.
    pub fn after_removal(&self, removed: &EntityId, remaining: &[EntitySummary]) -> Option<EntityId> {
        if self.current().as_ref() != Some(removed) {
            return self.current();
        }
        let next = remaining
            .iter()
            .find(|item| &item.id != removed)
            .map(|item| item.id.clone());
        self.select(next.clone());
        next
    }

    /// Track a job scoped to its resource
    pub fn register_job(&self, handle: JobHandle) {
        let mut jobs = self.jobs.entry(handle.resource_id().clone()).or_default();
        jobs.retain(|job| job.outcome().is_none());
        jobs.push(handle);
    }

    /// Cancel every tracked job of `entity`
    pub fn cancel_jobs_for(&self, entity: &EntityId) -> usize {
        match self.jobs.remove(entity) {
            Some((_, handles)) => {
                let live = handles.iter().filter(|job| job.outcome().is_none()).count();
                for job in &handles {
                    job.cancel();
                }
                live
            }
            None => 0,
        }
    }

    /// Tracked jobs still running for `entity`
    #[must_use]
    pub fn active_jobs(&self, entity: &EntityId) -> usize {
        self.jobs
            .get(entity)
            .map(|jobs| jobs.iter().filter(|job| job.outcome().is_none()).count())
            .unwrap_or(0)
    }
}
