//! Replayable scenarios
//!
//! A scenario seeds an [`InMemoryBackend`], opens an initial selection and
//! feeds a chat session's tool events through a [`SyncEngine`] one step at a
//! time. Each step can first change what the backend serves, the way the
//! real backend changes before the tool result reaches the client.

use crate::backend::InMemoryBackend;
use crate::config::SyncConfig;
use crate::dispatcher::ToolEvent;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::events::SyncEvent;
use brd_model::{EntityDetail, EntityId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

fn default_parent() -> EntityId {
    EntityId::from("flow")
}

fn default_session() -> String {
    "replay".to_string()
}

/// One replay step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Snapshots the backend serves from this step on
    #[serde(default)]
    pub put: Vec<EntityDetail>,
    /// Entities the backend deletes before the event
    #[serde(default)]
    pub remove: Vec<EntityId>,
    pub event: ToolEvent,
}

/// Replay input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_parent")]
    pub parent_id: EntityId,
    /// Initial children, in list order
    #[serde(default)]
    pub details: Vec<EntityDetail>,
    #[serde(default)]
    pub initial_selection: Option<EntityId>,
    #[serde(default = "default_session")]
    pub session_id: String,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Parse from JSON text
    ///
    /// # Errors
    /// Returns `InvalidPayload` on malformed JSON
    pub fn from_json_str(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::InvalidPayload {
            tool: "scenario".into(),
            reason: e.to_string(),
        })
    }

    /// Load from a JSON file
    ///
    /// # Errors
    /// Returns `InvalidPayload` when the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SyncError::InvalidPayload {
            tool: "scenario".into(),
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&text)
    }

    /// Run every step and collect the emitted events, in order
    ///
    /// # Errors
    /// Fails on invalid configuration or if the initial list or selection
    /// cannot be loaded
    pub async fn run(&self, config: SyncConfig) -> Result<Vec<SyncEvent>, SyncError> {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed(self.parent_id.clone(), self.details.clone());

        let engine = SyncEngine::new(config, self.parent_id.clone(), backend.clone())?;
        let mut rx = engine.subscribe();
        let mut emitted = Vec::new();

        engine.load_list().await?;
        if let Some(initial) = &self.initial_selection {
            engine.open(initial).await?;
        }
        drain(&mut rx, &mut emitted);

        let mut delivered = Vec::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            for detail in &step.put {
                backend.put_detail(detail.clone());
            }
            for id in &step.remove {
                backend.remove_entity(&self.parent_id, id);
            }
            delivered.push(step.event.clone());

            let reports = engine.ingest(&self.session_id, &delivered).await;
            tracing::debug!(step = index, dispatched = reports.len(), "replay step done");
            drain(&mut rx, &mut emitted);
        }
        Ok(emitted)
    }
}

fn drain(rx: &mut broadcast::Receiver<SyncEvent>, out: &mut Vec<SyncEvent>) {
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "replay fell behind the event bus");
            }
            Err(_) => break,
        }
    }
}
