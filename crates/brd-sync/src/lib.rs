//! Solution Flow Sync Engine
//!
//! Keeps a client-side view of BRD workspace entities consistent with the
//! backend while an AI assistant mutates them through tool calls, and tells
//! the view which fields changed so it can highlight them.
//!
//! # Core Concepts
//!
//! - [`SyncEngine`]: Facade the application talks to
//! - [`DetailCache`]: Last known snapshot per entity (moka)
//! - [`ToolResultDispatcher`]: Routes completed tool calls to cache writes,
//!   change sets, list refreshes and selection hand-offs
//! - [`SelectionController`]: Active selection plus stale-response tagging
//! - [`AsyncJobPoller`]: Bounded, cancellable polling of backend jobs
//! - [`WorkspaceBackend`]: Collaborator trait for the REST backend
//! - [`SyncEvent`]: Everything the view needs to react to, on one bus
//!
//! # Example
//!
//! ```rust
//! use brd_model::{EntityDetail, EntityId, EntityKind, FieldValue};
//! use brd_sync::{InMemoryBackend, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let backend = Arc::new(InMemoryBackend::new());
//! backend.seed("flow", vec![
//!     EntityDetail::new("step-1", EntityKind::Step).with_field("title", FieldValue::text("Intake")),
//! ]);
//!
//! let engine = SyncEngine::new(SyncConfig::default(), "flow", backend).unwrap();
//! engine.open(&EntityId::from("step-1")).await.unwrap();
//!
//! let report = engine
//!     .handle_tool_result("rename_solution_flow_step", &serde_json::json!({"step_id": "step-1"}))
//!     .await;
//! assert!(report.is_handled());
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod poller;
pub mod scenario;
pub mod selection;

pub use backend::{CallCounts, InMemoryBackend, WorkspaceBackend};
pub use cache::{CacheWrite, DetailCache};
pub use config::SyncConfig;
pub use dispatcher::{
    CacheAction, DispatchReport, MutationCategory, QuestionAction, StructuralAction,
    ToolCallStatus, ToolEvent, ToolResultDispatcher, ToolResultPayload,
};
pub use engine::{JobKind, JobScope, SyncEngine};
pub use error::{BackendError, SyncError};
pub use events::{EventBus, NoticeLevel, SyncEvent};
pub use poller::{AsyncJobPoller, JobHandle, JobId, JobStatus, PollOptions, PollOutcome};
pub use scenario::{Scenario, ScenarioStep};
pub use selection::{SelectionController, SelectionTicket};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        DispatchReport, EventBus, InMemoryBackend, JobKind, JobScope, SyncConfig, SyncEngine,
        SyncError, SyncEvent, ToolEvent, WorkspaceBackend,
    };
    pub use brd_model::{ChangeSet, EntityDetail, EntityId, EntityKind, FieldValue};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
