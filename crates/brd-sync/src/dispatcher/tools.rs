//! Recognized tool names, their mutation categories, and result payloads

use brd_model::{EntityDetail, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Synthetic tool name used when a finished background job asks for a refresh
pub const REFRESH_TOOL: &str = "refresh_entity";

/// Tools that edit fields of one entity
pub const FIELD_UPDATE_TOOLS: &[&str] = &[
    "update_solution_flow_step",
    "rename_solution_flow_step",
    "update_solution_flow_ai_config",
    "update_solution_flow_narrative",
    "refine_solution_flow_step",
];

/// Tools that move an open question through its lifecycle
pub const QUESTION_TOOLS: &[(&str, QuestionAction)] = &[
    ("resolve_solution_flow_question", QuestionAction::Resolve),
    ("escalate_solution_flow_question", QuestionAction::Escalate),
];

/// Tools that change the shape of the parent list
pub const STRUCTURAL_TOOLS: &[(&str, StructuralAction)] = &[
    ("add_solution_flow_step", StructuralAction::Add),
    ("remove_solution_flow_step", StructuralAction::Remove),
    ("reorder_solution_flow_steps", StructuralAction::Reorder),
];

/// Question lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionAction {
    Resolve,
    Escalate,
}

/// Structural action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralAction {
    Add,
    Remove,
    Reorder,
}

/// How the dispatcher treats a tool's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "category", content = "action")]
pub enum MutationCategory {
    /// Rename, content edit, AI-config change, narrative edit
    FieldUpdate,
    /// Resolve or escalate a question
    QuestionLifecycle(QuestionAction),
    /// Add, remove, reorder
    Structural(StructuralAction),
    /// Background job finished; refetch the resource
    Refresh,
}

impl MutationCategory {
    /// Category of `tool`, or `None` for tools the engine ignores
    #[must_use]
    pub fn classify(tool: &str) -> Option<Self> {
        if tool == REFRESH_TOOL {
            return Some(Self::Refresh);
        }
        if FIELD_UPDATE_TOOLS.contains(&tool) {
            return Some(Self::FieldUpdate);
        }
        if let Some((_, action)) = QUESTION_TOOLS.iter().find(|(name, _)| *name == tool) {
            return Some(Self::QuestionLifecycle(*action));
        }
        STRUCTURAL_TOOLS
            .iter()
            .find(|(name, _)| *name == tool)
            .map(|(_, action)| Self::Structural(*action))
    }
}

/// Result payload of a mutating tool call
///
/// Tools disagree on key names; the aliases cover what the agent emits.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolResultPayload {
    /// Affected (or removed / created) entity
    #[serde(default, alias = "step_id", alias = "id")]
    pub entity_id: Option<EntityId>,
    /// Full replacement snapshot, when the tool returns one
    #[serde(default, alias = "updated_step", alias = "step")]
    pub detail: Option<EntityDetail>,
    #[serde(default)]
    pub question_text: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub escalated_to: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub escalated_at: Option<DateTime<Utc>>,
    /// Set when the tool itself failed; nothing was mutated
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolResultPayload {
    /// Entity the payload is about: snapshot id first, then the explicit id
    #[must_use]
    pub fn target(&self) -> Option<EntityId> {
        self.detail
            .as_ref()
            .map(|d| d.id().clone())
            .or_else(|| self.entity_id.clone())
    }
}

/// Lifecycle state of a tool call on the chat transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Complete,
}

/// One tool-call event as delivered by the chat transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
    #[serde(alias = "toolName")]
    pub tool_name: String,
    pub status: ToolCallStatus,
    #[serde(default)]
    pub result: serde_json::Value,
}

impl ToolEvent {
    /// Completed event
    #[must_use]
    pub fn complete(tool_name: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolCallStatus::Complete,
            result,
        }
    }

    /// Event still in progress
    #[must_use]
    pub fn running(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolCallStatus::Running,
            result: serde_json::Value::Null,
        }
    }
}
