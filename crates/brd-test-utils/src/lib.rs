//! Testing utilities for the Solution Flow sync workspace
//!
//! Shared fixtures for entity snapshots and tool-result payloads.

#![allow(missing_docs)]

use brd_model::{
    ConfirmationStatus, EntityDetail, EntityId, EntityKind, EntitySummary, FieldValue, InfoField,
    OpenQuestion,
};
use serde_json::{json, Value};

/// Step with a title equal to its id and a goal
pub fn step(id: &str) -> EntityDetail {
    EntityDetail::new(id, EntityKind::Step)
        .with_field("title", FieldValue::text(id))
        .with_field("goal", FieldValue::text(format!("goal of {id}")))
}

/// Step with one open question per text
pub fn step_with_questions(id: &str, questions: &[&str]) -> EntityDetail {
    questions
        .iter()
        .fold(step(id), |detail, text| detail.with_question(OpenQuestion::new(*text)))
}

/// Step with information fields
pub fn step_with_info(id: &str, info: &[(&str, &str)]) -> EntityDetail {
    info.iter().fold(step(id), |detail, (name, value)| {
        detail.with_info_field(InfoField::new(*name, *value))
    })
}

/// Step in the given status
pub fn step_in(id: &str, status: ConfirmationStatus) -> EntityDetail {
    step(id).with_status(status)
}

/// Feature with a title
pub fn feature(id: &str, title: &str) -> EntityDetail {
    EntityDetail::new(id, EntityKind::Feature).with_field("title", FieldValue::text(title))
}

/// Steps for each id, in order
pub fn steps(ids: &[&str]) -> Vec<EntityDetail> {
    ids.iter().map(|id| step(id)).collect()
}

/// List projection for each id, in order
pub fn flow_of(ids: &[&str]) -> Vec<EntitySummary> {
    ids.iter().map(|id| step(id).summary()).collect()
}

pub fn id(value: &str) -> EntityId {
    EntityId::from(value)
}

/// Result payload naming only the affected step
pub fn step_ref(id: &str) -> Value {
    json!({ "step_id": id })
}

/// Result payload carrying a full snapshot
pub fn snapshot(detail: &EntityDetail) -> Value {
    json!({ "updated_step": detail })
}

/// Result payload of `resolve_solution_flow_question`
pub fn resolution(id: &str, question: &str, answer: &str) -> Value {
    json!({ "step_id": id, "question_text": question, "resolution": answer })
}

/// Result payload of `escalate_solution_flow_question`
pub fn escalation(id: &str, question: &str, to: &str) -> Value {
    json!({ "step_id": id, "question_text": question, "escalated_to": to })
}
