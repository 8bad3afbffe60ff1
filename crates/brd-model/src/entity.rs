//! Entity snapshots and their sub-items
//!
//! An [`EntityDetail`] is the full representation of one workspace entity as
//! last delivered by the backend. Named fields hold strings, string lists or
//! structured records; information fields and open questions are modelled
//! explicitly because the sync engine patches and diffs them item by item.

use crate::confirmation::{self, ConfirmationStatus, Transition};
use crate::error::ModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Backend-issued entity identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a backend identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Entity type; selects the field list the diff engine walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Solution flow step
    #[default]
    Step,
    /// Product feature
    Feature,
    /// Business workflow
    Workflow,
    /// User persona
    Persona,
    /// Business driver (pain, goal, KPI)
    BusinessDriver,
}

/// Value of a named field
///
/// Absent fields compare equal to any empty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scalar text
    Text(String),
    /// Ordered string list
    List(Vec<String>),
    /// Nested structured record (AI configuration, actor mappings, ...)
    Record(serde_json::Value),
}

impl FieldValue {
    /// Text value
    #[inline]
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// List value
    #[must_use]
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Whether the value carries no content
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Record(value) => match value {
                serde_json::Value::Null => true,
                serde_json::Value::Object(map) => map.is_empty(),
                serde_json::Value::Array(items) => items.is_empty(),
                serde_json::Value::String(s) => s.is_empty(),
                _ => false,
            },
        }
    }

    /// Text content, if this is a text value
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two optional values, treating absence as empty
    #[must_use]
    pub fn same(a: Option<&Self>, b: Option<&Self>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a == b,
            (Some(v), None) | (None, Some(v)) => v.is_empty(),
            (None, None) => true,
        }
    }
}

/// One extracted fact in the information-field collection
///
/// `name` is the join key between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoField {
    pub name: String,
    #[serde(default)]
    pub value: String,
    /// Signal the fact was extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl InfoField {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            source: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Open question lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    #[default]
    Open,
    Escalated,
    Resolved,
}

/// Question raised during generation
///
/// Created server-side; moves open -> resolved or open -> escalated and is
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenQuestion {
    pub question: String,
    #[serde(default)]
    pub status: QuestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
}

impl OpenQuestion {
    /// New open question
    #[inline]
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            status: QuestionStatus::Open,
            resolution: None,
            escalated_to: None,
            resolved_at: None,
            escalated_at: None,
        }
    }

    /// Mark resolved. Overwrites rather than accumulates, so replays are harmless.
    pub fn resolve(&mut self, resolution: Option<String>, at: Option<DateTime<Utc>>) {
        self.status = QuestionStatus::Resolved;
        self.resolution = resolution;
        self.resolved_at = at;
    }

    /// Mark escalated
    pub fn escalate(&mut self, escalated_to: Option<String>, at: Option<DateTime<Utc>>) {
        self.status = QuestionStatus::Escalated;
        self.escalated_to = escalated_to;
        self.escalated_at = at;
    }
}

/// Full snapshot of one workspace entity
///
/// The identifier is fixed at construction; there is no setter for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetail {
    id: EntityId,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub info_fields: Vec<InfoField>,
    #[serde(default)]
    pub open_questions: Vec<OpenQuestion>,
    #[serde(default)]
    pub confirmation_status: ConfirmationStatus,
    #[serde(default)]
    pub is_stale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_reason: Option<String>,
    /// Upstream entities this one was derived from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<EntityId>,
}

impl EntityDetail {
    /// Empty snapshot
    #[must_use]
    pub fn new(id: impl Into<EntityId>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            fields: BTreeMap::new(),
            info_fields: Vec::new(),
            open_questions: Vec::new(),
            confirmation_status: ConfirmationStatus::default(),
            is_stale: false,
            stale_reason: None,
            links: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_info_field(mut self, field: InfoField) -> Self {
        self.info_fields.push(field);
        self
    }

    #[must_use]
    pub fn with_question(mut self, question: OpenQuestion) -> Self {
        self.open_questions.push(question);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: ConfirmationStatus) -> Self {
        self.confirmation_status = status;
        self
    }

    #[must_use]
    pub fn with_link(mut self, upstream: impl Into<EntityId>) -> Self {
        self.links.push(upstream.into());
        self
    }

    /// Named field lookup
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Display title, from the `title` field
    #[must_use]
    pub fn title(&self) -> &str {
        self.field("title")
            .and_then(FieldValue::as_text)
            .unwrap_or_default()
    }

    /// Whether this entity was derived from `upstream`
    #[inline]
    #[must_use]
    pub fn links_to(&self, upstream: &EntityId) -> bool {
        self.links.contains(upstream)
    }

    /// Check that this snapshot belongs to `expected`
    ///
    /// # Errors
    /// Returns `IdentifierMismatch` when the ids differ
    pub fn ensure_id(&self, expected: &EntityId) -> Result<(), ModelError> {
        if &self.id == expected {
            Ok(())
        } else {
            Err(ModelError::IdentifierMismatch {
                expected: expected.clone(),
                actual: self.id.clone(),
            })
        }
    }

    /// Index of the first question whose text matches exactly
    ///
    /// Text is the only join key the backend gives us; two questions with
    /// identical text resolve to the first.
    #[must_use]
    pub fn question_position(&self, text: &str) -> Option<usize> {
        self.open_questions.iter().position(|q| q.question == text)
    }

    /// Mutable question lookup by text
    ///
    /// # Errors
    /// Returns `QuestionNotFound` when no question carries `text`
    pub fn question_mut(&mut self, text: &str) -> Result<&mut OpenQuestion, ModelError> {
        match self.question_position(text) {
            Some(idx) => Ok(&mut self.open_questions[idx]),
            None => Err(ModelError::QuestionNotFound {
                entity: self.id.clone(),
                question: text.to_string(),
            }),
        }
    }

    /// Mark stale and demote to `needs_review`
    ///
    /// Returns `false` when the entity was already stale for the same reason
    /// and already in `needs_review`.
    pub fn demote(&mut self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let transition = confirmation::demote(self.confirmation_status);
        let same_reason = self.is_stale && self.stale_reason.as_deref() == Some(reason.as_str());
        if same_reason && !transition.is_change() {
            return false;
        }
        self.confirmation_status = transition.status();
        self.is_stale = true;
        self.stale_reason = Some(reason);
        true
    }

    /// Apply a confirmation transition in place
    pub fn apply_transition(&mut self, transition: Transition) {
        self.confirmation_status = transition.status();
    }

    /// Lightweight list projection
    #[must_use]
    pub fn summary(&self) -> EntitySummary {
        EntitySummary {
            id: self.id.clone(),
            title: self.title().to_string(),
            confirmation_status: self.confirmation_status,
            is_stale: self.is_stale,
        }
    }
}

/// List-view projection of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: EntityId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub confirmation_status: ConfirmationStatus,
    #[serde(default)]
    pub is_stale: bool,
}

impl EntitySummary {
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<EntityId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            confirmation_status: ConfirmationStatus::default(),
            is_stale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_field_equals_empty_value() {
        let empty = FieldValue::text("");
        let list = FieldValue::list(Vec::<String>::new());
        let record = FieldValue::Record(json!({}));
        assert!(FieldValue::same(None, Some(&empty)));
        assert!(FieldValue::same(Some(&list), None));
        assert!(FieldValue::same(Some(&record), None));
        assert!(!FieldValue::same(Some(&FieldValue::text("x")), None));
    }

    #[test]
    fn field_value_untagged_deserialization() {
        let text: FieldValue = serde_json::from_value(json!("hello")).unwrap();
        let list: FieldValue = serde_json::from_value(json!(["a", "b"])).unwrap();
        let record: FieldValue =
            serde_json::from_value(json!({"role": "intake bot", "tone": "formal"})).unwrap();

        assert_eq!(text, FieldValue::text("hello"));
        assert_eq!(list, FieldValue::list(["a", "b"]));
        assert!(matches!(record, FieldValue::Record(_)));
    }

    #[test]
    fn detail_deserializes_with_defaults() {
        let detail: EntityDetail = serde_json::from_value(json!({
            "id": "step-1",
            "fields": {"title": "Intake"},
            "open_questions": [{"question": "Q1"}]
        }))
        .unwrap();

        assert_eq!(detail.id().as_str(), "step-1");
        assert_eq!(detail.kind, EntityKind::Step);
        assert_eq!(detail.title(), "Intake");
        assert_eq!(detail.open_questions[0].status, QuestionStatus::Open);
        assert_eq!(detail.confirmation_status, ConfirmationStatus::AiGenerated);
    }

    #[test]
    fn question_lookup_by_text() {
        let mut detail = EntityDetail::new("step-1", EntityKind::Step)
            .with_question(OpenQuestion::new("Q1"))
            .with_question(OpenQuestion::new("Q2"));

        assert_eq!(detail.question_position("Q2"), Some(1));
        detail
            .question_mut("Q1")
            .unwrap()
            .resolve(Some("yes".into()), None);
        assert_eq!(detail.open_questions[0].status, QuestionStatus::Resolved);

        let err = detail.question_mut("Q3").unwrap_err();
        assert!(err.is_patch_miss());
    }

    #[test]
    fn ensure_id_rejects_foreign_snapshot() {
        let detail = EntityDetail::new("a", EntityKind::Feature);
        assert!(detail.ensure_id(&EntityId::from("a")).is_ok());
        assert!(matches!(
            detail.ensure_id(&EntityId::from("b")),
            Err(ModelError::IdentifierMismatch { .. })
        ));
    }

    #[test]
    fn demote_is_idempotent_for_same_reason() {
        let mut detail = EntityDetail::new("a", EntityKind::Step)
            .with_status(ConfirmationStatus::ConfirmedClient);

        assert!(detail.demote("upstream f1 changed"));
        assert_eq!(detail.confirmation_status, ConfirmationStatus::NeedsReview);
        assert!(detail.is_stale);

        assert!(!detail.demote("upstream f1 changed"));
        assert!(detail.demote("upstream f2 changed"));
        assert_eq!(detail.stale_reason.as_deref(), Some("upstream f2 changed"));
    }

    #[test]
    fn summary_projects_title_and_status() {
        let detail = EntityDetail::new("a", EntityKind::Step)
            .with_field("title", FieldValue::text("Intake"))
            .with_status(ConfirmationStatus::NeedsClient);
        let summary = detail.summary();
        assert_eq!(summary.title, "Intake");
        assert_eq!(summary.confirmation_status, ConfirmationStatus::NeedsClient);
    }
}
