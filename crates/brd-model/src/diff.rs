//! Field-level diff between two snapshots of one entity
//!
//! [`diff`] walks the explicit field list of the entity's kind and reports a
//! [`ChangeSet`] of markers. The view layer owns how long a marker stays
//! highlighted; this module only says what changed.
//!
//! # Markers
//!
//! | Marker | Emitted when |
//! |---|---|
//! | `<name>` | named field differs (absent == empty) |
//! | `info_fields` | information-field collection differs as a whole |
//! | `field:<name>` | that information field is new or its content changed |
//! | `open_questions` | any question text, status or metadata differs |
//! | `confirmation_status` | review status differs |
//! | `staleness` | stale flag or reason differs |

use crate::entity::{EntityDetail, EntityKind, FieldValue, InfoField};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Coarse marker for the information-field collection
pub const INFO_FIELDS: &str = "info_fields";
/// Marker for the open-question list
pub const OPEN_QUESTIONS: &str = "open_questions";
/// Marker for the review status
pub const CONFIRMATION_STATUS: &str = "confirmation_status";
/// Marker for the staleness flag and reason
pub const STALENESS: &str = "staleness";

const INFO_ITEM_PREFIX: &str = "field:";

/// One entry in an entity kind's diff field list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    /// Named field in [`EntityDetail::fields`]
    Value(&'static str),
    /// Information-field collection, with per-item markers
    InfoFields,
    /// Open-question list
    Questions,
    /// Review status
    Status,
    /// Stale flag and reason
    Staleness,
}

const STEP_FIELDS: &[FieldSpec] = &[
    FieldSpec::Value("title"),
    FieldSpec::Value("goal"),
    FieldSpec::Value("actors"),
    FieldSpec::Value("narrative"),
    FieldSpec::Value("ai_config"),
    FieldSpec::Value("success_criteria"),
    FieldSpec::InfoFields,
    FieldSpec::Questions,
    FieldSpec::Status,
    FieldSpec::Staleness,
];

const FEATURE_FIELDS: &[FieldSpec] = &[
    FieldSpec::Value("title"),
    FieldSpec::Value("description"),
    FieldSpec::Value("acceptance_criteria"),
    FieldSpec::Value("priority"),
    FieldSpec::InfoFields,
    FieldSpec::Questions,
    FieldSpec::Status,
    FieldSpec::Staleness,
];

const WORKFLOW_FIELDS: &[FieldSpec] = &[
    FieldSpec::Value("title"),
    FieldSpec::Value("description"),
    FieldSpec::Value("steps"),
    FieldSpec::Value("narrative"),
    FieldSpec::InfoFields,
    FieldSpec::Questions,
    FieldSpec::Status,
    FieldSpec::Staleness,
];

const PERSONA_FIELDS: &[FieldSpec] = &[
    FieldSpec::Value("title"),
    FieldSpec::Value("role"),
    FieldSpec::Value("goals"),
    FieldSpec::Value("pain_points"),
    FieldSpec::InfoFields,
    FieldSpec::Status,
    FieldSpec::Staleness,
];

const DRIVER_FIELDS: &[FieldSpec] = &[
    FieldSpec::Value("title"),
    FieldSpec::Value("description"),
    FieldSpec::Value("driver_type"),
    FieldSpec::Value("evidence"),
    FieldSpec::InfoFields,
    FieldSpec::Status,
    FieldSpec::Staleness,
];

impl EntityKind {
    /// Fields the diff engine compares for this kind
    #[must_use]
    pub const fn diff_fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Step => STEP_FIELDS,
            Self::Feature => FEATURE_FIELDS,
            Self::Workflow => WORKFLOW_FIELDS,
            Self::Persona => PERSONA_FIELDS,
            Self::BusinessDriver => DRIVER_FIELDS,
        }
    }
}

/// Identifier of one changed field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeMarker(String);

impl ChangeMarker {
    /// Marker for a named field or collection
    #[inline]
    #[must_use]
    pub fn field(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Scoped marker for one information field
    #[inline]
    #[must_use]
    pub fn info_item(name: &str) -> Self {
        Self(format!("{INFO_ITEM_PREFIX}{name}"))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Information-field name, for scoped markers
    #[inline]
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.0.strip_prefix(INFO_ITEM_PREFIX)
    }
}

impl fmt::Display for ChangeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Markers that differ between two snapshots
///
/// Ordered, so two equal change sets iterate identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet {
    markers: BTreeSet<ChangeMarker>,
}

impl ChangeSet {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether `marker` (e.g. `"goal"` or `"field:Budget"`) is present
    #[must_use]
    pub fn contains(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| m.as_str() == marker)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeMarker> {
        self.markers.iter()
    }

    /// Names of information fields with a scoped marker
    pub fn changed_info_fields(&self) -> impl Iterator<Item = &str> {
        self.markers.iter().filter_map(ChangeMarker::scope)
    }

    /// Add a marker
    pub fn insert(&mut self, marker: ChangeMarker) {
        self.markers.insert(marker);
    }

    /// Merge another set into this one
    pub fn extend(&mut self, other: ChangeSet) {
        self.markers.extend(other.markers);
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeMarker;
    type IntoIter = std::collections::btree_set::Iter<'a, ChangeMarker>;

    fn into_iter(self) -> Self::IntoIter {
        self.markers.iter()
    }
}

/// Compute the change set between two snapshots
///
/// Returns an empty set when there is no previous snapshot or the
/// identifiers differ, so switching entities never highlights anything.
#[must_use]
pub fn diff(previous: Option<&EntityDetail>, current: &EntityDetail) -> ChangeSet {
    let mut changes = ChangeSet::new();
    let Some(previous) = previous else {
        return changes;
    };
    if previous.id() != current.id() {
        return changes;
    }

    for entry in current.kind.diff_fields() {
        match *entry {
            FieldSpec::Value(name) => {
                if !FieldValue::same(previous.field(name), current.field(name)) {
                    changes.insert(ChangeMarker::field(name));
                }
            }
            FieldSpec::InfoFields => {
                diff_info_fields(&previous.info_fields, &current.info_fields, &mut changes);
            }
            FieldSpec::Questions => {
                if previous.open_questions != current.open_questions {
                    changes.insert(ChangeMarker::field(OPEN_QUESTIONS));
                }
            }
            FieldSpec::Status => {
                if previous.confirmation_status != current.confirmation_status {
                    changes.insert(ChangeMarker::field(CONFIRMATION_STATUS));
                }
            }
            FieldSpec::Staleness => {
                if previous.is_stale != current.is_stale
                    || previous.stale_reason != current.stale_reason
                {
                    changes.insert(ChangeMarker::field(STALENESS));
                }
            }
        }
    }

    changes
}

fn diff_info_fields(previous: &[InfoField], current: &[InfoField], changes: &mut ChangeSet) {
    if previous == current {
        return;
    }
    changes.insert(ChangeMarker::field(INFO_FIELDS));

    // First occurrence wins when a name repeats
    let mut by_name: HashMap<&str, &InfoField> = HashMap::with_capacity(previous.len());
    for field in previous {
        by_name.entry(field.name.as_str()).or_insert(field);
    }

    for field in current {
        match by_name.get(field.name.as_str()) {
            Some(old) if *old == field => {}
            _ => changes.insert(ChangeMarker::info_item(&field.name)),
        }
    }
}
