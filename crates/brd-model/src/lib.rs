//! Solution Flow Entity Model
//!
//! Pure domain layer for the BRD workspace: entity snapshots, their review
//! status, and the field-level diff used to drive change highlighting.
//!
//! # Core Concepts
//!
//! - [`EntityDetail`]: Full snapshot of one workspace entity (step, feature, ...)
//! - [`ConfirmationStatus`]: Review status with the transitions in [`confirmation`]
//! - [`diff`]: Computes a [`ChangeSet`] between two snapshots of the same entity
//! - [`EntityKind::diff_fields`]: Explicit per-kind field list the diff walks
//!
//! Nothing in this crate performs I/O or touches a clock.
//!
//! # Example
//!
//! ```rust
//! use brd_model::{diff, EntityDetail, EntityKind, FieldValue};
//!
//! let before = EntityDetail::new("step-1", EntityKind::Step)
//!     .with_field("goal", FieldValue::text("Capture intake"));
//! let after = before.clone().with_field("goal", FieldValue::text("Capture intake fast"));
//!
//! let changes = diff(Some(&before), &after);
//! assert!(changes.contains("goal"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod confirmation;
pub mod diff;
pub mod entity;
pub mod error;

pub use confirmation::{ConfirmationAction, ConfirmationStatus, Transition};
pub use diff::{diff, ChangeMarker, ChangeSet, FieldSpec};
pub use entity::{
    EntityDetail, EntityId, EntityKind, EntitySummary, FieldValue, InfoField, OpenQuestion,
    QuestionStatus,
};
pub use error::ModelError;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
