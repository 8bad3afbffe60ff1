//! Confirmation state machine
//!
//! Pure transitions for an entity's review status. No transition is fatal:
//! requests that would not change anything come back as
//! [`Transition::Unchanged`] and callers skip the backend round-trip.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review status shared by every entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    /// Produced by generation, nobody has looked at it yet
    #[default]
    AiGenerated,
    /// Upstream change invalidated a prior review
    NeedsReview,
    /// Waiting on the client
    NeedsClient,
    /// Confirmed by the consultant
    ConfirmedConsultant,
    /// Confirmed by the client
    ConfirmedClient,
}

impl ConfirmationStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 5] = [
        Self::AiGenerated,
        Self::NeedsReview,
        Self::NeedsClient,
        Self::ConfirmedConsultant,
        Self::ConfirmedClient,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AiGenerated => "ai_generated",
            Self::NeedsReview => "needs_review",
            Self::NeedsClient => "needs_client",
            Self::ConfirmedConsultant => "confirmed_consultant",
            Self::ConfirmedClient => "confirmed_client",
        }
    }

    /// Either confirmed state
    #[inline]
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(self, Self::ConfirmedConsultant | Self::ConfirmedClient)
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmationStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ModelError::UnknownStatus(s.to_string()))
    }
}

/// Requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationAction {
    /// Consultant confirms
    Confirm,
    /// Ask the client to review
    RequestReview,
    /// Engine-driven demotion after an upstream change
    Demote,
}

/// Outcome of applying an action to a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed {
        from: ConfirmationStatus,
        to: ConfirmationStatus,
    },
    Unchanged(ConfirmationStatus),
}

impl Transition {
    /// Status after the transition
    #[inline]
    #[must_use]
    pub const fn status(self) -> ConfirmationStatus {
        match self {
            Self::Changed { to, .. } => to,
            Self::Unchanged(status) => status,
        }
    }

    /// Status before the transition
    #[inline]
    #[must_use]
    pub const fn previous(self) -> ConfirmationStatus {
        match self {
            Self::Changed { from, .. } => from,
            Self::Unchanged(status) => status,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_change(self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    fn to(from: ConfirmationStatus, to: ConfirmationStatus) -> Self {
        if from == to {
            Self::Unchanged(from)
        } else {
            Self::Changed { from, to }
        }
    }
}

/// `confirm`: moves to `confirmed_consultant` unless already confirmed
#[must_use]
pub fn confirm(from: ConfirmationStatus) -> Transition {
    if from.is_confirmed() {
        Transition::Unchanged(from)
    } else {
        Transition::to(from, ConfirmationStatus::ConfirmedConsultant)
    }
}

/// `requestReview`: moves to `needs_client`
#[must_use]
pub fn request_review(from: ConfirmationStatus) -> Transition {
    Transition::to(from, ConfirmationStatus::NeedsClient)
}

/// `demote`: moves any status back to `needs_review`
#[must_use]
pub fn demote(from: ConfirmationStatus) -> Transition {
    Transition::to(from, ConfirmationStatus::NeedsReview)
}

/// Apply an action
#[must_use]
pub fn apply(from: ConfirmationStatus, action: ConfirmationAction) -> Transition {
    match action {
        ConfirmationAction::Confirm => confirm(from),
        ConfirmationAction::RequestReview => request_review(from),
        ConfirmationAction::Demote => demote(from),
    }
}

/// Statuses reachable from `from` in one action
#[must_use]
pub fn reachable_from(from: ConfirmationStatus) -> Vec<ConfirmationStatus> {
    let mut out = Vec::with_capacity(3);
    for action in [
        ConfirmationAction::Confirm,
        ConfirmationAction::RequestReview,
        ConfirmationAction::Demote,
    ] {
        if let Transition::Changed { to, .. } = apply(from, action) {
            if !out.contains(&to) {
                out.push(to);
            }
        }
    }
    out
}
