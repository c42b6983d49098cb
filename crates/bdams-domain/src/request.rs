//! Blood request domain types and the request lifecycle.
//!
//! ```text
//! active ──respond──▶ pending_confirmation ──complete──▶ completed
//!    │
//!    └────cancel────▶ cancelled
//! ```
//!
//! Statuses only ever move forward along these edges; `completed` and
//! `cancelled` are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{RequestId, UserId};
use crate::user::{BloodType, UnknownValueError};

/// How soon the blood is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = UnknownValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(UnknownValueError::new("urgency", other)),
        }
    }
}

/// Lifecycle status of a [`BloodRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Active,
    PendingConfirmation,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingConfirmation => "pending_confirmation",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Position along the lifecycle. Both terminal states share the last stage.
    fn stage(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::PendingConfirmation => 1,
            Self::Completed | Self::Cancelled => 2,
        }
    }

    /// Resolve `transition` from this status.
    pub fn apply(self, transition: Transition) -> Result<RequestStatus, TransitionError> {
        let from = transition.source();
        if self == from {
            return Ok(transition.target());
        }
        if self.is_terminal() || self.stage() > from.stage() {
            Err(TransitionError::Superseded {
                status: self,
                transition,
            })
        } else {
            Err(TransitionError::Premature {
                status: self,
                transition,
            })
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event. Each has exactly one source and one target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Respond,
    Cancel,
    Complete,
}

impl Transition {
    pub fn source(self) -> RequestStatus {
        match self {
            Self::Respond | Self::Cancel => RequestStatus::Active,
            Self::Complete => RequestStatus::PendingConfirmation,
        }
    }

    pub fn target(self) -> RequestStatus {
        match self {
            Self::Respond => RequestStatus::PendingConfirmation,
            Self::Cancel => RequestStatus::Cancelled,
            Self::Complete => RequestStatus::Completed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Respond => "respond",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition cannot be applied to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The request has already moved past the transition's source status.
    #[error("cannot {transition}: request is already {status}")]
    Superseded {
        status: RequestStatus,
        transition: Transition,
    },
    /// The request has not reached the transition's source status yet.
    #[error("cannot {transition}: request is still {status}")]
    Premature {
        status: RequestStatus,
        transition: Transition,
    },
}

/// A donor's offer against a request. Appended, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorResponse {
    pub donor_id: UserId,
    pub donor_name: String,
    #[serde(alias = "donorContact")]
    pub contact: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A recipient's request for blood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequest {
    pub id: RequestId,
    pub requester_id: UserId,
    pub blood_type: BloodType,
    pub location: String,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    /// Arrival order.
    #[serde(default)]
    pub responses: Vec<DonorResponse>,
}

impl BloodRequest {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.requester_id == user
    }

    pub fn has_response_from(&self, donor: &UserId) -> bool {
        self.responses.iter().any(|r| &r.donor_id == donor)
    }

    /// Move this request along `transition`, leaving it untouched on error.
    pub fn apply(&mut self, transition: Transition) -> Result<(), TransitionError> {
        self.status = self.status.apply(transition)?;
        Ok(())
    }
}

/// Payload for `POST /requests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBloodRequest {
    pub blood_type: BloodType,
    pub location: String,
    #[serde(default)]
    pub urgency: Urgency,
}

/// Payload for `POST /requests/{id}/respond`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondInput {
    pub message: String,
}
