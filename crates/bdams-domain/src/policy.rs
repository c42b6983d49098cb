//! Role-based access policy.
//!
//! This table is the one place where role logic lives. Callers ask
//! [`AccessPolicy`] instead of branching on [`Role`] themselves.
//!
//! | action | donor | recipient |
//! |---|---|---|
//! | `CreateRequest` | deny | allow |
//! | `CancelRequest` | deny | allow if owner |
//! | `ConfirmCompletion` | deny | allow if owner |
//! | `RespondToRequest` | allow if request active | deny |
//! | `ViewAllActiveRequests` | allow | deny |
//! | `ViewOwnRequests` | allow (donation history) | allow |

use std::fmt;

use crate::id::UserId;
use crate::request::{BloodRequest, RequestStatus};
use crate::user::Role;

/// A role-gated user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateRequest,
    CancelRequest,
    ConfirmCompletion,
    RespondToRequest,
    ViewAllActiveRequests,
    ViewOwnRequests,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::CreateRequest,
        Action::CancelRequest,
        Action::ConfirmCompletion,
        Action::RespondToRequest,
        Action::ViewAllActiveRequests,
        Action::ViewOwnRequests,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateRequest => "create_request",
            Self::CancelRequest => "cancel_request",
            Self::ConfirmCompletion => "confirm_completion",
            Self::RespondToRequest => "respond_to_request",
            Self::ViewAllActiveRequests => "view_all_active_requests",
            Self::ViewOwnRequests => "view_own_requests",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell of the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Always,
    /// Allowed when the actor is the request's requester.
    IfOwner,
    /// Allowed while the target request is `active`.
    IfActive,
    Never,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Always => "allow",
            Self::IfOwner => "allow (if owner)",
            Self::IfActive => "allow (if request active)",
            Self::Never => "deny",
        })
    }
}

/// Stateless policy lookup.
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn requirement(role: Role, action: Action) -> Requirement {
        use Action::*;
        use Requirement::*;
        match (role, action) {
            (Role::Donor, CreateRequest) => Never,
            (Role::Donor, CancelRequest) => Never,
            (Role::Donor, ConfirmCompletion) => Never,
            (Role::Donor, RespondToRequest) => IfActive,
            (Role::Donor, ViewAllActiveRequests) => Always,
            (Role::Donor, ViewOwnRequests) => Always,
            (Role::Recipient, CreateRequest) => Always,
            (Role::Recipient, CancelRequest) => IfOwner,
            (Role::Recipient, ConfirmCompletion) => IfOwner,
            (Role::Recipient, RespondToRequest) => Never,
            (Role::Recipient, ViewAllActiveRequests) => Never,
            (Role::Recipient, ViewOwnRequests) => Always,
        }
    }

    /// Whether `role` may ever perform `action`, before any per-request condition.
    pub fn is_allowed(role: Role, action: Action) -> bool {
        Self::requirement(role, action) != Requirement::Never
    }

    /// Evaluate the table cell against a concrete request.
    ///
    /// Conditional cells deny when `request` is `None`.
    pub fn permits(
        role: Role,
        action: Action,
        actor: &UserId,
        request: Option<&BloodRequest>,
    ) -> bool {
        match Self::requirement(role, action) {
            Requirement::Always => true,
            Requirement::Never => false,
            Requirement::IfOwner => request.is_some_and(|r| r.is_owned_by(actor)),
            Requirement::IfActive => request.is_some_and(|r| r.status == RequestStatus::Active),
        }
    }
}
