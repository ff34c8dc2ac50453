//! Friend requests, team-join requests and system events

use crate::model::{TeamRef, UserRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request status
///
/// `PENDING` is the only non-terminal status. The server uses
/// `ACCEPTED`/`APPROVED` and `REJECTED`/`DECLINED` interchangeably depending on
/// the request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    /// Awaiting a response
    #[default]
    Pending,
    /// Accepted or approved
    #[serde(alias = "APPROVED", alias = "approved", alias = "accepted")]
    Accepted,
    /// Rejected or declined
    #[serde(alias = "DECLINED", alias = "declined", alias = "rejected")]
    Rejected,
}

impl RequestStatus {
    /// Whether the request has been answered
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Apply a status reported by the server or a push event
    ///
    /// Transitions are monotonic: a terminal status never changes, so late or
    /// duplicated events cannot resurrect an answered request. Returns `true`
    /// when the status changed.
    pub fn advance(&mut self, next: RequestStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        *self = next;
        true
    }
}

/// Request direction relative to the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Sent to the viewer
    Incoming,
    /// Sent by the viewer
    Outgoing,
}

/// A response the viewer can give to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    /// Accept a friend request
    Accept,
    /// Decline a friend request
    Decline,
    /// Approve a team-join request
    Approve,
    /// Reject a team-join request
    Reject,
}

impl RequestAction {
    /// Terminal status this action produces
    pub fn resulting_status(self) -> RequestStatus {
        match self {
            RequestAction::Accept | RequestAction::Approve => RequestStatus::Accepted,
            RequestAction::Decline | RequestAction::Reject => RequestStatus::Rejected,
        }
    }

    /// Whether the action answers a friend request (as opposed to a team-join request)
    pub fn is_friend_action(self) -> bool {
        matches!(self, RequestAction::Accept | RequestAction::Decline)
    }

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            RequestAction::Accept => "accept",
            RequestAction::Decline => "decline",
            RequestAction::Approve => "approve",
            RequestAction::Reject => "reject",
        }
    }
}

/// A friend request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    /// Request ID
    pub id: String,
    /// Direction relative to the viewer
    pub direction: Direction,
    /// Current status
    pub status: RequestStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Requesting user
    pub from_user: UserRef,
    /// Requested user
    pub to_user: UserRef,
    /// Status was set locally and the server has not confirmed it yet
    #[serde(default)]
    pub awaiting_confirmation: bool,
}

/// A request to join a team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamJoinRequest {
    /// Request ID
    pub id: String,
    /// Current status
    pub status: RequestStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// User who initiated the request
    pub from_user: UserRef,
    /// User the request is addressed to, if any
    #[serde(default)]
    pub to_user: Option<UserRef>,
    /// Team concerned
    pub team: TeamRef,
    /// Status was set locally and the server has not confirmed it yet
    #[serde(default)]
    pub awaiting_confirmation: bool,
}

/// What a system event reports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemEventKind {
    /// A tournament the viewer was part of was deleted
    TournamentDeleted,
    /// Any other persisted notification type
    Other(String),
}

/// A system notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    /// Subject id (ids may repeat across unrelated events)
    pub id: String,
    /// Event kind
    pub kind: SystemEventKind,
    /// Title to render
    pub title: String,
    /// Explanation to render
    pub reason: String,
    /// When the event happened
    pub created_at: DateTime<Utc>,
    /// Whether the viewer has seen it
    pub read: bool,
}

impl SystemEvent {
    /// Identity of a system event: subject id plus timestamp
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (&self.id, self.created_at)
    }
}
