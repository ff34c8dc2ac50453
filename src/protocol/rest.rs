//! REST wire types
//!
//! Every endpoint answers with the `{success, data, message}` envelope. Ids
//! may arrive as strings or integers depending on the table, so they are
//! normalized to strings here.

use crate::model::{
    Conversation, ConversationId, ConversationKind, Direction, FriendRequest, LastMessage,
    Message, RequestStatus, SystemEvent, SystemEventKind, TeamJoinRequest, TeamRef, UserRef,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Response envelope shared by all endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    pub success: bool,
    /// Payload on success; absent on failure and on ack-only endpoints
    pub data: Option<T>,
    /// Human-readable message, usually set on failure
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the envelope into its payload
    ///
    /// `context` names the call for the `MissingData` error.
    pub fn into_result(self, context: &str) -> Result<T> {
        if !self.success {
            return Err(Error::Api {
                message: self
                    .message
                    .unwrap_or_else(|| format!("{} failed", context)),
            });
        }
        self.data
            .ok_or_else(|| Error::MissingData(context.to_string()))
    }

    /// Check the envelope of a call whose payload is irrelevant
    pub fn into_ack(self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(Error::Api {
                message: self
                    .message
                    .unwrap_or_else(|| format!("{} failed", context)),
            })
        }
    }
}

pub(crate) fn de_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or integer id, got {}",
            other
        ))),
    }
}

pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A user as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    /// User ID
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Login name
    #[serde(default)]
    pub username: Option<String>,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<UserDto> for UserRef {
    fn from(dto: UserDto) -> Self {
        UserRef {
            id: dto.id,
            display_name: dto.display_name.or(dto.username),
            avatar_url: dto.avatar_url,
        }
    }
}

/// A message as returned by the chat and team message endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    /// Server id
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Message text
    #[serde(default)]
    pub content: String,
    /// Server send time
    pub sent_at: DateTime<Utc>,
    /// Sender, when the server expands it
    #[serde(default)]
    pub sender: Option<UserDto>,
    /// Sender id, when the server does not expand it
    #[serde(default, deserialize_with = "de_opt_id")]
    pub sender_id: Option<String>,
    /// Read receipt time
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl MessageDto {
    fn sender_ref(&self) -> UserRef {
        match (&self.sender, &self.sender_id) {
            (Some(user), _) => UserRef::from(user.clone()),
            (None, Some(id)) => UserRef::new(id.clone()),
            (None, None) => UserRef::unknown(),
        }
    }

    /// Convert into a confirmed timeline entry of `conversation`
    pub fn into_message(self, conversation: ConversationId) -> Message {
        let sender = self.sender_ref();
        let mut msg = Message::confirmed(self.id, conversation, self.content, self.sent_at, sender);
        msg.read_at = self.read_at;
        msg
    }

    fn last_message(&self) -> LastMessage {
        LastMessage {
            id: Some(self.id.clone()),
            content: self.content.clone(),
            sent_at: self.sent_at,
            sender_id: self.sender_ref().id,
        }
    }
}

/// A direct chat in the chat list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDto {
    /// Chat ID
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Both participants
    #[serde(default)]
    pub participants: Vec<UserDto>,
    /// Newest message
    #[serde(default)]
    pub last_message: Option<MessageDto>,
    /// Unread messages for the viewer
    #[serde(default)]
    pub unread_count: u32,
    /// Last activity
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChatDto {
    /// Convert into conversation metadata as seen by `self_user`
    pub fn into_conversation(self, self_user: &UserRef) -> Conversation {
        let mut me = self_user.clone();
        let mut other = UserRef::unknown();
        for participant in self.participants {
            let user = UserRef::from(participant);
            if user.id == self_user.id {
                me = user;
            } else {
                other = user;
            }
        }

        let kind = ConversationKind::Direct {
            self_user: me,
            other,
        };
        snapshot_conversation(
            ConversationId::Direct(self.id),
            kind,
            self.last_message,
            self.unread_count,
            self.updated_at,
        )
    }
}

/// A team the viewer belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDto {
    /// Team ID
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Team name
    #[serde(default)]
    pub name: String,
    /// Members
    #[serde(default)]
    pub members: Vec<UserDto>,
    /// Newest team message
    #[serde(default)]
    pub last_message: Option<MessageDto>,
    /// Unread team messages for the viewer
    #[serde(default)]
    pub unread_count: u32,
    /// Last activity
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TeamDto {
    /// Convert into conversation metadata
    pub fn into_conversation(self) -> Conversation {
        let title = if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name
        };
        let kind = ConversationKind::Team {
            title,
            roster: self.members.into_iter().map(|m| m.id).collect(),
        };
        snapshot_conversation(
            ConversationId::Team(self.id),
            kind,
            self.last_message,
            self.unread_count,
            self.updated_at,
        )
    }
}

fn snapshot_conversation(
    id: ConversationId,
    kind: ConversationKind,
    last_message: Option<MessageDto>,
    unread_count: u32,
    updated_at: Option<DateTime<Utc>>,
) -> Conversation {
    let last = last_message.as_ref().map(MessageDto::last_message);
    let updated_at = [updated_at, last.as_ref().map(|m| m.sent_at)]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let mut conversation = Conversation::new(id, kind, updated_at);
    conversation.last_message = last;
    conversation.unread_count = unread_count;
    conversation
}

/// A friend request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestDto {
    /// Request ID
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Requesting user
    pub from_user: UserDto,
    /// Requested user
    pub to_user: UserDto,
    /// Status
    #[serde(default)]
    pub status: RequestStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl FriendRequestDto {
    /// Convert, tagging the direction relative to the viewer
    pub fn into_request(self, direction: Direction) -> FriendRequest {
        FriendRequest {
            id: self.id,
            direction,
            status: self.status,
            created_at: self.created_at,
            from_user: self.from_user.into(),
            to_user: self.to_user.into(),
            awaiting_confirmation: false,
        }
    }
}

/// Team reference inside a join request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRefDto {
    /// Team ID
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Team name
    #[serde(default)]
    pub name: Option<String>,
}

/// A team-join request (invitation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamJoinRequestDto {
    /// Request ID
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Initiating user
    pub from_user: UserDto,
    /// Addressed user
    #[serde(default)]
    pub to_user: Option<UserDto>,
    /// Team
    pub team: TeamRefDto,
    /// Status
    #[serde(default)]
    pub status: RequestStatus,
    /// Send time
    #[serde(alias = "createdAt")]
    pub sent_at: DateTime<Utc>,
}

impl From<TeamJoinRequestDto> for TeamJoinRequest {
    fn from(dto: TeamJoinRequestDto) -> Self {
        TeamJoinRequest {
            id: dto.id,
            status: dto.status,
            created_at: dto.sent_at,
            from_user: dto.from_user.into(),
            to_user: dto.to_user.map(UserRef::from),
            team: TeamRef {
                id: dto.team.id,
                name: dto.team.name,
            },
            awaiting_confirmation: false,
        }
    }
}

/// A persisted notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    /// Subject id
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Notification type, e.g. `TOURNAMENT_DELETED`
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Explanation
    #[serde(default, alias = "message")]
    pub reason: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Read flag
    #[serde(default)]
    pub read: bool,
}

impl From<NotificationDto> for SystemEvent {
    fn from(dto: NotificationDto) -> Self {
        let kind = match dto.kind.as_str() {
            "TOURNAMENT_DELETED" | "tournament:deleted" => SystemEventKind::TournamentDeleted,
            other => SystemEventKind::Other(other.to_string()),
        };
        SystemEvent {
            id: dto.id,
            kind,
            title: dto.title,
            reason: dto.reason,
            created_at: dto.created_at,
            read: dto.read,
        }
    }
}

/// Body of a send-message call
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageBody<'a> {
    /// Message text
    pub content: &'a str,
}

/// Body of a create-chat call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatBody<'a> {
    /// The other participant
    pub participant_id: &'a str,
}

/// Body of a friend-request response
#[derive(Debug, Clone, Serialize)]
pub struct RespondBody {
    /// `accept` or `decline`
    pub action: &'static str,
}
