//! Typed event channel payloads
//!
//! Push payloads are untrusted: fields may be missing, renamed or of the
//! wrong type. Parsing here defaults what can be defaulted (unknown sender,
//! receive time for a missing timestamp) and drops what cannot (no id, no
//! target conversation), so a bad event never reaches the stores.

use crate::channel::Topic;
use crate::model::{
    ConversationId, Direction, FriendRequest, Message, RequestStatus, SystemEvent,
    SystemEventKind, TeamJoinRequest, TeamRef, UserRef,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

/// A validated event channel payload
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// `chat:message`, `chat:message:sent`, `team:message`, `team:message:sent`
    Message {
        /// Whether this is the `:sent` acknowledgment/echo variant
        echo: bool,
        /// The confirmed message
        message: Message,
    },
    /// `friend:request` (incoming) and `friend:request:sent` (outgoing)
    FriendRequest(FriendRequest),
    /// `friend:responded`
    FriendResponded {
        /// Request id, when the payload carries one
        request_id: Option<String>,
    },
    /// `team:join:request`
    TeamJoinRequest(TeamJoinRequest),
    /// `tournament:deleted`
    SystemEvent(SystemEvent),
    /// The channel (re)connected
    Connected,
}

impl ChannelEvent {
    /// Validate a raw payload received on `topic`
    ///
    /// Returns `None` (after logging) when the payload cannot identify what it
    /// refers to.
    pub fn parse(topic: Topic, payload: &Value, received_at: DateTime<Utc>) -> Option<Self> {
        let event = match topic {
            Topic::ChatMessage | Topic::ChatMessageSent => {
                parse_message(payload, received_at, "chatId", ConversationId::Direct).map(
                    |message| ChannelEvent::Message {
                        echo: topic == Topic::ChatMessageSent,
                        message,
                    },
                )
            }
            Topic::TeamMessage | Topic::TeamMessageSent => {
                parse_message(payload, received_at, "teamId", ConversationId::Team).map(
                    |message| ChannelEvent::Message {
                        echo: topic == Topic::TeamMessageSent,
                        message,
                    },
                )
            }
            Topic::FriendRequest => {
                parse_friend_request(payload, Direction::Incoming, received_at)
                    .map(ChannelEvent::FriendRequest)
            }
            Topic::FriendRequestSent => {
                parse_friend_request(payload, Direction::Outgoing, received_at)
                    .map(ChannelEvent::FriendRequest)
            }
            Topic::FriendResponded => Some(ChannelEvent::FriendResponded {
                request_id: id_field(payload, &["requestId", "id"]),
            }),
            Topic::TeamJoinRequest => {
                parse_team_join_request(payload, received_at).map(ChannelEvent::TeamJoinRequest)
            }
            Topic::TournamentDeleted => {
                parse_tournament_deleted(payload, received_at).map(ChannelEvent::SystemEvent)
            }
            Topic::Connect => Some(ChannelEvent::Connected),
        };

        if event.is_none() {
            warn!("Dropping malformed {} payload: {}", topic.name(), payload);
        }
        event
    }
}

/// String or integer id under the first present key
fn id_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match payload.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn str_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| payload.get(*key)?.as_str().map(str::to_string))
}

/// RFC 3339 string or epoch milliseconds
fn time_field(payload: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| match payload.get(*key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

/// A user object, or a bare id, under `key`
fn user_field(payload: &Value, key: &str) -> Option<UserRef> {
    match payload.get(key)? {
        user @ Value::Object(_) => {
            let id = id_field(user, &["id"])?;
            Some(UserRef {
                id,
                display_name: str_field(user, &["displayName", "username", "name"]),
                avatar_url: str_field(user, &["avatarUrl", "avatar"]),
            })
        }
        Value::String(s) if !s.is_empty() => Some(UserRef::new(s.clone())),
        Value::Number(n) => Some(UserRef::new(n.to_string())),
        _ => None,
    }
}

fn status_field(payload: &Value) -> RequestStatus {
    payload
        .get("status")
        .and_then(|s| serde_json::from_value(s.clone()).ok())
        .unwrap_or_default()
}

fn parse_message(
    payload: &Value,
    received_at: DateTime<Utc>,
    target_key: &str,
    target: fn(String) -> ConversationId,
) -> Option<Message> {
    let id = id_field(payload, &["id", "messageId"])?;
    let conversation = target(id_field(payload, &[target_key])?);
    let sender = user_field(payload, "sender")
        .or_else(|| id_field(payload, &["senderId"]).map(UserRef::new))
        .unwrap_or_else(UserRef::unknown);
    let sent_at = time_field(payload, &["sentAt", "createdAt"]).unwrap_or(received_at);
    let content = str_field(payload, &["content"]).unwrap_or_default();

    let mut message = Message::confirmed(id, conversation, content, sent_at, sender);
    message.read_at = time_field(payload, &["readAt"]);
    Some(message)
}

fn parse_friend_request(
    payload: &Value,
    direction: Direction,
    received_at: DateTime<Utc>,
) -> Option<FriendRequest> {
    Some(FriendRequest {
        id: id_field(payload, &["id", "requestId"])?,
        direction,
        status: status_field(payload),
        created_at: time_field(payload, &["createdAt"]).unwrap_or(received_at),
        from_user: user_field(payload, "fromUser").unwrap_or_else(UserRef::unknown),
        to_user: user_field(payload, "toUser").unwrap_or_else(UserRef::unknown),
        awaiting_confirmation: false,
    })
}

fn parse_team_join_request(payload: &Value, received_at: DateTime<Utc>) -> Option<TeamJoinRequest> {
    let team = match payload.get("team") {
        Some(team @ Value::Object(_)) => TeamRef {
            id: id_field(team, &["id"])?,
            name: str_field(team, &["name"]),
        },
        _ => TeamRef {
            id: id_field(payload, &["teamId"])?,
            name: None,
        },
    };

    Some(TeamJoinRequest {
        id: id_field(payload, &["id", "requestId"])?,
        status: status_field(payload),
        created_at: time_field(payload, &["sentAt", "createdAt"]).unwrap_or(received_at),
        from_user: user_field(payload, "fromUser").unwrap_or_else(UserRef::unknown),
        to_user: user_field(payload, "toUser"),
        team,
        awaiting_confirmation: false,
    })
}

fn parse_tournament_deleted(payload: &Value, received_at: DateTime<Utc>) -> Option<SystemEvent> {
    let id = id_field(payload, &["id", "tournamentId"])?;
    let title = str_field(payload, &["title", "name"]).unwrap_or_else(|| id.clone());
    let reason = match time_field(payload, &["startDate"]) {
        Some(start) => format!(
            "The tournament scheduled for {} was deleted by its organizer",
            start.format("%Y-%m-%d")
        ),
        None => "The tournament was deleted by its organizer".to_string(),
    };

    Some(SystemEvent {
        id,
        kind: SystemEventKind::TournamentDeleted,
        title,
        reason,
        created_at: time_field(payload, &["deletedAt", "createdAt"]).unwrap_or(received_at),
        read: false,
    })
}
