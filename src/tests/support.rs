// Shared fixtures: a scripted REST fake and builders for wire types

use crate::api::SnapshotApi;
use crate::config::Settings;
use crate::model::{ConversationId, Direction, RequestAction, RequestStatus, UserRef};
use crate::protocol::{
    ChatDto, FriendRequestDto, MessageDto, NotificationDto, TeamDto, TeamJoinRequestDto, UserDto,
};
use crate::protocol::rest::TeamRefDto;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub const SELF_ID: &str = "me";

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn me() -> UserRef {
    UserRef::new(SELF_ID).with_name("Me")
}

pub fn user_dto(id: &str) -> UserDto {
    UserDto {
        id: id.to_string(),
        username: Some(format!("{}_login", id)),
        display_name: None,
        avatar_url: None,
    }
}

pub fn message_dto(id: &str, content: &str, sent_at: DateTime<Utc>, sender: &str) -> MessageDto {
    MessageDto {
        id: id.to_string(),
        content: content.to_string(),
        sent_at,
        sender: Some(user_dto(sender)),
        sender_id: None,
        read_at: None,
    }
}

pub fn chat_dto(id: &str, other: &str, last: Option<MessageDto>, unread: u32) -> ChatDto {
    ChatDto {
        id: id.to_string(),
        participants: vec![user_dto(SELF_ID), user_dto(other)],
        last_message: last,
        unread_count: unread,
        updated_at: None,
    }
}

pub fn team_dto(id: &str, name: &str, last: Option<MessageDto>, unread: u32) -> TeamDto {
    TeamDto {
        id: id.to_string(),
        name: name.to_string(),
        members: vec![user_dto(SELF_ID), user_dto("captain")],
        last_message: last,
        unread_count: unread,
        updated_at: None,
    }
}

pub fn friend_request_dto(id: &str, from: &str, to: &str, secs: i64) -> FriendRequestDto {
    FriendRequestDto {
        id: id.to_string(),
        from_user: user_dto(from),
        to_user: user_dto(to),
        status: RequestStatus::Pending,
        created_at: at(secs),
    }
}

pub fn invitation_dto(id: &str, team: &str, secs: i64) -> TeamJoinRequestDto {
    TeamJoinRequestDto {
        id: id.to_string(),
        from_user: user_dto("captain"),
        to_user: Some(user_dto(SELF_ID)),
        team: TeamRefDto {
            id: team.to_string(),
            name: Some(format!("Team {}", team)),
        },
        status: RequestStatus::Pending,
        sent_at: at(secs),
    }
}

pub fn notification_dto(id: &str, secs: i64, read: bool) -> NotificationDto {
    NotificationDto {
        id: id.to_string(),
        kind: "TOURNAMENT_DELETED".to_string(),
        title: format!("Tournament {}", id),
        reason: "Cancelled".to_string(),
        created_at: at(secs),
        read,
    }
}

pub fn test_settings() -> Settings {
    Settings {
        self_user_id: Some(SELF_ID.to_string()),
        ..Settings::default()
    }
}

pub fn direct(id: &str) -> ConversationId {
    ConversationId::Direct(id.to_string())
}

pub fn team(id: &str) -> ConversationId {
    ConversationId::Team(id.to_string())
}

/// Snapshot data and call log of a [`FakeApi`]
#[derive(Default)]
pub struct FakeState {
    pub chats: Vec<ChatDto>,
    pub teams: Vec<TeamDto>,
    pub messages: HashMap<ConversationId, Vec<MessageDto>>,
    pub send_replies: VecDeque<MessageDto>,
    pub created_chats: HashMap<String, ChatDto>,
    pub incoming: Vec<FriendRequestDto>,
    pub outgoing: Vec<FriendRequestDto>,
    pub invitations: Vec<TeamJoinRequestDto>,
    pub notifications: Vec<NotificationDto>,
    pub friends: Vec<UserDto>,
    /// Calls that answer with HTTP 503
    pub failing: HashSet<&'static str>,
    pub calls: Vec<String>,
    gates: HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>,
}

/// Scripted [`SnapshotApi`]
///
/// Each call snapshots its reply when it is issued, then waits on the next
/// gate registered for its name (if any) before returning it. Tests use gates
/// to hold a response back and release it after other events.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Hold back the next `name` call until the returned sender fires (or is dropped)
    pub fn gate(&self, name: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|s| s.gates.entry(name).or_default().push_back(rx));
        tx
    }

    pub fn fail(&self, name: &'static str) {
        self.with(|s| s.failing.insert(name));
    }

    pub fn recover(&self, name: &'static str) {
        self.with(|s| s.failing.remove(name));
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| c.split(' ').next() == Some(name)).count())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    async fn call<T>(
        &self,
        name: &'static str,
        detail: String,
        reply: impl FnOnce(&mut FakeState) -> Result<T>,
    ) -> Result<T> {
        let (reply, gate) = self.with(|s| {
            s.calls.push(format!("{} {}", name, detail).trim_end().to_string());
            let gate = s.gates.get_mut(name).and_then(VecDeque::pop_front);
            let reply = if s.failing.contains(name) {
                Err(Error::Http { status: 503 })
            } else {
                reply(s)
            };
            (reply, gate)
        });
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        reply
    }
}

#[async_trait]
impl SnapshotApi for FakeApi {
    async fn list_chats(&self) -> Result<Vec<ChatDto>> {
        self.call("list_chats", String::new(), |s| Ok(s.chats.clone()))
            .await
    }

    async fn create_chat(&self, participant_id: &str) -> Result<ChatDto> {
        let participant = participant_id.to_string();
        self.call("create_chat", participant.clone(), move |s| {
            s.created_chats
                .get(&participant)
                .cloned()
                .ok_or_else(|| Error::NotFound(participant))
        })
        .await
    }

    async fn list_teams(&self) -> Result<Vec<TeamDto>> {
        self.call("list_teams", String::new(), |s| Ok(s.teams.clone()))
            .await
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageDto>> {
        let conversation = conversation.clone();
        self.call(
            "list_messages",
            format!("{} {} {}", conversation, limit, offset),
            move |s| {
                let all = s.messages.get(&conversation).cloned().unwrap_or_default();
                // Newest page first: offset counts back from the newest message.
                let end = all.len().saturating_sub(offset as usize);
                let start = end.saturating_sub(limit as usize);
                Ok(all[start..end].to_vec())
            },
        )
        .await
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<MessageDto> {
        self.call("send_message", format!("{} {}", conversation, content), |s| {
            s.send_replies
                .pop_front()
                .ok_or_else(|| Error::Network("no scripted reply".to_string()))
        })
        .await
    }

    async fn mark_read(&self, conversation: &ConversationId) -> Result<()> {
        self.call("mark_read", conversation.to_string(), |_| Ok(()))
            .await
    }

    async fn list_friends(&self) -> Result<Vec<UserDto>> {
        self.call("list_friends", String::new(), |s| Ok(s.friends.clone()))
            .await
    }

    async fn list_friend_requests(&self, direction: Direction) -> Result<Vec<FriendRequestDto>> {
        match direction {
            Direction::Incoming => {
                self.call("list_incoming", String::new(), |s| Ok(s.incoming.clone()))
                    .await
            }
            Direction::Outgoing => {
                self.call("list_outgoing", String::new(), |s| Ok(s.outgoing.clone()))
                    .await
            }
        }
    }

    async fn respond_friend_request(&self, request_id: &str, action: RequestAction) -> Result<()> {
        self.call(
            "respond_friend",
            format!("{} {}", request_id, action.as_str()),
            |_| Ok(()),
        )
        .await
    }

    async fn list_team_invitations(
        &self,
        _direction: Direction,
    ) -> Result<Vec<TeamJoinRequestDto>> {
        self.call("list_invitations", String::new(), |s| {
            Ok(s.invitations.clone())
        })
        .await
    }

    async fn respond_team_invitation(
        &self,
        request_id: &str,
        action: RequestAction,
    ) -> Result<()> {
        self.call(
            "respond_team",
            format!("{} {}", request_id, action.as_str()),
            |_| Ok(()),
        )
        .await
    }

    async fn list_notifications(&self) -> Result<Vec<NotificationDto>> {
        self.call("list_notifications", String::new(), |s| {
            Ok(s.notifications.clone())
        })
        .await
    }

    async fn mark_notifications_read(&self) -> Result<()> {
        self.call("mark_notifications_read", String::new(), |_| Ok(()))
            .await
    }
}
