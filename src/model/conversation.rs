//! Conversation metadata and timeline

use crate::model::message::{Message, TempId};
use crate::model::UserRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation identity
///
/// Direct chat ids and team ids come from different server tables, so the
/// kind is part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConversationId {
    /// 1:1 chat, keyed by chat id
    Direct(String),
    /// Team chat, keyed by team id
    Team(String),
}

impl ConversationId {
    /// The server-side id (chat id or team id)
    pub fn raw(&self) -> &str {
        match self {
            ConversationId::Direct(id) | ConversationId::Team(id) => id,
        }
    }

    /// Whether this is a team conversation
    pub fn is_team(&self) -> bool {
        matches!(self, ConversationId::Team(_))
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationId::Direct(id) => write!(f, "chat:{}", id),
            ConversationId::Team(id) => write!(f, "team:{}", id),
        }
    }
}

/// Kind-specific conversation attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConversationKind {
    /// Direct chat between the viewer and one other user
    Direct {
        /// The viewer
        self_user: UserRef,
        /// The other participant
        other: UserRef,
    },
    /// Team chat
    Team {
        /// Team display title
        title: String,
        /// Member user ids
        roster: Vec<String>,
    },
}

/// Denormalized pointer to the newest message, for list rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    /// Server id, `None` for an optimistic message
    pub id: Option<String>,
    /// Text content
    pub content: String,
    /// Send time
    pub sent_at: DateTime<Utc>,
    /// Sender user id
    pub sender_id: String,
}

impl From<&Message> for LastMessage {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.confirmed_id().map(str::to_string),
            content: msg.content.clone(),
            sent_at: msg.sent_at,
            sender_id: msg.sender.id.clone(),
        }
    }
}

/// A direct or team conversation with its message timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Identity
    pub id: ConversationId,
    /// Kind-specific attributes
    pub kind: ConversationKind,
    /// Newest known message
    pub last_message: Option<LastMessage>,
    /// Last activity time
    pub updated_at: DateTime<Utc>,
    /// Messages received while the conversation was not open
    pub unread_count: u32,
    /// Timeline, ordered by `sent_at` ascending
    pub messages: Vec<Message>,
    /// Newest message time covered by the last local mark-read
    #[serde(default)]
    pub read_through: Option<DateTime<Utc>>,
    /// List hydration generation at which a push last touched this conversation
    #[serde(skip)]
    pub(crate) touched_generation: Option<u64>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new(id: ConversationId, kind: ConversationKind, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            last_message: None,
            updated_at,
            unread_count: 0,
            messages: Vec::new(),
            read_through: None,
            touched_generation: None,
        }
    }

    /// Placeholder for a conversation first seen through a push event
    pub fn placeholder(id: ConversationId, self_user: &UserRef, sender: &UserRef) -> Self {
        let kind = match &id {
            ConversationId::Direct(_) => ConversationKind::Direct {
                self_user: self_user.clone(),
                other: if sender.id == self_user.id {
                    UserRef::unknown()
                } else {
                    sender.clone()
                },
            },
            ConversationId::Team(team_id) => ConversationKind::Team {
                title: team_id.clone(),
                roster: Vec::new(),
            },
        };
        Self::new(id, kind, DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Title to render in the conversation list
    pub fn title(&self) -> &str {
        match &self.kind {
            ConversationKind::Direct { other, .. } => other.label(),
            ConversationKind::Team { title, .. } => title,
        }
    }

    /// Index of the entry with server id `id`
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.confirmed_id() == Some(id))
    }

    /// Index of the entry staged as `temp_id`, whether or not it has been confirmed
    pub fn position_of_staged(&self, temp_id: &TempId) -> Option<usize> {
        self.messages.iter().position(|m| m.staged_as(temp_id))
    }

    /// Entries the server has not acknowledged yet
    pub fn pending_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_pending())
    }

    /// Number of acknowledged entries
    pub fn confirmed_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_pending()).count()
    }

    /// Point `last_message`/`updated_at` at `msg` if it is not older than what is known
    ///
    /// Returns `true` when the pointer moved.
    pub fn advance_last_message(&mut self, msg: &Message) -> bool {
        let newer = self
            .last_message
            .as_ref()
            .is_none_or(|last| msg.sent_at >= last.sent_at);

        if newer {
            self.last_message = Some(LastMessage::from(msg));
        }
        if msg.sent_at > self.updated_at {
            self.updated_at = msg.sent_at;
        }
        newer
    }

    /// Re-point an optimistic `last_message` at its acknowledged version
    ///
    /// Server and local clocks differ, so the acknowledged message may look
    /// older than the optimistic one it replaces.
    pub fn replace_pending_last(&mut self, confirmed: &Message) {
        let replaces = self.last_message.as_ref().is_some_and(|last| {
            last.id.is_none()
                && last.content == confirmed.content
                && last.sender_id == confirmed.sender.id
        });
        if replaces {
            self.last_message = Some(LastMessage::from(confirmed));
        }
    }

    /// Reset unread state, remembering how far the viewer has read
    ///
    /// Only server timestamps count: an optimistic entry carries the local
    /// clock, which may run ahead of the server's.
    pub fn mark_read(&mut self) {
        self.unread_count = 0;
        let newest = self
            .last_message
            .as_ref()
            .filter(|m| m.id.is_some())
            .map(|m| m.sent_at)
            .into_iter()
            .chain(
                self.messages
                    .iter()
                    .filter(|m| !m.is_pending())
                    .map(|m| m.sent_at),
            )
            .max();
        if let Some(newest) = newest {
            if self.read_through.is_none_or(|r| newest > r) {
                self.read_through = Some(newest);
            }
        }
    }
}
