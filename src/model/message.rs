//! Message identity and delivery status

use crate::model::{ConversationId, UserRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Locally generated identity of a message the server has not acknowledged
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId(String);

impl TempId {
    /// Generate a fresh temp id (`temp-<millis>-<uuid>`)
    pub fn generate() -> Self {
        Self(format!(
            "temp-{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        ))
    }

    /// The raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message identity: either still optimistic or acknowledged by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageId {
    /// Staged locally, awaiting server acknowledgment
    Pending {
        /// Local identity
        temp_id: TempId,
    },
    /// Acknowledged; carries the server-assigned id
    Confirmed {
        /// Server identity
        id: String,
    },
}

/// Delivery status of a message in a timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Optimistic entry with its send request in flight
    Sending,
    /// Acknowledged by the server
    #[default]
    Sent,
    /// The send request failed; the entry stays in place and can be retried
    Failed,
}

/// A message in a direct or team conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identity (pending or confirmed)
    pub id: MessageId,
    /// Conversation the message belongs to
    pub conversation: ConversationId,
    /// Text content
    pub content: String,
    /// Send time; local clock while pending, server clock once confirmed
    pub sent_at: DateTime<Utc>,
    /// Sender identity and display attributes
    pub sender: UserRef,
    /// When the recipient read it, if known
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    /// Delivery status
    #[serde(default)]
    pub delivery: DeliveryStatus,
    /// Temp id this entry was staged under; survives confirmation
    #[serde(default)]
    pub origin: Option<TempId>,
}

impl Message {
    /// Stage an optimistic message sent by `sender` now
    pub fn pending(
        temp_id: TempId,
        conversation: ConversationId,
        content: String,
        sender: UserRef,
    ) -> Self {
        Self {
            id: MessageId::Pending {
                temp_id: temp_id.clone(),
            },
            conversation,
            content,
            sent_at: Utc::now(),
            sender,
            read_at: None,
            delivery: DeliveryStatus::Sending,
            origin: Some(temp_id),
        }
    }

    /// A message acknowledged by the server
    pub fn confirmed(
        id: impl Into<String>,
        conversation: ConversationId,
        content: String,
        sent_at: DateTime<Utc>,
        sender: UserRef,
    ) -> Self {
        Self {
            id: MessageId::Confirmed { id: id.into() },
            conversation,
            content,
            sent_at,
            sender,
            read_at: None,
            delivery: DeliveryStatus::Sent,
            origin: None,
        }
    }

    /// Server id, if confirmed
    pub fn confirmed_id(&self) -> Option<&str> {
        match &self.id {
            MessageId::Confirmed { id } => Some(id),
            MessageId::Pending { .. } => None,
        }
    }

    /// Temp id, if still pending
    pub fn temp_id(&self) -> Option<&TempId> {
        match &self.id {
            MessageId::Pending { temp_id } => Some(temp_id),
            MessageId::Confirmed { .. } => None,
        }
    }

    /// Whether the server has not yet acknowledged this entry
    pub fn is_pending(&self) -> bool {
        matches!(self.id, MessageId::Pending { .. })
    }

    /// Whether this entry was staged under `temp_id` (pending or since confirmed)
    pub fn staged_as(&self, temp_id: &TempId) -> bool {
        self.origin.as_ref() == Some(temp_id)
    }

    /// Substitute the server's acknowledgment into this entry
    ///
    /// Identity, timestamp, content and sender are taken from `ack`; the
    /// staged temp id is kept as `origin`.
    pub fn confirm_with(&mut self, ack: &Message) {
        self.id = ack.id.clone();
        self.sent_at = ack.sent_at;
        self.content = ack.content.clone();
        if !ack.sender.is_unknown() {
            self.sender = ack.sender.clone();
        }
        if ack.read_at.is_some() {
            self.read_at = ack.read_at;
        }
        self.delivery = DeliveryStatus::Sent;
    }

    /// Mark the send request as failed
    pub fn mark_failed(&mut self) {
        self.delivery = DeliveryStatus::Failed;
    }

    /// Mark the send request as in flight again
    pub fn mark_sending(&mut self) {
        self.delivery = DeliveryStatus::Sending;
    }

    /// Short status marker for list rendering
    pub fn status_indicator(&self) -> &str {
        match self.delivery {
            DeliveryStatus::Sending => "↻",
            DeliveryStatus::Sent => "✓",
            DeliveryStatus::Failed => "✗",
        }
    }
}
