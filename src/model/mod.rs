//! Client-side data model
//!
//! - `conversation` - conversation identity, metadata and timeline
//! - `message` - message identity (pending/confirmed) and delivery status
//! - `request` - friend requests, team-join requests, system events
//! - `user` - user and team references

pub mod conversation;
pub mod message;
pub mod request;
pub mod user;

pub use conversation::{Conversation, ConversationId, ConversationKind, LastMessage};
pub use message::{DeliveryStatus, Message, MessageId, TempId};
pub use request::{
    Direction, FriendRequest, RequestAction, RequestStatus, SystemEvent, SystemEventKind,
    TeamJoinRequest,
};
pub use user::{TeamRef, UNKNOWN_USER_ID, UserRef};
