//! Protocol module
//!
//! Wire formats at both boundaries of the sync engine:
//! - `rest` - the `{success, data, message}` envelope and REST DTOs
//! - `events` - typed event channel payloads, validated and defaulted

pub mod events;
pub mod rest;

pub use events::ChannelEvent;
pub use rest::{
    ApiResponse, ChatDto, FriendRequestDto, MessageDto, NotificationDto, TeamDto,
    TeamJoinRequestDto, UserDto,
};
