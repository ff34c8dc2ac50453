//! Timeline ordering helpers

use crate::model::Message;
use chrono::{DateTime, Utc};

/// Index at which a message sent at `sent_at` keeps the timeline ordered
///
/// Entries with an equal timestamp stay ahead of the new one, so arrival
/// order breaks ties and existing positions never move.
pub fn insertion_index(messages: &[Message], sent_at: DateTime<Utc>) -> usize {
    messages.partition_point(|m| m.sent_at <= sent_at)
}

/// Stable sort by `sent_at` ascending
pub fn sort_timeline(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.sent_at);
}

/// Index of the optimistic entry an acknowledged message resolves
///
/// Matches the oldest pending entry with identical content whose local send
/// time lies within `window` of the server time. The caller decides whether
/// the acknowledged message is the viewer's own.
pub fn find_pending_match(
    messages: &[Message],
    ack: &Message,
    window: chrono::Duration,
) -> Option<usize> {
    messages.iter().position(|m| {
        m.is_pending()
            && m.content == ack.content
            && (m.sent_at - ack.sent_at).abs() <= window
    })
}
