//! Event channel module
//!
//! This module defines the boundary to the shared push connection:
//! - `EventChannel` trait: subscribe/unsubscribe handlers by topic name
//! - `Topic`: the event names the sync engine consumes
//! - `SubscriptionScope`: a set of subscriptions torn down together on drop
//! - `LocalChannel`: in-process multiplexer, used as the channel in tests and
//!   as the fan-out point a socket adapter publishes into

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Event names consumed by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inbound direct message
    ChatMessage,
    /// Acknowledgment/echo of a direct message sent by this user
    ChatMessageSent,
    /// Inbound team message
    TeamMessage,
    /// Acknowledgment/echo of a team message sent by this user
    TeamMessageSent,
    /// Incoming friend request
    FriendRequest,
    /// Outgoing friend request created by this user
    FriendRequestSent,
    /// The other party answered a friend request
    FriendResponded,
    /// Team-join request
    TeamJoinRequest,
    /// A tournament was deleted
    TournamentDeleted,
    /// The channel connected or reconnected
    Connect,
}

impl Topic {
    /// Every topic, in subscription order
    pub const ALL: [Topic; 10] = [
        Topic::ChatMessage,
        Topic::ChatMessageSent,
        Topic::TeamMessage,
        Topic::TeamMessageSent,
        Topic::FriendRequest,
        Topic::FriendRequestSent,
        Topic::FriendResponded,
        Topic::TeamJoinRequest,
        Topic::TournamentDeleted,
        Topic::Connect,
    ];

    /// Wire name of the event
    pub fn name(self) -> &'static str {
        match self {
            Topic::ChatMessage => "chat:message",
            Topic::ChatMessageSent => "chat:message:sent",
            Topic::TeamMessage => "team:message",
            Topic::TeamMessageSent => "team:message:sent",
            Topic::FriendRequest => "friend:request",
            Topic::FriendRequestSent => "friend:request:sent",
            Topic::FriendResponded => "friend:responded",
            Topic::TeamJoinRequest => "team:join:request",
            Topic::TournamentDeleted => "tournament:deleted",
            Topic::Connect => "connect",
        }
    }

    /// Look up a topic by wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback type for handling channel payloads
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// A persistent, authenticated publish/subscribe connection
///
/// Delivery is at-least-once and unordered across topics. Reconnection and
/// framing are the implementation's concern; a reconnect is reported on the
/// `connect` topic.
pub trait EventChannel: Send + Sync {
    /// Register `handler` for events named `topic`
    fn subscribe(&self, topic: &str, handler: EventHandler) -> SubscriptionId;

    /// Remove a subscription; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Subscriptions acquired together and released together
///
/// Dropping the scope unsubscribes every handler it registered, so a
/// session that is torn down and rebuilt never leaves duplicate handlers
/// behind.
pub struct SubscriptionScope {
    channel: Arc<dyn EventChannel>,
    ids: Vec<SubscriptionId>,
}

impl SubscriptionScope {
    /// Open an empty scope on `channel`
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        Self {
            channel,
            ids: Vec::new(),
        }
    }

    /// Subscribe `handler` to `topic` for the lifetime of this scope
    pub fn subscribe<F>(&mut self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.channel.subscribe(topic.name(), Arc::new(handler));
        self.ids.push(id);
        id
    }

    /// Number of live subscriptions held
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the scope holds no subscriptions
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Unsubscribe every handler now instead of on drop
    pub fn release(&mut self) {
        for id in self.ids.drain(..) {
            self.channel.unsubscribe(id);
        }
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SubscriptionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionScope")
            .field("ids", &self.ids)
            .finish()
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<String, Vec<(SubscriptionId, EventHandler)>>,
}

/// In-process event channel multiplexed by topic name
#[derive(Clone, Default)]
pub struct LocalChannel {
    registry: Arc<Mutex<Registry>>,
}

impl LocalChannel {
    /// Create a channel with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `payload` to every handler subscribed to `topic`
    ///
    /// Handlers run after the registry lock is released, so a handler may
    /// subscribe or unsubscribe. Returns the number of handlers invoked.
    pub fn publish(&self, topic: &str, payload: &Value) -> usize {
        let handlers: Vec<EventHandler> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .handlers
                .get(topic)
                .map(|subs| subs.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        trace!("Publishing {} to {} handler(s)", topic, handlers.len());
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    /// Number of handlers subscribed to `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.handlers.get(topic).map_or(0, Vec::len)
    }
}

impl EventChannel for LocalChannel {
    fn subscribe(&self, topic: &str, handler: EventHandler) -> SubscriptionId {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        registry
            .handlers
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        debug!("Subscribed {:?} to {}", id, topic);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        for subs in registry.handlers.values_mut() {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
        registry.handlers.retain(|_, subs| !subs.is_empty());
        debug!("Unsubscribed {:?}", id);
    }
}

impl std::fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChannel").finish_non_exhaustive()
    }
}
