//! Conversation store
//!
//! Holds every known direct and team conversation with its timeline and
//! reconciles three sources into it:
//! - REST snapshots (conversation list, timeline pages)
//! - optimistic local sends, identified by a temp id until acknowledged
//! - push events, delivered at least once and in no particular order
//!
//! A send is staged synchronously so the entry is visible immediately, then
//! delivered over REST. Whichever of the REST acknowledgment and the push
//! echo arrives first substitutes the server message into the staged entry at
//! its array position; the second one finds the final id already present and
//! is a no-op.
//!
//! A failed send keeps its entry in place, marked `DeliveryStatus::Failed`,
//! and can be re-issued with [`ConversationStore::retry_send`].

use crate::api::SnapshotApi;
use crate::config::Settings;
use crate::model::{
    Conversation, ConversationId, ConversationKind, DeliveryStatus, Message, TempId, UserRef,
};
use crate::protocol::TeamDto;
use crate::sync::generation::{Generation, Hydration, KeyedGenerations};
use crate::sync::{lock, ordering, spawn_best_effort};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What an inbound message event did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// The final id was already in the timeline
    Duplicate,
    /// The event acknowledged one of the viewer's optimistic entries
    Reconciled,
    /// The message was new and was added to the timeline
    Appended,
    /// The event carried no server id and was not applied
    Ignored,
}

/// A staged message awaiting delivery
///
/// Returned by [`ConversationStore::stage_message`] and consumed by
/// [`ConversationStore::deliver`], so each staged entry has at most one
/// request in flight.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingSend {
    conversation: ConversationId,
    temp_id: TempId,
    content: String,
}

impl PendingSend {
    /// Target conversation
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Temp id of the staged entry
    pub fn temp_id(&self) -> &TempId {
        &self.temp_id
    }

    /// Content to send (trimmed)
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Default)]
struct ConversationState {
    conversations: HashMap<ConversationId, Conversation>,
    open: Option<ConversationId>,
    list_generation: Generation,
    timeline_generations: KeyedGenerations<ConversationId>,
}

/// Client-side view of all conversations and their timelines
///
/// Cloning is cheap; clones share state, so one clone can live in channel
/// handlers while another serves the presentation layer.
#[derive(Clone)]
pub struct ConversationStore {
    api: Arc<dyn SnapshotApi>,
    self_user: UserRef,
    page_size: u32,
    echo_window: chrono::Duration,
    state: Arc<Mutex<ConversationState>>,
}

impl ConversationStore {
    /// Create an empty store for the viewer `self_user`
    pub fn new(api: Arc<dyn SnapshotApi>, self_user: UserRef, settings: &Settings) -> Self {
        Self {
            api,
            self_user,
            page_size: settings.page_size.max(1),
            echo_window: settings.echo_match_window(),
            state: Arc::new(Mutex::new(ConversationState::default())),
        }
    }

    /// The viewer
    pub fn self_user(&self) -> &UserRef {
        &self.self_user
    }

    /// Fetch the chat and team lists and merge them by conversation id
    ///
    /// Per conversation, the snapshot's `last_message`/`unread_count` only
    /// replace local values when the snapshot's last message is at least as
    /// new as the local one, so a push that arrived first is never regressed.
    /// Conversations missing from the snapshot are dropped unless a push,
    /// an unacknowledged send or the open view still references them.
    pub async fn hydrate_conversations(&self) -> Result<Hydration> {
        let ticket = lock(&self.state).list_generation.begin();

        let (chats, teams) = tokio::join!(self.api.list_chats(), self.api.list_teams());
        let (chats, teams) = (chats?, teams?);

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if !state.list_generation.is_current(ticket) {
            debug!("Discarding stale conversation list snapshot");
            return Ok(Hydration::Stale);
        }

        let snapshot: Vec<Conversation> = chats
            .into_iter()
            .map(|chat| chat.into_conversation(&self.self_user))
            .chain(teams.into_iter().map(TeamDto::into_conversation))
            .collect();

        let mut seen = HashSet::with_capacity(snapshot.len());
        for remote in snapshot {
            seen.insert(remote.id.clone());
            match state.conversations.get_mut(&remote.id) {
                Some(local) => merge_snapshot(local, remote),
                None => {
                    state.conversations.insert(remote.id.clone(), remote);
                }
            }
        }

        // The open view is read by definition, whatever the snapshot says
        let open = state.open.clone();
        if let Some(conversation) = open.as_ref().and_then(|id| state.conversations.get_mut(id)) {
            conversation.unread_count = 0;
        }

        let before = state.conversations.len();
        state.conversations.retain(|id, conversation| {
            seen.contains(id)
                || open.as_ref() == Some(id)
                || conversation.pending_messages().next().is_some()
                || conversation
                    .touched_generation
                    .is_some_and(|g| g >= ticket.value())
        });

        info!(
            "Hydrated {} conversations ({} dropped)",
            seen.len(),
            before - state.conversations.len()
        );
        Ok(Hydration::Applied)
    }

    /// Fetch the newest page of a conversation and replace its timeline
    ///
    /// Unacknowledged entries are re-appended after the fetched page unless
    /// the page already contains their server counterpart. Confirmed entries
    /// newer than the whole page (pushed after the request was issued) are
    /// kept as well.
    pub async fn hydrate_timeline(&self, id: &ConversationId) -> Result<Hydration> {
        let ticket = lock(&self.state).timeline_generations.begin(id);

        let page = self.api.list_messages(id, self.page_size, 0).await?;

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if !state.timeline_generations.is_current(id, ticket) {
            debug!("Discarding stale timeline snapshot for {}", id);
            return Ok(Hydration::Stale);
        }

        let mut fetched: Vec<Message> = page
            .into_iter()
            .map(|dto| dto.into_message(id.clone()))
            .collect();
        ordering::sort_timeline(&mut fetched);
        let fetched_len = fetched.len();

        let conversation = state.conversations.entry(id.clone()).or_insert_with(|| {
            Conversation::placeholder(id.clone(), &self.self_user, &UserRef::unknown())
        });
        let local = std::mem::take(&mut conversation.messages);
        conversation.messages = self.rebase_timeline(fetched, local);
        if let Some(newest) = conversation.messages.last().cloned() {
            conversation.advance_last_message(&newest);
        }

        info!(
            "Hydrated timeline for {}: {} fetched, {} total",
            id,
            fetched_len,
            conversation.messages.len()
        );
        Ok(Hydration::Applied)
    }

    fn rebase_timeline(&self, mut fetched: Vec<Message>, local: Vec<Message>) -> Vec<Message> {
        let newest_fetched = fetched.last().map(|m| m.sent_at);
        let fetched_ids: HashSet<String> = fetched
            .iter()
            .filter_map(|m| m.confirmed_id().map(str::to_string))
            .collect();

        let mut carried = Vec::new();
        let mut pending = Vec::new();
        for msg in local {
            match msg.confirmed_id() {
                None => pending.push(msg),
                Some(id) if fetched_ids.contains(id) => {
                    // Keep the staging origin so a late REST ack still finds its entry.
                    if msg.origin.is_some() {
                        if let Some(f) = fetched.iter_mut().find(|f| f.confirmed_id() == Some(id)) {
                            f.origin = msg.origin.clone();
                        }
                    }
                }
                Some(_) => {
                    if newest_fetched.is_none_or(|newest| msg.sent_at > newest) {
                        carried.push(msg);
                    }
                }
            }
        }

        let mut unmatched = Vec::new();
        for msg in pending {
            let counterpart = fetched.iter().position(|f| {
                f.origin.is_none()
                    && f.sender.id == self.self_user.id
                    && f.content == msg.content
                    && (f.sent_at - msg.sent_at).abs() <= self.echo_window
            });
            match counterpart {
                Some(idx) => fetched[idx].origin = msg.origin,
                None => unmatched.push(msg),
            }
        }

        fetched.extend(carried);
        fetched.extend(unmatched);
        fetched
    }

    /// Fetch the page of history preceding what is loaded
    ///
    /// Returns the number of messages added. A page that arrives after the
    /// timeline was re-hydrated or closed is discarded.
    pub async fn load_older(&self, id: &ConversationId) -> Result<usize> {
        let (ticket, offset) = {
            let mut state = lock(&self.state);
            let ticket = state.timeline_generations.peek(id);
            let offset = state
                .conversations
                .get(id)
                .map_or(0, Conversation::confirmed_count);
            (ticket, u32::try_from(offset).unwrap_or(u32::MAX))
        };

        let page = self.api.list_messages(id, self.page_size, offset).await?;

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if !state.timeline_generations.is_current(id, ticket) {
            debug!("Discarding stale history page for {}", id);
            return Ok(0);
        }
        let Some(conversation) = state.conversations.get_mut(id) else {
            return Ok(0);
        };

        let mut older: Vec<Message> = page
            .into_iter()
            .map(|dto| dto.into_message(id.clone()))
            .collect();
        ordering::sort_timeline(&mut older);

        let mut added = 0;
        for msg in older {
            let known = msg
                .confirmed_id()
                .is_some_and(|mid| conversation.position_of(mid).is_some());
            if known {
                continue;
            }
            let idx = ordering::insertion_index(&conversation.messages, msg.sent_at);
            conversation.messages.insert(idx, msg);
            added += 1;
        }

        debug!("Loaded {} older messages for {}", added, id);
        Ok(added)
    }

    /// Append an optimistic entry for `content` and return its send handle
    ///
    /// The entry is visible as soon as this returns. `content` is trimmed and
    /// must not be empty.
    pub fn stage_message(&self, id: &ConversationId, content: &str) -> Result<PendingSend> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Validation("message content is empty".to_string()));
        }

        let mut state = lock(&self.state);
        let conversation = state
            .conversations
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("conversation {}", id)))?;

        let temp_id = TempId::generate();
        let message = Message::pending(
            temp_id.clone(),
            id.clone(),
            content.to_string(),
            self.self_user.clone(),
        );
        conversation.advance_last_message(&message);
        conversation.messages.push(message);

        debug!("Staged {} in {}", temp_id, id);
        Ok(PendingSend {
            conversation: id.clone(),
            temp_id,
            content: content.to_string(),
        })
    }

    /// Issue the REST send for a staged entry and reconcile the response
    ///
    /// On success the staged entry becomes the server message in place. On
    /// failure it stays in the timeline marked `Failed` and the error is
    /// returned.
    pub async fn deliver(&self, pending: PendingSend) -> Result<Message> {
        let result = self
            .api
            .send_message(&pending.conversation, &pending.content)
            .await;

        let mut state = lock(&self.state);
        let conversation = state.conversations.get_mut(&pending.conversation);

        match result {
            Ok(dto) => {
                let ack = dto.into_message(pending.conversation.clone());
                info!(
                    "Message {} acknowledged in {}",
                    pending.temp_id, pending.conversation
                );
                Ok(match conversation {
                    Some(conversation) => reconcile_ack(conversation, &pending.temp_id, ack),
                    None => ack,
                })
            }
            Err(e) => {
                error!(
                    "Failed to send {} to {}: {}",
                    pending.temp_id, pending.conversation, e
                );
                if let Some(entry) = conversation
                    .and_then(|c| {
                        let idx = c.position_of_staged(&pending.temp_id)?;
                        c.messages.get_mut(idx)
                    })
                    .filter(|m| m.is_pending())
                {
                    entry.mark_failed();
                }
                Err(e)
            }
        }
    }

    /// Stage and deliver a message
    pub async fn send_message(&self, id: &ConversationId, content: &str) -> Result<Message> {
        let pending = self.stage_message(id, content)?;
        self.deliver(pending).await
    }

    /// Re-issue a failed send
    ///
    /// Only entries marked `Failed` can be retried; one still `Sending` or
    /// already acknowledged is a validation error.
    pub async fn retry_send(&self, id: &ConversationId, temp_id: &TempId) -> Result<Message> {
        let pending = {
            let mut state = lock(&self.state);
            let conversation = state
                .conversations
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("conversation {}", id)))?;
            let entry = conversation
                .position_of_staged(temp_id)
                .and_then(|idx| conversation.messages.get_mut(idx))
                .ok_or_else(|| Error::NotFound(format!("message {}", temp_id)))?;

            if !entry.is_pending() {
                return Err(Error::Validation(format!("{} is already delivered", temp_id)));
            }
            if entry.delivery == DeliveryStatus::Sending {
                return Err(Error::Validation(format!("{} is already being sent", temp_id)));
            }
            entry.mark_sending();

            PendingSend {
                conversation: id.clone(),
                temp_id: temp_id.clone(),
                content: entry.content.clone(),
            }
        };

        info!("Retrying {} in {}", temp_id, id);
        self.deliver(pending).await
    }

    /// Merge a pushed message (`…:message` or `…:message:sent`)
    ///
    /// Idempotent: a final id already in the timeline is a no-op. A message
    /// from the viewer that matches an unacknowledged entry acknowledges it in
    /// place. Anything else is inserted in `sent_at` order and, unless it is
    /// the viewer's own, counted as unread. In the open conversation it is
    /// marked read instead, and the server is told so without waiting.
    pub fn apply_inbound_message(&self, mut message: Message, echo: bool) -> InboundOutcome {
        if echo && message.sender.is_unknown() {
            message.sender = self.self_user.clone();
        }
        let Some(message_id) = message.confirmed_id().map(str::to_string) else {
            warn!("Ignoring inbound message without a server id");
            return InboundOutcome::Ignored;
        };

        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let generation = state.list_generation.current();
        let is_open = state.open.as_ref() == Some(&message.conversation);
        let from_self = message.sender.id == self.self_user.id;

        let conversation = state
            .conversations
            .entry(message.conversation.clone())
            .or_insert_with(|| {
                Conversation::placeholder(
                    message.conversation.clone(),
                    &self.self_user,
                    &message.sender,
                )
            });
        conversation.touched_generation = Some(generation);

        if conversation.position_of(&message_id).is_some() {
            debug!("Duplicate message {} in {}", message_id, message.conversation);
            return InboundOutcome::Duplicate;
        }

        if from_self {
            if let Some(idx) =
                ordering::find_pending_match(&conversation.messages, &message, self.echo_window)
            {
                conversation.messages[idx].confirm_with(&message);
                let confirmed = conversation.messages[idx].clone();
                conversation.replace_pending_last(&confirmed);
                conversation.advance_last_message(&confirmed);
                debug!("Echo {} acknowledged a staged entry", message_id);
                return InboundOutcome::Reconciled;
            }
        }

        let idx = ordering::insertion_index(&conversation.messages, message.sent_at);
        conversation.advance_last_message(&message);
        conversation.messages.insert(idx, message);
        let seen_in_open_view = is_open && !from_self;
        if seen_in_open_view {
            conversation.mark_read();
        } else if !from_self {
            conversation.unread_count += 1;
        }

        debug!(
            "Appended {} to {} (unread {})",
            message_id, conversation.id, conversation.unread_count
        );
        let id = conversation.id.clone();
        drop(guard);

        if seen_in_open_view {
            self.send_read_receipt(id);
        }
        InboundOutcome::Appended
    }

    /// Reset a conversation's unread count and tell the server, without waiting
    ///
    /// The REST call is best-effort: a failure is logged and not retried,
    /// since reopening the conversation issues it again.
    pub fn mark_read(&self, id: &ConversationId) -> Option<JoinHandle<()>> {
        {
            let mut state = lock(&self.state);
            state.conversations.get_mut(id)?.mark_read();
        }
        self.send_read_receipt(id.clone())
    }

    fn send_read_receipt(&self, id: ConversationId) -> Option<JoinHandle<()>> {
        let api = self.api.clone();
        spawn_best_effort("mark read", async move { api.mark_read(&id).await })
    }

    /// Record that the UI is showing `id` and mark it read
    ///
    /// Any in-flight timeline hydration of the previously open conversation
    /// becomes stale.
    pub fn open_conversation(&self, id: &ConversationId) -> Option<JoinHandle<()>> {
        {
            let mut state = lock(&self.state);
            if let Some(previous) = state.open.replace(id.clone()) {
                if previous != *id {
                    state.timeline_generations.invalidate(&previous);
                }
            }
        }
        self.mark_read(id)
    }

    /// Record that no conversation is showing
    pub fn close_conversation(&self) {
        let mut state = lock(&self.state);
        if let Some(previous) = state.open.take() {
            state.timeline_generations.invalidate(&previous);
        }
    }

    /// Conversation currently shown by the UI
    pub fn open_conversation_id(&self) -> Option<ConversationId> {
        lock(&self.state).open.clone()
    }

    /// Create or fetch the direct chat with `user_id` and add it to the store
    pub async fn start_direct_chat(&self, user_id: &str) -> Result<ConversationId> {
        let chat = self.api.create_chat(user_id).await?;
        let remote = chat.into_conversation(&self.self_user);
        let id = remote.id.clone();

        let mut state = lock(&self.state);
        let generation = state.list_generation.current();
        match state.conversations.get_mut(&id) {
            Some(local) => merge_snapshot(local, remote),
            None => {
                let mut remote = remote;
                remote.touched_generation = Some(generation);
                state.conversations.insert(id.clone(), remote);
            }
        }

        info!("Direct chat {} ready with {}", id, user_id);
        Ok(id)
    }

    /// Drop a conversation (team deleted or left); returns whether it existed
    pub fn remove_conversation(&self, id: &ConversationId) -> bool {
        let mut state = lock(&self.state);
        if state.open.as_ref() == Some(id) {
            state.open = None;
        }
        state.timeline_generations.invalidate(id);
        state.conversations.remove(id).is_some()
    }

    /// All conversations, most recently active first
    pub fn conversations(&self) -> Vec<Conversation> {
        let state = lock(&self.state);
        let mut list: Vec<Conversation> = state.conversations.values().cloned().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// One conversation
    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        lock(&self.state).conversations.get(id).cloned()
    }

    /// Timeline of a conversation (empty if unknown)
    pub fn timeline(&self, id: &ConversationId) -> Vec<Message> {
        lock(&self.state)
            .conversations
            .get(id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    /// Unread count of a conversation (zero if unknown)
    pub fn unread_count(&self, id: &ConversationId) -> u32 {
        lock(&self.state)
            .conversations
            .get(id)
            .map_or(0, |c| c.unread_count)
    }

    /// Sum of unread counts across conversations
    pub fn total_unread(&self) -> u32 {
        lock(&self.state)
            .conversations
            .values()
            .map(|c| c.unread_count)
            .sum()
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("self_user", &self.self_user)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Fold a snapshot of conversation metadata into the local copy
fn merge_snapshot(local: &mut Conversation, remote: Conversation) {
    let keeps_known_participant = matches!(
        (&local.kind, &remote.kind),
        (ConversationKind::Direct { .. }, ConversationKind::Direct { other, .. }) if other.is_unknown()
    );
    if !keeps_known_participant {
        local.kind = remote.kind;
    }

    let remote_time = remote.last_message.as_ref().map(|m| m.sent_at);
    let local_time = local.last_message.as_ref().map(|m| m.sent_at);
    let snapshot_is_current = match (remote_time, local_time) {
        (_, None) => true,
        (Some(remote), Some(local)) => remote >= local,
        (None, Some(_)) => false,
    };

    if snapshot_is_current {
        let read_covers = local
            .read_through
            .is_some_and(|read| remote_time.is_none_or(|t| t <= read));
        local.last_message = remote.last_message;
        local.unread_count = if read_covers { 0 } else { remote.unread_count };
    }

    if remote.updated_at > local.updated_at {
        local.updated_at = remote.updated_at;
    }
}

/// Substitute a REST acknowledgment into the entry staged as `temp_id`
fn reconcile_ack(conversation: &mut Conversation, temp_id: &TempId, ack: Message) -> Message {
    let ack_id = ack.confirmed_id().map(str::to_string);

    match conversation.position_of_staged(temp_id) {
        Some(idx) if conversation.messages[idx].is_pending() => {
            // An echo that did not match may have added the same message separately.
            if let Some(dup) = ack_id.as_deref().and_then(|id| conversation.position_of(id)) {
                conversation.messages.remove(dup);
            }
            let idx = conversation.position_of_staged(temp_id).unwrap_or(idx);
            conversation.messages[idx].confirm_with(&ack);
            let confirmed = conversation.messages[idx].clone();
            conversation.replace_pending_last(&confirmed);
            conversation.advance_last_message(&confirmed);
            confirmed
        }
        Some(idx) => {
            debug!("{} was already acknowledged by its echo", temp_id);
            conversation.messages[idx].clone()
        }
        None => {
            if let Some(idx) = ack_id.as_deref().and_then(|id| conversation.position_of(id)) {
                return conversation.messages[idx].clone();
            }
            let mut confirmed = ack;
            confirmed.origin = Some(temp_id.clone());
            let idx = ordering::insertion_index(&conversation.messages, confirmed.sent_at);
            conversation.advance_last_message(&confirmed);
            conversation.messages.insert(idx, confirmed.clone());
            confirmed
        }
    }
}
