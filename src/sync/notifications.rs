//! Notification aggregator
//!
//! Merges friend requests, team-join requests and system events from REST
//! snapshots and push events into per-section lists plus one unread badge.
//!
//! Sections are refreshed wholesale by [`NotificationAggregator::hydrate_all`];
//! push events are upserted in between. Request status only ever moves from
//! `PENDING` to a terminal status, whichever source reports it.

use crate::api::SnapshotApi;
use crate::model::{
    Direction, FriendRequest, RequestAction, RequestStatus, SystemEvent, SystemEventKind,
    TeamJoinRequest, UserRef,
};
use crate::sync::generation::{Generation, Hydration};
use crate::sync::{lock, spawn_best_effort};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A notification list refreshed by [`NotificationAggregator::hydrate_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Friend requests sent to the viewer
    IncomingFriendRequests,
    /// Friend requests sent by the viewer
    OutgoingFriendRequests,
    /// Team-join requests received by the viewer
    TeamJoinRequests,
    /// Persisted system notifications
    SystemEvents,
    /// The viewer's friends
    Friends,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Section::IncomingFriendRequests => "incoming friend requests",
            Section::OutgoingFriendRequests => "outgoing friend requests",
            Section::TeamJoinRequests => "team-join requests",
            Section::SystemEvents => "system events",
            Section::Friends => "friends",
        };
        f.write_str(name)
    }
}

/// Result of a full notification refresh
///
/// Sections that failed keep their previous contents and are listed in
/// `failures` so each can render its own retry state.
#[derive(Debug)]
pub struct HydrationReport {
    /// Whether the fetched sections were applied
    pub outcome: Hydration,
    /// Sections whose fetch failed, with the error
    pub failures: Vec<(Section, Error)>,
}

impl HydrationReport {
    /// Whether every section was fetched and applied
    pub fn is_complete(&self) -> bool {
        self.outcome.is_applied() && self.failures.is_empty()
    }

    /// Error for `section`, if its fetch failed
    pub fn failure(&self, section: Section) -> Option<&Error> {
        self.failures
            .iter()
            .find(|(s, _)| *s == section)
            .map(|(_, e)| e)
    }
}

/// What a push event did to its section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new entry was prepended
    Inserted,
    /// An existing entry changed
    Updated,
    /// The event carried nothing new
    Unchanged,
}

#[derive(Default)]
struct NotificationState {
    incoming: Vec<FriendRequest>,
    outgoing: Vec<FriendRequest>,
    team_join: Vec<TeamJoinRequest>,
    system_events: Vec<SystemEvent>,
    friends: Vec<UserRef>,
    panel_open: bool,
    generation: Generation,
    /// Generation at which a push last touched an entry, keyed by section and identity
    pushed: HashMap<(Section, String), u64>,
}

impl NotificationState {
    fn touch(&mut self, section: Section, key: String) {
        let generation = self.generation.current();
        self.pushed.insert((section, key), generation);
    }

    fn pushed_since(&self, section: Section, key: &str, generation: u64) -> bool {
        self.pushed
            .get(&(section, key.to_string()))
            .is_some_and(|g| *g >= generation)
    }

    fn friend_list(&mut self, direction: Direction) -> &mut Vec<FriendRequest> {
        match direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        }
    }
}

fn friend_section(direction: Direction) -> Section {
    match direction {
        Direction::Incoming => Section::IncomingFriendRequests,
        Direction::Outgoing => Section::OutgoingFriendRequests,
    }
}

fn event_key(event: &SystemEvent) -> String {
    format!("{}@{}", event.id, event.created_at.timestamp_millis())
}

/// Friend requests, team-join requests and system events for the viewer
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct NotificationAggregator {
    api: Arc<dyn SnapshotApi>,
    state: Arc<Mutex<NotificationState>>,
}

impl NotificationAggregator {
    /// Create an empty aggregator
    pub fn new(api: Arc<dyn SnapshotApi>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(NotificationState::default())),
        }
    }

    /// Refresh every section in parallel
    ///
    /// Each section whose fetch succeeded is replaced wholesale, with two
    /// exceptions: a snapshot that still reports `PENDING` for a request the
    /// viewer already answered keeps the terminal status, and entries pushed
    /// while the fetch was in flight are kept even if the snapshot predates
    /// them. A refresh superseded by a newer one applies nothing.
    pub async fn hydrate_all(&self) -> HydrationReport {
        let ticket = lock(&self.state).generation.begin();

        let (incoming, outgoing, team_join, events, friends) = tokio::join!(
            self.api.list_friend_requests(Direction::Incoming),
            self.api.list_friend_requests(Direction::Outgoing),
            self.api.list_team_invitations(Direction::Incoming),
            self.api.list_notifications(),
            self.api.list_friends(),
        );

        let mut state = lock(&self.state);
        if !state.generation.is_current(ticket) {
            debug!("Discarding stale notification snapshot");
            return HydrationReport {
                outcome: Hydration::Stale,
                failures: Vec::new(),
            };
        }

        let generation = ticket.value();
        let mut failures = Vec::new();

        for (direction, fetched) in [
            (Direction::Incoming, incoming),
            (Direction::Outgoing, outgoing),
        ] {
            let section = friend_section(direction);
            match fetched {
                Ok(dtos) => {
                    let fetched = dtos
                        .into_iter()
                        .map(|dto| dto.into_request(direction))
                        .collect();
                    let merged = replace_requests(
                        &state,
                        section,
                        state_list(&state, direction),
                        fetched,
                        generation,
                        |r| &r.id,
                        |r| r.status,
                    );
                    *state.friend_list(direction) = merged;
                }
                Err(e) => failures.push((section, e)),
            }
        }

        match team_join {
            Ok(dtos) => {
                let fetched = dtos.into_iter().map(TeamJoinRequest::from).collect();
                let merged = replace_requests(
                    &state,
                    Section::TeamJoinRequests,
                    &state.team_join,
                    fetched,
                    generation,
                    |r| &r.id,
                    |r| r.status,
                );
                state.team_join = merged;
            }
            Err(e) => failures.push((Section::TeamJoinRequests, e)),
        }

        match events {
            Ok(dtos) => {
                let mut fetched: Vec<SystemEvent> =
                    dtos.into_iter().map(SystemEvent::from).collect();
                let kept: Vec<SystemEvent> = state
                    .system_events
                    .iter()
                    .filter(|local| {
                        state.pushed_since(Section::SystemEvents, &event_key(local), generation)
                            && !fetched.iter().any(|f| f.key() == local.key())
                    })
                    .cloned()
                    .collect();
                for local in &state.system_events {
                    // A read already recorded locally is not undone by an older snapshot.
                    if local.read {
                        if let Some(f) = fetched.iter_mut().find(|f| f.key() == local.key()) {
                            f.read = true;
                        }
                    }
                }
                state.system_events = kept.into_iter().chain(fetched).collect();
            }
            Err(e) => failures.push((Section::SystemEvents, e)),
        }

        match friends {
            Ok(dtos) => state.friends = dtos.into_iter().map(UserRef::from).collect(),
            Err(e) => failures.push((Section::Friends, e)),
        }

        state
            .pushed
            .retain(|_, touched| *touched >= generation);

        for (section, e) in &failures {
            warn!("Failed to refresh {}: {}", section, e);
        }
        info!(
            "Hydrated notifications: {} incoming, {} outgoing, {} team-join, {} events ({} sections failed)",
            state.incoming.len(),
            state.outgoing.len(),
            state.team_join.len(),
            state.system_events.len(),
            failures.len()
        );

        HydrationReport {
            outcome: Hydration::Applied,
            failures,
        }
    }

    /// Upsert a pushed friend request into its direction's list
    ///
    /// A later event for a known id overwrites its attributes; the status
    /// still only moves forward.
    pub fn merge_friend_request_event(&self, request: FriendRequest) -> MergeOutcome {
        let mut state = lock(&self.state);
        state.touch(friend_section(request.direction), request.id.clone());
        let list = state.friend_list(request.direction);

        let Some(idx) = list.iter().position(|r| r.id == request.id) else {
            debug!("New {:?} friend request {}", request.direction, request.id);
            list.insert(0, request);
            return MergeOutcome::Inserted;
        };
        let existing = &mut list[idx];

        let before = existing.clone();
        let mut status = existing.status;
        status.advance(request.status);
        if existing.awaiting_confirmation && status == request.status {
            existing.awaiting_confirmation = false;
        }
        existing.created_at = request.created_at;
        existing.from_user = request.from_user;
        existing.to_user = request.to_user;
        existing.status = status;

        if *existing == before {
            debug!("Friend request {} unchanged", existing.id);
            MergeOutcome::Unchanged
        } else {
            debug!("Friend request {} now {:?}", existing.id, existing.status);
            MergeOutcome::Updated
        }
    }

    /// Prepend a pushed team-join request unless its id is already listed
    ///
    /// For a listed id only a forward status change is applied.
    pub fn merge_team_join_request_event(&self, request: TeamJoinRequest) -> MergeOutcome {
        let mut state = lock(&self.state);
        state.touch(Section::TeamJoinRequests, request.id.clone());

        match state.team_join.iter_mut().find(|r| r.id == request.id) {
            Some(existing) => {
                if existing.status.advance(request.status) {
                    MergeOutcome::Updated
                } else {
                    MergeOutcome::Unchanged
                }
            }
            None => {
                debug!("New team-join request {} for {}", request.id, request.team.id);
                state.team_join.insert(0, request);
                MergeOutcome::Inserted
            }
        }
    }

    /// Prepend a pushed system event as unread
    ///
    /// Returns `false` for a duplicate delivery.
    pub fn record_system_event(&self, mut event: SystemEvent) -> bool {
        let mut state = lock(&self.state);
        let duplicate = state.system_events.iter().any(|known| match &event.kind {
            // Deletion of the same tournament is one event however often it is pushed.
            SystemEventKind::TournamentDeleted => {
                known.kind == SystemEventKind::TournamentDeleted && known.id == event.id
            }
            SystemEventKind::Other(_) => known.key() == event.key(),
        });
        if duplicate {
            debug!("Duplicate system event {}", event.id);
            return false;
        }

        event.read = false;
        state.touch(Section::SystemEvents, event_key(&event));
        state.system_events.insert(0, event);
        true
    }

    /// Answer a friend request or a team-join request
    ///
    /// The local entry flips to the resulting status immediately and is
    /// flagged as awaiting confirmation. If the REST call fails the flip is
    /// undone and the error returned; otherwise every section is refreshed to
    /// pick up downstream effects such as a new friend.
    pub async fn respond(&self, request_id: &str, action: RequestAction) -> Result<HydrationReport> {
        let target = action.resulting_status();
        {
            let mut state = lock(&self.state);
            let state = &mut *state;
            let status = if action.is_friend_action() {
                state
                    .incoming
                    .iter_mut()
                    .chain(state.outgoing.iter_mut())
                    .find(|r| r.id == request_id)
                    .map(|r| (&mut r.status, &mut r.awaiting_confirmation))
            } else {
                state
                    .team_join
                    .iter_mut()
                    .find(|r| r.id == request_id)
                    .map(|r| (&mut r.status, &mut r.awaiting_confirmation))
            };
            if let Some((status, awaiting)) = status {
                if status.is_terminal() {
                    return Err(Error::Validation(format!(
                        "request {} was already answered",
                        request_id
                    )));
                }
                *status = target;
                *awaiting = true;
            }
        }

        info!("Responding to request {} with {}", request_id, action.as_str());
        let result = if action.is_friend_action() {
            self.api.respond_friend_request(request_id, action).await
        } else {
            self.api.respond_team_invitation(request_id, action).await
        };

        {
            let mut state = lock(&self.state);
            let state = &mut *state;
            let entry = state
                .incoming
                .iter_mut()
                .chain(state.outgoing.iter_mut())
                .map(|r| (&r.id, &mut r.status, &mut r.awaiting_confirmation))
                .chain(
                    state
                        .team_join
                        .iter_mut()
                        .map(|r| (&r.id, &mut r.status, &mut r.awaiting_confirmation)),
                )
                .find(|(id, _, awaiting)| id.as_str() == request_id && **awaiting);

            if let Some((_, status, awaiting)) = entry {
                *awaiting = false;
                if result.is_err() && *status == target {
                    *status = RequestStatus::Pending;
                }
            }
        }

        if let Err(e) = result {
            warn!("Failed to {} request {}: {}", action.as_str(), request_id, e);
            return Err(e);
        }

        Ok(self.hydrate_all().await)
    }

    /// Badge count: pending incoming friend requests, pending team-join
    /// requests and unread system events
    pub fn compute_unread_badge(&self) -> usize {
        let state = lock(&self.state);
        let friends = state
            .incoming
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count();
        let teams = state
            .team_join
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count();
        let events = state.system_events.iter().filter(|e| !e.read).count();
        friends + teams + events
    }

    /// Mark every system event read and tell the server, without waiting
    ///
    /// Does nothing (and returns `None`) when no event is unread. A failed
    /// REST call leaves the local state read.
    pub fn mark_system_events_read(&self) -> Option<JoinHandle<()>> {
        {
            let mut state = lock(&self.state);
            let mut flipped = 0;
            for event in state.system_events.iter_mut().filter(|e| !e.read) {
                event.read = true;
                flipped += 1;
            }
            if flipped == 0 {
                return None;
            }
            debug!("Marked {} system events read", flipped);
        }

        let api = self.api.clone();
        spawn_best_effort("mark notifications read", async move {
            api.mark_notifications_read().await
        })
    }

    /// Record that the notification panel opened, marking system events read
    pub fn open_panel(&self) -> Option<JoinHandle<()>> {
        lock(&self.state).panel_open = true;
        self.mark_system_events_read()
    }

    /// Record that the notification panel closed
    pub fn close_panel(&self) {
        lock(&self.state).panel_open = false;
    }

    /// Whether the notification panel is open
    pub fn is_panel_open(&self) -> bool {
        lock(&self.state).panel_open
    }

    /// Friend requests sent to the viewer, newest push first
    pub fn incoming_requests(&self) -> Vec<FriendRequest> {
        lock(&self.state).incoming.clone()
    }

    /// Friend requests sent by the viewer
    pub fn outgoing_requests(&self) -> Vec<FriendRequest> {
        lock(&self.state).outgoing.clone()
    }

    /// Incoming and outgoing friend requests, newest first
    pub fn friend_feed(&self) -> Vec<FriendRequest> {
        let state = lock(&self.state);
        let mut feed: Vec<FriendRequest> = state
            .incoming
            .iter()
            .chain(state.outgoing.iter())
            .cloned()
            .collect();
        feed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        feed
    }

    /// Team-join requests
    pub fn team_join_requests(&self) -> Vec<TeamJoinRequest> {
        lock(&self.state).team_join.clone()
    }

    /// System events
    pub fn system_events(&self) -> Vec<SystemEvent> {
        lock(&self.state).system_events.clone()
    }

    /// The viewer's friends
    pub fn friends(&self) -> Vec<UserRef> {
        lock(&self.state).friends.clone()
    }
}

impl std::fmt::Debug for NotificationAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAggregator").finish_non_exhaustive()
    }
}

fn state_list(state: &NotificationState, direction: Direction) -> &Vec<FriendRequest> {
    match direction {
        Direction::Incoming => &state.incoming,
        Direction::Outgoing => &state.outgoing,
    }
}

/// Replace a request list with a snapshot
///
/// A local entry with a terminal status survives a snapshot that still
/// reports `PENDING`, and entries pushed at or after `generation` that the snapshot lacks are
/// kept in front.
fn replace_requests<R: Clone>(
    state: &NotificationState,
    section: Section,
    local: &[R],
    mut fetched: Vec<R>,
    generation: u64,
    id: impl Fn(&R) -> &String,
    status: impl Fn(&R) -> RequestStatus,
) -> Vec<R> {
    let mut kept = Vec::new();
    for entry in local {
        match fetched.iter_mut().find(|f| id(f) == id(entry)) {
            Some(remote) => {
                if status(entry).is_terminal() && !status(remote).is_terminal() {
                    *remote = entry.clone();
                }
            }
            None => {
                if state.pushed_since(section, id(entry), generation) {
                    kept.push(entry.clone());
                }
            }
        }
    }
    kept.extend(fetched);
    kept
}
