//! Sync session
//!
//! Wires a [`ConversationStore`] and a [`NotificationAggregator`] to an
//! [`EventChannel`]. Every topic is subscribed through one
//! [`SubscriptionScope`], so dropping the session releases every handler.
//!
//! Channel handlers apply events synchronously. Work that needs a REST round
//! trip (`friend:responded`, a reconnect) is queued as a [`SyncTask`] and run
//! by whoever drives the session, typically via [`SyncSession::run`]. A
//! [`ShutdownHandle`] stops that loop and releases the subscriptions.

use crate::api::SnapshotApi;
use crate::channel::{EventChannel, SubscriptionScope, Topic};
use crate::config::Settings;
use crate::model::UserRef;
use crate::protocol::ChannelEvent;
use crate::sync::{ConversationStore, Hydration, HydrationReport, NotificationAggregator};
use crate::Result;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Follow-up work requested by a channel event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTask {
    /// Refresh every notification section
    ReloadNotifications,
    /// Re-hydrate everything after the channel reconnected
    Rehydrate,
}

/// Stops [`SyncSession::run`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Ask the session loop to stop; later calls are no-ops
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// Outcome of [`SyncSession::hydrate`]
#[derive(Debug)]
pub struct SessionHydration {
    /// Conversation list hydration
    pub conversations: Result<Hydration>,
    /// Timeline hydration of the open conversation, if one is open
    pub timeline: Option<Result<Hydration>>,
    /// Notification refresh
    pub notifications: HydrationReport,
}

/// Handler state shared by every subscription of a session
#[derive(Clone)]
struct Dispatcher {
    conversations: ConversationStore,
    notifications: NotificationAggregator,
    tasks: mpsc::UnboundedSender<SyncTask>,
    connected_once: Arc<AtomicBool>,
}

impl Dispatcher {
    fn handle(&self, topic: Topic, payload: &Value) {
        let Some(event) = ChannelEvent::parse(topic, payload, Utc::now()) else {
            return;
        };

        match event {
            ChannelEvent::Message { echo, message } => {
                let outcome = self.conversations.apply_inbound_message(message, echo);
                debug!("{}: {:?}", topic, outcome);
            }
            ChannelEvent::FriendRequest(request) => {
                let outcome = self.notifications.merge_friend_request_event(request);
                debug!("{}: {:?}", topic, outcome);
            }
            ChannelEvent::FriendResponded { request_id } => {
                debug!("Friend request {:?} answered remotely", request_id);
                self.queue(SyncTask::ReloadNotifications);
            }
            ChannelEvent::TeamJoinRequest(request) => {
                let outcome = self.notifications.merge_team_join_request_event(request);
                debug!("{}: {:?}", topic, outcome);
            }
            ChannelEvent::SystemEvent(event) => {
                self.notifications.record_system_event(event);
            }
            ChannelEvent::Connected => {
                if self.connected_once.swap(true, Ordering::SeqCst) {
                    info!("Channel reconnected, scheduling re-hydration");
                    self.queue(SyncTask::Rehydrate);
                }
            }
        }
    }

    fn queue(&self, task: SyncTask) {
        if self.tasks.send(task).is_err() {
            warn!("Dropping {:?}: session is shut down", task);
        }
    }
}

/// A running synchronization session for one viewer
pub struct SyncSession {
    conversations: ConversationStore,
    notifications: NotificationAggregator,
    tasks: mpsc::UnboundedReceiver<SyncTask>,
    scope: SubscriptionScope,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SyncSession {
    /// Create both stores and subscribe them to every topic on `channel`
    ///
    /// The first `connect` event seen is taken as the initial connection;
    /// every later one schedules [`SyncTask::Rehydrate`].
    pub fn start(
        api: Arc<dyn SnapshotApi>,
        channel: Arc<dyn EventChannel>,
        self_user: UserRef,
        settings: &Settings,
    ) -> Self {
        let conversations = ConversationStore::new(api.clone(), self_user, settings);
        let notifications = NotificationAggregator::new(api);
        let (tx, rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            conversations: conversations.clone(),
            notifications: notifications.clone(),
            tasks: tx,
            connected_once: Arc::new(AtomicBool::new(false)),
        };

        let mut scope = SubscriptionScope::new(channel);
        for topic in Topic::ALL {
            let dispatcher = dispatcher.clone();
            scope.subscribe(topic, move |payload| dispatcher.handle(topic, payload));
        }

        info!(
            "Sync session started for {} ({} subscriptions)",
            conversations.self_user().id,
            scope.len()
        );

        let (shutdown, _) = watch::channel(false);
        Self {
            conversations,
            notifications,
            tasks: rx,
            scope,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Hydrate conversations and notifications, then the open timeline
    pub async fn hydrate(&self) -> SessionHydration {
        let (conversations, notifications) = tokio::join!(
            self.conversations.hydrate_conversations(),
            self.notifications.hydrate_all(),
        );

        let timeline = match self.conversations.open_conversation_id() {
            Some(id) => Some(self.conversations.hydrate_timeline(&id).await),
            None => None,
        };

        if let Err(e) = &conversations {
            warn!("Conversation hydration failed: {}", e);
        }
        if let Some(Err(e)) = &timeline {
            warn!("Timeline hydration failed: {}", e);
        }

        SessionHydration {
            conversations,
            timeline,
            notifications,
        }
    }

    /// Wait for the next queued task
    pub async fn next_task(&mut self) -> Option<SyncTask> {
        self.tasks.recv().await
    }

    /// Take a queued task without waiting
    pub fn try_next_task(&mut self) -> Option<SyncTask> {
        self.tasks.try_recv().ok()
    }

    /// Execute one task
    pub async fn run_task(&self, task: SyncTask) {
        debug!("Running {:?}", task);
        match task {
            SyncTask::ReloadNotifications => {
                self.notifications.hydrate_all().await;
            }
            SyncTask::Rehydrate => {
                self.hydrate().await;
            }
        }
    }

    /// Execute every queued task; returns how many ran
    pub async fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.try_next_task() {
            self.run_task(task).await;
            ran += 1;
        }
        ran
    }

    /// Handle that stops [`SyncSession::run`] from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Execute tasks as they are queued until shut down
    ///
    /// Returns once [`ShutdownHandle::shutdown`] is called; a task already
    /// running is finished first. Every channel subscription is released on
    /// return, so no further events reach the stores.
    pub async fn run(&mut self) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let task = tokio::select! {
                _ = shutdown.changed() => break,
                task = self.tasks.recv() => task,
            };
            match task {
                Some(task) => self.run_task(task).await,
                None => break,
            }
        }

        self.scope.release();
        info!("Sync session stopped");
    }

    /// The conversation store (shares state with the session)
    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// The notification aggregator (shares state with the session)
    pub fn notifications(&self) -> &NotificationAggregator {
        &self.notifications
    }

    /// Number of channel subscriptions held
    pub fn subscription_count(&self) -> usize {
        self.scope.len()
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("conversations", &self.conversations)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
