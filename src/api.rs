//! REST snapshot module
//!
//! This module defines the boundary to the REST API:
//! - `SnapshotApi` trait: the calls the sync engine makes
//! - `HttpApi`: reqwest implementation with bearer authentication and
//!   `{success, data, message}` envelope handling

use crate::config::{Credential, Settings};
use crate::model::{ConversationId, Direction, RequestAction};
use crate::protocol::rest::{CreateChatBody, RespondBody, SendMessageBody};
use crate::protocol::{
    ApiResponse, ChatDto, FriendRequestDto, MessageDto, NotificationDto, TeamDto,
    TeamJoinRequestDto, UserDto,
};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// REST calls consumed by the sync engine
///
/// Implementations must be cheap to share; the stores hold them behind an
/// `Arc` and call them from spawned tasks.
#[async_trait]
pub trait SnapshotApi: Send + Sync {
    /// Direct chats of the viewer
    async fn list_chats(&self) -> Result<Vec<ChatDto>>;

    /// Create (or fetch the existing) direct chat with `participant_id`
    async fn create_chat(&self, participant_id: &str) -> Result<ChatDto>;

    /// Teams of the viewer
    async fn list_teams(&self) -> Result<Vec<TeamDto>>;

    /// One page of a conversation's history, newest first or oldest first
    async fn list_messages(
        &self,
        conversation: &ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageDto>>;

    /// Send a message; returns the acknowledged message
    async fn send_message(&self, conversation: &ConversationId, content: &str)
    -> Result<MessageDto>;

    /// Mark a conversation read for the viewer
    async fn mark_read(&self, conversation: &ConversationId) -> Result<()>;

    /// Friends of the viewer
    async fn list_friends(&self) -> Result<Vec<UserDto>>;

    /// Pending friend requests in one box
    async fn list_friend_requests(&self, direction: Direction) -> Result<Vec<FriendRequestDto>>;

    /// Accept or decline a friend request
    async fn respond_friend_request(&self, request_id: &str, action: RequestAction) -> Result<()>;

    /// Team-join invitations, received (`Incoming`) or sent (`Outgoing`)
    async fn list_team_invitations(&self, direction: Direction)
    -> Result<Vec<TeamJoinRequestDto>>;

    /// Approve or reject a team-join request
    async fn respond_team_invitation(&self, request_id: &str, action: RequestAction)
    -> Result<()>;

    /// Persisted system notifications
    async fn list_notifications(&self) -> Result<Vec<NotificationDto>>;

    /// Mark every persisted notification read
    async fn mark_notifications_read(&self) -> Result<()>;
}

/// HTTP implementation of [`SnapshotApi`]
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

impl HttpApi {
    /// Build a client from settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use matchsync::{Credential, HttpApi, Settings};
    ///
    /// let settings = Settings::default();
    /// let api = HttpApi::new(&settings, Some(Credential::new("token"))).expect("client");
    /// ```
    pub fn new(settings: &Settings, credential: Option<Credential>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            credential,
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.credential {
            Some(credential) => builder.bearer_auth(credential.as_str()),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        context: &str,
    ) -> Result<ApiResponse<T>> {
        debug!("REST {}", context);

        let response = builder.send().await.map_err(|e| {
            warn!("{} failed: {}", context, e);
            Error::Network(format!("{}: {}", context, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} failed with status {}", context, status);
            return Err(Error::Http {
                status: status.as_u16(),
            });
        }

        response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| Error::Network(format!("{}: invalid response body: {}", context, e)))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<T> {
        self.send::<T>(self.request(Method::GET, path).query(query), context)
            .await?
            .into_result(context)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        context: &str,
    ) -> Result<T> {
        self.send::<T>(self.request(method, path).json(body), context)
            .await?
            .into_result(context)
    }

    async fn ack<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        context: &str,
    ) -> Result<()> {
        self.send::<serde_json::Value>(self.request(method, path).json(body), context)
            .await?
            .into_ack(context)
    }
}

fn messages_path(conversation: &ConversationId) -> String {
    match conversation {
        ConversationId::Direct(id) => format!("/chats/{}/messages", id),
        ConversationId::Team(id) => format!("/teams/{}/messages", id),
    }
}

fn friend_box(direction: Direction) -> &'static str {
    match direction {
        Direction::Incoming => "incoming",
        Direction::Outgoing => "outgoing",
    }
}

fn invitation_box(direction: Direction) -> &'static str {
    match direction {
        Direction::Incoming => "received",
        Direction::Outgoing => "sent",
    }
}

#[async_trait]
impl SnapshotApi for HttpApi {
    async fn list_chats(&self) -> Result<Vec<ChatDto>> {
        self.get("/chats", &[], "list chats").await
    }

    async fn create_chat(&self, participant_id: &str) -> Result<ChatDto> {
        let body = CreateChatBody { participant_id };
        self.post(Method::POST, "/chats", &body, "create chat").await
    }

    async fn list_teams(&self) -> Result<Vec<TeamDto>> {
        self.get("/teams/mine", &[], "list teams").await
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageDto>> {
        let query = [("limit", limit.to_string()), ("offset", offset.to_string())];
        self.get(&messages_path(conversation), &query, "list messages")
            .await
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<MessageDto> {
        let body = SendMessageBody { content };
        self.post(Method::POST, &messages_path(conversation), &body, "send message")
            .await
    }

    async fn mark_read(&self, conversation: &ConversationId) -> Result<()> {
        let path = match conversation {
            ConversationId::Direct(id) => format!("/chats/{}/read", id),
            ConversationId::Team(id) => format!("/teams/{}/messages/read", id),
        };
        self.ack(Method::PATCH, &path, &serde_json::json!({}), "mark read")
            .await
    }

    async fn list_friends(&self) -> Result<Vec<UserDto>> {
        self.get("/friends", &[], "list friends").await
    }

    async fn list_friend_requests(&self, direction: Direction) -> Result<Vec<FriendRequestDto>> {
        let query = [("box", friend_box(direction).to_string())];
        self.get("/friends/requests", &query, "list friend requests")
            .await
    }

    async fn respond_friend_request(&self, request_id: &str, action: RequestAction) -> Result<()> {
        let path = format!("/friends/requests/{}/respond", request_id);
        let body = RespondBody {
            action: action.as_str(),
        };
        self.ack(Method::POST, &path, &body, "respond to friend request")
            .await
    }

    async fn list_team_invitations(
        &self,
        direction: Direction,
    ) -> Result<Vec<TeamJoinRequestDto>> {
        let query = [("type", invitation_box(direction).to_string())];
        self.get("/teams/invitations", &query, "list team invitations")
            .await
    }

    async fn respond_team_invitation(
        &self,
        request_id: &str,
        action: RequestAction,
    ) -> Result<()> {
        let path = format!("/teams/invitations/{}/{}", request_id, action.as_str());
        self.ack(Method::POST, &path, &serde_json::json!({}), "respond to team invitation")
            .await
    }

    async fn list_notifications(&self) -> Result<Vec<NotificationDto>> {
        self.get("/notifications", &[], "list notifications").await
    }

    async fn mark_notifications_read(&self) -> Result<()> {
        self.ack(
            Method::PATCH,
            "/notifications/read",
            &serde_json::json!({}),
            "mark notifications read",
        )
        .await
    }
}

impl std::fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApi")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential)
            .finish()
    }
}
