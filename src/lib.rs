//! Matchsync - realtime conversation and notification synchronization
//!
//! This library keeps a client's view of direct chats, team chats, friend
//! requests, team-join requests and system events consistent across REST
//! snapshots, optimistic local writes and push events arriving over a shared
//! event channel.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod channel;
pub mod config;
pub mod model;
pub mod protocol;
pub mod session;
pub mod sync;

pub use api::{HttpApi, SnapshotApi};
pub use channel::{EventChannel, LocalChannel, SubscriptionScope, Topic};
pub use config::{Credential, CredentialStore, Settings};
pub use session::{SessionHydration, ShutdownHandle, SyncSession, SyncTask};
pub use sync::{ConversationStore, Hydration, HydrationReport, NotificationAggregator};

/// Result type alias for Matchsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Matchsync operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never produced a response (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status code
    #[error("HTTP error: status {status}")]
    Http {
        /// HTTP status code
        status: u16,
    },

    /// The response envelope reported `success = false`
    #[error("API error: {message}")]
    Api {
        /// Server supplied message
        message: String,
    },

    /// The response envelope succeeded but carried no data
    #[error("Missing data in response to {0}")]
    MissingData(String),

    /// The caller asked for something the current state does not allow
    #[error("Validation error: {0}")]
    Validation(String),

    /// The referenced conversation, message or request is unknown
    #[error("Not found: {0}")]
    NotFound(String),

    /// Settings could not be read or written
    #[error("Config error: {0}")]
    Config(String),

    /// The stored credential is missing or unreadable
    #[error("Credential error: {0}")]
    Credential(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    ///
    /// Transport failures, server errors and rate limiting are retryable;
    /// validation and envelope-level rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Http { status } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }
}

/// Initialize logging for Matchsync.
///
/// Honors `RUST_LOG`; defaults to `matchsync=info`. Safe to call more than once.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("matchsync=info,warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests;
