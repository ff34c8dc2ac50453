//! User and team references carried by messages and requests

use serde::{Deserialize, Serialize};

/// Identifier used when a payload names no sender
pub const UNKNOWN_USER_ID: &str = "unknown";

/// A user as seen by the client: identity plus display attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User ID
    pub id: String,
    /// Display name, if the payload carried one
    #[serde(default)]
    pub display_name: Option<String>,
    /// Avatar URL, if the payload carried one
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl UserRef {
    /// A user known only by id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    /// Attach a display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Placeholder for a missing or malformed sender
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_USER_ID)
    }

    /// Whether this is the placeholder sender
    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_USER_ID
    }

    /// Name to render: display name when present, otherwise the id
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// A team as referenced by a join request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    /// Team ID
    pub id: String,
    /// Team name
    #[serde(default)]
    pub name: Option<String>,
}
