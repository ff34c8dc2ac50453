//! Client settings

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client settings
///
/// Stored in JSON format. Every field has a default, so a partial or missing
/// file still yields usable settings.
///
/// # Example
/// ```rust,no_run
/// use matchsync::Settings;
///
/// let settings = Settings::load("matchsync.json").expect("Failed to load");
/// println!("API: {}", settings.api_base_url);
/// println!("Page size: {}", settings.page_size);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the REST API (no trailing slash)
    pub api_base_url: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Number of messages fetched per timeline page
    pub page_size: u32,
    /// How far apart an optimistic entry and a self-sent echo may be and still match
    pub echo_match_window_ms: i64,
    /// Where the bearer credential is persisted
    pub credential_path: String,
    /// Viewer's user id; derived from the credential when absent
    pub self_user_id: Option<String>,
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// # Returns
    /// The loaded settings, or default settings if the file doesn't exist or is empty
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse settings: {}", e)))?;
        settings.normalize();

        Ok(settings)
    }

    /// Save settings to a JSON file, creating the parent directory if needed
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("Failed to create settings directory: {}", e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| Error::Config(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Echo match window as a chrono `Duration`
    pub fn echo_match_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.echo_match_window_ms)
    }

    // Zero page size would make pagination loop forever.
    fn normalize(&mut self) {
        while self.api_base_url.ends_with('/') {
            self.api_base_url.pop();
        }
        if self.page_size == 0 {
            self.page_size = Self::default().page_size;
        }
        if self.echo_match_window_ms < 0 {
            self.echo_match_window_ms = 0;
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            request_timeout_ms: 10_000,
            page_size: 50,
            echo_match_window_ms: 60_000,
            credential_path: "./data/credential".to_string(),
            self_user_id: None,
        }
    }
}
