//! Durable bearer credential
//!
//! The credential string is the only client state that survives a restart;
//! everything else is rebuilt from REST and the event channel.

use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::path::{Path, PathBuf};

/// Bearer credential issued by the auth service
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// The raw token, as sent in the `Authorization` header
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// User id carried in the token's claims (`sub`, `id` or `userId`)
    ///
    /// Only decodes the claims segment of a JWT; the signature is the server's
    /// concern. Returns `None` for opaque tokens.
    pub fn subject(&self) -> Option<String> {
        let claims = self.0.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(claims.trim_end_matches('=')).ok()?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

        ["sub", "id", "userId"].iter().find_map(|key| match value.get(*key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

// Keep tokens out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// File-backed storage for the credential
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store rooted at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the stored credential, `None` if nothing has been saved
    pub fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Credential(format!("Failed to read credential: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(Credential::new(data)))
    }

    /// Persist a credential, replacing any previous one
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Credential(format!("Failed to create credential directory: {}", e))
                })?;
            }
        }

        std::fs::write(&self.path, credential.as_str())
            .map_err(|e| Error::Credential(format!("Failed to write credential: {}", e)))
    }

    /// Remove the stored credential (logout)
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Credential(format!("Failed to remove credential: {}", e))),
        }
    }
}
