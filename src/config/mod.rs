//! Configuration module
//!
//! - `settings` - client settings loaded from JSON
//! - `credential` - the persisted bearer credential

pub mod credential;
pub mod settings;

pub use credential::{Credential, CredentialStore};
pub use settings::Settings;
