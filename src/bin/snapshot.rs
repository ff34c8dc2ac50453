//! Matchsync snapshot tool
//!
//! Loads settings and the stored credential, hydrates every store once over
//! HTTP and logs what came back.
//!
//! Usage: `matchsync-snapshot [--config <path>]`

use anyhow::{Context, bail};
use matchsync::model::UserRef;
use matchsync::{ConversationStore, CredentialStore, HttpApi, NotificationAggregator, Settings};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "matchsync.json";

fn config_path() -> anyhow::Result<String> {
    let mut args = std::env::args().skip(1);
    let mut path = DEFAULT_CONFIG.to_string();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                path = args.next().context("--config needs a path")?;
            }
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    matchsync::init();

    let path = config_path()?;
    let settings = Settings::load(&path).with_context(|| format!("loading {}", path))?;

    let credential = CredentialStore::new(&settings.credential_path)
        .load()
        .context("loading credential")?
        .context("no credential stored; sign in first")?;

    let self_id = settings
        .self_user_id
        .clone()
        .or_else(|| credential.subject())
        .context("cannot determine the viewer's user id (set self_user_id)")?;

    let api = Arc::new(HttpApi::new(&settings, Some(credential))?);
    info!("Hydrating from {} as {}", api.base_url(), self_id);

    let conversations = ConversationStore::new(api.clone(), UserRef::new(self_id), &settings);
    let notifications = NotificationAggregator::new(api);

    let (hydrated, report) = tokio::join!(
        conversations.hydrate_conversations(),
        notifications.hydrate_all(),
    );
    hydrated.context("hydrating conversations")?;
    for (section, e) in &report.failures {
        warn!("{} unavailable: {}", section, e);
    }

    for conversation in conversations.conversations() {
        info!(
            "{:<24} {:>3} unread  {}",
            conversation.title(),
            conversation.unread_count,
            conversation
                .last_message
                .as_ref()
                .map_or("", |m| m.content.as_str())
        );
    }
    info!(
        "{} conversations, {} unread messages, notification badge {}",
        conversations.conversations().len(),
        conversations.total_unread(),
        notifications.compute_unread_badge()
    );

    Ok(())
}
