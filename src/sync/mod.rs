//! Synchronization core
//!
//! - `conversations` - direct and team conversations, timelines, optimistic send
//! - `notifications` - friend requests, team-join requests, system events
//! - `generation` - stale hydration discard
//! - `ordering` - timeline ordering helpers
//!
//! Both stores keep their state behind a `std::sync::Mutex` that is never
//! held across an `.await`: every mutation runs to completion before another
//! handler can observe the state, so only the completion order of REST calls
//! can interleave.

pub mod conversations;
pub mod generation;
pub mod notifications;
pub mod ordering;

pub use conversations::{ConversationStore, InboundOutcome, PendingSend};
pub use generation::{Generation, Hydration, KeyedGenerations, Ticket};
pub use notifications::{HydrationReport, MergeOutcome, NotificationAggregator, Section};

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::warn;

/// Lock a store mutex
///
/// A handler that panicked mid-mutation leaves the state as it was at the
/// panic; later events are still applied rather than wedging the channel.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fire a best-effort REST call without waiting for it
///
/// Failures are logged and swallowed. Returns `None` when called outside a
/// tokio runtime, in which case the call is skipped.
pub(crate) fn spawn_best_effort<F>(label: &'static str, call: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = crate::Result<()>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => Some(handle.spawn(async move {
            if let Err(e) = call.await {
                warn!("{} failed (local state kept): {}", label, e);
            }
        })),
        Err(_) => {
            warn!("{} skipped: no async runtime", label);
            None
        }
    }
}
