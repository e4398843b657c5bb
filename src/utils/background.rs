//! Detached background work
//!
//! Side effects the caller must not wait for (persisting rotation state,
//! hydrating it at startup) run through [`spawn_observed`]: the future is
//! spawned on the current Tokio runtime and its outcome is only logged.

use std::fmt::Display;
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Spawn `future` detached; log its error, never propagate it.
///
/// Returns `None` (and logs) when called outside a Tokio runtime, in which
/// case the work is dropped. The handle is only for tests and shutdown code;
/// request paths ignore it.
pub fn spawn_observed<F, T, E>(operation: &'static str, future: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            tracing::warn!(operation, "No Tokio runtime, skipping background task");
            return None;
        }
    };

    Some(handle.spawn(async move {
        match future.await {
            Ok(_) => tracing::trace!(operation, "Background task completed"),
            Err(e) => tracing::warn!(operation, error = %e, "Background task failed"),
        }
    }))
}
