//! Fixed-interval polling with timeout and cancellation support.
//!
//! Deleting a cloud resource usually starts a long-running operation that
//! has to be polled until it reports completion. Every resource kind goes
//! through `poll_until` for that, so interval, timeout and cancellation
//! behave the same across kinds.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{BackendError, Result};

/// How often to re-check, and for how long.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Result of a single status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending,
}

/// Sleep for `duration` unless `cancel` fires first.
pub async fn sleep(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(BackendError::Cancelled),
    }
}

/// Run `check` until it reports `Ready`, sleeping one interval between checks.
///
/// Fails with `BackendError::Timeout` once the accumulated wait exceeds the
/// timeout, with `BackendError::Cancelled` when `cancel` fires, and with the
/// check's own error as soon as it returns one.
pub async fn poll_until<F, Fut, T>(
    config: PollConfig,
    cancel: &CancellationToken,
    item: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    let mut waited = Duration::ZERO;

    loop {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        if let PollStatus::Ready(value) = check().await? {
            debug!(item = %item, waited_secs = waited.as_secs(), "Operation complete");
            return Ok(value);
        }

        if waited > config.timeout {
            return Err(BackendError::Timeout {
                item: item.to_string(),
                waited,
            });
        }

        debug!(item = %item, waited_secs = waited.as_secs(), "Operation still running");
        sleep(config.interval, cancel).await?;
        waited += config.interval;
    }
}
