//! Removal with retries on transient backend errors.
//!
//! The delete APIs are not immediately consistent: a delete can be refused
//! because something still references the target, because the target is not
//! ready, or because the item listed is already gone. Those errors are retried
//! until they clear or the timeout runs out; everything else fails at once.

use nuke_core::{ErrorClass, Resource, TeardownConfig, classify, poll};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::TeardownError;
use crate::orchestrator::{EventSink, KindState, TeardownEvent, cancellable};

/// Outcome of a successful removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Removed {
    /// Items cached when removal started.
    pub items: Vec<String>,
    /// Number of `remove` calls made.
    pub attempts: u32,
}

pub(crate) async fn remove_with_retry(
    kind: &dyn Resource,
    config: &TeardownConfig,
    cancel: &CancellationToken,
    events: &EventSink,
) -> Result<Removed, TeardownError> {
    let name = kind.name();
    let items = cached(kind).await?;
    let mut waited = Duration::ZERO;
    let mut attempts = 1;

    info!(kind = %name, items = ?items, "[Remove] Removing items");
    events
        .state(
            name,
            KindState::Removing {
                items: items.clone(),
                attempt: attempts,
            },
        )
        .await;

    let mut result = cancellable(cancel, kind.remove()).await?;

    loop {
        let error = match result {
            Ok(()) => return Ok(Removed { items, attempts }),
            Err(error) => error,
        };

        if error.is_cancelled() {
            return Err(TeardownError::Cancelled);
        }

        let reason = match classify(&error) {
            ErrorClass::Transient(reason) => reason,
            ErrorClass::Fatal => {
                let items = match kind.list(false).await {
                    Ok(items) => items,
                    Err(list_error) => {
                        warn!(
                            kind = %name,
                            error = %list_error,
                            "Could not read remaining items after a failed removal"
                        );
                        Vec::new()
                    }
                };
                return Err(TeardownError::Removal {
                    resource: name.to_string(),
                    items,
                    source: error,
                });
            }
        };

        // pick up side effects of other kinds' deletions
        cancellable(cancel, kind.list(true))
            .await?
            .map_err(|source| TeardownError::Listing {
                resource: name.to_string(),
                source,
            })?;

        if waited > config.timeout {
            return Err(TeardownError::RemovalTimeout {
                resource: name.to_string(),
                remaining: cached(kind).await?,
                waited,
                last_error: error,
            });
        }

        let remaining = cached(kind).await?;
        warn!(
            kind = %name,
            items = ?remaining,
            reason = ?reason,
            waited_secs = waited.as_secs(),
            error = %error,
            "[Remove] Resource in use, waiting before retrying delete"
        );
        events
            .emit(TeardownEvent::Retrying {
                kind: name.to_string(),
                attempt: attempts,
                reason,
                items: remaining.clone(),
                waited,
            })
            .await;
        events
            .state(name, KindState::Retrying { attempt: attempts, reason })
            .await;

        poll::sleep(config.poll_interval, cancel)
            .await
            .map_err(|_| TeardownError::Cancelled)?;
        waited += config.poll_interval;
        attempts += 1;

        events
            .state(
                name,
                KindState::Removing {
                    items: remaining,
                    attempt: attempts,
                },
            )
            .await;
        result = cancellable(cancel, kind.remove()).await?;
    }
}

async fn cached(kind: &dyn Resource) -> Result<Vec<String>, TeardownError> {
    kind.list(false)
        .await
        .map_err(|source| TeardownError::Listing {
            resource: kind.name().to_string(),
            source,
        })
}
