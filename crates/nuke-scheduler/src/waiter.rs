//! Waiting for a kind's dependencies to drain.

use nuke_core::poll;
use nuke_core::{Registry, RegistryError, Resource, TeardownConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::TeardownError;
use crate::orchestrator::{EventSink, TeardownEvent, cancellable};

/// Block until every dependency of `kind` reports no live items.
///
/// Only cached listings (`list(false)`) of the dependencies are consulted.
/// If any waiting happened, `kind` re-lists itself from the backend before
/// returning, since deletions of its dependencies may have cascaded into it.
///
/// Returns how long the wait took.
pub(crate) async fn wait_for_dependencies(
    registry: &Registry,
    kind: &dyn Resource,
    config: &TeardownConfig,
    cancel: &CancellationToken,
    events: &EventSink,
) -> Result<Duration, TeardownError> {
    let dependencies = kind.dependencies();
    let mut waited = Duration::ZERO;

    while let Some(dependency) = first_blocking(registry, kind.name(), &dependencies).await? {
        if waited > config.timeout {
            return Err(TeardownError::DependencyTimeout {
                resource: kind.name().to_string(),
                dependency,
                waited,
            });
        }

        poll::sleep(config.poll_interval, cancel)
            .await
            .map_err(|_| TeardownError::Cancelled)?;
        waited += config.poll_interval;

        info!(
            kind = %kind.name(),
            dependency = %dependency,
            waited_secs = waited.as_secs(),
            "[Waiting] Waiting for dependency to delete"
        );
        events
            .emit(TeardownEvent::Waiting {
                kind: kind.name().to_string(),
                dependency,
                waited,
            })
            .await;
    }

    if !waited.is_zero() {
        cancellable(cancel, kind.list(true))
            .await?
            .map_err(|source| TeardownError::Listing {
                resource: kind.name().to_string(),
                source,
            })?;
    }

    Ok(waited)
}

/// First dependency, in declaration order, that still has cached items.
async fn first_blocking(
    registry: &Registry,
    kind: &str,
    dependencies: &[String],
) -> Result<Option<String>, TeardownError> {
    for name in dependencies {
        let dependency = registry.get(name).ok_or_else(|| {
            TeardownError::Registry(RegistryError::UnknownDependency {
                kind: kind.to_string(),
                dependency: name.clone(),
            })
        })?;

        let items = dependency
            .list(false)
            .await
            .map_err(|source| TeardownError::Listing {
                resource: name.clone(),
                source,
            })?;

        if !items.is_empty() {
            return Ok(Some(name.clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, FakeKind};

    fn config() -> TeardownConfig {
        TeardownConfig::new("test-project")
            .with_timeout(Duration::from_secs(30))
            .with_poll_interval(Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_immediately_without_blocking_dependencies() {
        let log = CallLog::default();
        let mut registry = Registry::new();
        registry.register(FakeKind::new("A", &[], &log)).unwrap();
        registry
            .register(FakeKind::new("B", &["A"], &log).with_items(&["b-1"]))
            .unwrap();
        let kind = registry.get("B").unwrap();
        kind.list(true).await.unwrap();

        let waited = wait_for_dependencies(
            &registry,
            kind,
            &config(),
            &CancellationToken::new(),
            &EventSink::none(),
        )
        .await
        .unwrap();

        assert!(waited.is_zero());
        // no refresh when nothing was waited for
        assert_eq!(log.count("B.list(true)"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_naming_blocking_dependency() {
        let log = CallLog::default();
        let mut registry = Registry::new();
        registry
            .register(FakeKind::new("A", &[], &log).with_items(&["a-1"]))
            .unwrap();
        registry
            .register(FakeKind::new("B", &["A"], &log).with_items(&["b-1"]))
            .unwrap();
        registry.get("A").unwrap().list(true).await.unwrap();

        let start = tokio::time::Instant::now();
        let err = wait_for_dependencies(
            &registry,
            registry.get("B").unwrap(),
            &config(),
            &CancellationToken::new(),
            &EventSink::none(),
        )
        .await
        .unwrap_err();

        match err {
            TeardownError::DependencyTimeout {
                resource,
                dependency,
                waited,
            } => {
                assert_eq!(resource, "B");
                assert_eq!(dependency, "A");
                assert_eq!(waited, Duration::from_secs(40));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_own_listing_after_waiting() {
        let log = CallLog::default();
        let a = FakeKind::new("A", &[], &log).with_items(&["a-1"]);
        let mut registry = Registry::new();
        registry.register(a.clone()).unwrap();
        registry
            .register(FakeKind::new("B", &["A"], &log).with_items(&["b-1", "b-2"]))
            .unwrap();
        let b = registry.get("B").unwrap();
        a.list(true).await.unwrap();
        b.list(true).await.unwrap();

        let drain = a.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            drain.remove().await.unwrap();
        });

        let waited = wait_for_dependencies(
            &registry,
            b,
            &config(),
            &CancellationToken::new(),
            &EventSink::none(),
        )
        .await
        .unwrap();

        assert_eq!(waited, Duration::from_secs(20));
        assert_eq!(log.count("B.list(true)"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_wait() {
        let log = CallLog::default();
        let mut registry = Registry::new();
        registry
            .register(FakeKind::new("A", &[], &log).with_items(&["a-1"]))
            .unwrap();
        registry
            .register(FakeKind::new("B", &["A"], &log).with_items(&["b-1"]))
            .unwrap();
        registry.get("A").unwrap().list(true).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for_dependencies(
            &registry,
            registry.get("B").unwrap(),
            &config(),
            &cancel,
            &EventSink::none(),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }
}
