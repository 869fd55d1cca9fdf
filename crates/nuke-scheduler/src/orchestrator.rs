//! Teardown orchestrator - removes every registered resource kind in parallel,
//! each kind waiting for the kinds it depends on.

use chrono::{DateTime, Utc};
use nuke_core::{Registry, Resource, RunId, TeardownConfig, TransientReason};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Barrier, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::TeardownError;
use crate::{retry, waiter};

/// State of a resource kind during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KindState {
    Pending,
    Listed { items: Vec<String> },
    WaitingDependencies { dependencies: Vec<String> },
    Removing { items: Vec<String>, attempt: u32 },
    Retrying { attempt: u32, reason: TransientReason },
    Done(Completion),
    TimedOut { message: String },
    Failed { message: String },
    Cancelled,
}

impl KindState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            KindState::Done(_)
                | KindState::TimedOut { .. }
                | KindState::Failed { .. }
                | KindState::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, KindState::Done(_))
    }

    fn from_error(error: &TeardownError) -> Self {
        if error.is_cancelled() {
            KindState::Cancelled
        } else if error.is_timeout() {
            KindState::TimedOut {
                message: error.to_string(),
            }
        } else {
            KindState::Failed {
                message: error.to_string(),
            }
        }
    }
}

/// How a kind finished successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "completion", rename_all = "snake_case")]
pub enum Completion {
    /// Nothing was listed.
    Empty,
    /// Dry run: these items would have been deleted.
    DryRun { items: Vec<String> },
    /// Items deleted, and how many `remove` calls it took.
    Removed { items: Vec<String>, attempts: u32 },
}

/// Event emitted during teardown.
#[derive(Debug, Clone)]
pub enum TeardownEvent {
    KindState {
        kind: String,
        state: KindState,
    },
    Waiting {
        kind: String,
        dependency: String,
        waited: Duration,
    },
    Retrying {
        kind: String,
        attempt: u32,
        reason: TransientReason,
        items: Vec<String>,
        waited: Duration,
    },
    TeardownCompleted {
        success: bool,
    },
}

/// Result of a teardown run.
#[derive(Debug, Serialize)]
pub struct TeardownReport {
    pub run_id: RunId,
    pub project: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub kinds: BTreeMap<String, KindState>,
    /// First error observed; later errors are only reflected in `kinds`.
    #[serde(serialize_with = "error_message")]
    pub error: Option<TeardownError>,
}

impl TeardownReport {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(mut self) -> Result<Self, TeardownError> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    /// Items a dry run would have deleted, per kind.
    pub fn would_delete(&self) -> BTreeMap<&str, &[String]> {
        self.kinds
            .iter()
            .filter_map(|(kind, state)| match state {
                KindState::Done(Completion::DryRun { items }) => {
                    Some((kind.as_str(), items.as_slice()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

fn error_message<S: Serializer>(
    error: &Option<TeardownError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Optional event channel shared by the per-kind tasks.
#[derive(Clone)]
pub(crate) struct EventSink(Option<mpsc::Sender<TeardownEvent>>);

impl EventSink {
    pub(crate) fn none() -> Self {
        Self(None)
    }

    pub(crate) async fn emit(&self, event: TeardownEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event).await;
        }
    }

    pub(crate) async fn state(&self, kind: &str, state: KindState) {
        self.emit(TeardownEvent::KindState {
            kind: kind.to_string(),
            state,
        })
        .await;
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, TeardownError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TeardownError::Cancelled),
        output = fut => Ok(output),
    }
}

/// Tears down every kind of a registry.
pub struct Teardown {
    registry: Arc<Registry>,
    config: Arc<TeardownConfig>,
    run_id: RunId,
}

impl Teardown {
    /// Validate the registry and set up every kind.
    ///
    /// Fails before any kind is listed if a dependency does not resolve, the
    /// dependency graph has a cycle, or a kind's setup fails.
    pub async fn new(mut registry: Registry, config: TeardownConfig) -> Result<Self, TeardownError> {
        registry.validate()?;
        registry.setup_all(&config).await?;

        Ok(Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            run_id: RunId::new(),
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Start the teardown, returning a channel of events and a handle to get the final report.
    pub fn execute(
        &self,
    ) -> (
        mpsc::Receiver<TeardownEvent>,
        tokio::task::JoinHandle<TeardownReport>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let registry = self.registry.clone();
        let config = self.config.clone();
        let run_id = self.run_id;

        let handle = tokio::spawn(async move {
            Self::execute_inner(registry, config, run_id, EventSink(Some(tx))).await
        });

        (rx, handle)
    }

    /// Run the teardown to completion without publishing events.
    pub async fn run(&self) -> TeardownReport {
        Self::execute_inner(
            self.registry.clone(),
            self.config.clone(),
            self.run_id,
            EventSink::none(),
        )
        .await
    }

    async fn execute_inner(
        registry: Arc<Registry>,
        config: Arc<TeardownConfig>,
        run_id: RunId,
        events: EventSink,
    ) -> TeardownReport {
        let started_at = Utc::now();
        let names = registry.names();
        let mut kinds: BTreeMap<String, KindState> = names
            .iter()
            .map(|name| (name.clone(), KindState::Pending))
            .collect();

        info!(
            run_id = %run_id,
            project = %config.project,
            kinds = names.len(),
            dry_run = config.dry_run,
            timeout_secs = config.timeout.as_secs(),
            poll_interval_secs = config.poll_interval.as_secs(),
            "Starting teardown"
        );

        // first failure stops the siblings without cancelling the caller's token
        let cancel = config.cancel.child_token();
        let listed = Arc::new(Barrier::new(names.len()));
        let mut tasks = JoinSet::new();
        let mut task_names = HashMap::new();

        for name in names {
            let registry = registry.clone();
            let config = config.clone();
            let cancel = cancel.clone();
            let listed = listed.clone();
            let events = events.clone();
            let kind_name = name.clone();

            let handle = tasks.spawn(async move {
                teardown_kind(&registry, &kind_name, &config, &cancel, &listed, &events).await
            });
            task_names.insert(handle.id(), name);
        }

        let mut first_error: Option<TeardownError> = None;

        while let Some(joined) = tasks.join_next_with_id().await {
            let (name, result) = match joined {
                Ok((id, result)) => (task_names.remove(&id).unwrap_or_default(), result),
                Err(e) => {
                    let name = task_names.remove(&e.id()).unwrap_or_default();
                    let error = TeardownError::TaskAborted {
                        resource: name.clone(),
                        message: e.to_string(),
                    };
                    (name, Err(error))
                }
            };

            let state = match result {
                Ok(completion) => KindState::Done(completion),
                Err(e) => {
                    let state = KindState::from_error(&e);
                    // a sibling may observe the cancellation before the cause is joined
                    let first = match &first_error {
                        None => true,
                        Some(first) => first.is_cancelled() && !e.is_cancelled(),
                    };
                    if first {
                        if !e.is_cancelled() {
                            error!(kind = %name, error = %e, "[Error] Teardown failed, stopping remaining kinds");
                        }
                        cancel.cancel();
                        first_error = Some(e);
                    }
                    state
                }
            };

            events.state(&name, state.clone()).await;
            kinds.insert(name, state);
        }

        let success = first_error.is_none();
        match &first_error {
            None => info!(
                run_id = %run_id,
                project = %config.project,
                dry_run = config.dry_run,
                "-- Teardown complete --"
            ),
            Some(e) if e.is_cancelled() => warn!(run_id = %run_id, "Teardown cancelled"),
            Some(e) => error!(run_id = %run_id, error = %e, "Teardown failed"),
        }
        events
            .emit(TeardownEvent::TeardownCompleted { success })
            .await;

        TeardownReport {
            run_id,
            project: config.project.clone(),
            dry_run: config.dry_run,
            started_at,
            finished_at: Utc::now(),
            kinds,
            error: first_error,
        }
    }
}

/// Tear down a single kind.
async fn teardown_kind(
    registry: &Registry,
    name: &str,
    config: &TeardownConfig,
    cancel: &CancellationToken,
    listed: &Barrier,
    events: &EventSink,
) -> Result<Completion, TeardownError> {
    let (kind, items) = match list_kind(registry, name, cancel).await {
        Ok(listing) => listing,
        Err(e) => {
            // an unlisted cache reads as empty, so dependents must not go on
            cancel.cancel();
            return Err(e);
        }
    };

    // no kind may judge a dependency empty before that dependency listed itself
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TeardownError::Cancelled),
        _ = listed.wait() => {}
    }

    events
        .state(
            name,
            KindState::Listed {
                items: items.clone(),
            },
        )
        .await;

    if items.is_empty() {
        info!(kind = %name, "[Skipping] No items to delete");
        return Ok(Completion::Empty);
    }

    if config.dry_run {
        info!(
            kind = %name,
            project = %config.project,
            items = ?items,
            "[Dryrun] Items would be destroyed"
        );
        return Ok(Completion::DryRun { items });
    }

    let dependencies = kind.dependencies();
    if !dependencies.is_empty() {
        events
            .state(name, KindState::WaitingDependencies { dependencies })
            .await;
    }
    waiter::wait_for_dependencies(registry, kind, config, cancel, events).await?;

    let removed = retry::remove_with_retry(kind, config, cancel, events).await?;
    info!(
        kind = %name,
        items = removed.items.len(),
        attempts = removed.attempts,
        "[Done] Deleted all items"
    );
    Ok(Completion::Removed {
        items: removed.items,
        attempts: removed.attempts,
    })
}

async fn list_kind<'a>(
    registry: &'a Registry,
    name: &str,
    cancel: &CancellationToken,
) -> Result<(&'a dyn Resource, Vec<String>), TeardownError> {
    let kind = registry
        .get(name)
        .ok_or_else(|| TeardownError::TaskAborted {
            resource: name.to_string(),
            message: "kind is not registered".to_string(),
        })?;

    info!(kind = %name, "[Info] Retrieving list of resources");
    let items = cancellable(cancel, kind.list(true))
        .await?
        .map_err(|source| TeardownError::Listing {
            resource: name.to_string(),
            source,
        })?;
    Ok((kind, items))
}
