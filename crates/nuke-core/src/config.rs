//! Teardown configuration handed to every resource kind.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::poll::PollConfig;

/// Configuration for one teardown run.
///
/// Built once before the run starts and shared read-only with every kind
/// through `Resource::setup`.
#[derive(Debug, Clone)]
pub struct TeardownConfig {
    /// Project to tear down.
    pub project: String,
    /// Zones of the project, in discovery order.
    pub zones: Vec<String>,
    /// Regions of the project, in discovery order.
    pub regions: Vec<String>,
    /// Upper bound for each blocking wait of a single resource kind.
    pub timeout: Duration,
    /// Delay between consecutive backend re-checks.
    pub poll_interval: Duration,
    /// Report what would be deleted without deleting anything.
    pub dry_run: bool,
    /// Cancelled when the run must stop (operator interrupt or first error).
    pub cancel: CancellationToken,
}

impl TeardownConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(400);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zones: Vec::new(),
            regions: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            dry_run: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_zones(mut self, zones: Vec<String>) -> Self {
        self.zones = zones;
        self
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Polling settings for waiting on a single backend operation.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            timeout: self.timeout,
        }
    }
}
