//! The capability contract every resource kind implements.
//!
//! A resource kind is a category of cloud object (compute instances, networks,
//! clusters, ...) with its own listing and removal logic. Kinds keep a cache of
//! the live items they know about; the orchestrator drives them through
//! `setup`, `list`, `dependencies` and `remove`.

use async_trait::async_trait;

use crate::{Result, TeardownConfig};

/// Trait for resource kinds.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Unique, stable name of this kind. Used as registry key and as the
    /// node id in the dependency graph.
    fn name(&self) -> &str;

    /// Bind the run configuration. Called exactly once, before any other
    /// method, and must not delete anything.
    async fn setup(&mut self, config: &TeardownConfig) -> Result<()>;

    /// Return the identifiers of live items, sorted.
    ///
    /// With `refresh == false` this returns the cache without contacting the
    /// backend. With `refresh == true` the backend is queried and the cache
    /// replaced.
    async fn list(&self, refresh: bool) -> Result<Vec<String>>;

    /// Names of kinds that must have no live items before `remove` runs.
    fn dependencies(&self) -> Vec<String>;

    /// Delete every cached item. Leaves the cache empty on success; with an
    /// empty cache this succeeds without touching the backend.
    async fn remove(&self) -> Result<()>;
}
