//! Teardown errors.

use nuke_core::{BackendError, RegistryError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TeardownError {
    #[error(
        "resource {resource} timed out whilst waiting for dependency {dependency} to delete ({} seconds)",
        .waited.as_secs()
    )]
    DependencyTimeout {
        resource: String,
        dependency: String,
        waited: Duration,
    },

    #[error(
        "resource {resource} timed out whilst trying to delete ({} seconds). Items: {remaining:?}. Last error: {last_error}",
        .waited.as_secs()
    )]
    RemovalTimeout {
        resource: String,
        remaining: Vec<String>,
        waited: Duration,
        #[source]
        last_error: BackendError,
    },

    #[error("resource {resource} failed to delete. Items: {items:?}. Error: {source}")]
    Removal {
        resource: String,
        items: Vec<String>,
        #[source]
        source: BackendError,
    },

    #[error("failed to list resource {resource}: {source}")]
    Listing {
        resource: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("teardown task for resource {resource} aborted: {message}")]
    TaskAborted { resource: String, message: String },

    #[error("teardown cancelled")]
    Cancelled,
}

impl TeardownError {
    /// Name of the resource kind the error is about, if any.
    pub fn resource(&self) -> Option<&str> {
        match self {
            TeardownError::DependencyTimeout { resource, .. }
            | TeardownError::RemovalTimeout { resource, .. }
            | TeardownError::Removal { resource, .. }
            | TeardownError::Listing { resource, .. }
            | TeardownError::TaskAborted { resource, .. } => Some(resource),
            TeardownError::Registry(_) | TeardownError::Cancelled => None,
        }
    }

    /// Items still outstanding when the error was raised.
    pub fn remaining_items(&self) -> &[String] {
        match self {
            TeardownError::RemovalTimeout { remaining, .. } => remaining,
            TeardownError::Removal { items, .. } => items,
            _ => &[],
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TeardownError::DependencyTimeout { .. } | TeardownError::RemovalTimeout { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TeardownError::Cancelled)
    }
}
