//! Core types and traits for gcp-nuke.
//!
//! This crate contains:
//! - The `Resource` capability contract every resource kind implements
//! - The `Registry` of resource kinds and its startup validation
//! - Teardown configuration shared with every kind
//! - Backend error types and transient/fatal classification
//! - Shared helpers for plugins (item cache, operation polling)

pub mod cache;
pub mod config;
pub mod error;
pub mod id;
pub mod poll;
pub mod registry;
pub mod resource;

pub use cache::ItemCache;
pub use config::TeardownConfig;
pub use error::{BackendError, ErrorClass, Result, TransientReason, classify};
pub use id::RunId;
pub use registry::{Registry, RegistryError};
pub use resource::Resource;
