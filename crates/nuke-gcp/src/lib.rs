//! Google Cloud resource kinds for gcp-nuke.
//!
//! Provides:
//! - A small REST client for the Google Cloud APIs holding deletable resources
//! - Zone and region discovery
//! - One resource kind per deletable collection, registered by `register_all`

pub mod bigquery;
pub mod client;
pub mod compute;
pub mod gke;
pub mod iam;
pub mod location;
pub mod operation;
pub mod peerings;
pub mod pubsub;

pub use bigquery::BigQueryDatasets;
pub use client::{AccessToken, Endpoints, GcpClient};
pub use compute::{COLLECTIONS, CollectionSpec, ComputeCollection};
pub use gke::ContainerGkeClusters;
pub use iam::IamServiceAccounts;
pub use location::{discover_regions, discover_zones};
pub use peerings::ComputeNetworkPeerings;
pub use pubsub::PubSubTopics;

use nuke_core::{BackendError, Registry, RegistryError, TeardownConfig};

/// Register every Google Cloud resource kind.
pub fn register_all(registry: &mut Registry, client: GcpClient) -> Result<(), RegistryError> {
    for spec in COLLECTIONS {
        registry.register(ComputeCollection::new(spec, client.clone()))?;
    }
    registry.register(ComputeNetworkPeerings::new(client.clone()))?;
    registry.register(ContainerGkeClusters::new(client.clone()))?;
    registry.register(PubSubTopics::new(client.clone()))?;
    registry.register(BigQueryDatasets::new(client.clone()))?;
    registry.register(IamServiceAccounts::new(client))?;
    Ok(())
}

/// The configuration bound by `setup`.
pub(crate) fn configured<'a>(
    config: &'a Option<TeardownConfig>,
    kind: &str,
) -> nuke_core::Result<&'a TeardownConfig> {
    config
        .as_ref()
        .ok_or_else(|| BackendError::other(format!("resource kind {kind} used before setup")))
}
