//! VPC network peerings.

use async_trait::async_trait;
use futures::future::join_all;
use nuke_core::{ItemCache, Resource, Result, TeardownConfig};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::compute::{COMPUTE_INSTANCE_REGION_GROUPS, COMPUTE_INSTANCE_ZONE_GROUPS};
use crate::gke::CONTAINER_GKE_CLUSTERS;
use crate::operation::{self, Operation};
use crate::{GcpClient, configured};

pub const COMPUTE_NETWORK_PEERINGS: &str = "ComputeNetworkPeerings";

#[derive(Debug, Deserialize)]
struct Network {
    name: String,
    #[serde(default)]
    peerings: Vec<Peering>,
}

#[derive(Debug, Deserialize)]
struct Peering {
    name: String,
}

/// Peering identifiers are `{network}/{peering}`; the network is kept as metadata.
fn peering_items(networks: Vec<Network>) -> Vec<(String, String)> {
    networks
        .into_iter()
        .flat_map(|network| {
            let name = network.name;
            network
                .peerings
                .into_iter()
                .map(move |p| (format!("{name}/{}", p.name), name.clone()))
        })
        .collect()
}

/// Peerings of every network in the project, removed with `removePeering`.
pub struct ComputeNetworkPeerings {
    client: GcpClient,
    config: Option<TeardownConfig>,
    cache: ItemCache<String>,
}

impl ComputeNetworkPeerings {
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            config: None,
            cache: ItemCache::new(),
        }
    }

    async fn remove_peering(&self, config: &TeardownConfig, key: String, network: String) -> Result<()> {
        let peering = key.rsplit('/').next().unwrap_or(&key);
        info!(
            kind = COMPUTE_NETWORK_PEERINGS,
            item = %key,
            project = %config.project,
            "[Info] Resource currently being deleted"
        );

        let url = self
            .client
            .compute_url(&config.project, &format!("global/networks/{network}/removePeering"));
        let operation: Operation = self.client.post(&url, &json!({ "name": peering })).await?;
        operation::wait(&self.client, config, &key, operation).await?;

        self.cache.remove(&key);
        info!(kind = COMPUTE_NETWORK_PEERINGS, item = %key, "[Info] Resource deleted");
        Ok(())
    }
}

#[async_trait]
impl Resource for ComputeNetworkPeerings {
    fn name(&self) -> &str {
        COMPUTE_NETWORK_PEERINGS
    }

    async fn setup(&mut self, config: &TeardownConfig) -> Result<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    async fn list(&self, refresh: bool) -> Result<Vec<String>> {
        if !refresh {
            return Ok(self.cache.names());
        }
        let config = configured(&self.config, COMPUTE_NETWORK_PEERINGS)?;
        let networks: Vec<Network> = self
            .client
            .list_all(&self.client.compute_url(&config.project, "global/networks"), "items")
            .await?;
        Ok(self.cache.replace(peering_items(networks)))
    }

    fn dependencies(&self) -> Vec<String> {
        vec![
            COMPUTE_INSTANCE_REGION_GROUPS.to_string(),
            COMPUTE_INSTANCE_ZONE_GROUPS.to_string(),
            CONTAINER_GKE_CLUSTERS.to_string(),
        ]
    }

    async fn remove(&self) -> Result<()> {
        let entries = self.cache.entries();
        if entries.is_empty() {
            return Ok(());
        }
        let config = configured(&self.config, COMPUTE_NETWORK_PEERINGS)?;

        join_all(
            entries
                .into_iter()
                .map(|(key, network)| self.remove_peering(config, key, network)),
        )
        .await
        .into_iter()
        .collect()
    }
}
