//! GKE clusters.

use async_trait::async_trait;
use futures::future::join_all;
use nuke_core::{ItemCache, Resource, Result, TeardownConfig};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::client::is_service_disabled;
use crate::operation::{self, Operation};
use crate::{GcpClient, configured};

pub const CONTAINER_GKE_CLUSTERS: &str = "ContainerGKEClusters";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cluster {
    name: String,
    location: String,
    #[serde(default)]
    node_pools: Vec<NodePool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodePool {
    #[serde(default)]
    instance_group_urls: Vec<String>,
}

impl Cluster {
    /// Full resource name, `projects/{project}/locations/{location}/clusters/{name}`.
    fn resource_name(&self, project: &str) -> String {
        format!(
            "projects/{project}/locations/{}/clusters/{}",
            self.location, self.name
        )
    }
}

async fn list_clusters(client: &GcpClient, project: &str) -> Result<Vec<Cluster>> {
    let url = client.container_url(&format!("projects/{project}/locations/-/clusters"));
    match client.list_all(&url, "clusters").await {
        Ok(clusters) => Ok(clusters),
        Err(e) if is_service_disabled(&e) => {
            warn!(project = %project, "Kubernetes Engine API is disabled, no clusters to delete");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Names of the instance group managers backing GKE node pools.
pub(crate) async fn node_pool_groups(client: &GcpClient, project: &str) -> Result<HashSet<String>> {
    let clusters = list_clusters(client, project).await?;
    Ok(group_names(&clusters))
}

fn group_names(clusters: &[Cluster]) -> HashSet<String> {
    clusters
        .iter()
        .flat_map(|c| c.node_pools.iter())
        .flat_map(|p| p.instance_group_urls.iter())
        .filter_map(|url| url.split("/instanceGroupManagers/").nth(1))
        .map(str::to_string)
        .collect()
}

/// GKE clusters in every location of the project.
pub struct ContainerGkeClusters {
    client: GcpClient,
    config: Option<TeardownConfig>,
    cache: ItemCache<()>,
}

impl ContainerGkeClusters {
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            config: None,
            cache: ItemCache::new(),
        }
    }

    async fn delete_cluster(&self, config: &TeardownConfig, cluster: String) -> Result<()> {
        info!(
            kind = CONTAINER_GKE_CLUSTERS,
            item = %cluster,
            project = %config.project,
            "[Info] Resource currently being deleted"
        );
        let operation: Operation = self
            .client
            .delete(&self.client.container_url(&cluster))
            .await?;
        operation::wait(&self.client, config, &cluster, operation).await?;

        self.cache.remove(&cluster);
        info!(kind = CONTAINER_GKE_CLUSTERS, item = %cluster, "[Info] Resource deleted");
        Ok(())
    }
}

#[async_trait]
impl Resource for ContainerGkeClusters {
    fn name(&self) -> &str {
        CONTAINER_GKE_CLUSTERS
    }

    async fn setup(&mut self, config: &TeardownConfig) -> Result<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    async fn list(&self, refresh: bool) -> Result<Vec<String>> {
        if !refresh {
            return Ok(self.cache.names());
        }
        let config = configured(&self.config, CONTAINER_GKE_CLUSTERS)?;
        let clusters = list_clusters(&self.client, &config.project).await?;
        Ok(self.cache.replace(
            clusters
                .iter()
                .map(|c| (c.resource_name(&config.project), ())),
        ))
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn remove(&self) -> Result<()> {
        let clusters = self.cache.names();
        if clusters.is_empty() {
            return Ok(());
        }
        let config = configured(&self.config, CONTAINER_GKE_CLUSTERS)?;

        join_all(clusters.into_iter().map(|c| self.delete_cluster(config, c)))
            .await
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster() -> Cluster {
        serde_json::from_value(json!({
            "name": "prod",
            "location": "europe-west1",
            "selfLink": "https://container.googleapis.com/v1/projects/p/locations/europe-west1/clusters/prod",
            "nodePools": [
                {
                    "name": "default-pool",
                    "instanceGroupUrls": [
                        "https://www.googleapis.com/compute/v1/projects/p/zones/europe-west1-b/instanceGroupManagers/gke-prod-default-pool-1a2b-grp",
                        "https://www.googleapis.com/compute/v1/projects/p/zones/europe-west1-c/instanceGroupManagers/gke-prod-default-pool-3c4d-grp"
                    ]
                },
                {"name": "empty-pool"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(
            cluster().resource_name("p"),
            "projects/p/locations/europe-west1/clusters/prod"
        );
    }

    #[test]
    fn test_node_pool_group_names() {
        let names = group_names(&[cluster()]);
        assert_eq!(names.len(), 2);
        assert!(names.contains("gke-prod-default-pool-1a2b-grp"));
        assert!(names.contains("gke-prod-default-pool-3c4d-grp"));
    }
}
