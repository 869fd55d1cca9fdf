//! Zone and region discovery.

use nuke_core::Result;
use serde::Deserialize;
use tracing::info;

use crate::GcpClient;
use crate::client::last_segment;

#[derive(Debug, Deserialize)]
struct Location {
    name: String,
}

/// Names of the zones available to `project`.
pub async fn discover_zones(client: &GcpClient, project: &str) -> Result<Vec<String>> {
    info!(project = %project, "[Info] Retrieving zones");
    let zones: Vec<Location> = client
        .list_all(&client.compute_url(project, "zones"), "items")
        .await?;
    Ok(names(zones))
}

/// Names of the regions available to `project`.
pub async fn discover_regions(client: &GcpClient, project: &str) -> Result<Vec<String>> {
    info!(project = %project, "[Info] Retrieving regions");
    let regions: Vec<Location> = client
        .list_all(&client.compute_url(project, "regions"), "items")
        .await?;
    Ok(names(regions))
}

fn names(locations: Vec<Location>) -> Vec<String> {
    locations
        .into_iter()
        .map(|l| last_segment(&l.name).to_string())
        .collect()
}
