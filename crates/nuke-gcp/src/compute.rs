//! Compute Engine resource kinds.
//!
//! Most compute collections behave the same way: list per zone, per region
//! or globally, delete each item, wait for the returned operation. Each kind
//! is described by a `CollectionSpec`; the few differences between kinds
//! (items to leave alone, work before the delete call) are spelled out in it.

use async_trait::async_trait;
use futures::future::join_all;
use nuke_core::{BackendError, ItemCache, Resource, Result, TeardownConfig};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::client::last_segment;
use crate::operation::{self, Operation};
use crate::{GcpClient, configured, gke};

/// Where the items of a collection live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Zonal,
    Regional,
    Global,
}

/// Listed items that are not deleted directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    None,
    /// Instances created by an instance group manager go with their group.
    GroupManagedInstances,
    /// Disks attached to an instance go with the instance.
    AttachedDisks,
    /// Instance groups of GKE node pools go with their cluster.
    GkeNodePools,
    /// Subnetworks of auto-mode networks go with their network.
    AutoModeSubnets,
}

/// Work done on an item before its delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreDelete {
    None,
    /// Mark every attached disk auto-delete so it goes with the instance.
    DiskAutoDelete,
}

/// Description of one compute collection.
#[derive(Debug)]
pub struct CollectionSpec {
    pub kind: &'static str,
    /// REST collection name, e.g. `instanceGroupManagers`.
    pub collection: &'static str,
    pub scope: Scope,
    pub dependencies: &'static [&'static str],
    pub filter: Filter,
    pub pre_delete: PreDelete,
}

const fn spec(
    kind: &'static str,
    collection: &'static str,
    scope: Scope,
    dependencies: &'static [&'static str],
) -> CollectionSpec {
    CollectionSpec {
        kind,
        collection,
        scope,
        dependencies,
        filter: Filter::None,
        pre_delete: PreDelete::None,
    }
}

pub const COMPUTE_INSTANCES: &str = "ComputeInstances";
pub const COMPUTE_DISKS: &str = "ComputeDisks";
pub const COMPUTE_ZONE_AUTOSCALERS: &str = "ComputeZoneAutoScalers";
pub const COMPUTE_REGION_AUTOSCALERS: &str = "ComputeRegionAutoScalers";
pub const COMPUTE_INSTANCE_ZONE_GROUPS: &str = "ComputeInstanceZoneGroups";
pub const COMPUTE_INSTANCE_REGION_GROUPS: &str = "ComputeInstanceRegionGroups";
pub const COMPUTE_INSTANCE_TEMPLATES: &str = "ComputeInstanceTemplates";
pub const COMPUTE_FIREWALLS: &str = "ComputeFirewalls";
pub const COMPUTE_VPN_TUNNELS: &str = "ComputeVPNTunnels";
pub const COMPUTE_VPN_GATEWAYS: &str = "ComputeVPNGateways";
pub const COMPUTE_ROUTERS: &str = "ComputeRouters";
pub const COMPUTE_SUBNETWORKS: &str = "ComputeSubnetworks";
pub const COMPUTE_NETWORKS: &str = "ComputeNetworks";

/// Every generic compute collection.
pub const COLLECTIONS: &[CollectionSpec] = &[
    CollectionSpec {
        filter: Filter::GroupManagedInstances,
        pre_delete: PreDelete::DiskAutoDelete,
        ..spec(COMPUTE_INSTANCES, "instances", Scope::Zonal, &[])
    },
    CollectionSpec {
        filter: Filter::AttachedDisks,
        ..spec(COMPUTE_DISKS, "disks", Scope::Zonal, &[COMPUTE_INSTANCES])
    },
    spec(COMPUTE_ZONE_AUTOSCALERS, "autoscalers", Scope::Zonal, &[]),
    spec(COMPUTE_REGION_AUTOSCALERS, "autoscalers", Scope::Regional, &[]),
    CollectionSpec {
        filter: Filter::GkeNodePools,
        ..spec(
            COMPUTE_INSTANCE_ZONE_GROUPS,
            "instanceGroupManagers",
            Scope::Zonal,
            &[COMPUTE_ZONE_AUTOSCALERS, gke::CONTAINER_GKE_CLUSTERS],
        )
    },
    spec(
        COMPUTE_INSTANCE_REGION_GROUPS,
        "instanceGroupManagers",
        Scope::Regional,
        &[COMPUTE_REGION_AUTOSCALERS],
    ),
    spec(
        COMPUTE_INSTANCE_TEMPLATES,
        "instanceTemplates",
        Scope::Global,
        &[COMPUTE_INSTANCE_REGION_GROUPS, COMPUTE_INSTANCE_ZONE_GROUPS],
    ),
    spec(
        COMPUTE_FIREWALLS,
        "firewalls",
        Scope::Global,
        &[
            COMPUTE_INSTANCE_REGION_GROUPS,
            COMPUTE_INSTANCE_ZONE_GROUPS,
            gke::CONTAINER_GKE_CLUSTERS,
        ],
    ),
    spec(COMPUTE_VPN_TUNNELS, "vpnTunnels", Scope::Regional, &[]),
    spec(
        COMPUTE_VPN_GATEWAYS,
        "vpnGateways",
        Scope::Regional,
        &[COMPUTE_VPN_TUNNELS],
    ),
    spec(
        COMPUTE_ROUTERS,
        "routers",
        Scope::Regional,
        &[COMPUTE_VPN_TUNNELS, COMPUTE_VPN_GATEWAYS],
    ),
    CollectionSpec {
        filter: Filter::AutoModeSubnets,
        ..spec(
            COMPUTE_SUBNETWORKS,
            "subnetworks",
            Scope::Regional,
            &[
                COMPUTE_INSTANCES,
                COMPUTE_INSTANCE_REGION_GROUPS,
                COMPUTE_INSTANCE_ZONE_GROUPS,
                gke::CONTAINER_GKE_CLUSTERS,
                COMPUTE_ROUTERS,
            ],
        )
    },
    spec(
        COMPUTE_NETWORKS,
        "networks",
        Scope::Global,
        &[
            COMPUTE_SUBNETWORKS,
            COMPUTE_FIREWALLS,
            crate::peerings::COMPUTE_NETWORK_PEERINGS,
            COMPUTE_ROUTERS,
        ],
    ),
];

impl Filter {
    /// Whether `item` is left alone. `names` holds the names collected for
    /// filters that need a lookup elsewhere.
    fn skips(self, item: &Value, names: &HashSet<String>) -> bool {
        match self {
            Filter::None => false,
            Filter::GroupManagedInstances => item
                .pointer("/metadata/items")
                .and_then(Value::as_array)
                .is_some_and(|entries| {
                    entries.iter().any(|entry| {
                        entry.get("key").and_then(Value::as_str) == Some("created-by")
                            && entry
                                .get("value")
                                .and_then(Value::as_str)
                                .is_some_and(|v| v.contains("/instanceGroupManagers/"))
                    })
                }),
            Filter::AttachedDisks => item
                .get("users")
                .and_then(Value::as_array)
                .is_some_and(|users| !users.is_empty()),
            Filter::GkeNodePools => item
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| names.contains(name)),
            Filter::AutoModeSubnets => item
                .get("network")
                .and_then(Value::as_str)
                .is_some_and(|network| names.contains(last_segment(network))),
        }
    }
}

/// Zone or region of a cached item; `None` for global items.
#[derive(Debug, Clone)]
struct Item {
    name: String,
    location: Option<String>,
}

/// A compute collection as a resource kind.
pub struct ComputeCollection {
    spec: &'static CollectionSpec,
    client: GcpClient,
    config: Option<TeardownConfig>,
    cache: ItemCache<Item>,
}

impl ComputeCollection {
    pub fn new(spec: &'static CollectionSpec, client: GcpClient) -> Self {
        Self {
            spec,
            client,
            config: None,
            cache: ItemCache::new(),
        }
    }

    fn locations(&self, config: &TeardownConfig) -> Vec<Option<String>> {
        match self.spec.scope {
            Scope::Zonal => config.zones.iter().cloned().map(Some).collect(),
            Scope::Regional => config.regions.iter().cloned().map(Some).collect(),
            Scope::Global => vec![None],
        }
    }

    fn collection_url(&self, project: &str, location: Option<&str>) -> String {
        let path = match (self.spec.scope, location) {
            (Scope::Zonal, Some(zone)) => format!("zones/{zone}/{}", self.spec.collection),
            (Scope::Regional, Some(region)) => format!("regions/{region}/{}", self.spec.collection),
            _ => format!("global/{}", self.spec.collection),
        };
        self.client.compute_url(project, &path)
    }

    fn item_url(&self, project: &str, item: &Item) -> String {
        format!(
            "{}/{}",
            self.collection_url(project, item.location.as_deref()),
            item.name
        )
    }

    fn cache_key(name: &str, location: Option<&str>) -> String {
        match location {
            Some(location) => format!("{location}/{name}"),
            None => name.to_string(),
        }
    }

    /// Names the filter needs to look up, fetched fresh on every listing.
    async fn filter_names(&self, config: &TeardownConfig) -> Result<HashSet<String>> {
        match self.spec.filter {
            Filter::GkeNodePools => gke::node_pool_groups(&self.client, &config.project).await,
            Filter::AutoModeSubnets => auto_mode_networks(&self.client, &config.project).await,
            _ => Ok(HashSet::new()),
        }
    }

    async fn delete_item(&self, config: &TeardownConfig, key: String, item: Item) -> Result<()> {
        let url = self.item_url(&config.project, &item);

        if self.spec.pre_delete == PreDelete::DiskAutoDelete {
            self.set_disk_auto_delete(config, &key, &url).await?;
        }

        info!(
            kind = %self.spec.kind,
            item = %key,
            project = %config.project,
            "[Info] Resource currently being deleted"
        );
        let operation: Operation = self.client.delete(&url).await?;
        operation::wait(&self.client, config, &key, operation).await?;

        self.cache.remove(&key);
        info!(kind = %self.spec.kind, item = %key, project = %config.project, "[Info] Resource deleted");
        Ok(())
    }

    async fn set_disk_auto_delete(&self, config: &TeardownConfig, key: &str, url: &str) -> Result<()> {
        let instance: InstanceDisks = self.client.get(url).await?;

        for disk in instance.disks.iter().filter(|d| !d.auto_delete) {
            debug!(item = %key, device = %disk.device_name, "Setting disk auto-delete");
            let set_url = format!(
                "{url}/setDiskAutoDelete?autoDelete=true&deviceName={}",
                urlencoding::encode(&disk.device_name)
            );
            let operation: Operation = self.client.post(&set_url, &json!({})).await?;
            operation::wait(&self.client, config, key, operation).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InstanceDisks {
    #[serde(default)]
    disks: Vec<AttachedDisk>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachedDisk {
    device_name: String,
    #[serde(default)]
    auto_delete: bool,
}

async fn auto_mode_networks(client: &GcpClient, project: &str) -> Result<HashSet<String>> {
    let networks: Vec<Value> = client
        .list_all(&client.compute_url(project, "global/networks"), "items")
        .await?;
    Ok(networks
        .iter()
        .filter(|n| n.get("autoCreateSubnetworks").and_then(Value::as_bool) == Some(true))
        .filter_map(|n| n.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl Resource for ComputeCollection {
    fn name(&self) -> &str {
        self.spec.kind
    }

    async fn setup(&mut self, config: &TeardownConfig) -> Result<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    async fn list(&self, refresh: bool) -> Result<Vec<String>> {
        if !refresh {
            return Ok(self.cache.names());
        }
        let config = configured(&self.config, self.spec.kind)?;
        let skip = self.filter_names(config).await?;

        let mut items = Vec::new();
        for location in self.locations(config) {
            let url = self.collection_url(&config.project, location.as_deref());
            let listed: Vec<Value> = self.client.list_all(&url, "items").await?;

            for raw in listed {
                let Some(name) = raw.get("name").and_then(Value::as_str) else {
                    return Err(BackendError::Decode(format!(
                        "{} item without a name",
                        self.spec.kind
                    )));
                };
                if self.spec.filter.skips(&raw, &skip) {
                    debug!(kind = %self.spec.kind, item = %name, "Skipping item");
                    continue;
                }
                let key = Self::cache_key(name, location.as_deref());
                let item = Item {
                    name: name.to_string(),
                    location: location.clone(),
                };
                items.push((key, item));
            }
        }

        Ok(self.cache.replace(items))
    }

    fn dependencies(&self) -> Vec<String> {
        self.spec.dependencies.iter().map(|d| d.to_string()).collect()
    }

    async fn remove(&self) -> Result<()> {
        let entries = self.cache.entries();
        if entries.is_empty() {
            return Ok(());
        }
        let config = configured(&self.config, self.spec.kind)?;

        // every deletion runs to completion; the first error is reported
        join_all(
            entries
                .into_iter()
                .map(|(key, item)| self.delete_item(config, key, item)),
        )
        .await
        .into_iter()
        .collect()
    }
}
