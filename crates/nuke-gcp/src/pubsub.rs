//! Pub/Sub topics. Topic deletion is synchronous.

use async_trait::async_trait;
use futures::future::join_all;
use nuke_core::{ItemCache, Resource, Result, TeardownConfig};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::is_service_disabled;
use crate::{GcpClient, configured};

pub const PUBSUB_TOPICS: &str = "PubSubTopics";

#[derive(Debug, Deserialize)]
struct Topic {
    /// Full resource name, `projects/{project}/topics/{topic}`.
    name: String,
}

pub struct PubSubTopics {
    client: GcpClient,
    config: Option<TeardownConfig>,
    cache: ItemCache<()>,
}

impl PubSubTopics {
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            config: None,
            cache: ItemCache::new(),
        }
    }

    async fn delete_topic(&self, config: &TeardownConfig, topic: String) -> Result<()> {
        let _: Value = self.client.delete(&self.client.pubsub_url(&topic)).await?;
        self.cache.remove(&topic);
        info!(kind = PUBSUB_TOPICS, item = %topic, project = %config.project, "[Info] Resource deleted");
        Ok(())
    }
}

#[async_trait]
impl Resource for PubSubTopics {
    fn name(&self) -> &str {
        PUBSUB_TOPICS
    }

    async fn setup(&mut self, config: &TeardownConfig) -> Result<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    async fn list(&self, refresh: bool) -> Result<Vec<String>> {
        if !refresh {
            return Ok(self.cache.names());
        }
        let config = configured(&self.config, PUBSUB_TOPICS)?;
        let url = self
            .client
            .pubsub_url(&format!("projects/{}/topics", config.project));

        let topics: Vec<Topic> = match self.client.list_all(&url, "topics").await {
            Ok(topics) => topics,
            Err(e) if is_service_disabled(&e) => {
                warn!(project = %config.project, "Pub/Sub API is disabled, no topics to delete");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(self.cache.replace(topics.into_iter().map(|t| (t.name, ()))))
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn remove(&self) -> Result<()> {
        let topics = self.cache.names();
        if topics.is_empty() {
            return Ok(());
        }
        let config = configured(&self.config, PUBSUB_TOPICS)?;

        join_all(topics.into_iter().map(|t| self.delete_topic(config, t)))
            .await
            .into_iter()
            .collect()
    }
}
