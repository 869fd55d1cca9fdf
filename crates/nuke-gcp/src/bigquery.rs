//! BigQuery datasets, deleted together with their tables.

use async_trait::async_trait;
use futures::future::join_all;
use nuke_core::{ItemCache, Resource, Result, TeardownConfig};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::is_service_disabled;
use crate::{GcpClient, configured};

pub const BIGQUERY_DATASETS: &str = "BigQueryDatasets";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Dataset {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

pub struct BigQueryDatasets {
    client: GcpClient,
    config: Option<TeardownConfig>,
    cache: ItemCache<()>,
}

impl BigQueryDatasets {
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            config: None,
            cache: ItemCache::new(),
        }
    }

    async fn delete_dataset(&self, config: &TeardownConfig, dataset: String) -> Result<()> {
        let url = self.client.bigquery_url(
            &config.project,
            &format!("datasets/{}?deleteContents=true", urlencoding::encode(&dataset)),
        );
        let _: Value = self.client.delete(&url).await?;

        self.cache.remove(&dataset);
        info!(kind = BIGQUERY_DATASETS, item = %dataset, project = %config.project, "[Info] Resource deleted");
        Ok(())
    }
}

#[async_trait]
impl Resource for BigQueryDatasets {
    fn name(&self) -> &str {
        BIGQUERY_DATASETS
    }

    async fn setup(&mut self, config: &TeardownConfig) -> Result<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    async fn list(&self, refresh: bool) -> Result<Vec<String>> {
        if !refresh {
            return Ok(self.cache.names());
        }
        let config = configured(&self.config, BIGQUERY_DATASETS)?;
        let url = self.client.bigquery_url(&config.project, "datasets?all=true");

        let datasets: Vec<Dataset> = match self.client.list_all(&url, "datasets").await {
            Ok(datasets) => datasets,
            Err(e) if is_service_disabled(&e) => {
                warn!(project = %config.project, "BigQuery API is disabled, no datasets to delete");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(self.cache.replace(
            datasets
                .into_iter()
                .map(|d| (d.dataset_reference.dataset_id, ())),
        ))
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn remove(&self) -> Result<()> {
        let datasets = self.cache.names();
        if datasets.is_empty() {
            return Ok(());
        }
        let config = configured(&self.config, BIGQUERY_DATASETS)?;

        join_all(datasets.into_iter().map(|d| self.delete_dataset(config, d)))
            .await
            .into_iter()
            .collect()
    }
}
