//! User-managed IAM service accounts.

use async_trait::async_trait;
use futures::future::join_all;
use nuke_core::{ItemCache, Resource, Result, TeardownConfig};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::{GcpClient, configured};

pub const IAM_SERVICE_ACCOUNTS: &str = "IAMServiceAccounts";

#[derive(Debug, Deserialize)]
struct ServiceAccount {
    email: String,
}

/// Only accounts created in the project; Google-managed and default
/// accounts live under other domains.
fn user_managed(accounts: Vec<ServiceAccount>, project: &str) -> Vec<String> {
    let domain = format!("@{project}.iam.gserviceaccount.com");
    accounts
        .into_iter()
        .map(|a| a.email)
        .filter(|email| email.ends_with(&domain))
        .collect()
}

pub struct IamServiceAccounts {
    client: GcpClient,
    config: Option<TeardownConfig>,
    cache: ItemCache<()>,
}

impl IamServiceAccounts {
    pub fn new(client: GcpClient) -> Self {
        Self {
            client,
            config: None,
            cache: ItemCache::new(),
        }
    }

    async fn delete_account(&self, config: &TeardownConfig, email: String) -> Result<()> {
        let url = self
            .client
            .iam_url(&format!("projects/{}/serviceAccounts/{email}", config.project));
        let _: Value = self.client.delete(&url).await?;

        self.cache.remove(&email);
        info!(kind = IAM_SERVICE_ACCOUNTS, item = %email, project = %config.project, "[Info] Resource deleted");
        Ok(())
    }
}

#[async_trait]
impl Resource for IamServiceAccounts {
    fn name(&self) -> &str {
        IAM_SERVICE_ACCOUNTS
    }

    async fn setup(&mut self, config: &TeardownConfig) -> Result<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    async fn list(&self, refresh: bool) -> Result<Vec<String>> {
        if !refresh {
            return Ok(self.cache.names());
        }
        let config = configured(&self.config, IAM_SERVICE_ACCOUNTS)?;
        let url = self
            .client
            .iam_url(&format!("projects/{}/serviceAccounts", config.project));

        let accounts: Vec<ServiceAccount> = self.client.list_all(&url, "accounts").await?;
        Ok(self.cache.replace(
            user_managed(accounts, &config.project)
                .into_iter()
                .map(|email| (email, ())),
        ))
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn remove(&self) -> Result<()> {
        let accounts = self.cache.names();
        if accounts.is_empty() {
            return Ok(());
        }
        let config = configured(&self.config, IAM_SERVICE_ACCOUNTS)?;

        join_all(accounts.into_iter().map(|a| self.delete_account(config, a)))
            .await
            .into_iter()
            .collect()
    }
}
