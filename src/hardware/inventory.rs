//! Fleet Inventory Client
//!
//! Maps this host to its instance identifier through an HTTP inventory
//! service. The instance listing is a JSON array of `{instance_id, hostname}`
//! records (`vm_id` is accepted for the instance field). The hostname comes
//! from a metadata endpoint when one is configured, otherwise from the kernel.

use crate::domain::ports::{FleetInventory, InstanceRecord};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Configuration for the inventory client
#[derive(Debug, Clone)]
pub struct InventoryConfig {
    /// URL returning the instance listing
    pub instances_url: String,
    /// Metadata URL returning this host's hostname as plain text
    pub hostname_url: Option<String>,
    /// File holding the kernel hostname, used without a metadata URL
    pub hostname_file: PathBuf,
    pub timeout: Duration,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            instances_url: String::new(),
            hostname_url: None,
            hostname_file: PathBuf::from("/proc/sys/kernel/hostname"),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInstance {
    #[serde(alias = "vm_id")]
    instance_id: serde_json::Value,
    hostname: String,
}

impl RawInstance {
    fn into_record(self) -> InstanceRecord {
        let instance_id = match self.instance_id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        InstanceRecord {
            instance_id,
            hostname: self.hostname.trim().to_string(),
        }
    }
}

/// Fleet inventory reached over HTTP
pub struct HttpFleetInventory {
    config: InventoryConfig,
    client: Client,
}

impl HttpFleetInventory {
    pub fn new(config: InventoryConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Inventory(format!("HTTP request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Inventory(format!(
                "GET {} failed with status {}: {}",
                url, status, body
            )));
        }

        resp.text()
            .await
            .map_err(|e| Error::Inventory(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl FleetInventory for HttpFleetInventory {
    async fn hostname(&self) -> Result<String> {
        let hostname = match &self.config.hostname_url {
            Some(url) => self.get_text(url).await?,
            None => std::fs::read_to_string(&self.config.hostname_file)?,
        };
        Ok(hostname.trim().to_string())
    }

    async fn instances(&self) -> Result<Vec<InstanceRecord>> {
        let body = self.get_text(&self.config.instances_url).await?;
        let raw: Vec<RawInstance> = serde_json::from_str(&body)?;
        Ok(raw.into_iter().map(RawInstance::into_record).collect())
    }
}
