//! LUN and Pool Operations
//!
//! Typed wrappers over the `/lun`, `/storagepool` and `/system` resources.

use crate::array::client::ArrayClient;
use crate::array::envelope::{
    LunRecord, MappingViewRecord, PoolRecord, SystemRecord, ERROR_CONNECT_TO_SERVER,
};
use crate::error::Result;
use serde_json::Value;
use tracing::{debug, info};

#[derive(Clone)]
pub struct LunApi {
    client: ArrayClient,
}

impl LunApi {
    pub fn new(client: ArrayClient) -> Self {
        Self { client }
    }

    /// Fetch a LUN; `None` when the array reports it absent.
    ///
    /// An unreachable array is an error, never "absent".
    pub async fn get_lun(&self, lun_id: &str) -> Result<Option<LunRecord>> {
        let envelope = self.client.get(format!("/lun/{}", lun_id)).await?;
        if envelope.code() == ERROR_CONNECT_TO_SERVER {
            envelope.assert_success("get lun")?;
        }
        if !envelope.is_success() {
            debug!("LUN {} not found: code {}", lun_id, envelope.code());
            return Ok(None);
        }
        Ok(Some(envelope.into_data("get lun")?))
    }

    pub async fn lun_exists(&self, lun_id: &str) -> Result<bool> {
        Ok(self.get_lun(lun_id).await?.is_some())
    }

    /// Every LUN on the array
    pub async fn list_luns(&self) -> Result<Vec<LunRecord>> {
        self.client
            .get("/lun?range=[0-65535]")
            .await?
            .into_list("list luns")
    }

    /// Create a LUN from a prepared request body
    pub async fn create_lun(&self, body: Value) -> Result<LunRecord> {
        let lun: LunRecord = self.client.post("/lun", body).await?.into_data("create lun")?;
        info!("Created LUN {} ({})", lun.id, lun.name);
        Ok(lun)
    }

    /// Delete a LUN; the caller removes lun-group memberships first
    pub async fn delete_lun(&self, lun_id: &str) -> Result<()> {
        let body = serde_json::json!({"TYPE": "11", "ID": lun_id});
        self.client
            .delete(format!("/lun/{}", lun_id), Some(body))
            .await?
            .assert_success("delete lun")?;
        info!("Deleted LUN {}", lun_id);
        Ok(())
    }

    /// All storage pools
    pub async fn list_pools(&self) -> Result<Vec<PoolRecord>> {
        let envelope = self.client.get("/storagepool").await?;
        envelope.require_data("query resource pool")?;
        envelope.into_list("query resource pool")
    }

    /// The block pool named `name`; file-system pools never match
    pub async fn find_pool(&self, name: &str) -> Result<Option<PoolRecord>> {
        let name = name.trim();
        Ok(self
            .list_pools()
            .await?
            .into_iter()
            .find(|p| p.name == name && !p.is_file_system_pool()))
    }

    /// Firmware version string, e.g. `V300R003C20`
    pub async fn array_version(&self) -> Result<String> {
        let system: SystemRecord = self
            .client
            .get("/system/")
            .await?
            .into_data("find array version")?;
        Ok(system.product_version)
    }

    /// Host LUN IDs still free on a mapping view
    pub async fn available_host_lun_ids(&self, view_id: &str) -> Result<Vec<u32>> {
        let view: MappingViewRecord = self
            .client
            .get(format!("/MAPPINGVIEW/{}", view_id))
            .await?
            .into_data("find mapping view by id")?;
        Ok(view.available_host_lun_ids())
    }
}
