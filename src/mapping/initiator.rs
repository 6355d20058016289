//! Initiator Manager
//!
//! Registers a host's iSCSI initiator or FC ports with the array and binds
//! them to the host object, honouring per-initiator CHAP and ALUA settings.

use crate::array::client::ArrayClient;
use crate::array::envelope::InitiatorRecord;
use crate::config::InitiatorSettings;
use crate::error::{Error, Result};
use crate::mapping::creator::IdempotentCreator;
use crate::mapping::entity::{EntityKind, FC_INITIATOR_OBJECT_TYPE};
use crate::mapping::resolver::EntityResolver;
use serde_json::json;
use tracing::{debug, info, warn};

/// RUNNINGSTATUS of an online FC initiator
pub const FC_INIT_ONLINE: &str = "27";

#[derive(Clone)]
pub struct InitiatorManager {
    client: ArrayClient,
    resolver: EntityResolver,
    creator: IdempotentCreator,
}

impl InitiatorManager {
    pub fn new(client: ArrayClient, resolver: EntityResolver, creator: IdempotentCreator) -> Self {
        Self {
            client,
            resolver,
            creator,
        }
    }

    // =========================================================================
    // iSCSI
    // =========================================================================

    /// Make sure `initiator` is known to the array and bound to `host_id`
    pub async fn ensure_iscsi_initiator(
        &self,
        initiator: &str,
        host_id: &str,
        settings: &InitiatorSettings,
    ) -> Result<()> {
        let records: Vec<InitiatorRecord> = self.resolver.list(EntityKind::IscsiInitiator).await?;

        let existing = records.into_iter().find(|r| r.id == initiator);
        let free = match &existing {
            Some(record) => record.free(),
            None => {
                info!("Adding iSCSI initiator {} to the array", initiator);
                self.creator
                    .create(EntityKind::IscsiInitiator, initiator, None)
                    .await?;
                true
            }
        };

        if !free {
            if let Some(parent) = existing.and_then(|r| r.parent_id) {
                if parent != host_id {
                    warn!(
                        "iSCSI initiator {} is bound to host {}, not {}",
                        initiator, parent, host_id
                    );
                }
            }
            debug!("iSCSI initiator {} already associated", initiator);
            return Ok(());
        }

        self.associate_iscsi_initiator(initiator, host_id, settings).await
    }

    async fn associate_iscsi_initiator(
        &self,
        initiator: &str,
        host_id: &str,
        settings: &InitiatorSettings,
    ) -> Result<()> {
        let path = format!("/iscsi_initiator/{}", urlencoding::encode(initiator));

        match &settings.chap {
            Some(chap) => {
                info!("Use CHAP when adding initiator {} to host {}", initiator, host_id);
                let body = json!({
                    "TYPE": EntityKind::IscsiInitiator.object_type(),
                    "USECHAP": "true",
                    "CHAPNAME": chap.username,
                    "CHAPPASSWORD": chap.password,
                    "ID": initiator,
                    "PARENTTYPE": EntityKind::Host.object_type(),
                    "PARENTID": host_id,
                });
                self.client.put(path, body).await?.assert_success(
                    "use CHAP to associate initiator to host (check the CHAP username and password)",
                )?;
            }
            None => {
                let body = json!({
                    "TYPE": EntityKind::IscsiInitiator.object_type(),
                    "ID": initiator,
                    "USECHAP": "false",
                    "PARENTTYPE": EntityKind::Host.object_type(),
                    "PARENTID": host_id,
                });
                self.client
                    .put(path, body)
                    .await?
                    .assert_success("associate initiator to host")?;
            }
        }

        if let Some(multipath) = settings.alua {
            info!("Use ALUA {} when adding initiator {} to host", multipath, initiator);
            let body = json!({
                "ID": initiator,
                "MULTIPATHTYPE": multipath.to_string(),
            });
            self.client
                .put("/iscsi_initiator", body)
                .await?
                .assert_success("use ALUA to associate initiator to host")?;
        }

        info!("Associated iSCSI initiator {} to host {}", initiator, host_id);
        Ok(())
    }

    // =========================================================================
    // Fibre Channel
    // =========================================================================

    /// WWNs the array sees online and not yet bound to any host
    pub async fn free_fc_wwns(&self) -> Result<Vec<String>> {
        let records: Vec<InitiatorRecord> = self
            .client
            .get("/fc_initiator?ISFREE=true&range=[0-8191]")
            .await?
            .into_list("get connected free FC wwn")?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// Online FC initiators bound to `host_id`
    pub async fn online_fc_initiators(&self, host_id: &str) -> Result<Vec<String>> {
        let path = format!("/fc_initiator?PARENTTYPE=21&PARENTID={}", host_id);
        let records: Vec<InitiatorRecord> = self.client.get(path).await?.into_list("get host FC initiators")?;

        Ok(records
            .into_iter()
            .filter(|r| {
                r.parent_id.as_deref() == Some(host_id)
                    && r.running_status.as_deref() == Some(FC_INIT_ONLINE)
            })
            .map(|r| r.id)
            .collect())
    }

    /// Bind every free local WWPN to `host_id` and return the host's online
    /// initiators
    pub async fn ensure_fc_ports(&self, host_id: &str, local_wwpns: &[String]) -> Result<Vec<String>> {
        let free = self.free_fc_wwns().await?;

        for wwn in local_wwpns.iter().filter(|w| free.contains(w)) {
            info!("Adding FC port {} to host {}", wwn, host_id);
            let body = json!({
                "TYPE": FC_INITIATOR_OBJECT_TYPE,
                "ID": wwn,
                "PARENTTYPE": EntityKind::Host.object_type(),
                "PARENTID": host_id,
            });
            self.client
                .put(format!("/fc_initiator/{}", wwn), body)
                .await?
                .assert_success("add FC port to host")?;
        }

        let online = self.online_fc_initiators(host_id).await?;
        if online.is_empty() {
            return Err(Error::Provisioning(format!(
                "no online FC initiator bound to host {}",
                host_id
            )));
        }
        Ok(online)
    }
}
