//! Mapping Orchestrator
//!
//! Establishes and revokes "this LUN is visible to this host". A LUN is
//! visible only when a host-derived lun group holds it and a mapping view
//! binds that lun group to the host's host group (and optionally a port
//! group). Each step is idempotent; a mapping that fails after the LUN joined
//! its lun group is rolled back by removing that membership, while the group
//! and view skeletons are kept for the next attempt.

use crate::array::client::ArrayClient;
use crate::array::lun::LunApi;
use crate::error::{Error, Result};
use crate::mapping::association::{AssociationManager, Relation};
use crate::mapping::creator::IdempotentCreator;
use crate::mapping::entity::{hostgroup_name, lungroup_name, mapping_view_name, EntityKind};
use crate::mapping::initiator::InitiatorManager;
use crate::mapping::resolver::EntityResolver;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Oldest firmware that reports free host LUN IDs on a view
pub const ARRAY_VERSION: &str = "V300R003C00";

// =============================================================================
// Mapping State
// =============================================================================

/// Progress of a single (host, LUN) pair through the mapping procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingState {
    GroupsProvisioned,
    LunInGroup,
    ViewCreated,
    FullyAssociated,
    LunRemovedFromGroup,
}

impl std::fmt::Display for MappingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingState::GroupsProvisioned => write!(f, "groups-provisioned"),
            MappingState::LunInGroup => write!(f, "lun-in-group"),
            MappingState::ViewCreated => write!(f, "view-created"),
            MappingState::FullyAssociated => write!(f, "fully-associated"),
            MappingState::LunRemovedFromGroup => write!(f, "lun-removed-from-group"),
        }
    }
}

/// Result of a successful mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    pub lun_id: String,
    pub view_id: String,
    /// Free host LUN IDs on the view; `None` on firmware older than
    /// [`ARRAY_VERSION`]
    pub available_host_lun_ids: Option<Vec<u32>>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Owns the mapping engine components for one array session
#[derive(Clone)]
pub struct MappingOrchestrator {
    resolver: EntityResolver,
    creator: IdempotentCreator,
    associations: AssociationManager,
    initiators: InitiatorManager,
    luns: LunApi,
}

impl MappingOrchestrator {
    pub fn new(client: ArrayClient) -> Self {
        let resolver = EntityResolver::new(client.clone());
        let creator = IdempotentCreator::new(client.clone(), resolver.clone());
        let associations = AssociationManager::new(client.clone());
        let initiators = InitiatorManager::new(client.clone(), resolver.clone(), creator.clone());
        let luns = LunApi::new(client);

        Self {
            resolver,
            creator,
            associations,
            initiators,
            luns,
        }
    }

    pub fn creator(&self) -> &IdempotentCreator {
        &self.creator
    }

    pub fn associations(&self) -> &AssociationManager {
        &self.associations
    }

    pub fn initiators(&self) -> &InitiatorManager {
        &self.initiators
    }

    pub fn luns(&self) -> &LunApi {
        &self.luns
    }

    /// Ensure the host group of `host_id` exists and contains the host
    pub async fn ensure_host_in_hostgroup(&self, host_id: &str) -> Result<String> {
        let name = hostgroup_name(host_id);
        let hostgroup_id = self.creator.ensure(EntityKind::HostGroup, &name).await?;
        self.associations
            .ensure_associated(Relation::HostInHostGroup, &hostgroup_id, host_id)
            .await?;
        Ok(hostgroup_id)
    }

    /// Make `lun_id` visible to `host_id` through its host group
    pub async fn do_mapping(
        &self,
        lun_id: &str,
        hostgroup_id: &str,
        host_id: &str,
        portgroup_id: Option<&str>,
    ) -> Result<MapInfo> {
        let lungroup_name = lungroup_name(host_id);
        let view_name = mapping_view_name(host_id);

        let lungroup_id = self.resolver.resolve(EntityKind::LunGroup, &lungroup_name).await?;
        let view_id = self.resolver.resolve(EntityKind::MappingView, &view_name).await?;

        info!(
            "do_mapping, lun_group: {:?}, view_id: {:?}, lun_id: {}",
            lungroup_id, view_id, lun_id
        );

        let lungroup_id = match lungroup_id {
            Some(id) => id,
            None => self
                .creator
                .ensure(EntityKind::LunGroup, &lungroup_name)
                .await
                .map_err(|e| {
                    error!("Failed to create lungroup {}: {}", lungroup_name, e);
                    Error::Provisioning(format!("create lungroup {}: {}", lungroup_name, e))
                })?,
        };
        debug!("Mapping state for LUN {}: {}", lun_id, MappingState::GroupsProvisioned);

        match self
            .reconcile(lun_id, &lungroup_id, view_id, &view_name, hostgroup_id, portgroup_id)
            .await
        {
            Ok(info) => {
                info!(
                    "Mapped LUN {} to host {} through view {}",
                    lun_id, host_id, info.view_id
                );
                Ok(info)
            }
            Err(e) => {
                error!(
                    "Error occurred when adding hostgroup and lungroup to view: {}. \
                     Remove lun {} from lungroup {} now",
                    e, lun_id, lungroup_id
                );
                if let Err(rollback) = self
                    .associations
                    .disassociate(Relation::LunInLunGroup, &lungroup_id, lun_id)
                    .await
                {
                    warn!(
                        "Rollback of LUN {} from lungroup {} failed: {}",
                        lun_id, lungroup_id, rollback
                    );
                }
                Err(Error::Provisioning(format!("map lun {}: {}", lun_id, e)))
            }
        }
    }

    async fn reconcile(
        &self,
        lun_id: &str,
        lungroup_id: &str,
        view_id: Option<String>,
        view_name: &str,
        hostgroup_id: &str,
        portgroup_id: Option<&str>,
    ) -> Result<MapInfo> {
        self.associations
            .ensure_associated(Relation::LunInLunGroup, lungroup_id, lun_id)
            .await?;
        debug!("Mapping state for LUN {}: {}", lun_id, MappingState::LunInGroup);

        let view_id = match view_id {
            None => {
                let view_id = self
                    .creator
                    .create(EntityKind::MappingView, view_name, None)
                    .await?;
                debug!("Mapping state for LUN {}: {}", lun_id, MappingState::ViewCreated);

                self.associations
                    .associate(Relation::HostGroupInView, &view_id, hostgroup_id)
                    .await?;
                self.associations
                    .associate(Relation::LunGroupInView, &view_id, lungroup_id)
                    .await?;
                if let Some(portgroup_id) = portgroup_id {
                    self.associations
                        .associate(Relation::PortGroupInView, &view_id, portgroup_id)
                        .await?;
                }
                view_id
            }
            Some(view_id) => {
                // A prior partial failure may have left the view under-associated.
                self.associations
                    .ensure_associated(Relation::HostGroupInView, &view_id, hostgroup_id)
                    .await?;
                self.associations
                    .ensure_associated(Relation::LunGroupInView, &view_id, lungroup_id)
                    .await?;
                if let Some(portgroup_id) = portgroup_id {
                    self.associations
                        .ensure_associated(Relation::PortGroupInView, &view_id, portgroup_id)
                        .await?;
                }
                view_id
            }
        };
        debug!("Mapping state for LUN {}: {}", lun_id, MappingState::FullyAssociated);

        let version = self.luns.array_version().await?;
        let available_host_lun_ids = if version.as_str() >= ARRAY_VERSION {
            Some(self.luns.available_host_lun_ids(&view_id).await?)
        } else {
            debug!("Array version {} predates host LUN ID reporting", version);
            None
        };

        Ok(MapInfo {
            lun_id: lun_id.to_string(),
            view_id,
            available_host_lun_ids,
        })
    }

    /// Revoke `lun_id` from the host named `host_name`.
    ///
    /// Removing a mapping for a LUN the array does not have is an error; a
    /// LUN that is already out of the view's lun group is not.
    pub async fn delete_mapping(&self, lun_id: &str, host_name: &str) -> Result<()> {
        let mut lungroup_id = None;

        if let Some(host_id) = self.resolver.resolve_host(host_name).await? {
            let view_name = mapping_view_name(&host_id);
            if let Some(view_id) = self.resolver.resolve(EntityKind::MappingView, &view_name).await? {
                lungroup_id = self.associations.lungroup_of_view(&view_id).await?;
            }
        }

        if !self.luns.lun_exists(lun_id).await? {
            error!("Can't find lun {} on the array", lun_id);
            return Err(Error::LunNotFound {
                lun_id: lun_id.to_string(),
            });
        }

        let Some(lungroup_id) = lungroup_id else {
            info!(
                "No lungroup mapped for host {}; lun {} treated as unmapped",
                host_name, lun_id
            );
            return Ok(());
        };

        let lungroup_ids = self.associations.lungroups_of_lun(lun_id).await?;
        if lungroup_ids.contains(&lungroup_id) {
            self.associations
                .disassociate(Relation::LunInLunGroup, &lungroup_id, lun_id)
                .await?;
            debug!("Mapping state for LUN {}: {}", lun_id, MappingState::LunRemovedFromGroup);
        } else {
            info!(
                "Lun is not in lungroup. Lun id: {}. lungroup id: {}",
                lun_id, lungroup_id
            );
        }

        Ok(())
    }
}
