//! OceanStor Block Device Driver
//!
//! Implements [`BlockDeviceApi`] on top of the mapping engine. Every
//! lifecycle call validates the volume's state on the array before touching
//! the object graph, so lifecycle signals (unknown, unattached, already
//! attached) are raised without side effects.

use crate::array::client::ArrayClient;
use crate::array::envelope::{LunRecord, SECTOR_SIZE};
use crate::array::lun::LunApi;
use crate::config::{InitiatorSettings, Protocol, ProvisionerConfig};
use crate::domain::ports::{
    BlockDeviceApi, FleetInventoryRef, HostDiscovererRef, LocalBlockDevice, Volume,
};
use crate::error::{Error, Result};
use crate::mapping::association::Relation;
use crate::mapping::orchestrator::MappingOrchestrator;
use crate::volume::naming::{decode_name, encode_name, is_cluster_volume};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::json;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Volumes are rounded up to whole GiB
pub const ALLOCATION_UNIT: u64 = 1024 * 1024 * 1024;

/// Device letters handed out by the positional fallback
const DEVICE_SUFFIXES: &[u8] = b"cdefghijklmnopqrstuv";

/// LUN capacity in sectors for a requested size in bytes
pub fn capacity_sectors(size: u64) -> Result<u64> {
    size.div_ceil(ALLOCATION_UNIT)
        .checked_mul(ALLOCATION_UNIT)
        .map(|bytes| bytes / SECTOR_SIZE)
        .ok_or_else(|| {
            Error::Configuration(format!("volume size {} bytes is out of range", size))
        })
}

/// Whether a kernel-reported WWID names the LUN with array WWN `wwn`
fn wwid_matches(wwid: &str, wwn: &str) -> bool {
    !wwn.is_empty() && wwid.to_ascii_lowercase().contains(&wwn.to_ascii_lowercase())
}

/// Host initiators to register, gathered before any array mutation
enum InitiatorPlan {
    Iscsi {
        initiator: String,
        settings: InitiatorSettings,
    },
    Fc {
        wwpns: Vec<String>,
    },
}

// =============================================================================
// Driver
// =============================================================================

/// Block device driver for one array and one cluster
pub struct OceanStorBlockDevice {
    config: ProvisionerConfig,
    cluster_id: String,
    orchestrator: MappingOrchestrator,
    host: HostDiscovererRef,
    inventory: Option<FleetInventoryRef>,
}

impl OceanStorBlockDevice {
    pub fn new(
        config: ProvisionerConfig,
        cluster_id: impl Into<String>,
        client: ArrayClient,
        host: HostDiscovererRef,
    ) -> Self {
        Self {
            config,
            cluster_id: cluster_id.into(),
            orchestrator: MappingOrchestrator::new(client),
            host,
            inventory: None,
        }
    }

    /// Resolve node identity through a fleet inventory first
    pub fn with_inventory(mut self, inventory: FleetInventoryRef) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn orchestrator(&self) -> &MappingOrchestrator {
        &self.orchestrator
    }

    fn luns(&self) -> &LunApi {
        self.orchestrator.luns()
    }

    async fn require_lun(&self, blockdevice_id: &str) -> Result<LunRecord> {
        self.luns()
            .get_lun(blockdevice_id)
            .await?
            .ok_or_else(|| {
                error!("Volume {} does not exist on the array", blockdevice_id);
                Error::UnknownVolume {
                    volume_id: blockdevice_id.to_string(),
                }
            })
    }

    /// Node a LUN is exposed to, taken from the host record.
    ///
    /// Hashed host names keep the node name as their description.
    async fn attached_to(&self, lun: &LunRecord) -> Result<Option<String>> {
        if !lun.in_use() {
            return Ok(None);
        }
        let hosts = self.orchestrator.associations().hosts_of_lun(&lun.id).await?;
        Ok(hosts.into_iter().next().map(|h| match h.description {
            Some(d) if !d.is_empty() => d,
            _ => h.name,
        }))
    }

    async fn to_volume(&self, lun: &LunRecord) -> Result<Volume> {
        Ok(Volume {
            blockdevice_id: lun.id.clone(),
            dataset_id: decode_name(&lun.name)?,
            size: lun.capacity_bytes(),
            attached_to: self.attached_to(lun).await?,
        })
    }

    /// Discover this host's initiators and their settings
    async fn plan_initiators(&self) -> Result<InitiatorPlan> {
        match self.config.protocol {
            Protocol::Iscsi => {
                let initiator = self.host.iscsi_initiator().await?.ok_or_else(|| {
                    Error::HostDiscovery("can't find iscsi initiator".to_string())
                })?;
                let settings = self.config.iscsi.settings_for(&initiator);
                settings.validate()?;
                Ok(InitiatorPlan::Iscsi {
                    initiator,
                    settings,
                })
            }
            Protocol::Fc => Ok(InitiatorPlan::Fc {
                wwpns: self.host.fc_wwpns().await?,
            }),
        }
    }

    /// Register planned initiators with `host_id`
    async fn connect_initiators(&self, host_id: &str, plan: &InitiatorPlan) -> Result<()> {
        let initiators = self.orchestrator.initiators();
        match plan {
            InitiatorPlan::Iscsi {
                initiator,
                settings,
            } => {
                initiators
                    .ensure_iscsi_initiator(initiator, host_id, settings)
                    .await
            }
            InitiatorPlan::Fc { wwpns } => {
                let online = initiators.ensure_fc_ports(host_id, wwpns).await?;
                debug!("Online FC initiators of host {}: {:?}", host_id, online);
                Ok(())
            }
        }
    }

    fn device_for(devices: &[LocalBlockDevice], lun: &LunRecord) -> Option<PathBuf> {
        devices
            .iter()
            .find(|d| d.wwid.as_deref().map_or(false, |w| wwid_matches(w, &lun.wwn)))
            .map(|d| d.path())
    }
}

#[async_trait]
impl BlockDeviceApi for OceanStorBlockDevice {
    fn allocation_unit(&self) -> u64 {
        ALLOCATION_UNIT
    }

    async fn compute_instance_id(&self) -> Result<Option<String>> {
        if let Some(inventory) = &self.inventory {
            let lookup = async {
                let hostname = inventory.hostname().await?;
                let instances = inventory.instances().await?;
                Ok::<_, Error>(
                    instances
                        .into_iter()
                        .find(|i| i.hostname == hostname)
                        .map(|i| i.instance_id),
                )
            };
            match lookup.await {
                Ok(Some(id)) => {
                    info!("Instance ID from fleet inventory: {}", id);
                    return Ok(Some(id));
                }
                Ok(None) => debug!("Fleet inventory has no record of this host"),
                Err(e) => warn!("Fleet inventory lookup failed: {}", e),
            }
        }
        Ok(self.config.instance_id.clone())
    }

    async fn create_volume(&self, dataset_id: Uuid, size: u64) -> Result<Volume> {
        info!("Call create_volume, dataset_id={}, size={}", dataset_id, size);
        let capacity = capacity_sectors(size)?;

        let pool = self
            .luns()
            .find_pool(&self.config.storage_pool)
            .await?
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "storage pool {} not found on the array",
                    self.config.storage_pool
                ))
            })?;
        if let Some(free) = pool.free_sectors() {
            if free < capacity {
                error!(
                    "Pool {} has {} free sectors, {} requested",
                    pool.name, free, capacity
                );
                return Err(Error::Provisioning(format!(
                    "storage pool {} lacks capacity for {} bytes",
                    pool.name, size
                )));
            }
        }

        let params = &self.config.lun;
        let body = json!({
            "TYPE": "11",
            "NAME": encode_name(&dataset_id, &self.cluster_id),
            "PARENTTYPE": "216",
            "PARENTID": pool.id,
            "DESCRIPTION": dataset_id.to_string(),
            "ALLOCTYPE": params.lun_type,
            "CAPACITY": capacity,
            "DATATRANSFERPOLICY": "0",
            "READCACHEPOLICY": "2",
            "WRITECACHEPOLICY": "5",
            "WRITEPOLICY": params.write_type,
            "MIRRORPOLICY": params.mirror_switch,
            "PREFETCHPOLICY": params.prefetch_type,
            "PREFETCHVALUE": params.prefetch_value,
            "DATASTRIPSIZE": params.strip_unit_size,
        });
        let lun = self.luns().create_lun(body).await?;

        Ok(Volume {
            blockdevice_id: lun.id,
            dataset_id,
            size,
            attached_to: None,
        })
    }

    async fn destroy_volume(&self, blockdevice_id: &str) -> Result<()> {
        info!("Call destroy_volume blockdevice_id={}", blockdevice_id);
        self.require_lun(blockdevice_id).await?;

        let associations = self.orchestrator.associations();
        let lungroups = associations.lungroups_of_lun(blockdevice_id).await?;
        if let [lungroup] = lungroups.as_slice() {
            associations
                .disassociate(Relation::LunInLunGroup, lungroup, blockdevice_id)
                .await?;
        }

        self.luns().delete_lun(blockdevice_id).await
    }

    async fn attach_volume(&self, blockdevice_id: &str, attach_to: &str) -> Result<Volume> {
        info!(
            "Call attach_volume blockdevice_id={}, attach_to={}",
            blockdevice_id, attach_to
        );

        let lun = self.require_lun(blockdevice_id).await?;
        if lun.in_use() {
            error!("Volume {} is already attached", blockdevice_id);
            return Err(Error::AlreadyAttached {
                volume_id: blockdevice_id.to_string(),
            });
        }

        let plan = self.plan_initiators().await?;

        let host_id = self.orchestrator.creator().ensure_host(attach_to).await?;
        let hostgroup_id = self.orchestrator.ensure_host_in_hostgroup(&host_id).await?;
        self.connect_initiators(&host_id, &plan).await?;

        let map_info = self
            .orchestrator
            .do_mapping(&lun.id, &hostgroup_id, &host_id, None)
            .await?;
        debug!("Mapped volume {}: {:?}", blockdevice_id, map_info);

        if let Err(e) = self.host.rescan().await {
            warn!("SCSI rescan after attaching {} failed: {}", blockdevice_id, e);
        }

        Ok(Volume {
            blockdevice_id: lun.id.clone(),
            dataset_id: decode_name(&lun.name)?,
            size: lun.capacity_bytes(),
            attached_to: Some(attach_to.to_string()),
        })
    }

    async fn detach_volume(&self, blockdevice_id: &str) -> Result<()> {
        info!("Call detach_volume blockdevice_id={}", blockdevice_id);

        let lun = self.require_lun(blockdevice_id).await?;
        let unattached = || Error::UnattachedVolume {
            volume_id: blockdevice_id.to_string(),
        };
        let host_name = self.attached_to(&lun).await?.ok_or_else(|| {
            error!("Volume {} not attached", blockdevice_id);
            unattached()
        })?;

        let local_device = match self.host.block_devices().await {
            Ok(devices) => devices
                .into_iter()
                .find(|d| d.wwid.as_deref().map_or(false, |w| wwid_matches(w, &lun.wwn))),
            Err(e) => {
                warn!("Cannot enumerate local block devices: {}", e);
                None
            }
        };

        self.orchestrator.delete_mapping(&lun.id, &host_name).await?;

        if let Some(device) = local_device {
            if let Err(e) = self.host.remove_device(&device.name).await {
                warn!("Failed to remove SCSI device {}: {}", device.name, e);
            }
        }
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        let luns = self.luns().list_luns().await?;
        let volumes = try_join_all(
            luns.iter()
                .filter(|l| is_cluster_volume(&l.name, &self.cluster_id))
                .map(|l| self.to_volume(l)),
        )
        .await?;
        debug!("Listed {} volumes of cluster {}", volumes.len(), self.cluster_id);
        Ok(volumes)
    }

    async fn get_device_path(&self, blockdevice_id: &str) -> Result<PathBuf> {
        let lun = self.require_lun(blockdevice_id).await?;
        if !lun.in_use() {
            return Err(Error::UnattachedVolume {
                volume_id: blockdevice_id.to_string(),
            });
        }

        let devices = self.host.block_devices().await?;
        if let Some(path) = Self::device_for(&devices, &lun) {
            info!("device_path found: {}", path.display());
            return Ok(path);
        }

        // Paravirtual disks report no WWID; fall back to enumeration order.
        if devices.iter().all(|d| d.wwid.is_none()) {
            let volumes = self.list_volumes().await?;
            if let Some(index) = volumes.iter().position(|v| v.blockdevice_id == lun.id) {
                if let Some(suffix) = DEVICE_SUFFIXES.get(index) {
                    let path = PathBuf::from(format!("/dev/vd{}", *suffix as char));
                    info!("device_path found by position: {}", path.display());
                    return Ok(path);
                }
            }
        }

        Err(Error::DeviceNotFound {
            volume_id: blockdevice_id.to_string(),
        })
    }
}
