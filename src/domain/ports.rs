//! Domain Ports - Core trait definitions for the provisioner
//!
//! These traits define the boundaries between the mapping engine and the
//! systems around it: the array's REST transport, the cluster orchestrator,
//! host-side device discovery and the fleet inventory.

use crate::array::envelope::Envelope;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Array Transport Port
// =============================================================================

/// HTTP verbs the array API uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpVerb::Get => write!(f, "GET"),
            HttpVerb::Post => write!(f, "POST"),
            HttpVerb::Put => write!(f, "PUT"),
            HttpVerb::Delete => write!(f, "DELETE"),
        }
    }
}

/// A single call against the array, relative to the session base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayRequest {
    pub verb: HttpVerb,
    /// Path and query, e.g. `/lungroup?range=[0-8191]`
    pub path: String,
    pub body: Option<Value>,
}

/// Port for the authenticated array transport.
///
/// Implementations never surface transport failures as errors: an
/// unreachable array yields an envelope carrying
/// [`ERROR_CONNECT_TO_SERVER`](crate::array::envelope::ERROR_CONNECT_TO_SERVER).
/// An error is returned only when no session exists or the reply is not JSON.
#[async_trait]
pub trait ArrayTransport: Send + Sync {
    async fn send(&self, request: ArrayRequest) -> Result<Envelope>;
}

// =============================================================================
// Volume Lifecycle Port
// =============================================================================

/// A block volume as seen by the cluster orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Array LUN ID
    pub blockdevice_id: String,
    /// Dataset the volume backs
    pub dataset_id: Uuid,
    /// Size in bytes
    pub size: u64,
    /// Node the volume is attached to, if any
    pub attached_to: Option<String>,
}

/// Port the cluster orchestrator drives
#[async_trait]
pub trait BlockDeviceApi: Send + Sync {
    /// Size in bytes volumes are rounded up to
    fn allocation_unit(&self) -> u64;

    /// Identifier of the node this process runs on
    async fn compute_instance_id(&self) -> Result<Option<String>>;

    /// Create a volume for `dataset_id`
    async fn create_volume(&self, dataset_id: Uuid, size: u64) -> Result<Volume>;

    /// Destroy a volume
    async fn destroy_volume(&self, blockdevice_id: &str) -> Result<()>;

    /// Attach a volume to `attach_to`
    async fn attach_volume(&self, blockdevice_id: &str, attach_to: &str) -> Result<Volume>;

    /// Detach a volume from whichever node holds it
    async fn detach_volume(&self, blockdevice_id: &str) -> Result<()>;

    /// List all volumes belonging to this cluster
    async fn list_volumes(&self) -> Result<Vec<Volume>>;

    /// Local device node of an attached volume
    async fn get_device_path(&self, blockdevice_id: &str) -> Result<PathBuf>;
}

// =============================================================================
// Host Discovery Port
// =============================================================================

/// A block device visible on the local host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalBlockDevice {
    /// Kernel name, e.g. `sdb`
    pub name: String,
    /// SCSI WWID, when the device reports one
    pub wwid: Option<String>,
}

impl LocalBlockDevice {
    pub fn path(&self) -> PathBuf {
        PathBuf::from("/dev").join(&self.name)
    }
}

/// Port for host-side initiator and device discovery
#[async_trait]
pub trait HostDiscoverer: Send + Sync {
    /// The iSCSI initiator name (IQN) of this host
    async fn iscsi_initiator(&self) -> Result<Option<String>>;

    /// WWPNs of online FC ports on this host
    async fn fc_wwpns(&self) -> Result<Vec<String>>;

    /// Ask every SCSI host adapter to rescan its bus
    async fn rescan(&self) -> Result<()>;

    /// Block devices currently present, in kernel enumeration order
    async fn block_devices(&self) -> Result<Vec<LocalBlockDevice>>;

    /// Remove a SCSI device from the host
    async fn remove_device(&self, name: &str) -> Result<()>;
}

// =============================================================================
// Fleet Inventory Port
// =============================================================================

/// An instance known to the fleet inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub hostname: String,
}

/// Port for mapping this host to its fleet instance identifier
#[async_trait]
pub trait FleetInventory: Send + Sync {
    /// Hostname this host is known by in the inventory
    async fn hostname(&self) -> Result<String>;

    /// Every instance in the fleet
    async fn instances(&self) -> Result<Vec<InstanceRecord>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ArrayTransportRef = Arc<dyn ArrayTransport>;
pub type HostDiscovererRef = Arc<dyn HostDiscoverer>;
pub type FleetInventoryRef = Arc<dyn FleetInventory>;
