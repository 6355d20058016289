//! OceanStor Provisioner
//!
//! Provisions block volumes on a REST-managed OceanStor array and exposes
//! them to compute hosts on behalf of a cluster orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Volume Lifecycle (BlockDeviceApi)                       │
//! │      create · destroy · attach · detach · list · device path            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                        Mapping Orchestrator                              │
//! │            do_mapping (with rollback) · delete_mapping                   │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌────────────────┐  │
//! │  │   Resolver   │ │   Creator    │ │ Associations │ │   Initiators   │  │
//! │  └──────────────┘ └──────────────┘ └──────────────┘ └────────────────┘  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                 Array Session (login · token · envelope)                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │     Host discovery (sysfs)          │      Fleet inventory (HTTP)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`array`]: Authenticated REST session and typed responses
//! - [`mapping`]: Host, group, view and initiator reconciliation
//! - [`volume`]: Volume naming and the lifecycle driver
//! - [`hardware`]: Host discovery and fleet inventory
//! - [`config`]: XML configuration
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod array;
pub mod config;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod mapping;
pub mod volume;

// Re-export commonly used types
pub use array::{ArrayClient, RestSession, SessionConfig};

pub use config::{
    ChapCredentials, InitiatorSettings, IscsiConfig, LunParams, Protocol, ProvisionerConfig,
};

pub use domain::ports::{
    ArrayTransport, BlockDeviceApi, FleetInventory, HostDiscoverer, InstanceRecord,
    LocalBlockDevice, Volume,
};

pub use error::{Error, Result};

pub use hardware::{HostScanner, HttpFleetInventory, InventoryConfig, ScannerConfig};

pub use mapping::{MapInfo, MappingOrchestrator, MappingState};

pub use volume::{OceanStorBlockDevice, ALLOCATION_UNIT};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
