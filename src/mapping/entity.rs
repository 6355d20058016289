//! Array Entity Kinds and Naming
//!
//! The closed set of array objects the mapping engine manipulates, their
//! REST collections and object-type codes, and the host-derived names the
//! engine gives them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// =============================================================================
// Naming Constants
// =============================================================================

/// Longest host name the array accepts
pub const MAX_HOSTNAME_LENGTH: usize = 31;

pub const HOSTGROUP_PREFIX: &str = "Flocker_HostGroup_";
pub const LUNGROUP_PREFIX: &str = "Flocker_LunGroup_";
pub const MAPPING_VIEW_PREFIX: &str = "Flocker_Mapping_View_";

/// Object type of a LUN
pub const LUN_OBJECT_TYPE: &str = "11";
/// Object type of a port group
pub const PORTGROUP_OBJECT_TYPE: &str = "257";
/// Object type of an FC initiator
pub const FC_INITIATOR_OBJECT_TYPE: &str = "223";

// =============================================================================
// Entity Kind
// =============================================================================

/// Array objects resolved by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Host,
    HostGroup,
    LunGroup,
    MappingView,
    IscsiInitiator,
}

impl EntityKind {
    /// Array object type code
    pub fn object_type(&self) -> &'static str {
        match self {
            EntityKind::Host => "21",
            EntityKind::HostGroup => "14",
            EntityKind::LunGroup => "256",
            EntityKind::MappingView => "245",
            EntityKind::IscsiInitiator => "222",
        }
    }

    /// REST collection
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Host => "/host",
            EntityKind::HostGroup => "/hostgroup",
            EntityKind::LunGroup => "/lungroup",
            EntityKind::MappingView => "/mappingview",
            EntityKind::IscsiInitiator => "/iscsi_initiator",
        }
    }

    /// Bounded listing query for this kind
    pub fn list_path(&self) -> String {
        let range = match self {
            EntityKind::Host => "[0-65535]",
            EntityKind::IscsiInitiator => "[0-256]",
            _ => "[0-8191]",
        };
        format!("{}?range={}", self.collection(), range)
    }

    /// Initiators are identified by their raw ID, everything else by NAME
    pub fn matches_by_id(&self) -> bool {
        matches!(self, EntityKind::IscsiInitiator)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Host => write!(f, "host"),
            EntityKind::HostGroup => write!(f, "hostgroup"),
            EntityKind::LunGroup => write!(f, "lungroup"),
            EntityKind::MappingView => write!(f, "mapping view"),
            EntityKind::IscsiInitiator => write!(f, "iscsi initiator"),
        }
    }
}

// =============================================================================
// Host Names
// =============================================================================

/// A host name as stored on the array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostName {
    /// Name used for lookup and creation
    pub name: String,
    /// Original node name when `name` had to be hashed
    pub original: Option<String>,
}

impl HostName {
    /// Derive the array host name for a node.
    ///
    /// Names longer than [`MAX_HOSTNAME_LENGTH`] bytes are replaced with a
    /// deterministic 30-character digest so creation and later lookups agree.
    pub fn for_node(node: &str) -> Self {
        if node.len() <= MAX_HOSTNAME_LENGTH {
            return Self {
                name: node.to_string(),
                original: None,
            };
        }

        let digest = Sha256::digest(node.as_bytes());
        Self {
            name: hex::encode(&digest[..15]),
            original: Some(node.to_string()),
        }
    }

    /// The node name this host was derived from
    pub fn node(&self) -> &str {
        self.original.as_deref().unwrap_or(&self.name)
    }
}

pub fn hostgroup_name(host_id: &str) -> String {
    format!("{}{}", HOSTGROUP_PREFIX, host_id)
}

pub fn lungroup_name(host_id: &str) -> String {
    format!("{}{}", LUNGROUP_PREFIX, host_id)
}

pub fn mapping_view_name(host_id: &str) -> String {
    format!("{}{}", MAPPING_VIEW_PREFIX, host_id)
}
