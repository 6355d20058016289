//! Array Response Envelope
//!
//! Every OceanStor REST response is `{"error": {"code", "description"}, "data"}`.
//! This module types that envelope and the records the provisioner reads
//! out of `data`.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

// =============================================================================
// Error Codes
// =============================================================================

/// Sentinel used when the array could not be reached at all
pub const ERROR_CONNECT_TO_SERVER: i64 = -403;
/// Object name already in use
pub const OBJECT_NAME_ALREADY_EXIST: i64 = 1077948993;
/// Object ID does not exist
pub const OBJECT_NOT_EXIST: i64 = 1077948996;
/// Host is already a member of the host group
pub const HOST_ALREADY_IN_HOSTGROUP: i64 = 1077937501;
/// LUN is already a member of the lun group
pub const LUN_ALREADY_IN_LUNGROUP: i64 = 1077936862;
/// Host group is already bound to the mapping view
pub const HOSTGROUP_ALREADY_IN_MAPPINGVIEW: i64 = 1073804556;
/// Lun group is already bound to the mapping view
pub const LUNGROUP_ALREADY_IN_MAPPINGVIEW: i64 = 1073804560;
/// Port group is already bound to the mapping view
pub const PORTGROUP_ALREADY_IN_MAPPINGVIEW: i64 = 1073804558;

/// Codes meaning "the association you asked for already exists"
pub const ALREADY_ASSOCIATED_CODES: &[i64] = &[
    HOST_ALREADY_IN_HOSTGROUP,
    LUN_ALREADY_IN_LUNGROUP,
    HOSTGROUP_ALREADY_IN_MAPPINGVIEW,
    LUNGROUP_ALREADY_IN_MAPPINGVIEW,
    PORTGROUP_ALREADY_IN_MAPPINGVIEW,
];

// =============================================================================
// Envelope
// =============================================================================

/// Error section of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i64,
    #[serde(default)]
    pub description: String,
}

/// A parsed array response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub error: ErrorInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Successful envelope with the given payload
    pub fn ok(data: Value) -> Self {
        Self {
            error: ErrorInfo {
                code: 0,
                description: "0".to_string(),
            },
            data: Some(data),
        }
    }

    /// Successful envelope without a payload
    pub fn empty() -> Self {
        Self {
            error: ErrorInfo {
                code: 0,
                description: "0".to_string(),
            },
            data: None,
        }
    }

    /// Failed envelope
    pub fn failure(code: i64, description: impl Into<String>) -> Self {
        Self {
            error: ErrorInfo {
                code,
                description: description.into(),
            },
            data: None,
        }
    }

    /// The envelope the transport synthesizes when the array is unreachable
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::failure(ERROR_CONNECT_TO_SERVER, reason)
    }

    pub fn is_success(&self) -> bool {
        self.error.code == 0
    }

    pub fn code(&self) -> i64 {
        self.error.code
    }

    /// Whether the failure is one of the "already associated" codes
    pub fn is_already_associated(&self) -> bool {
        ALREADY_ASSOCIATED_CODES.contains(&self.error.code)
    }

    /// Turn a non-zero code into an error for `operation`
    pub fn assert_success(&self, operation: &str) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }

        error!(
            "{} failed: code {}, {}",
            operation, self.error.code, self.error.description
        );

        if self.error.code == ERROR_CONNECT_TO_SERVER {
            return Err(Error::Connectivity {
                reason: self.error.description.clone(),
            });
        }

        Err(Error::ArrayRejected {
            operation: operation.to_string(),
            code: self.error.code,
            description: self.error.description.clone(),
        })
    }

    /// Assert success and that `data` is present
    pub fn require_data(&self, operation: &str) -> Result<&Value> {
        self.assert_success(operation)?;
        self.data.as_ref().ok_or_else(|| {
            error!("{}: \"data\" was not in result", operation);
            Error::MissingData {
                operation: operation.to_string(),
            }
        })
    }

    /// Assert success and decode `data` into `T`
    pub fn into_data<T: DeserializeOwned>(self, operation: &str) -> Result<T> {
        self.require_data(operation)?;
        let data = self.data.unwrap_or(Value::Null);
        Ok(serde_json::from_value(data)?)
    }

    /// Assert success and decode a listing; absent `data` means an empty list
    pub fn into_list<T: DeserializeOwned>(self, operation: &str) -> Result<Vec<T>> {
        self.assert_success(operation)?;
        match self.data {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(data) => Ok(serde_json::from_value(data)?),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// Any object listed with an ID and a NAME (host, groups, views)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "DESCRIPTION", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An iSCSI or FC initiator as listed by the array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiatorRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ISFREE", default)]
    pub is_free: String,
    #[serde(rename = "PARENTID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(rename = "RUNNINGSTATUS", default, skip_serializing_if = "Option::is_none")]
    pub running_status: Option<String>,
}

impl InitiatorRecord {
    pub fn free(&self) -> bool {
        self.is_free == "true"
    }
}

/// A LUN as returned by `GET /lun/<id>` or the LUN listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NAME", default)]
    pub name: String,
    /// Capacity in 512-byte sectors
    #[serde(rename = "CAPACITY", default)]
    pub capacity: String,
    #[serde(rename = "WWN", default)]
    pub wwn: String,
    #[serde(rename = "EXPOSEDTOINITIATOR", default)]
    pub exposed_to_initiator: String,
    #[serde(rename = "DESCRIPTION", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl LunRecord {
    /// Whether the LUN is currently mapped to some initiator ("in-use")
    pub fn in_use(&self) -> bool {
        self.exposed_to_initiator == "true"
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity.parse::<u64>().unwrap_or(0) * SECTOR_SIZE
    }
}

/// Bytes per array sector
pub const SECTOR_SIZE: u64 = 512;

/// A storage pool as listed by `GET /storagepool`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "USAGETYPE", default, skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<String>,
    #[serde(rename = "USERFREECAPACITY", default)]
    pub user_free_capacity: String,
    #[serde(rename = "DATASPACE", default, skip_serializing_if = "Option::is_none")]
    pub data_space: Option<String>,
}

/// Pool usage type for file-system pools, which cannot hold LUNs
pub const FILE_SYSTEM_POOL_TYPE: &str = "2";

impl PoolRecord {
    pub fn is_file_system_pool(&self) -> bool {
        self.usage_type.as_deref() == Some(FILE_SYSTEM_POOL_TYPE)
    }

    /// Free capacity in sectors, preferring DATASPACE when the array
    /// reports it. `None` when the array sends something unparseable.
    pub fn free_sectors(&self) -> Option<u64> {
        self.data_space
            .as_deref()
            .unwrap_or(&self.user_free_capacity)
            .trim()
            .parse()
            .ok()
    }
}

/// `GET /system/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRecord {
    #[serde(rename = "PRODUCTVERSION", default)]
    pub product_version: String,
}

/// `GET /MAPPINGVIEW/<id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingViewRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NAME", default)]
    pub name: String,
    #[serde(rename = "AVAILABLEHOSTLUNIDLIST", default)]
    pub available_host_lun_ids: Value,
}

impl MappingViewRecord {
    /// Host LUN IDs still free on this view.
    ///
    /// Firmware returns either a JSON array or a string holding one.
    pub fn available_host_lun_ids(&self) -> Vec<u32> {
        fn collect(values: &[Value]) -> Vec<u32> {
            values
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .collect()
        }

        match &self.available_host_lun_ids {
            Value::Array(values) => collect(values),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Array(values)) => collect(&values),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

/// Login response payload
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "deviceid")]
    pub device_id: String,
    #[serde(rename = "iBaseToken")]
    pub token: String,
}
