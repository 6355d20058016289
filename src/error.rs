//! Error types for the OceanStor provisioner
//!
//! Provides structured error types for the array session, the mapping
//! engine, the volume lifecycle shim and the host-side collaborators.

use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Array Session Errors
    // =========================================================================
    #[error("Cannot reach array: {reason}")]
    Connectivity { reason: String },

    #[error("Array login rejected: {0}")]
    Authentication(String),

    #[error("Array rejected {operation}: code {code}, {description}")]
    ArrayRejected {
        operation: String,
        code: i64,
        description: String,
    },

    #[error("Array response for {operation} carried no data")]
    MissingData { operation: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Mapping Errors
    // =========================================================================
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("LUN not found on array: {lun_id}")]
    LunNotFound { lun_id: String },

    // =========================================================================
    // Volume Lifecycle Errors
    // =========================================================================
    #[error("Unknown volume: {volume_id}")]
    UnknownVolume { volume_id: String },

    #[error("Volume is not attached: {volume_id}")]
    UnattachedVolume { volume_id: String },

    #[error("Volume is already attached: {volume_id}")]
    AlreadyAttached { volume_id: String },

    #[error("Invalid volume name: {name}")]
    InvalidVolumeName { name: String },

    // =========================================================================
    // Host-side Errors
    // =========================================================================
    #[error("Host discovery failed: {0}")]
    HostDiscovery(String),

    #[error("Device not found for volume: {volume_id}")]
    DeviceNotFound { volume_id: String },

    #[error("Fleet inventory error: {0}")]
    Inventory(String),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// The provisioner itself never retries; this only classifies.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Configuration(_)
                | Error::Authentication(_)
                | Error::UnknownVolume { .. }
                | Error::UnattachedVolume { .. }
                | Error::AlreadyAttached { .. }
                | Error::InvalidVolumeName { .. }
                | Error::LunNotFound { .. }
        )
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connectivity { .. } | Error::Http(_))
    }

    /// Whether this error is one of the lifecycle signals the orchestrator
    /// expects verbatim.
    pub fn is_lifecycle_signal(&self) -> bool {
        matches!(
            self,
            Error::UnknownVolume { .. }
                | Error::UnattachedVolume { .. }
                | Error::AlreadyAttached { .. }
        )
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;
