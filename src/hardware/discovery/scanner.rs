//! Host Scanner
//!
//! Reads initiator identities and block devices from the local host and
//! drives SCSI bus rescans and device removal through sysfs.

use crate::domain::ports::{HostDiscoverer, LocalBlockDevice};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

// =============================================================================
// Constants
// =============================================================================

const INITIATOR_FILE: &str = "etc/iscsi/initiatorname.iscsi";
const FC_HOST_CLASS: &str = "sys/class/fc_host";
const SCSI_HOST_CLASS: &str = "sys/class/scsi_host";
const SYS_BLOCK: &str = "sys/block";

const INITIATOR_KEY: &str = "InitiatorName=";
const FC_PORT_ONLINE: &str = "Online";

// =============================================================================
// Scanner Configuration
// =============================================================================

/// Configuration for the host scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Filesystem root holding `etc/` and `sys/` (for testing)
    pub root: PathBuf,
    /// Include loopback devices
    pub include_loopback: bool,
    /// Include device mapper devices
    pub include_dm: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            include_loopback: false,
            include_dm: false,
        }
    }
}

// =============================================================================
// Host Scanner
// =============================================================================

/// Host discovery backed by `/etc` and sysfs
pub struct HostScanner {
    config: ScannerConfig,
}

impl HostScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.config.root.join(relative)
    }

    /// Read a sysfs attribute, trimmed
    fn read_attr(&self, base: &Path, attr: &str) -> Result<String> {
        let path = base.join(attr);
        fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|e| Error::HostDiscovery(format!("Failed to read {}: {}", path.display(), e)))
    }

    fn write_attr(&self, path: &Path, value: &str) -> Result<()> {
        fs::write(path, value)
            .map_err(|e| Error::HostDiscovery(format!("Failed to write {}: {}", path.display(), e)))
    }

    /// Entries of a sysfs class directory, sorted by name; empty when the
    /// class does not exist on this host
    fn class_entries(&self, relative: &str) -> Result<Vec<(String, PathBuf)>> {
        let dir = self.path(relative);
        if !dir.exists() {
            debug!("No sysfs class at {:?}", dir);
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            entries.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
        }
        entries.sort();
        Ok(entries)
    }

    fn should_include_device(&self, name: &str) -> bool {
        if !self.config.include_loopback && name.starts_with("loop") {
            return false;
        }
        if !self.config.include_dm && name.starts_with("dm-") {
            return false;
        }
        !(name.starts_with("ram") || name.starts_with("zram") || name.starts_with("md"))
    }
}

#[async_trait]
impl HostDiscoverer for HostScanner {
    async fn iscsi_initiator(&self) -> Result<Option<String>> {
        let path = self.path(INITIATOR_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("can't find iscsi initiator: {} is missing", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let initiator = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.starts_with('#'))
            .find_map(|l| l.strip_prefix(INITIATOR_KEY))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        match &initiator {
            Some(name) => info!("get iscsi initiator={}", name),
            None => error!("can't find iscsi initiator in {}", path.display()),
        }
        Ok(initiator)
    }

    async fn fc_wwpns(&self) -> Result<Vec<String>> {
        let mut wwpns = Vec::new();
        for (name, port) in self.class_entries(FC_HOST_CLASS)? {
            let state = self.read_attr(&port, "port_state").unwrap_or_default();
            if state != FC_PORT_ONLINE {
                debug!("FC host {} is {}", name, state);
                continue;
            }
            let wwpn = self.read_attr(&port, "port_name")?;
            wwpns.push(wwpn.trim_start_matches("0x").to_ascii_lowercase());
        }
        Ok(wwpns)
    }

    async fn rescan(&self) -> Result<()> {
        for (name, host) in self.class_entries(SCSI_HOST_CLASS)? {
            // One unwritable adapter must not stop the others from scanning.
            if let Err(e) = self.write_attr(&host.join("scan"), "- - -") {
                warn!("Rescan of SCSI host {} failed: {}", name, e);
            }
        }
        Ok(())
    }

    async fn block_devices(&self) -> Result<Vec<LocalBlockDevice>> {
        let mut devices = Vec::new();
        for (name, dev) in self.class_entries(SYS_BLOCK)? {
            if !self.should_include_device(&name) {
                continue;
            }
            let wwid = self.read_attr(&dev, "device/wwid").ok().filter(|w| !w.is_empty());
            devices.push(LocalBlockDevice { name, wwid });
        }
        Ok(devices)
    }

    async fn remove_device(&self, name: &str) -> Result<()> {
        let path = self.path(SYS_BLOCK).join(name).join("device/delete");
        self.write_attr(&path, "1")?;
        info!("Removed SCSI device {}", name);
        Ok(())
    }
}
