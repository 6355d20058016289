//! Provisioner Configuration
//!
//! Loads the XML configuration file that describes the array connection,
//! LUN creation parameters and per-initiator iSCSI settings. Raw documents
//! are deserialized with quick-xml and then validated into typed settings.

use crate::array::session::SessionConfig;
use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flocker/flocker_huawei_conf.xml";

// =============================================================================
// Raw Document
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
struct RawConfig {
    #[serde(rename = "Storage")]
    storage: RawStorage,
    #[serde(rename = "LUN", default)]
    lun: RawLun,
    #[serde(rename = "iSCSI", default)]
    iscsi: RawIscsi,
    #[serde(rename = "Instance", default)]
    instance: Option<RawInstance>,
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    #[serde(rename = "Protocol", default)]
    protocol: Option<String>,
    #[serde(rename = "RestURL", default)]
    rest_url: Option<String>,
    #[serde(rename = "UserName", default)]
    username: Option<String>,
    #[serde(rename = "UserPassword", default)]
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLun {
    #[serde(rename = "StoragePool", default)]
    storage_pool: Option<String>,
    #[serde(rename = "LUNType", default)]
    lun_type: Option<String>,
    #[serde(rename = "StripUnitSize", default)]
    strip_unit_size: Option<String>,
    #[serde(rename = "WriteType", default)]
    write_type: Option<String>,
    #[serde(rename = "MirrorSwitch", default)]
    mirror_switch: Option<String>,
    #[serde(rename = "Prefetch", default)]
    prefetch: Option<RawPrefetch>,
}

#[derive(Debug, Deserialize)]
struct RawPrefetch {
    #[serde(rename = "@Type", default)]
    kind: Option<String>,
    #[serde(rename = "@Value", default)]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIscsi {
    #[serde(rename = "Initiator", default)]
    initiators: Vec<RawInitiator>,
}

#[derive(Debug, Deserialize)]
struct RawInitiator {
    #[serde(rename = "@Name", default)]
    name: String,
    #[serde(rename = "@CHAPinfo", default)]
    chap_info: Option<String>,
    #[serde(rename = "@ALUA", default)]
    alua: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInstance {
    #[serde(rename = "ID", default)]
    id: Option<String>,
}

/// Trim a value and drop it when nothing is left
fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    trimmed(value).ok_or_else(|| Error::Configuration(format!("{} is missing", key)))
}

// =============================================================================
// Protocol
// =============================================================================

/// Host connectivity protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Iscsi,
    Fc,
}

impl std::str::FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "iSCSI" => Ok(Protocol::Iscsi),
            "FC" => Ok(Protocol::Fc),
            other => Err(Error::Configuration(format!(
                "wrong protocol '{}'; Protocol should be set to either iSCSI or FC",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Iscsi => write!(f, "iSCSI"),
            Protocol::Fc => write!(f, "FC"),
        }
    }
}

// =============================================================================
// LUN Parameters
// =============================================================================

/// Parameters applied to every LUN the provisioner creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LunParams {
    /// 0 = thick, 1 = thin
    pub lun_type: u8,
    pub strip_unit_size: String,
    pub write_type: String,
    pub mirror_switch: String,
    pub prefetch_type: String,
    pub prefetch_value: String,
}

impl Default for LunParams {
    fn default() -> Self {
        Self {
            lun_type: 0,
            strip_unit_size: "64".to_string(),
            write_type: "1".to_string(),
            mirror_switch: "1".to_string(),
            prefetch_type: "3".to_string(),
            prefetch_value: "0".to_string(),
        }
    }
}

impl LunParams {
    fn from_raw(raw: &RawLun) -> Result<Self> {
        let mut params = LunParams::default();

        if let Some(lun_type) = trimmed(raw.lun_type.clone()) {
            params.lun_type = match lun_type.as_str() {
                "Thick" => 0,
                "Thin" => 1,
                other => {
                    return Err(Error::Configuration(format!(
                        "LUNType must be 'Thin' or 'Thick', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(v) = trimmed(raw.strip_unit_size.clone()) {
            params.strip_unit_size = v;
        }
        if let Some(v) = trimmed(raw.write_type.clone()) {
            params.write_type = v;
        }
        if let Some(v) = trimmed(raw.mirror_switch.clone()) {
            params.mirror_switch = v;
        }

        let prefetch_type = raw.prefetch.as_ref().and_then(|p| trimmed(p.kind.clone()));
        match prefetch_type {
            Some(kind) => {
                let value = raw
                    .prefetch
                    .as_ref()
                    .and_then(|p| trimmed(p.value.clone()))
                    .unwrap_or_else(|| "0".to_string());
                params.prefetch_value = match kind.as_str() {
                    "0" | "3" => "0".to_string(),
                    "1" => {
                        let v: u64 = value.parse().map_err(|_| {
                            Error::Configuration(format!("Prefetch Value '{}' is not a number", value))
                        })?;
                        (v * 2).to_string()
                    }
                    "2" => value,
                    other => {
                        return Err(Error::Configuration(format!(
                            "PrefetchType must be in 0,1,2,3, got '{}'",
                            other
                        )))
                    }
                };
                params.prefetch_type = kind;
            }
            None => info!("Use default PrefetchType. PrefetchType: Intelligent"),
        }

        Ok(params)
    }
}

// =============================================================================
// iSCSI Settings
// =============================================================================

/// CHAP credentials for one initiator
#[derive(Clone, PartialEq, Eq)]
pub struct ChapCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ChapCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-initiator settings applied when binding to a host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitiatorSettings {
    pub chap: Option<ChapCredentials>,
    /// Multipath type, 0 or 1
    pub alua: Option<u8>,
}

impl InitiatorSettings {
    /// Check values that may have been set outside the XML parser
    pub fn validate(&self) -> Result<()> {
        match self.alua {
            Some(alua) if alua > 1 => Err(Error::Configuration(format!(
                "invalid ALUA value '{}'; ALUA value must be 1 or 0",
                alua
            ))),
            _ => Ok(()),
        }
    }

    fn from_raw(raw: &RawInitiator, name: &str) -> Result<Self> {
        let chap = match trimmed(raw.chap_info.clone()) {
            Some(info) => {
                let (username, password) = info.split_once(';').ok_or_else(|| {
                    Error::Configuration(format!(
                        "CHAPinfo of initiator {} must be 'user;password'",
                        name
                    ))
                })?;
                Some(ChapCredentials {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            None => None,
        };

        let alua = match trimmed(raw.alua.clone()).as_deref() {
            Some("0") => Some(0),
            Some("1") => Some(1),
            Some(other) => {
                return Err(Error::Configuration(format!(
                    "invalid ALUA value '{}' for initiator {}; ALUA value must be 1 or 0",
                    other, name
                )))
            }
            None => None,
        };

        Ok(Self { chap, alua })
    }
}

/// One validated `<Initiator>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatorEntry {
    pub name: String,
    pub settings: InitiatorSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IscsiConfig {
    pub initiators: Vec<InitiatorEntry>,
}

impl IscsiConfig {
    fn from_raw(raw: RawIscsi) -> Result<Self> {
        let initiators = raw
            .initiators
            .iter()
            .map(|i| {
                let name = i.name.trim().to_string();
                let settings = InitiatorSettings::from_raw(i, &name)?;
                Ok(InitiatorEntry { name, settings })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { initiators })
    }

    /// Settings configured for `initiator`; defaults when it is not listed
    pub fn settings_for(&self, initiator: &str) -> InitiatorSettings {
        match self.initiators.iter().find(|e| e.name == initiator) {
            Some(entry) => entry.settings.clone(),
            None => {
                debug!("No iSCSI settings configured for initiator {}", initiator);
                InitiatorSettings::default()
            }
        }
    }
}

// =============================================================================
// Provisioner Configuration
// =============================================================================

/// Validated provisioner configuration
#[derive(Clone)]
pub struct ProvisionerConfig {
    pub protocol: Protocol,
    pub rest_url: String,
    pub username: String,
    pub password: String,
    pub storage_pool: String,
    pub lun: LunParams,
    pub iscsi: IscsiConfig,
    /// Node identity used when the fleet inventory has no answer
    pub instance_id: Option<String>,
}

impl std::fmt::Debug for ProvisionerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerConfig")
            .field("protocol", &self.protocol)
            .field("rest_url", &self.rest_url)
            .field("username", &self.username)
            .field("storage_pool", &self.storage_pool)
            .field("lun", &self.lun)
            .field("iscsi", &self.iscsi)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl ProvisionerConfig {
    /// Parse and validate an XML document
    pub fn parse(xml: &str) -> Result<Self> {
        let raw: RawConfig = quick_xml::de::from_str(xml)?;

        let protocol = required(raw.storage.protocol, "Storage/Protocol")?.parse()?;
        let mut rest_url = required(raw.storage.rest_url, "Storage/RestURL")?;
        if !rest_url.ends_with('/') {
            rest_url.push('/');
        }
        let username = required(raw.storage.username, "Storage/UserName")?;
        // Passwords are taken verbatim.
        let password = raw
            .storage
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Configuration("Storage/UserPassword is missing".into()))?;

        let storage_pool = trimmed(raw.lun.storage_pool.clone()).ok_or_else(|| {
            Error::Configuration("invalid resource pool name; check LUN/StoragePool".into())
        })?;
        let lun = LunParams::from_raw(&raw.lun)?;

        let iscsi = IscsiConfig::from_raw(raw.iscsi)?;

        let instance_id = raw.instance.and_then(|i| trimmed(i.id));

        Ok(Self {
            protocol,
            rest_url,
            username,
            password,
            storage_pool,
            lun,
            iscsi,
            instance_id,
        })
    }

    /// Load and validate the configuration file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&text)?;
        info!(
            "Loaded configuration from {} (protocol {}, pool {})",
            path.display(),
            config.protocol,
            config.storage_pool
        );
        Ok(config)
    }

    /// Session settings for the configured array
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            rest_url: self.rest_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Instance Identity
// =============================================================================

/// A fresh node identity: URL-safe base64 of a random UUID
pub fn new_instance_id() -> String {
    URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes())
}

/// Return the instance ID stored in the file at `path`, generating and
/// persisting one when the file has none
pub fn ensure_instance_id(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    if let Some(id) = ProvisionerConfig::parse(&text)?.instance_id {
        return Ok(id);
    }

    let id = new_instance_id();
    let element = format!("<Instance><ID>{}</ID></Instance>", id);
    let updated = match instance_element(&text) {
        // Fill an empty <Instance> in place.
        Some((start, end)) => format!("{}{}{}", &text[..start], element, &text[end..]),
        None => {
            let closing = text.rfind("</config>").ok_or_else(|| {
                Error::Configuration(format!("{} has no closing </config> tag", path.display()))
            })?;
            format!("{}  {}\n{}", &text[..closing], element, &text[closing..])
        }
    };

    write_atomically(path, &updated)?;
    info!("Generated instance ID {} in {}", id, path.display());
    Ok(id)
}

/// Byte range of the `<Instance>` element, self-closing or not
fn instance_element(text: &str) -> Option<(usize, usize)> {
    let start = text.find("<Instance")?;
    let rest = &text[start..];
    let open_end = rest.find('>')?;
    if rest[..open_end].ends_with('/') {
        return Some((start, start + open_end + 1));
    }
    let close = rest.find("</Instance>")?;
    Some((start, start + close + "</Instance>".len()))
}

fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = PathBuf::from(path);
    tmp.set_extension("xml.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
