//! Volume name encoding
//!
//! A LUN name carries the dataset it backs and the cluster that owns it:
//! `f` + URL-safe base64 of the 16 dataset UUID bytes (22 chars, unpadded)
//! + the first 8 chars of the cluster ID. Array names are length-limited,
//! which is why the UUID is not stored in its textual form.

use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

const NAME_PREFIX: char = 'f';
const ENCODED_UUID_LEN: usize = 22;
const CLUSTER_TAG_LEN: usize = 8;

/// Array-side name of the LUN backing `dataset_id`
pub fn encode_name(dataset_id: &Uuid, cluster_id: &str) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(dataset_id.as_bytes());
    let tag: String = cluster_id.chars().take(CLUSTER_TAG_LEN).collect();
    format!("{}{}{}", NAME_PREFIX, encoded, tag)
}

/// Dataset ID carried by a LUN name; the cluster suffix is ignored
pub fn decode_name(name: &str) -> Result<Uuid> {
    let invalid = || Error::InvalidVolumeName {
        name: name.to_string(),
    };

    let encoded = name.get(1..1 + ENCODED_UUID_LEN).ok_or_else(invalid)?;
    let bytes = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| invalid())?;
    Uuid::from_slice(&bytes).map_err(|_| invalid())
}

/// Whether a LUN name was produced for `cluster_id`
pub fn is_cluster_volume(name: &str, cluster_id: &str) -> bool {
    if !name.starts_with(NAME_PREFIX) || name.len() <= ENCODED_UUID_LEN + 2 {
        return false;
    }
    match name.get(1 + ENCODED_UUID_LEN..) {
        Some(tag) => cluster_id.contains(tag),
        None => false,
    }
}
