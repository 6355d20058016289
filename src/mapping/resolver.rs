//! Entity Resolver
//!
//! Finds the array-side ID of a named entity. The array offers no indexed
//! lookup, so every resolution lists the kind and scans for an exact match.

use crate::array::client::ArrayClient;
use crate::array::envelope::NamedRecord;
use crate::mapping::entity::{EntityKind, HostName};
use crate::error::Result;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Name-to-ID lookups against the array
#[derive(Clone)]
pub struct EntityResolver {
    client: ArrayClient,
}

impl EntityResolver {
    pub fn new(client: ArrayClient) -> Self {
        Self { client }
    }

    /// List every entity of `kind` as typed records
    pub async fn list<T: DeserializeOwned>(&self, kind: EntityKind) -> Result<Vec<T>> {
        let envelope = self.client.get(kind.list_path()).await?;
        envelope.into_list(&format!("list {}", kind))
    }

    /// Resolve `name` to an ID; `None` when absent.
    ///
    /// The first exact match wins; uniqueness is the array's concern.
    pub async fn resolve(&self, kind: EntityKind, name: &str) -> Result<Option<String>> {
        let records: Vec<NamedRecord> = self.list(kind).await?;
        let id = records
            .into_iter()
            .find(|r| {
                if kind.matches_by_id() {
                    r.id == name
                } else {
                    r.name == name
                }
            })
            .map(|r| r.id);

        debug!("Resolved {} '{}' to {:?}", kind, name, id);
        Ok(id)
    }

    /// Resolve a host by node name, applying the same hashing used at creation
    pub async fn resolve_host(&self, node: &str) -> Result<Option<String>> {
        let host = HostName::for_node(node);
        self.resolve(EntityKind::Host, &host.name).await
    }
}
