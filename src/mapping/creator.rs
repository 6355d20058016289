//! Idempotent Creator
//!
//! Find-or-create for named array entities. The array has no atomic
//! create-if-absent, and two orchestrator instances may provision the same
//! node concurrently, so a failed create is followed by a second lookup.

use crate::array::client::ArrayClient;
use crate::array::envelope::NamedRecord;
use crate::error::{Error, Result};
use crate::mapping::entity::{EntityKind, HostName};
use crate::mapping::resolver::EntityResolver;
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// Find-or-create over the entity kinds
#[derive(Clone)]
pub struct IdempotentCreator {
    client: ArrayClient,
    resolver: EntityResolver,
}

impl IdempotentCreator {
    pub fn new(client: ArrayClient, resolver: EntityResolver) -> Self {
        Self { client, resolver }
    }

    /// Return the ID of `name`, creating it if absent
    pub async fn ensure(&self, kind: EntityKind, name: &str) -> Result<String> {
        self.ensure_with_description(kind, name, None).await
    }

    /// Ensure the host for `node` exists.
    ///
    /// Over-long node names are hashed; the original is kept as the host
    /// description.
    pub async fn ensure_host(&self, node: &str) -> Result<String> {
        let host = HostName::for_node(node);
        self.ensure_with_description(EntityKind::Host, &host.name, host.original.as_deref())
            .await
    }

    async fn ensure_with_description(
        &self,
        kind: EntityKind,
        name: &str,
        description: Option<&str>,
    ) -> Result<String> {
        if let Some(id) = self.resolver.resolve(kind, name).await? {
            info!("Found existing {} '{}' with id {}", kind, name, id);
            return Ok(id);
        }

        match self.create(kind, name, description).await {
            Ok(id) => {
                info!("Created {} '{}' with id {}", kind, name, id);
                Ok(id)
            }
            Err(e) => {
                warn!(
                    "Failed to create {} '{}': {}. Checking if it exists on the array",
                    kind, name, e
                );
                match self.resolver.resolve(kind, name).await? {
                    Some(id) => {
                        info!("{} '{}' was created concurrently with id {}", kind, name, id);
                        Ok(id)
                    }
                    None => {
                        error!("Failed to create {} '{}' and it does not exist", kind, name);
                        Err(Error::Provisioning(format!(
                            "failed to create {} '{}': {}",
                            kind, name, e
                        )))
                    }
                }
            }
        }
    }

    /// Create `name` unconditionally and return its ID
    pub async fn create(
        &self,
        kind: EntityKind,
        name: &str,
        description: Option<&str>,
    ) -> Result<String> {
        let operation = format!("create {}", kind);
        let envelope = self.client.post(kind.collection(), create_body(kind, name, description)).await?;

        if kind.matches_by_id() {
            envelope.assert_success(&operation)?;
            return Ok(name.to_string());
        }

        let record: NamedRecord = envelope.into_data(&operation)?;
        Ok(record.id)
    }
}

fn create_body(kind: EntityKind, name: &str, description: Option<&str>) -> Value {
    match kind {
        EntityKind::Host => json!({
            "TYPE": kind.object_type(),
            "NAME": name,
            "OPERATIONSYSTEM": "0",
            "DESCRIPTION": description.unwrap_or_default(),
        }),
        EntityKind::HostGroup => json!({
            "TYPE": kind.object_type(),
            "NAME": name,
        }),
        EntityKind::LunGroup => json!({
            "DESCRIPTION": description.unwrap_or(name),
            "APPTYPE": "0",
            "GROUPTYPE": "0",
            "NAME": name,
        }),
        EntityKind::MappingView => json!({
            "NAME": name,
            "TYPE": kind.object_type(),
        }),
        EntityKind::IscsiInitiator => json!({
            "TYPE": kind.object_type(),
            "ID": name,
            "USECHAP": "false",
        }),
    }
}
