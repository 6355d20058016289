//! Association Manager
//!
//! Checks, establishes and removes the many-to-many relations between array
//! entities. Every establish is check-then-act; because that is not
//! transactional on the array, an "already associated" reply from a lost
//! race counts as success.

use crate::array::client::ArrayClient;
use crate::array::envelope::{Envelope, NamedRecord};
use crate::error::Result;
use crate::mapping::entity::{EntityKind, LUN_OBJECT_TYPE, PORTGROUP_OBJECT_TYPE};
use serde_json::json;
use tracing::{debug, info};

// =============================================================================
// Relations
// =============================================================================

/// The relations the mapping engine manages.
///
/// In every variant the parent is the container (group or view) and the
/// child is the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// host-group ⊇ host
    HostInHostGroup,
    /// lun-group ⊇ LUN
    LunInLunGroup,
    /// mapping-view ⊇ host-group
    HostGroupInView,
    /// mapping-view ⊇ lun-group
    LunGroupInView,
    /// mapping-view ⊇ port-group
    PortGroupInView,
}

impl Relation {
    fn child_object_type(&self) -> &'static str {
        match self {
            Relation::HostInHostGroup => EntityKind::Host.object_type(),
            Relation::LunInLunGroup => LUN_OBJECT_TYPE,
            Relation::HostGroupInView => EntityKind::HostGroup.object_type(),
            Relation::LunGroupInView => EntityKind::LunGroup.object_type(),
            Relation::PortGroupInView => PORTGROUP_OBJECT_TYPE,
        }
    }

    fn is_view_relation(&self) -> bool {
        matches!(
            self,
            Relation::HostGroupInView | Relation::LunGroupInView | Relation::PortGroupInView
        )
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::HostInHostGroup => write!(f, "host to hostgroup"),
            Relation::LunInLunGroup => write!(f, "lun to lungroup"),
            Relation::HostGroupInView => write!(f, "hostgroup to mapping view"),
            Relation::LunGroupInView => write!(f, "lungroup to mapping view"),
            Relation::PortGroupInView => write!(f, "portgroup to mapping view"),
        }
    }
}

// =============================================================================
// Association Manager
// =============================================================================

#[derive(Clone)]
pub struct AssociationManager {
    client: ArrayClient,
}

impl AssociationManager {
    pub fn new(client: ArrayClient) -> Self {
        Self { client }
    }

    /// Whether `child` is currently a member of `parent`
    pub async fn is_associated(&self, relation: Relation, parent: &str, child: &str) -> Result<bool> {
        let operation = format!("check {} association", relation);

        // Group memberships are listed per group; view memberships are listed
        // per member, returning the views that hold it.
        let (path, wanted) = match relation {
            Relation::HostInHostGroup => (
                format!(
                    "/host/associate?TYPE=21&ASSOCIATEOBJTYPE=14&ASSOCIATEOBJID={}",
                    parent
                ),
                child,
            ),
            Relation::LunInLunGroup => (
                format!(
                    "/lun/associate?TYPE=11&ASSOCIATEOBJTYPE=256&ASSOCIATEOBJID={}",
                    parent
                ),
                child,
            ),
            _ => (
                format!(
                    "/mappingview/associate?TYPE=245&ASSOCIATEOBJTYPE={}&ASSOCIATEOBJID={}",
                    relation.child_object_type(),
                    child
                ),
                parent,
            ),
        };

        let records: Vec<NamedRecord> = self.client.get(path).await?.into_list(&operation)?;
        let found = records.iter().any(|r| r.id == wanted);
        debug!("{} {} -> {}: {}", relation, child, parent, found);
        Ok(found)
    }

    /// Associate unconditionally; "already associated" is success
    pub async fn associate(&self, relation: Relation, parent: &str, child: &str) -> Result<()> {
        let envelope = match relation {
            Relation::HostInHostGroup => {
                self.client
                    .post(
                        "/hostgroup/associate",
                        json!({
                            "TYPE": EntityKind::HostGroup.object_type(),
                            "ID": parent,
                            "ASSOCIATEOBJTYPE": relation.child_object_type(),
                            "ASSOCIATEOBJID": child,
                        }),
                    )
                    .await?
            }
            Relation::LunInLunGroup => {
                self.client
                    .post(
                        "/lungroup/associate",
                        json!({
                            "ID": parent,
                            "ASSOCIATEOBJTYPE": relation.child_object_type(),
                            "ASSOCIATEOBJID": child,
                        }),
                    )
                    .await?
            }
            _ => {
                self.client
                    .put("/MAPPINGVIEW/CREATE_ASSOCIATE", self.view_body(relation, parent, child))
                    .await?
            }
        };

        self.tolerate_duplicate(relation, parent, child, envelope)
    }

    /// Associate only if not already associated
    pub async fn ensure_associated(&self, relation: Relation, parent: &str, child: &str) -> Result<()> {
        if self.is_associated(relation, parent, child).await? {
            debug!("{} already associated: {} in {}", relation, child, parent);
            return Ok(());
        }
        self.associate(relation, parent, child).await
    }

    /// Remove `child` from `parent`
    pub async fn disassociate(&self, relation: Relation, parent: &str, child: &str) -> Result<()> {
        let envelope = match relation {
            Relation::HostInHostGroup => {
                self.client
                    .delete(
                        format!(
                            "/host/associate?TYPE=14&ID={}&ASSOCIATEOBJTYPE=21&ASSOCIATEOBJID={}",
                            parent, child
                        ),
                        None,
                    )
                    .await?
            }
            Relation::LunInLunGroup => {
                self.client
                    .delete(
                        format!(
                            "/lungroup/associate?ID={}&ASSOCIATEOBJTYPE=11&ASSOCIATEOBJID={}",
                            parent, child
                        ),
                        None,
                    )
                    .await?
            }
            _ => {
                self.client
                    .put("/mappingview/REMOVE_ASSOCIATE", self.view_body(relation, parent, child))
                    .await?
            }
        };

        envelope.assert_success(&format!("remove {} association", relation))?;
        info!("Removed {} association: {} from {}", relation, child, parent);
        Ok(())
    }

    fn view_body(&self, relation: Relation, view: &str, child: &str) -> serde_json::Value {
        debug_assert!(relation.is_view_relation());
        json!({
            "ASSOCIATEOBJTYPE": relation.child_object_type(),
            "ASSOCIATEOBJID": child,
            "TYPE": EntityKind::MappingView.object_type(),
            "ID": view,
        })
    }

    fn tolerate_duplicate(
        &self,
        relation: Relation,
        parent: &str,
        child: &str,
        envelope: Envelope,
    ) -> Result<()> {
        if envelope.is_already_associated() {
            info!(
                "{} association {} in {} was made concurrently",
                relation, child, parent
            );
            return Ok(());
        }
        envelope.assert_success(&format!("associate {}", relation))?;
        info!("Associated {}: {} in {}", relation, child, parent);
        Ok(())
    }

    // =========================================================================
    // Membership Queries
    // =========================================================================

    /// Lun groups the LUN currently belongs to
    pub async fn lungroups_of_lun(&self, lun: &str) -> Result<Vec<String>> {
        let path = format!(
            "/lungroup/associate?TYPE=256&ASSOCIATEOBJTYPE=11&ASSOCIATEOBJID={}",
            lun
        );
        let records: Vec<NamedRecord> = self
            .client
            .get(path)
            .await?
            .into_list("get lungroup id by lun id")?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    /// The lun group bound to a mapping view; a view holds at most one
    pub async fn lungroup_of_view(&self, view: &str) -> Result<Option<String>> {
        let path = format!(
            "/mappingview/associate/lungroup?TYPE=256&ASSOCIATEOBJTYPE=245&ASSOCIATEOBJID={}",
            view
        );
        let records: Vec<NamedRecord> = self
            .client
            .get(path)
            .await?
            .into_list("find lungroup from mapping view")?;
        Ok(records.into_iter().last().map(|r| r.id))
    }

    /// Hosts a LUN is mapped to
    pub async fn hosts_of_lun(&self, lun: &str) -> Result<Vec<NamedRecord>> {
        let path = format!("/host/associate?ASSOCIATEOBJTYPE=11&ASSOCIATEOBJID={}", lun);
        self.client.get(path).await?.into_list("query host of lun map")
    }
}
