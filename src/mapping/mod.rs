//! Mapping Engine
//!
//! Reconciles hosts, initiators, host groups, lun groups and mapping views on
//! the array so that a LUN becomes (or stops being) visible to a host:
//! - Entity: names, object type codes and host name hashing
//! - Resolver: name-to-ID lookups
//! - Creator: idempotent find-or-create
//! - Association: membership checks and changes
//! - Initiator: iSCSI and FC registration
//! - Orchestrator: the map and unmap procedures

pub mod association;
pub mod creator;
pub mod entity;
pub mod initiator;
pub mod orchestrator;
pub mod resolver;

pub use association::*;
pub use creator::*;
pub use entity::*;
pub use initiator::*;
pub use orchestrator::*;
pub use resolver::*;
