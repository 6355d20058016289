//! Hardware Module
//!
//! Host-side collaborators of the provisioner: initiator and block device
//! discovery, and the fleet inventory that maps this host to its instance.

pub mod discovery;
pub mod inventory;

pub use discovery::*;
pub use inventory::*;
