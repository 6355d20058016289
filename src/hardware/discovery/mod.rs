//! Host Discovery Module
//!
//! Discovers iSCSI and FC initiator identities and SCSI block devices on
//! Linux hosts.

pub mod scanner;

pub use scanner::*;
