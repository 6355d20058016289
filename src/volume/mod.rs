//! Volume Lifecycle
//!
//! The orchestrator-facing side of the provisioner: volume naming and the
//! [`BlockDeviceApi`](crate::domain::BlockDeviceApi) implementation.

pub mod driver;
pub mod naming;

pub use driver::*;
pub use naming::*;
