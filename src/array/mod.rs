//! Array Session Module
//!
//! Authenticated REST access to an OceanStor array:
//! - Session: login, token, base URL, transport
//! - Envelope: typed responses and the success check
//! - Client: verb helpers shared by the mapping engine

pub mod client;
pub mod envelope;
pub mod lun;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

pub use client::*;
pub use envelope::*;
pub use lun::*;
pub use session::*;
