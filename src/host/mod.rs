//! Game host collaborators
//!
//! [`provider`] defines what the queue needs from a match server;
//! [`mirror`] implements it on top of the AMQP transport.

pub mod mirror;
pub mod provider;

pub use mirror::HostMirror;
pub use provider::{DenyAll, GameHost, NoStoredTags, PrivilegeCheck, TagStore};
