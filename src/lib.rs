//! Team Queue - spectator queue and team admission for match servers
//!
//! Spectators who want to play wait in an ordered queue. Whenever a team
//! slot may have opened, the admission scheduler moves the longest-waiting
//! eligible spectators onto the smaller team, keeping red and blue even.
//! The game host talks to the service over AMQP.

pub mod amqp;
pub mod config;
pub mod error;
pub mod host;
pub mod metrics;
pub mod queue;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{QueueError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::CommandPublisher;
pub use host::{GameHost, HostMirror, PrivilegeCheck, TagStore};
pub use queue::{AdmissionScheduler, EventDispatcher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
