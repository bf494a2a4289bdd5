//! Configuration management for the team-queue service
//!
//! Configuration is loaded from environment variables or a TOML file,
//! validated, and then overridden by command line flags in the binary.

pub mod app;
pub mod queue;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, ServiceSettings};
pub use queue::QueueConfig;
