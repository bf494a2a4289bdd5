//! Service layer for the team-queue service
//!
//! Application state, the production message handler and health checks.

pub mod app;
pub mod health;

pub use app::{AppState, ProductionMessageHandler, ServiceError};
pub use health::{HealthCheck, HealthStatus};
