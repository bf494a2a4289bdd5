//! Metrics and monitoring for the team-queue service
//!
//! Prometheus collectors for the queue and admission passes, plus the HTTP
//! server that exposes them next to the health probes.

pub mod collector;
pub mod health;

pub use collector::{AdmissionMetrics, MetricsCollector, MetricsTimer, QueueMetrics, ServiceMetrics};
pub use health::{HealthEndpoints, HealthServer, HealthServerConfig};
