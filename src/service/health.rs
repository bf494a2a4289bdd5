//! Health checks for the queue service
//!
//! Liveness only asks whether the service is running; readiness also
//! needs the frame worker up and the broker connection open.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value exported as `team_queue_service_health_status`
    pub fn as_gauge(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// Combine two statuses, keeping the worse one
    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.as_gauge() <= other.as_gauge() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Set when the component is not healthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Queue statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub players_queued: usize,
    pub players_afk: usize,
    pub passes_executed: u64,
    pub players_admitted: u64,
    pub joins_vetoed: u64,
    pub uptime_info: String,
}

impl HealthCheck {
    /// Check every component and gather queue statistics
    ///
    /// A service that is not running yet reports degraded rather than
    /// unhealthy so the components can be probed before start.
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(&app_state).await,
            Self::check_scheduler(&app_state),
            Self::check_amqp_health(&app_state),
        ];

        let status = checks
            .iter()
            .map(|check| match check.name.as_str() {
                "service_running" if check.status == HealthStatus::Unhealthy => {
                    HealthStatus::Degraded
                }
                _ => check.status,
            })
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        let stats = Self::gather_service_stats(&app_state);

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle host events
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_scheduler(&app_state)
            .status
            .worst(Self::check_amqp_health(&app_state).status))
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_scheduler(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();
        let scheduler = app_state.scheduler();

        let (status, message) = match scheduler.stats() {
            Err(e) => (
                HealthStatus::Unhealthy,
                Some(format!("Scheduler state unavailable: {}", e)),
            ),
            Ok(_) if !scheduler.is_worker_started() => (
                HealthStatus::Degraded,
                Some("Frame worker not started".to_string()),
            ),
            Ok(_) => (HealthStatus::Healthy, None),
        };

        ComponentCheck {
            name: "admission_scheduler".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_amqp_health(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.amqp_connection().is_alive() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("AMQP connection closed".to_string()),
            )
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let scheduler = app_state.scheduler();
        let uptime_info = format!("Up {}s", app_state.uptime().as_secs());

        let (queued, afk, stats) = match (
            scheduler.queued_players(),
            scheduler.afk_players(),
            scheduler.stats(),
        ) {
            (Ok(queued), Ok(afk), Ok(stats)) => (queued.len(), afk.len(), stats),
            _ => {
                debug!("Scheduler state unavailable for health stats");
                return ServiceStats {
                    uptime_info,
                    ..ServiceStats::default()
                };
            }
        };

        ServiceStats {
            players_queued: queued,
            players_afk: afk,
            passes_executed: stats.passes_executed,
            players_admitted: stats.players_admitted,
            joins_vetoed: stats.joins_vetoed,
            uptime_info,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
