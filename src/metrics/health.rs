//! Health check endpoints and Prometheus metrics server

use crate::metrics::collector::MetricsCollector;
use crate::queue::AdmissionScheduler;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "team-queue";

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub app_state: Option<Arc<AppState>>,
}

/// HTTP endpoints for probes, metrics and queue statistics
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                app_state: None,
            },
            shutdown_tx,
        }
    }

    /// Set the application state for health checks
    pub fn with_app_state(mut self, app_state: Arc<AppState>) -> Self {
        self.state.app_state = Some(app_state);
        self
    }

    /// Serve until [`stop`](Self::stop) is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health server to {}", addr))?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                debug!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .route("/queue", get(queue_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }
        Ok(())
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": crate::VERSION,
        "endpoints": ["/health", "/ready", "/alive", "/metrics", "/stats", "/queue"]
    }))
}

/// Liveness as JSON
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Health check requested");

    let status = match &state.app_state {
        Some(app_state) => HealthCheck::liveness_check(app_state.clone())
            .await
            .unwrap_or(HealthStatus::Unhealthy),
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": SERVICE_NAME,
                    "version": crate::VERSION,
                    "error": "Service not initialized"
                })),
            )
        }
    };

    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (
        code,
        Json(json!({
            "status": status,
            "service": SERVICE_NAME,
            "version": crate::VERSION
        })),
    )
}

async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match &state.app_state {
        Some(app_state) => match HealthCheck::readiness_check(app_state.clone()).await {
            Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
            Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
            Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
            Err(e) => {
                error!("Readiness check failed: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
            }
        },
        None => (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized"),
    }
}

async fn alive_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    match &state.app_state {
        Some(app_state) => match HealthCheck::liveness_check(app_state.clone()).await {
            Ok(HealthStatus::Healthy) => (StatusCode::OK, "Alive"),
            _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
        },
        None => (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized"),
    }
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    match HealthEndpoints::get_metrics_text(state.metrics_collector.clone()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                "Failed to encode metrics".to_string(),
            )
        }
    }
}

/// Queue snapshot and component checks for humans
async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(app_state) = &state.app_state else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "service": {"name": SERVICE_NAME, "version": crate::VERSION, "status": "error"},
                "error": "Service not initialized",
                "timestamp": chrono::Utc::now()
            })),
        );
    };

    match HealthCheck::check(app_state.clone()).await {
        Ok(health) => {
            let scheduler = app_state.scheduler();
            let locks = scheduler.locks().unwrap_or_default();
            let stats = json!({
                "service": {
                    "name": SERVICE_NAME,
                    "version": crate::VERSION,
                    "status": health.status,
                    "uptime": health.stats.uptime_info
                },
                "queue": {
                    "queued": scheduler.queued_players().unwrap_or_default().len(),
                    "afk": scheduler.afk_players().unwrap_or_default().len(),
                    "locks": {
                        "red": locks.red,
                        "blue": locks.blue
                    },
                    "end_screen": scheduler.is_end_screen().unwrap_or(false),
                    "push_pending": scheduler.is_push_pending()
                },
                "admission": scheduler.stats().unwrap_or_default(),
                "components": health.checks,
                "timestamp": chrono::Utc::now()
            });
            (StatusCode::OK, Json(stats))
        }
        Err(e) => {
            error!("Failed to get stats: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "service": {"name": SERVICE_NAME, "version": crate::VERSION, "status": "error"},
                    "error": "Failed to get service stats",
                    "timestamp": chrono::Utc::now()
                })),
            )
        }
    }
}

/// Who is waiting, in admission order, with the tag each player shows
async fn queue_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(app_state) = &state.app_state else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Service not initialized" })),
        );
    };

    match HealthEndpoints::queue_listing(app_state.scheduler()) {
        Ok(listing) => (StatusCode::OK, Json(listing)),
        Err(e) => {
            error!("Failed to list queue: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read queue state" })),
            )
        }
    }
}

/// Programmatic access to what the endpoints serve
pub struct HealthEndpoints;

impl HealthEndpoints {
    pub fn queue_listing(scheduler: &AdmissionScheduler) -> Result<serde_json::Value> {
        let mut queued = Vec::new();
        for (index, player) in scheduler.queued_players()?.into_iter().enumerate() {
            queued.push(json!({
                "position": index + 1,
                "id": player,
                "name": scheduler.display_name(player),
                "tag": scheduler.tag_of(player)?
            }));
        }

        let afk: Vec<_> = scheduler
            .afk_players()?
            .into_iter()
            .map(|player| json!({ "id": player, "name": scheduler.display_name(player) }))
            .collect();

        Ok(json!({ "queued": queued, "afk": afk }))
    }

    pub fn get_metrics_text(metrics_collector: Arc<MetricsCollector>) -> Result<String> {
        let metric_families = metrics_collector.registry().gather();
        TextEncoder::new()
            .encode_to_string(&metric_families)
            .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::MockCommandPublisher;
    use crate::config::QueueConfig;
    use crate::host::HostMirror;
    use crate::types::{ConnectionState, GameInfo, MatchPhase, PlayerInfo, ServerSnapshot, Team};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt; // for oneshot

    fn server() -> (HealthServer, Arc<MetricsCollector>) {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        (
            HealthServer::new(HealthServerConfig::default(), collector.clone()),
            collector,
        )
    }

    async fn status_of(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let (server, _) = server();
        assert_eq!(status_of(server.create_router(), "/").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (server, collector) = server();
        collector.record_admitted(Team::Red);
        collector.update_health_status(2);

        let response = server
            .create_router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));
    }

    #[tokio::test]
    async fn test_endpoints_without_app_state() {
        let (server, _) = server();
        let app = server.create_router();

        for uri in ["/health", "/ready", "/alive", "/stats", "/queue"] {
            assert_eq!(
                status_of(app.clone(), uri).await,
                StatusCode::SERVICE_UNAVAILABLE,
                "{} should be unavailable",
                uri
            );
        }
    }

    #[tokio::test]
    async fn test_404_handling() {
        let (server, _) = server();
        assert_eq!(
            status_of(server.create_router(), "/nonexistent").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_metrics_text() {
        let (_, collector) = server();
        collector.record_enqueued("command");

        let metrics_text = HealthEndpoints::get_metrics_text(collector).unwrap();
        assert!(metrics_text.contains("team_queue"));
    }

    #[tokio::test]
    async fn test_queue_listing() {
        let snapshot = ServerSnapshot {
            players: vec![
                PlayerInfo::new(1, "Anarki", Team::Spectator, ConnectionState::Active),
                PlayerInfo::new(2, "Bones", Team::Spectator, ConnectionState::Active),
            ],
            game: Some(GameInfo {
                gametype: "ca".to_string(),
                phase: MatchPhase::PreGame,
                team_size: 4,
            }),
            max_clients: 16,
        };
        let mirror = Arc::new(HostMirror::with_snapshot(
            Arc::new(MockCommandPublisher::new()),
            snapshot,
        ));
        let scheduler = AdmissionScheduler::new(
            mirror.clone(),
            mirror.clone(),
            mirror,
            QueueConfig::default(),
        );
        scheduler.enqueue(2, None, "test").unwrap();
        scheduler.set_afk(1).unwrap();

        let listing = HealthEndpoints::queue_listing(&scheduler).unwrap();
        assert_eq!(listing["queued"][0]["name"], "Bones");
        assert_eq!(listing["queued"][0]["position"], 1);
        assert_eq!(listing["queued"][0]["tag"], "(1)");
        assert_eq!(listing["afk"][0]["id"], 1);
    }
}
