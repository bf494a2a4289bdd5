//! Main application state and service coordination
//!
//! [`AppState`] wires the broker connection, the host mirror, the admission
//! scheduler and the health server together and owns their background
//! tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{HostEventConsumer, MessageHandler};
use crate::amqp::messages::MessageEnvelope;
use crate::amqp::publisher::{AmqpCommandPublisher, CommandPublisher, PublisherConfig};
use crate::config::AppConfig;
use crate::error::{QueueError, Result as QueueResult};
use crate::host::HostMirror;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::queue::{AdmissionScheduler, EventDispatcher};
use crate::service::health::{HealthCheck, HealthStatus};
use crate::types::{EventOutcome, HostCommand, HostEvent, HostMessage, Reply, Verdict};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Message handler that feeds host messages through the queue
///
/// Each message first refreshes the host mirror, then goes to the
/// dispatcher; verdicts, replies and rewritten player info are published
/// back with the message's correlation id.
pub struct ProductionMessageHandler {
    mirror: Arc<HostMirror>,
    dispatcher: EventDispatcher,
    publisher: Arc<dyn CommandPublisher>,
    metrics_collector: Arc<MetricsCollector>,
    /// Set once the first snapshot has been applied
    synced: AtomicBool,
}

impl ProductionMessageHandler {
    pub fn new(
        mirror: Arc<HostMirror>,
        dispatcher: EventDispatcher,
        publisher: Arc<dyn CommandPublisher>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            mirror,
            dispatcher,
            publisher,
            metrics_collector,
            synced: AtomicBool::new(false),
        }
    }

    async fn process(&self, correlation_id: &str, message: HostMessage) -> QueueResult<()> {
        match message.snapshot {
            Some(snapshot) => {
                self.mirror.apply_snapshot(snapshot)?;
                if !self.synced.swap(true, Ordering::AcqRel) {
                    info!("First host snapshot received, syncing queue state");
                    let scheduler = self.dispatcher.scheduler();
                    scheduler.sync_end_screen()?;
                    scheduler.retag_all()?;
                }
            }
            None => self.mirror.observe_event(&message.event)?,
        }

        let outcome = match self.dispatcher.dispatch(&message.event) {
            Ok(outcome) => outcome,
            Err(e) if matches!(message.event, HostEvent::TeamChangeAttempt { .. }) => {
                // The host is blocked on a verdict
                error!("Team change check failed, allowing: {}", e);
                EventOutcome::verdict(Verdict::Allow)
            }
            Err(e) => return Err(e),
        };

        self.publish_outcome(correlation_id, &message.event, outcome)
            .await
    }

    async fn publish_outcome(
        &self,
        correlation_id: &str,
        event: &HostEvent,
        outcome: EventOutcome,
    ) -> QueueResult<()> {
        if let Some(verdict) = outcome.verdict {
            self.publisher
                .publish_command(HostCommand::Verdict {
                    in_reply_to: correlation_id.to_string(),
                    allow: verdict == Verdict::Allow,
                })
                .await?;
        }

        for reply in outcome.replies {
            let command = match reply {
                Reply::Channel(message) => HostCommand::Reply {
                    in_reply_to: correlation_id.to_string(),
                    message,
                },
                Reply::Tell { player, message } => HostCommand::Tell { player, message },
            };
            self.publisher.publish_command(command).await?;
        }

        if let (Some(value), HostEvent::PlayerInfoChanged { player, .. }) =
            (outcome.player_info, event)
        {
            self.publisher
                .publish_command(HostCommand::PlayerInfo {
                    in_reply_to: correlation_id.to_string(),
                    player: *player,
                    value,
                })
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl MessageHandler for ProductionMessageHandler {
    async fn handle_host_message(&self, envelope: MessageEnvelope<HostMessage>) -> QueueResult<()> {
        let start_time = Instant::now();
        let kind = envelope.payload.event.kind();

        let result = self
            .process(&envelope.correlation_id, envelope.payload)
            .await;

        let elapsed = start_time.elapsed();
        self.metrics_collector
            .record_amqp_operation(kind, result.is_ok(), elapsed);

        match &result {
            Ok(_) => debug!(
                "Host event {} ({}) handled in {:.2}ms",
                kind,
                envelope.correlation_id,
                elapsed.as_secs_f64() * 1000.0
            ),
            Err(e) => error!(
                "Host event {} ({}) failed after {:.2}ms: {}",
                kind,
                envelope.correlation_id,
                elapsed.as_secs_f64() * 1000.0,
                e
            ),
        }

        result
    }

    async fn handle_error(&self, error: QueueError, message_data: &[u8]) {
        self.metrics_collector
            .service()
            .amqp_errors_total
            .with_label_values(&["decode"])
            .inc();

        error!(
            "Message handler error - type: '{}', message_size: {} bytes",
            error,
            message_data.len()
        );

        if !message_data.is_empty() {
            let preview_len = std::cmp::min(100, message_data.len());
            let preview = String::from_utf8_lossy(&message_data[..preview_len]);
            error!("Message preview: {:?}", preview);
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    amqp_connection: Arc<AmqpConnection>,

    metrics_collector: Arc<MetricsCollector>,

    /// Host state and command channel
    mirror: Arc<HostMirror>,

    publisher: Arc<dyn CommandPublisher>,

    scheduler: AdmissionScheduler,

    /// Health endpoints, present while running
    health_server: Mutex<Option<Arc<HealthServer>>>,

    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    event_consumer: Mutex<Option<HostEventConsumer>>,

    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing team-queue service");
        info!(
            "Configuration: service={}, events_queue={}, commands_exchange={}",
            config.service.name, config.amqp.events_queue, config.amqp.commands_exchange
        );

        let amqp_connection = Self::initialize_amqp(&config).await?;
        let metrics_collector = Self::initialize_metrics()?;
        let publisher = Self::initialize_publisher(&config, &amqp_connection).await?;

        let mirror = Arc::new(HostMirror::new(publisher.clone()));
        let scheduler = AdmissionScheduler::with_metrics(
            mirror.clone(),
            mirror.clone(),
            mirror.clone(),
            config.queue.clone(),
            metrics_collector.clone(),
        );

        Ok(Self {
            config,
            amqp_connection,
            metrics_collector,
            mirror,
            publisher,
            scheduler,
            health_server: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            event_consumer: Mutex::new(None),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start the frame worker, health endpoints, consumption and background tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting team-queue service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await?;

        let worker = self
            .scheduler
            .start()
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to start frame worker: {}", e),
            })?;
        self.background_tasks.lock().await.push(worker);

        self.start_amqp_consumption().await?;
        self.start_background_tasks().await?;

        info!("✅ team-queue service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of team-queue service");

        *self.is_running.write().await = false;

        if let Some(consumer) = self.event_consumer.lock().await.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP message consumption stopped");
            }
        }

        // Let queued host calls drain before the worker goes away
        if self.scheduler.is_worker_started() {
            let drain = self.scheduler.flush();
            if tokio::time::timeout(Duration::from_secs(2), drain)
                .await
                .is_err()
            {
                warn!("Timed out waiting for the frame worker to drain");
            }
        }

        if let Some(health_server) = self.health_server.lock().await.take() {
            info!("Stopping health server...");
            if let Err(e) = health_server.stop().await {
                warn!("Failed to stop health server: {}", e);
            }
        }

        self.stop_background_tasks().await;

        let final_stats =
            self.scheduler
                .stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final admission statistics: {:?}", final_stats);
        info!("✅ team-queue service shutdown completed");

        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn scheduler(&self) -> &AdmissionScheduler {
        &self.scheduler
    }

    pub fn mirror(&self) -> Arc<HostMirror> {
        self.mirror.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Get AMQP connection for health checks
    pub fn amqp_connection(&self) -> Arc<AmqpConnection> {
        self.amqp_connection.clone()
    }

    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        let amqp_config =
            AmqpConfig::from_app_config(config).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    fn initialize_metrics() -> Result<Arc<MetricsCollector>, ServiceError> {
        let collector = MetricsCollector::new().map_err(|e| ServiceError::Initialization {
            message: format!("Failed to create metrics collector: {}", e),
        })?;
        Ok(Arc::new(collector))
    }

    async fn initialize_publisher(
        config: &AppConfig,
        connection: &AmqpConnection,
    ) -> Result<Arc<dyn CommandPublisher>, ServiceError> {
        let channel = connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to open AMQP channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            ..PublisherConfig::default()
        };

        let publisher = AmqpCommandPublisher::with_exchange(
            channel,
            publisher_config,
            &config.amqp.commands_exchange,
        )
        .await
        .map_err(|e| ServiceError::Initialization {
            message: format!("Failed to initialize command publisher: {}", e),
        })?;

        Ok(Arc::new(publisher))
    }

    async fn start_metrics_service(self: &Arc<Self>) -> Result<(), ServiceError> {
        let port = self.config.service.metrics_port;
        info!("Starting metrics and health endpoints on port {}", port);

        let health_config = HealthServerConfig {
            port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, self.metrics_collector.clone())
                .with_app_state(self.clone()),
        );
        *self.health_server.lock().await = Some(health_server.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server failed: {}", e);
            } else {
                info!("Health server task completed");
            }
        });
        self.background_tasks.lock().await.push(handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    async fn start_amqp_consumption(&self) -> Result<(), ServiceError> {
        let queue_name = self.config.amqp.events_queue.as_str();
        info!("Starting host event consumption on queue '{}'", queue_name);

        let channel = self
            .amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        debug!("Queue '{}' declared", queue_name);

        let message_handler = Arc::new(ProductionMessageHandler::new(
            self.mirror.clone(),
            EventDispatcher::new(self.scheduler.clone()),
            self.publisher.clone(),
            self.metrics_collector.clone(),
        ));

        let consumer = HostEventConsumer::new(message_handler, channel);
        consumer
            .start_consuming(queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming messages: {}", e),
            })?;

        *self.event_consumer.lock().await = Some(consumer);

        info!("Now listening for host events on '{}'", queue_name);
        Ok(())
    }

    async fn start_background_tasks(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting health metrics task (15s interval)...");

        let health_metrics_task = {
            let app_state = self.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(15));
                debug!("Health metrics task started");

                while app_state.is_running().await {
                    interval.tick().await;

                    let collector = app_state.metrics_collector();
                    collector
                        .service()
                        .uptime_seconds
                        .set(app_state.uptime().as_secs() as i64);

                    match HealthCheck::check(app_state.clone()).await {
                        Ok(health) => {
                            collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                collector.update_component_health(
                                    &check.name,
                                    check.status == HealthStatus::Healthy,
                                );
                            }
                            debug!(
                                "Health {} - {} queued, {} afk",
                                health.status,
                                health.stats.players_queued,
                                health.stats.players_afk
                            );
                        }
                        Err(e) => warn!("Health metrics update failed: {}", e),
                    }
                }

                debug!("Health metrics task stopped");
            })
        };

        self.background_tasks.lock().await.push(health_metrics_task);
        Ok(())
    }

    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("✅ All {} background tasks stopped", task_count);
    }
}
