//! AMQP command publisher for outbound host commands

use crate::amqp::messages::{MessageEnvelope, MessageUtils, HOST_COMMANDS_EXCHANGE};
use crate::error::{QueueError, Result};
use crate::types::*;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for sending commands to the game host
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Publish a single command
    async fn publish_command(&self, command: HostCommand) -> Result<()>;
}

/// Configuration for command publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
    /// Correlation ids remembered for deduplication before the cache resets
    pub dedup_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
            dedup_capacity: 10_000,
        }
    }
}

/// AMQP-based command publisher
pub struct AmqpCommandPublisher {
    channel: Channel,
    config: PublisherConfig,
    exchange: String,
    published_messages: Mutex<HashSet<String>>,
}

impl AmqpCommandPublisher {
    /// Create a publisher on the default commands exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        Self::with_exchange(channel, config, HOST_COMMANDS_EXCHANGE).await
    }

    /// Create a publisher on a named exchange
    pub async fn with_exchange(
        channel: Channel,
        config: PublisherConfig,
        exchange: &str,
    ) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            exchange: exchange.to_string(),
            published_messages: Mutex::new(HashSet::new()),
        };

        publisher.setup_exchange().await?;

        Ok(publisher)
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.exchange, "topic");
        self.channel
            .exchange_declare(args)
            .await
            .map_err(|e| QueueError::AmqpConnectionFailed {
                message: format!("Failed to declare commands exchange: {}", e),
            })?;

        info!("Declared host commands exchange {}", self.exchange);
        Ok(())
    }

    /// Publish an envelope with retry and backoff
    pub async fn publish_envelope(&self, envelope: &MessageEnvelope<HostCommand>) -> Result<()> {
        if self.config.enable_deduplication {
            let published = self
                .published_messages
                .lock()
                .map_err(|_| QueueError::lock_poisoned("published messages"))?;
            if published.contains(&envelope.correlation_id) {
                debug!(
                    "Command {} already published, skipping",
                    envelope.correlation_id
                );
                return Ok(());
            }
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        let mut published = self
                            .published_messages
                            .lock()
                            .map_err(|_| QueueError::lock_poisoned("published messages"))?;
                        if published.len() >= self.config.dedup_capacity {
                            published.clear();
                        }
                        published.insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Published {} as {} to {}",
                        envelope.routing_key, envelope.correlation_id, self.exchange
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish command {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for command {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    async fn try_publish(&self, envelope: &MessageEnvelope<HostCommand>) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| QueueError::AmqpConnectionFailed {
                message: format!("Failed to publish command: {}", e),
            })?;

        Ok(())
    }

    /// Number of correlation ids in the deduplication cache
    pub fn cached_message_count(&self) -> usize {
        self.published_messages
            .lock()
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CommandPublisher for AmqpCommandPublisher {
    async fn publish_command(&self, command: HostCommand) -> Result<()> {
        let routing_key = MessageUtils::get_routing_key(&command);
        let envelope = MessageEnvelope::new(command, routing_key.to_string());
        self.publish_envelope(&envelope).await
    }
}

/// Command publisher that records instead of sending
#[derive(Debug, Default)]
pub struct MockCommandPublisher {
    published: Mutex<Vec<HostCommand>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MockCommandPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command published so far
    pub fn published(&self) -> Vec<HostCommand> {
        self.published
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut commands) = self.published.lock() {
            commands.clear();
        }
    }

    /// Make subsequent publishes fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandPublisher for MockCommandPublisher {
    async fn publish_command(&self, command: HostCommand) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(QueueError::AmqpConnectionFailed {
                message: "mock publisher failure".to_string(),
            }
            .into());
        }
        self.published
            .lock()
            .map_err(|_| QueueError::lock_poisoned("published commands"))?
            .push(command);
        Ok(())
    }
}
