//! AMQP message handlers for inbound host events
//!
//! [`HostEventConsumer`] reads host messages off the events queue and hands
//! each decoded envelope to a [`MessageHandler`]. Deliveries are acked once
//! handled, failed or not, so a poison message cannot wedge the queue.

use crate::amqp::messages::{MessageEnvelope, MessageUtils};
use crate::error::{QueueError, Result};
use crate::types::HostMessage;
use amqprs::{
    channel::{BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trait defining the interface for handling AMQP messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one host message
    async fn handle_host_message(&self, envelope: MessageEnvelope<HostMessage>) -> Result<()>;

    /// Handle processing errors
    async fn handle_error(&self, error: QueueError, message_data: &[u8]);
}

/// Consumer for the host events queue
pub struct HostEventConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl HostEventConsumer {
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("team-queue-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(EventConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| QueueError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming host events from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel
            .basic_cancel(args)
            .await
            .map_err(|e| QueueError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            })?;

        info!("Stopped consuming host events");
        Ok(())
    }
}

struct EventConsumer {
    handler: Arc<dyn MessageHandler>,
}

impl EventConsumer {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    async fn process_message(&self, content: &[u8]) -> Result<()> {
        let envelope = MessageUtils::deserialize_host_message(content)?;

        debug!(
            "Host message parsed - correlation_id: {}, event: {}",
            envelope.correlation_id,
            envelope.payload.event.kind()
        );

        self.handler.handle_host_message(envelope).await
    }
}

#[async_trait]
impl AsyncConsumer for EventConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();

        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            deliver.routing_key(),
            content.len()
        );

        let start_time = std::time::Instant::now();

        match self.process_message(&content).await {
            Ok(_) => {
                debug!(
                    "Message processed - delivery_tag: {}, processing_time: {:.2}ms",
                    delivery_tag,
                    start_time.elapsed().as_secs_f64() * 1000.0
                );
            }
            Err(e) => {
                error!(
                    "Message processing failed - delivery_tag: {}, processing_time: {:.2}ms, error: {}",
                    delivery_tag,
                    start_time.elapsed().as_secs_f64() * 1000.0,
                    e
                );
                let error = match e.downcast::<QueueError>() {
                    Ok(queue_error) => queue_error,
                    Err(other) => QueueError::InternalError {
                        message: other.to_string(),
                    },
                };
                self.handler.handle_error(error, &content).await;
            }
        }

        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            warn!("Failed to ack delivery {}: {}", delivery_tag, e);
        }
    }
}

/// Mock message handler for testing
pub struct MockMessageHandler {
    pub received: Arc<tokio::sync::Mutex<Vec<MessageEnvelope<HostMessage>>>>,
    pub errors: Arc<tokio::sync::Mutex<Vec<String>>>,
}

impl Default for MockMessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMessageHandler {
    pub fn new() -> Self {
        Self {
            received: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            errors: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl MessageHandler for MockMessageHandler {
    async fn handle_host_message(&self, envelope: MessageEnvelope<HostMessage>) -> Result<()> {
        self.received.lock().await.push(envelope);
        Ok(())
    }

    async fn handle_error(&self, error: QueueError, _message_data: &[u8]) {
        self.errors.lock().await.push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::messages::HOST_EVENT_ROUTING_KEY;
    use crate::types::HostEvent;

    #[tokio::test]
    async fn test_mock_handler() {
        let handler = MockMessageHandler::new();
        let envelope = MessageEnvelope::new(
            HostMessage {
                snapshot: None,
                event: HostEvent::PlayerLoaded { player: 3 },
            },
            HOST_EVENT_ROUTING_KEY.to_string(),
        );

        handler.handle_host_message(envelope.clone()).await.unwrap();

        let received = handler.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].correlation_id, envelope.correlation_id);
    }

    #[tokio::test]
    async fn test_process_message_reports_bad_payload() {
        let handler = Arc::new(MockMessageHandler::new());
        let consumer = EventConsumer::new(handler.clone());

        assert!(consumer.process_message(b"garbage").await.is_err());
        assert!(handler.received.lock().await.is_empty());

        let envelope = MessageEnvelope::new(
            HostMessage {
                snapshot: None,
                event: HostEvent::MatchEnd,
            },
            HOST_EVENT_ROUTING_KEY.to_string(),
        );
        consumer
            .process_message(&envelope.to_bytes().unwrap())
            .await
            .unwrap();
        assert_eq!(handler.received.lock().await.len(), 1);
    }
}
