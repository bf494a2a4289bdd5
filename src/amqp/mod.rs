//! AMQP integration for the queue service
//!
//! Host events arrive on a durable queue and commands for the host go out
//! on a topic exchange, both JSON in a [`messages::MessageEnvelope`].

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{HostEventConsumer, MessageHandler};
pub use messages::*;
pub use publisher::{AmqpCommandPublisher, CommandPublisher, MockCommandPublisher, PublisherConfig};
