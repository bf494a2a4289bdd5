//! Error types for the queue service
//!
//! Operations return `anyhow::Result` so that host, transport and state
//! failures compose with `?`; the variants below name the failures callers
//! may want to match on.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific queue scenarios
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid player id: {input}")]
    InvalidPlayerId { input: String },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: u64 },

    #[error("Invalid host message: {reason}")]
    InvalidHostMessage { reason: String },

    #[error("Host unavailable: {message}")]
    HostUnavailable { message: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Frame worker unavailable: {message}")]
    WorkerUnavailable { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl QueueError {
    /// Error used when a shared state lock has been poisoned
    pub fn lock_poisoned(what: &str) -> Self {
        QueueError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}
