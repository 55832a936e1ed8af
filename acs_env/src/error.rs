//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnvError {
    /// The worker pool already has its maximum number of tasks in flight
    #[error("Worker pool saturated: {in_flight} tasks in flight (limit {limit}), dropped '{task}'")]
    PoolSaturated {
        task: String,
        in_flight: usize,
        limit: usize,
    },

    /// Queue transport failed (connection lost, channel closed, etc.)
    #[error("Queue error: {0}")]
    QueueError(String),

    /// Message serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
}

impl EnvError {
    /// Creates a queue transport error.
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::QueueError(msg.into())
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::SerializationError(msg.to_string())
    }
}
