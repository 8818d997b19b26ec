//! Error types for the messaging core.

use crate::types::SubscriptionId;
use thiserror::Error;

/// Main error type for node, subscription and executor operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Node is inactive: {0}")]
    NodeInactive(String),

    /// Dequeue found nothing pending. Expected during normal flow control.
    #[error("Queue is empty")]
    Empty,

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Invalid queue capacity: {0}")]
    InvalidCapacity(usize),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Node belongs to another context: {0}")]
    ForeignNode(String),

    #[error("Executor is stopped")]
    ExecutorStopped,

    #[error("Executor is already spinning")]
    AlreadySpinning,

    #[error("Context has been shut down")]
    ContextShutdown,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::Serialization(e.to_string())
    }
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, BusError>;
