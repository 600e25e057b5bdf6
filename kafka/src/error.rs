//! Error types for the Kafka client.

use thiserror::Error;

/// Result type alias for Kafka operations.
pub type Result<T> = std::result::Result<T, KafkaError>;

/// Errors that can occur during Kafka operations.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Error from the underlying rdkafka library.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Invalid session configuration, detected before a session is created.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The delivery report for a submitted message was lost.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Error writing operator output or reading a config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing a JSON configuration document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}
