//! Error types for the vitals simulator

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Simulator errors
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Kafka client error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Failed to enqueue message for topic {topic}: {source}")]
    Enqueue {
        topic: String,
        #[source]
        source: KafkaError,
    },

    #[error("Flush failed with {pending} message(s) outstanding: {reason}")]
    Flush { pending: usize, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, SimulatorError>;
