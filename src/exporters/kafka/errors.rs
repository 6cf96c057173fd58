// SPDX-License-Identifier: Apache-2.0

use crate::exporters::queue::QueueError;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Problems with the exporter configuration, detected before any export begins.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no brokers configured")]
    NoBrokers,

    #[error("no topic configured")]
    NoTopic,

    #[error("unknown encoding \"{0}\": no marshaller found")]
    UnknownEncoding(String),

    #[error("invalid sending queue: {0}")]
    InvalidQueue(String),

    #[error("invalid retry_on_failure: {0}")]
    InvalidRetry(String),

    /// librdkafka refused the generated client configuration
    #[error("invalid producer configuration: {0}")]
    InvalidProducer(String),
}

/// Errors that can occur during Kafka export operations
#[derive(Error, Debug)]
pub enum KafkaExportError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The eager metadata probe could not reach the brokers
    #[error("Failed to connect to Kafka brokers: {0}")]
    Connection(String),

    /// The batch could not be encoded, retrying will not help
    #[error("Failed to serialize telemetry data: {0}")]
    Serialization(String),

    /// Error from the Kafka producer while sending
    #[error("Kafka producer error: {0}")]
    Transport(#[from] KafkaError),

    #[error("Sending queue error: {0}")]
    Queue(#[from] QueueError),
}

impl From<(KafkaError, rdkafka::message::OwnedMessage)> for KafkaExportError {
    fn from((error, _): (KafkaError, rdkafka::message::OwnedMessage)) -> Self {
        KafkaExportError::Transport(error)
    }
}

impl From<prost::EncodeError> for KafkaExportError {
    fn from(e: prost::EncodeError) -> Self {
        KafkaExportError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for KafkaExportError {
    fn from(e: serde_json::Error) -> Self {
        KafkaExportError::Serialization(e.to_string())
    }
}

/// Determine if an error is retryable. Only broker sends are; everything
/// else is a property of the input or the configuration.
pub fn is_retryable_error(err: &KafkaExportError) -> bool {
    match err {
        KafkaExportError::Transport(_) => true,
        KafkaExportError::Config(_)
        | KafkaExportError::Connection(_)
        | KafkaExportError::Serialization(_)
        | KafkaExportError::Queue(_) => false,
    }
}

/// Result type for Kafka export operations
pub type Result<T> = std::result::Result<T, KafkaExportError>;
