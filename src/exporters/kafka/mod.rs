// SPDX-License-Identifier: Apache-2.0

//! Kafka trace exporter.
//!
//! Batches of OTLP spans are encoded by a pluggable [`Marshaller`] and written
//! to a single Kafka topic using rdkafka.
//!
//! # Features
//!
//! - Encodings selected by name from a [`MarshallerRegistry`], `otlp_proto` built in
//! - Eager broker metadata probe with its own retry settings
//! - Bounded sending queue with a fixed pool of consumers
//! - Exponential backoff retry of failed sends
//! - SASL authentication and raw librdkafka producer settings
//!
//! # Modules
//!
//! - `config`: Configuration structures and validation
//! - `errors`: Error types specific to Kafka export operations
//! - `exporter`: Push path from spans to producer sends
//! - `factory`: Builds a running exporter from configuration
//! - `marshaller`: Encodings and the registry holding them
//! - `message`: Encoded message payloads
//! - `producer`: Kafka producer management

pub mod config;
pub mod errors;
pub mod exporter;
pub mod factory;
pub mod marshaller;
pub mod message;
pub mod producer;

#[cfg(test)]
mod tests;

pub use config::KafkaExporterConfig;
pub use errors::{ConfigError, KafkaExportError};
pub use exporter::{KafkaExporter, PushService, TraceBatch};
pub use factory::{
    KafkaTracesExporter, build_traces_exporter, build_traces_exporter_with_producer,
};
pub use marshaller::{Marshaller, MarshallerRegistry, OtlpJsonMarshaller, OtlpProtoMarshaller};
pub use message::MessageEnvelope;
pub use producer::{KafkaProducer, Producer};
