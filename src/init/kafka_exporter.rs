// SPDX-License-Identifier: Apache-2.0

use crate::exporters::kafka::config::{
    KafkaExporterConfig, MetadataConfig, MetadataRetryConfig, SaslMechanism, SecurityProtocol,
};
use crate::exporters::queue::QueueConfig;
use crate::init::parse::{parse_broker_list, parse_key_val};
use crate::init::retry::GlobalExporterRetryArgs;
use clap::{ArgAction, Args, ValueEnum};
use std::time::Duration;

crate::define_exporter_retry_args!(
    KafkaRetryArgs,
    "kafka-exporter",
    "ROTEL_KAFKA_EXPORTER",
    "Kafka Exporter"
);

#[derive(Debug, Args, Clone)]
pub struct KafkaExporterArgs {
    /// Kafka broker addresses (comma-separated)
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_BROKERS",
        default_value = "localhost:9092"
    )]
    pub kafka_exporter_brokers: String,

    /// Broker version to assume instead of querying the brokers, e.g. 2.1.0
    #[arg(long, env = "ROTEL_KAFKA_EXPORTER_PROTOCOL_VERSION")]
    pub kafka_exporter_protocol_version: Option<String>,

    /// Topic name for traces
    #[arg(long, env = "ROTEL_KAFKA_EXPORTER_TOPIC", default_value = "otlp")]
    pub kafka_exporter_topic: String,

    /// Encoding used for trace messages
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_ENCODING",
        default_value = "otlp_proto"
    )]
    pub kafka_exporter_encoding: String,

    /// Fetch metadata for all topics, and check broker connectivity on startup
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_METADATA_FULL",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub kafka_exporter_metadata_full: bool,

    /// Retries of the startup metadata request
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_METADATA_RETRY_MAX",
        default_value_t = 3
    )]
    pub kafka_exporter_metadata_retry_max: u32,

    /// Wait between metadata requests
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_METADATA_RETRY_BACKOFF",
        default_value = "250ms",
        value_parser = humantime::parse_duration,
    )]
    pub kafka_exporter_metadata_retry_backoff: Duration,

    /// Producer delivery timeout
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration,
    )]
    pub kafka_exporter_timeout: Duration,

    /// Client ID for the Kafka producer
    #[arg(long, env = "ROTEL_KAFKA_EXPORTER_CLIENT_ID", default_value = "rotel")]
    pub kafka_exporter_client_id: String,

    /// SASL username for authentication
    #[arg(long, env = "ROTEL_KAFKA_EXPORTER_SASL_USERNAME")]
    pub kafka_exporter_sasl_username: Option<String>,

    /// SASL password for authentication
    #[arg(long, env = "ROTEL_KAFKA_EXPORTER_SASL_PASSWORD")]
    pub kafka_exporter_sasl_password: Option<String>,

    /// SASL mechanism
    #[arg(value_enum, long, env = "ROTEL_KAFKA_EXPORTER_SASL_MECHANISM")]
    pub kafka_exporter_sasl_mechanism: Option<KafkaSaslMechanism>,

    /// Security protocol, defaults to sasl-plaintext when SASL credentials are set
    #[arg(value_enum, long, env = "ROTEL_KAFKA_EXPORTER_SECURITY_PROTOCOL")]
    pub kafka_exporter_security_protocol: Option<KafkaSecurityProtocol>,

    /// Custom Kafka producer configuration parameters (key=value pairs). These will override built-in options if conflicts exist.
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_CUSTOM_CONFIG",
        value_parser = parse_key_val::<String, String>,
        value_delimiter = ','
    )]
    pub kafka_exporter_custom_config: Vec<(String, String)>,

    /// Buffer batches in a bounded queue and export them in the background
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_SENDING_QUEUE_ENABLED",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub kafka_exporter_sending_queue_enabled: bool,

    /// Number of background export tasks
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_SENDING_QUEUE_NUM_CONSUMERS",
        default_value_t = 10
    )]
    pub kafka_exporter_sending_queue_num_consumers: usize,

    /// Maximum number of batches waiting in the queue
    #[arg(
        long,
        env = "ROTEL_KAFKA_EXPORTER_SENDING_QUEUE_SIZE",
        default_value_t = 5000
    )]
    pub kafka_exporter_sending_queue_size: usize,

    #[command(flatten)]
    pub retry: KafkaRetryArgs,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum KafkaSaslMechanism {
    #[value(name = "plain")]
    Plain,
    #[value(name = "scram-sha-256")]
    ScramSha256,
    #[value(name = "scram-sha-512")]
    ScramSha512,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum KafkaSecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl From<KafkaSaslMechanism> for SaslMechanism {
    fn from(value: KafkaSaslMechanism) -> Self {
        match value {
            KafkaSaslMechanism::Plain => SaslMechanism::Plain,
            KafkaSaslMechanism::ScramSha256 => SaslMechanism::ScramSha256,
            KafkaSaslMechanism::ScramSha512 => SaslMechanism::ScramSha512,
        }
    }
}

impl From<KafkaSecurityProtocol> for SecurityProtocol {
    fn from(value: KafkaSecurityProtocol) -> Self {
        match value {
            KafkaSecurityProtocol::Plaintext => SecurityProtocol::Plaintext,
            KafkaSecurityProtocol::Ssl => SecurityProtocol::Ssl,
            KafkaSecurityProtocol::SaslPlaintext => SecurityProtocol::SaslPlaintext,
            KafkaSecurityProtocol::SaslSsl => SecurityProtocol::SaslSsl,
        }
    }
}

impl KafkaExporterArgs {
    pub fn build_config(&self, global_retry: &GlobalExporterRetryArgs) -> KafkaExporterConfig {
        let mut config = KafkaExporterConfig::new(parse_broker_list(&self.kafka_exporter_brokers))
            .with_topic(self.kafka_exporter_topic.clone())
            .with_encoding(self.kafka_exporter_encoding.clone())
            .with_timeout(self.kafka_exporter_timeout)
            .with_client_id(self.kafka_exporter_client_id.clone())
            .with_custom_config(self.kafka_exporter_custom_config.clone())
            .with_sending_queue(QueueConfig {
                enabled: self.kafka_exporter_sending_queue_enabled,
                num_consumers: self.kafka_exporter_sending_queue_num_consumers,
                queue_size: self.kafka_exporter_sending_queue_size,
            })
            .with_retry_on_failure(self.retry.to_retry_config(global_retry));

        config.metadata = MetadataConfig {
            full: self.kafka_exporter_metadata_full,
            retry: MetadataRetryConfig {
                max: self.kafka_exporter_metadata_retry_max,
                backoff: self.kafka_exporter_metadata_retry_backoff,
            },
        };

        if let Some(ref version) = self.kafka_exporter_protocol_version {
            config = config.with_protocol_version(version.clone());
        }

        // Configure SASL if credentials are provided
        if let (Some(username), Some(password), Some(mechanism)) = (
            &self.kafka_exporter_sasl_username,
            &self.kafka_exporter_sasl_password,
            self.kafka_exporter_sasl_mechanism,
        ) {
            let protocol = self
                .kafka_exporter_security_protocol
                .map_or(SecurityProtocol::SaslPlaintext, Into::into);
            config = config.with_sasl_auth(
                username.clone(),
                password.clone(),
                mechanism.into(),
                protocol,
            );
        } else {
            config.auth.security_protocol = self.kafka_exporter_security_protocol.map(Into::into);
        }

        config
    }
}
