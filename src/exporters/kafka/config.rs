// SPDX-License-Identifier: Apache-2.0

use crate::exporters::kafka::errors::ConfigError;
use crate::exporters::kafka::marshaller::{MarshallerRegistry, OTLP_PROTO_ENCODING};
use crate::exporters::queue::QueueConfig;
use crate::exporters::retry::RetryConfig;
use rdkafka::ClientConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BROKER: &str = "localhost:9092";
pub const DEFAULT_TOPIC: &str = "otlp";
pub const DEFAULT_ENCODING: &str = OTLP_PROTO_ENCODING;
pub const DEFAULT_METADATA_FULL: bool = true;
pub const DEFAULT_METADATA_RETRY_MAX: u32 = 3;
pub const DEFAULT_METADATA_RETRY_BACKOFF: Duration = Duration::from_millis(250);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// SASL mechanism
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub enum SaslMechanism {
    #[serde(rename = "PLAIN")]
    Plain,
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256,
    #[serde(rename = "SCRAM-SHA-512")]
    ScramSha512,
}

impl SaslMechanism {
    /// Convert to the string value expected by librdkafka
    pub fn to_kafka_value(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// Security protocol used to talk to brokers
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub enum SecurityProtocol {
    #[default]
    #[serde(rename = "PLAINTEXT")]
    Plaintext,
    #[serde(rename = "SSL")]
    Ssl,
    #[serde(rename = "SASL_PLAINTEXT")]
    SaslPlaintext,
    #[serde(rename = "SASL_SSL")]
    SaslSsl,
}

impl SecurityProtocol {
    /// Convert to the string value expected by librdkafka
    pub fn to_kafka_value(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::Ssl => "ssl",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
            SecurityProtocol::SaslSsl => "sasl_ssl",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SaslConfig {
    pub username: String,
    pub password: String,
    pub mechanism: SaslMechanism,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub security_protocol: Option<SecurityProtocol>,
    pub sasl: Option<SaslConfig>,
}

/// Retry settings for broker metadata requests. These help when the broker
/// is starting at the same time as the exporter.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetadataRetryConfig {
    /// Number of retries after the first failed metadata request
    pub max: u32,
    /// Wait between metadata requests (also used by librdkafka while a
    /// leader election is in progress)
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for MetadataRetryConfig {
    fn default() -> Self {
        Self {
            max: DEFAULT_METADATA_RETRY_MAX,
            backoff: DEFAULT_METADATA_RETRY_BACKOFF,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Maintain metadata for all topics instead of only the ones in use.
    /// When set, metadata is also fetched while building the exporter so that
    /// unreachable brokers are reported up front.
    pub full: bool,
    pub retry: MetadataRetryConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            full: DEFAULT_METADATA_FULL,
            retry: MetadataRetryConfig::default(),
        }
    }
}

/// Configuration for the Kafka trace exporter
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct KafkaExporterConfig {
    /// Kafka broker addresses as host:port
    pub brokers: Vec<String>,

    /// Broker version to assume, handed to librdkafka as is
    pub protocol_version: Option<String>,

    pub topic: String,

    /// Name of the marshaller used to encode batches
    pub encoding: String,

    pub metadata: MetadataConfig,

    /// Producer delivery timeout. This is the only timeout applied to sends.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Client ID for the Kafka producer
    pub client_id: String,

    pub auth: AuthConfig,

    /// Raw librdkafka producer settings, applied last
    pub producer_config: HashMap<String, String>,

    pub sending_queue: QueueConfig,

    pub retry_on_failure: RetryConfig,
}

impl Default for KafkaExporterConfig {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER.to_string()],
            protocol_version: None,
            topic: DEFAULT_TOPIC.to_string(),
            encoding: DEFAULT_ENCODING.to_string(),
            metadata: MetadataConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            client_id: "rotel".to_string(),
            auth: AuthConfig::default(),
            producer_config: HashMap::new(),
            sending_queue: QueueConfig::default(),
            retry_on_failure: RetryConfig::default(),
        }
    }
}

impl KafkaExporterConfig {
    /// Create a new Kafka exporter configuration
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            ..Default::default()
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    pub fn with_metadata_full(mut self, full: bool) -> Self {
        self.metadata.full = full;
        self
    }

    pub fn with_metadata_retry(mut self, max: u32, backoff: Duration) -> Self {
        self.metadata.retry = MetadataRetryConfig { max, backoff };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_sasl_auth(
        mut self,
        username: String,
        password: String,
        mechanism: SaslMechanism,
        security_protocol: SecurityProtocol,
    ) -> Self {
        self.auth = AuthConfig {
            security_protocol: Some(security_protocol),
            sasl: Some(SaslConfig {
                username,
                password,
                mechanism,
            }),
        };
        self
    }

    /// Set custom producer configuration parameters
    pub fn with_custom_config(mut self, custom_config: Vec<(String, String)>) -> Self {
        for (key, value) in custom_config {
            self.producer_config.insert(key, value);
        }
        self
    }

    pub fn with_sending_queue(mut self, queue: QueueConfig) -> Self {
        self.sending_queue = queue;
        self
    }

    pub fn with_retry_on_failure(mut self, retry: RetryConfig) -> Self {
        self.retry_on_failure = retry;
        self
    }

    /// Check the configuration against the marshallers available in `registry`.
    /// Rules are evaluated in order and the first failure is returned.
    pub fn validate(&self, registry: &MarshallerRegistry) -> Result<(), ConfigError> {
        if self.brokers.is_empty() {
            return Err(ConfigError::NoBrokers);
        }
        if self.topic.is_empty() {
            return Err(ConfigError::NoTopic);
        }
        if !registry.contains(&self.encoding) {
            return Err(ConfigError::UnknownEncoding(self.encoding.clone()));
        }
        if self.sending_queue.enabled {
            if self.sending_queue.queue_size == 0 {
                return Err(ConfigError::InvalidQueue(
                    "queue_size must be positive".to_string(),
                ));
            }
            if self.sending_queue.num_consumers == 0 {
                return Err(ConfigError::InvalidQueue(
                    "num_consumers must be positive".to_string(),
                ));
            }
        }
        if self.retry_on_failure.enabled {
            let retry = &self.retry_on_failure;
            if retry.initial_interval.is_zero() {
                return Err(ConfigError::InvalidRetry(
                    "initial_interval must be positive".to_string(),
                ));
            }
            if retry.max_interval < retry.initial_interval {
                return Err(ConfigError::InvalidRetry(
                    "max_interval must not be less than initial_interval".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Build rdkafka ClientConfig from this configuration
    pub fn build_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();

        config.set("bootstrap.servers", self.brokers.join(","));
        config.set("client.id", &self.client_id);

        // The producer's delivery timeout bounds every send
        config.set("message.timeout.ms", self.timeout.as_millis().to_string());

        if let Some(ref version) = self.protocol_version {
            config.set("api.version.request", "false");
            config.set("broker.version.fallback", version);
        }

        config.set(
            "topic.metadata.refresh.sparse",
            (!self.metadata.full).to_string(),
        );
        config.set(
            "topic.metadata.refresh.fast.interval.ms",
            self.metadata.retry.backoff.as_millis().to_string(),
        );

        if let Some(ref protocol) = self.auth.security_protocol {
            config.set("security.protocol", protocol.to_kafka_value());
        }
        if let Some(ref sasl) = self.auth.sasl {
            config.set("sasl.mechanism", sasl.mechanism.to_kafka_value());
            config.set("sasl.username", &sasl.username);
            config.set("sasl.password", &sasl.password);
        }

        // Custom producer configuration overrides built-in options if conflicts exist
        for (key, value) in &self.producer_config {
            config.set(key, value);
        }

        config
    }
}
