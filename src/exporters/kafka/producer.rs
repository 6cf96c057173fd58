// SPDX-License-Identifier: Apache-2.0

use crate::exporters::kafka::config::KafkaExporterConfig;
use crate::exporters::kafka::errors::{ConfigError, KafkaExportError, Result};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Broker connection used by the exporter.
///
/// Implementations own partitioning and transport-level timeouts, and must be
/// safe to share between concurrent senders.
pub trait Producer: Send + Sync + 'static {
    /// Send one message to `topic`. A `None` key leaves partition assignment
    /// to the broker client.
    fn send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        value: &[u8],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Flush outstanding messages and release the connection
    fn close(&self) -> Result<()>;
}

/// rdkafka backed producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl Debug for KafkaProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KafkaProducer {
    /// Create the producer. When `metadata.full` is set the cluster metadata is
    /// fetched before returning, so that unreachable brokers fail here rather
    /// than on the first send.
    pub async fn connect(config: &KafkaExporterConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .build_client_config()
            .create()
            .map_err(|e| ConfigError::InvalidProducer(e.to_string()))?;

        let producer = Self {
            producer,
            timeout: config.timeout,
        };

        if config.metadata.full {
            producer
                .probe_metadata(config.metadata.retry.max, config.metadata.retry.backoff)
                .await?;
        } else {
            debug!("Skipping Kafka metadata probe, connectivity is checked on first send");
        }

        Ok(producer)
    }

    async fn probe_metadata(&self, max_retries: u32, backoff: Duration) -> Result<()> {
        let mut attempt = 0;
        loop {
            let producer = self.producer.clone();
            let timeout = self.timeout;
            // fetch_metadata blocks the calling thread
            let res = tokio::task::spawn_blocking(move || {
                producer
                    .client()
                    .fetch_metadata(None, Timeout::After(timeout))
                    .map(|m| (m.brokers().len(), m.topics().len()))
            })
            .await
            .map_err(|e| KafkaExportError::Connection(e.to_string()))?;

            match res {
                Ok((brokers, topics)) => {
                    info!(brokers, topics, "Fetched Kafka cluster metadata");
                    return Ok(());
                }
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        delay = ?backoff,
                        "Failed to fetch Kafka metadata, will retry after delay."
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(KafkaExportError::Connection(e.to_string())),
            }
        }
    }
}

impl Producer for KafkaProducer {
    async fn send(&self, topic: &str, key: Option<&[u8]>, value: &[u8]) -> Result<()> {
        let mut record = FutureRecord::<[u8], [u8]>::to(topic).payload(value);
        if let Some(key) = key {
            record = record.key(key);
        }

        // No wait on the local queue: delivery is bounded only by message.timeout.ms
        let delivery = self
            .producer
            .send(record, Timeout::After(Duration::ZERO))
            .await?;

        debug!(
            topic,
            partition = delivery.partition,
            offset = delivery.offset,
            "Message delivered to Kafka"
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        debug!("Flushing Kafka producer");
        self.producer.flush(Timeout::After(self.timeout))?;
        Ok(())
    }
}
