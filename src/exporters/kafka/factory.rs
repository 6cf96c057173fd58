// SPDX-License-Identifier: Apache-2.0

use crate::exporters::kafka::config::KafkaExporterConfig;
use crate::exporters::kafka::errors::{KafkaExportError, Result, is_retryable_error};
use crate::exporters::kafka::exporter::{KafkaExporter, PushService, TraceBatch};
use crate::exporters::kafka::marshaller::MarshallerRegistry;
use crate::exporters::kafka::producer::{KafkaProducer, Producer};
use crate::exporters::queue::{QueueCounters, QueueError, QueuedExporter};
use crate::exporters::retry::RetryPolicy;
use crate::telemetry::u64_counter;
use opentelemetry_proto::tonic::trace::v1::ResourceSpans;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::retry::Retry;
use tracing::{info, warn};

const EXPORTER_TYPE: &str = "kafka_traces";

type TracesService<P> = Retry<RetryPolicy<KafkaExportError>, PushService<P>>;

/// Trace exporter as handed to the host: queue, retry and push path wired
/// together.
///
/// [`KafkaTracesExporter::shutdown`] must be awaited before the exporter goes
/// away. Dropping it instead neither waits for queued batches nor flushes the
/// producer, so spans still in flight may be lost.
pub struct KafkaTracesExporter<P: Producer> {
    queue: QueuedExporter<TraceBatch, TracesService<P>>,
    exporter: Arc<KafkaExporter<P>>,
    closed: bool,
}

impl<P: Producer> KafkaTracesExporter<P> {
    /// Accept a batch for export.
    ///
    /// With the sending queue enabled this never waits: a full queue returns
    /// [`QueueError::Full`] and the spans are dropped. With the queue disabled
    /// the batch is pushed, with retries, before returning.
    pub async fn consume_traces(&self, traces: Vec<ResourceSpans>) -> Result<()> {
        match self.queue.consume(Arc::new(traces)).await {
            Ok(()) => Ok(()),
            Err(QueueError::Export(e)) => match e.downcast::<KafkaExportError>() {
                Ok(e) => Err(*e),
                Err(e) => Err(QueueError::Export(e).into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn topic(&self) -> &str {
        self.exporter.topic()
    }

    pub fn encoding(&self) -> &str {
        self.exporter.encoding()
    }

    /// Batches waiting in the sending queue
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stop accepting batches, drain the queue and close the producer.
    pub async fn shutdown(mut self) -> Result<()> {
        info!(topic = self.exporter.topic(), "Shutting down Kafka traces exporter");
        self.queue.shutdown().await;
        self.closed = true;
        self.exporter.close()
    }
}

impl<P: Producer> Drop for KafkaTracesExporter<P> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                topic = self.exporter.topic(),
                queued = self.queue.len(),
                "Kafka traces exporter dropped without shutdown, queued spans may be lost"
            );
        }
    }
}

/// Validate `config`, connect to the brokers and start the exporter.
///
/// When `metadata.full` is set the brokers must answer a metadata request
/// before this returns. Must be called within a tokio runtime.
pub async fn build_traces_exporter(
    config: KafkaExporterConfig,
    registry: &MarshallerRegistry,
) -> Result<KafkaTracesExporter<KafkaProducer>> {
    config.validate(registry)?;

    info!(
        brokers = config.brokers.join(","),
        topic = config.topic,
        encoding = config.encoding,
        "Connecting Kafka traces exporter"
    );
    let producer = KafkaProducer::connect(&config).await?;

    build_traces_exporter_with_producer(config, registry, producer)
}

/// Start the exporter on top of an already created producer.
pub fn build_traces_exporter_with_producer<P: Producer>(
    config: KafkaExporterConfig,
    registry: &MarshallerRegistry,
    producer: P,
) -> Result<KafkaTracesExporter<P>> {
    config.validate(registry)?;
    let marshaller = registry.resolve(&config.encoding)?;

    let exporter = Arc::new(KafkaExporter::new(
        producer,
        marshaller,
        config.topic.clone(),
    ));

    let cancel = CancellationToken::new();
    let policy = RetryPolicy::new(
        config.retry_on_failure.clone(),
        is_retryable_error,
        cancel.clone(),
    );
    let svc = Retry::new(policy, PushService::new(exporter.clone()));

    let counters = QueueCounters {
        sent: u64_counter("rotel_kafka_exporter_sent_spans"),
        send_failed: u64_counter("rotel_kafka_exporter_send_failed_spans"),
        enqueue_failed: u64_counter("rotel_kafka_exporter_enqueue_failed_spans"),
    };

    let queue = QueuedExporter::new(EXPORTER_TYPE, &config.sending_queue, svc, cancel, counters);

    info!(
        topic = config.topic,
        encoding = config.encoding,
        queue_enabled = config.sending_queue.enabled,
        consumers = config.sending_queue.num_consumers,
        retry_enabled = config.retry_on_failure.enabled,
        "Started Kafka traces exporter"
    );

    Ok(KafkaTracesExporter {
        queue,
        exporter,
        closed: false,
    })
}
