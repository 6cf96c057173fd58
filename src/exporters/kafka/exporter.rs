// SPDX-License-Identifier: Apache-2.0

use crate::exporters::kafka::errors::Result;
use crate::exporters::kafka::marshaller::Marshaller;
use crate::exporters::kafka::producer::Producer;
use crate::exporters::queue::BatchSizer;
use futures::future::BoxFuture;
use opentelemetry_proto::tonic::trace::v1::ResourceSpans;
use std::fmt::Debug;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Service};
use tracing::debug;

/// A batch of spans as it moves through the queue and retry layers. Retries
/// share the batch instead of copying it.
pub type TraceBatch = Arc<Vec<ResourceSpans>>;

impl BatchSizer for [ResourceSpans] {
    fn size_of(&self) -> usize {
        self.iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .map(|ss| ss.spans.len())
            .sum()
    }
}

impl BatchSizer for TraceBatch {
    fn size_of(&self) -> usize {
        self.as_slice().size_of()
    }
}

/// Sends trace batches to a single Kafka topic using one producer and one
/// marshaller.
pub struct KafkaExporter<P> {
    producer: P,
    marshaller: Arc<dyn Marshaller>,
    topic: String,
}

impl<P> Debug for KafkaExporter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaExporter")
            .field("topic", &self.topic)
            .field("encoding", &self.marshaller.encoding())
            .finish_non_exhaustive()
    }
}

impl<P: Producer> KafkaExporter<P> {
    pub fn new(producer: P, marshaller: Arc<dyn Marshaller>, topic: String) -> Self {
        Self {
            producer,
            marshaller,
            topic,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn encoding(&self) -> &str {
        self.marshaller.encoding()
    }

    /// Encode `traces` and send the resulting messages, in order, to the
    /// configured topic.
    ///
    /// Serialization failures are returned before anything is sent. The first
    /// failed send stops the push and its error is returned.
    pub async fn push(&self, traces: &[ResourceSpans]) -> Result<()> {
        let messages = self.marshaller.marshal(traces)?;

        debug!(
            topic = self.topic,
            messages = messages.len(),
            spans = traces.size_of(),
            "Sending traces to Kafka"
        );

        for message in &messages {
            self.producer.send(&self.topic, None, message.value()).await?;
        }
        Ok(())
    }

    /// Release the producer. No push may be in flight or issued afterwards.
    pub fn close(&self) -> Result<()> {
        debug!(topic = self.topic, "Closing Kafka exporter");
        self.producer.close()
    }
}

/// Tower service adapter over [`KafkaExporter::push`], so the push can be
/// wrapped in the retry layer.
pub struct PushService<P> {
    exporter: Arc<KafkaExporter<P>>,
}

impl<P> Clone for PushService<P> {
    fn clone(&self) -> Self {
        Self {
            exporter: self.exporter.clone(),
        }
    }
}

impl<P: Producer> PushService<P> {
    pub fn new(exporter: Arc<KafkaExporter<P>>) -> Self {
        Self { exporter }
    }
}

impl<P: Producer> Service<TraceBatch> for PushService<P> {
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, std::result::Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, batch: TraceBatch) -> Self::Future {
        let exporter = self.exporter.clone();
        Box::pin(async move {
            exporter.push(&batch).await?;
            Ok(())
        })
    }
}
