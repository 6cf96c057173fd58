// SPDX-License-Identifier: Apache-2.0
#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use crate::exporters::kafka::config::KafkaExporterConfig;
    use crate::exporters::kafka::errors::{
        ConfigError, KafkaExportError, Result, is_retryable_error,
    };
    use crate::exporters::kafka::exporter::{KafkaExporter, PushService, TraceBatch};
    use crate::exporters::kafka::factory::{
        build_traces_exporter, build_traces_exporter_with_producer,
    };
    use crate::exporters::kafka::marshaller::{Marshaller, MarshallerRegistry};
    use crate::exporters::kafka::message::MessageEnvelope;
    use crate::exporters::kafka::producer::Producer;
    use crate::exporters::queue::{QueueConfig, QueueError};
    use crate::exporters::retry::RetryConfig;
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use opentelemetry_proto::tonic::trace::v1::ResourceSpans;
    use prost::Message;
    use rdkafka::error::KafkaError;
    use rdkafka::types::RDKafkaErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio_test::{assert_err, assert_ok};
    use tower::ServiceExt;
    use utilities::otlp::FakeOTLP;

    #[derive(Debug, Clone, PartialEq)]
    struct SentMessage {
        topic: String,
        key: Option<Vec<u8>>,
        value: Vec<u8>,
    }

    #[derive(Default)]
    struct MockState {
        sent: Mutex<Vec<SentMessage>>,
        attempts: AtomicUsize,
        fail_next: AtomicUsize,
        closes: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    /// Records every send. Can be told to fail the next N sends, or to hold
    /// sends until the gate is opened.
    #[derive(Clone, Default)]
    struct MockProducer {
        state: Arc<MockState>,
    }

    impl MockProducer {
        fn failing(n: usize) -> Self {
            let producer = Self::default();
            producer.state.fail_next.store(n, Ordering::SeqCst);
            producer
        }

        fn gated(gate: Arc<Semaphore>) -> Self {
            Self {
                state: Arc::new(MockState {
                    gate: Some(gate),
                    ..Default::default()
                }),
            }
        }

        fn sent(&self) -> Vec<SentMessage> {
            self.state.sent.lock().unwrap().clone()
        }

        fn attempts(&self) -> usize {
            self.state.attempts.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.state.closes.load(Ordering::SeqCst)
        }
    }

    impl Producer for MockProducer {
        async fn send(&self, topic: &str, key: Option<&[u8]>, value: &[u8]) -> Result<()> {
            if let Some(gate) = &self.state.gate {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| KafkaExportError::Connection(e.to_string()))?;
            }
            self.state.attempts.fetch_add(1, Ordering::SeqCst);

            let fail = self
                .state
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(KafkaExportError::Transport(KafkaError::MessageProduction(
                    RDKafkaErrorCode::BrokerTransportFailure,
                )));
            }

            self.state.sent.lock().unwrap().push(SentMessage {
                topic: topic.to_string(),
                key: key.map(|k| k.to_vec()),
                value: value.to_vec(),
            });
            Ok(())
        }

        fn close(&self) -> Result<()> {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SentinelMarshaller;

    impl Marshaller for SentinelMarshaller {
        fn encoding(&self) -> &str {
            "sentinel"
        }

        fn marshal(&self, _traces: &[ResourceSpans]) -> Result<Vec<MessageEnvelope>> {
            Ok(vec![MessageEnvelope::new(&b"sentinel"[..])])
        }
    }

    /// One message per resource, in input order
    struct PerResourceMarshaller;

    impl Marshaller for PerResourceMarshaller {
        fn encoding(&self) -> &str {
            "per_resource"
        }

        fn marshal(&self, traces: &[ResourceSpans]) -> Result<Vec<MessageEnvelope>> {
            Ok(traces
                .iter()
                .map(|rs| MessageEnvelope::new(rs.encode_to_vec()))
                .collect())
        }
    }

    #[derive(Default)]
    struct FailingMarshaller {
        calls: Arc<AtomicUsize>,
    }

    impl Marshaller for FailingMarshaller {
        fn encoding(&self) -> &str {
            "failing"
        }

        fn marshal(&self, _traces: &[ResourceSpans]) -> Result<Vec<MessageEnvelope>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(KafkaExportError::Serialization("cannot encode".to_string()))
        }
    }

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            enabled: true,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            max_elapsed_time: Duration::from_secs(5),
        }
    }

    fn inline_queue() -> QueueConfig {
        QueueConfig {
            enabled: false,
            ..Default::default()
        }
    }

    fn test_config() -> KafkaExporterConfig {
        KafkaExporterConfig::new(vec!["localhost:9092".to_string()])
            .with_topic("traces")
            .with_retry_on_failure(fast_retry())
    }

    fn decode(value: &[u8]) -> ExportTraceServiceRequest {
        ExportTraceServiceRequest::decode(value).unwrap()
    }

    #[tokio::test]
    async fn test_build_and_export_with_defaults() {
        init_logging();
        let producer = MockProducer::default();
        let registry = MarshallerRegistry::default();

        let exporter =
            build_traces_exporter_with_producer(test_config(), &registry, producer.clone())
                .unwrap();
        assert_eq!("traces", exporter.topic());
        assert_eq!("otlp_proto", exporter.encoding());

        let traces = FakeOTLP::trace_service_request_with_spans(2, 3).resource_spans;
        assert_ok!(exporter.consume_traces(traces.clone()).await);
        assert_ok!(exporter.shutdown().await);

        let sent = producer.sent();
        assert_eq!(1, sent.len());
        assert_eq!("traces", sent[0].topic);
        assert_eq!(None, sent[0].key);

        let decoded = decode(&sent[0].value);
        assert_eq!(traces, decoded.resource_spans);
        let names: Vec<&str> = decoded.resource_spans[0].scope_spans[0]
            .spans
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(vec!["span-0", "span-1", "span-2"], names);
    }

    #[tokio::test]
    async fn test_empty_brokers_rejected_first() {
        let registry = MarshallerRegistry::default();
        let config = KafkaExporterConfig::new(vec![])
            .with_topic("")
            .with_encoding("avro");

        let result =
            build_traces_exporter_with_producer(config.clone(), &registry, MockProducer::default());
        assert!(matches!(
            result,
            Err(KafkaExportError::Config(ConfigError::NoBrokers))
        ));

        // The real factory fails the same way, before touching the network
        let result = build_traces_exporter(config, &registry).await;
        assert!(matches!(
            result,
            Err(KafkaExportError::Config(ConfigError::NoBrokers))
        ));
    }

    #[tokio::test]
    async fn test_unknown_encoding_names_encoding() {
        let registry = MarshallerRegistry::default();
        let config = test_config().with_encoding("avro");

        let err = match build_traces_exporter_with_producer(
            config,
            &registry,
            MockProducer::default(),
        ) {
            Err(e) => e,
            Ok(_) => panic!("expected an unknown encoding error"),
        };
        assert!(matches!(
            &err,
            KafkaExportError::Config(ConfigError::UnknownEncoding(name)) if name == "avro"
        ));
        assert!(err.to_string().contains("avro"));
    }

    #[tokio::test]
    async fn test_custom_marshaller_routes_pushes() {
        let producer = MockProducer::default();
        let registry = MarshallerRegistry::default().with_marshaller("sentinel", SentinelMarshaller);
        let config = test_config()
            .with_encoding("sentinel")
            .with_sending_queue(inline_queue());

        let exporter =
            build_traces_exporter_with_producer(config, &registry, producer.clone()).unwrap();
        assert_ok!(exporter.consume_traces(vec![FakeOTLP::resource_spans(1)]).await);
        assert_ok!(exporter.shutdown().await);

        let values: Vec<Vec<u8>> = producer.sent().into_iter().map(|m| m.value).collect();
        assert_eq!(vec![b"sentinel".to_vec()], values);
    }

    #[tokio::test]
    async fn test_failing_marshaller_never_sends() {
        let producer = MockProducer::default();
        let marshaller = FailingMarshaller::default();
        let calls = marshaller.calls.clone();
        let registry = MarshallerRegistry::default().with_marshaller("failing", marshaller);
        let config = test_config()
            .with_encoding("failing")
            .with_sending_queue(inline_queue());

        let exporter =
            build_traces_exporter_with_producer(config, &registry, producer.clone()).unwrap();
        let res = exporter.consume_traces(vec![FakeOTLP::resource_spans(1)]).await;
        assert!(matches!(res, Err(KafkaExportError::Serialization(_))));

        // Not retried
        assert_eq!(1, calls.load(Ordering::SeqCst));
        assert_eq!(0, producer.attempts());
        assert_ok!(exporter.shutdown().await);
    }

    #[tokio::test]
    async fn test_invalid_span_ids_are_not_sent() {
        let producer = MockProducer::default();
        let registry = MarshallerRegistry::default();
        let config = test_config().with_sending_queue(inline_queue());

        let mut rs = FakeOTLP::resource_spans(2);
        rs.scope_spans[0].spans[1].trace_id = vec![1, 2, 3];

        let exporter =
            build_traces_exporter_with_producer(config, &registry, producer.clone()).unwrap();
        let res = exporter.consume_traces(vec![rs]).await;
        match res {
            Err(KafkaExportError::Serialization(msg)) => assert!(msg.contains("span-1")),
            other => panic!("expected serialization error, got {:?}", other),
        }
        assert_eq!(0, producer.attempts());
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        init_logging();
        let producer = MockProducer::failing(2);
        let registry = MarshallerRegistry::default();
        let config = test_config().with_sending_queue(inline_queue());

        let exporter =
            build_traces_exporter_with_producer(config, &registry, producer.clone()).unwrap();
        assert_ok!(exporter.consume_traces(vec![FakeOTLP::resource_spans(1)]).await);

        assert_eq!(3, producer.attempts());
        assert_eq!(1, producer.sent().len());
        assert_ok!(exporter.shutdown().await);
    }

    #[tokio::test]
    async fn test_queued_transport_failures_are_retried() {
        let producer = MockProducer::failing(2);
        let registry = MarshallerRegistry::default();
        let config = test_config().with_sending_queue(QueueConfig {
            enabled: true,
            num_consumers: 1,
            queue_size: 10,
        });

        let exporter =
            build_traces_exporter_with_producer(config, &registry, producer.clone()).unwrap();
        assert_ok!(exporter.consume_traces(vec![FakeOTLP::resource_spans(1)]).await);
        assert_ok!(exporter.shutdown().await);

        assert_eq!(3, producer.attempts());
        assert_eq!(1, producer.sent().len());
    }

    #[tokio::test]
    async fn test_transport_failure_without_retry() {
        let producer = MockProducer::failing(1);
        let registry = MarshallerRegistry::default();
        let config = test_config()
            .with_sending_queue(inline_queue())
            .with_retry_on_failure(RetryConfig {
                enabled: false,
                ..fast_retry()
            });

        let exporter =
            build_traces_exporter_with_producer(config, &registry, producer.clone()).unwrap();
        let res = exporter.consume_traces(vec![FakeOTLP::resource_spans(1)]).await;
        assert!(matches!(res, Err(KafkaExportError::Transport(_))));
        assert_eq!(1, producer.attempts());
        assert!(producer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_push_sends_in_order_and_stops_on_first_failure() {
        let traces = vec![
            FakeOTLP::resource_spans(1),
            FakeOTLP::resource_spans(2),
            FakeOTLP::resource_spans(3),
        ];

        let producer = MockProducer::default();
        let exporter = KafkaExporter::new(
            producer.clone(),
            Arc::new(PerResourceMarshaller),
            "traces".to_string(),
        );
        assert_ok!(exporter.push(&traces).await);
        let sent: Vec<ResourceSpans> = producer
            .sent()
            .iter()
            .map(|m| ResourceSpans::decode(m.value.as_slice()).unwrap())
            .collect();
        assert_eq!(traces, sent);

        let producer = MockProducer::failing(1);
        let exporter = KafkaExporter::new(
            producer.clone(),
            Arc::new(PerResourceMarshaller),
            "traces".to_string(),
        );
        let res = exporter.push(&traces).await;
        assert!(matches!(res, Err(KafkaExportError::Transport(_))));
        // The failed first send ends the push
        assert_eq!(1, producer.attempts());
        assert!(producer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_push_service_keeps_error_type() {
        let producer = MockProducer::failing(1);
        let exporter = Arc::new(KafkaExporter::new(
            producer,
            Arc::new(SentinelMarshaller),
            "traces".to_string(),
        ));

        let svc = PushService::new(exporter);
        let batch: TraceBatch = Arc::new(vec![]);
        let err = assert_err!(svc.oneshot(batch).await);
        assert!(matches!(
            err.downcast_ref::<KafkaExportError>(),
            Some(KafkaExportError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_full_queue_reports_error() {
        let gate = Arc::new(Semaphore::new(0));
        let producer = MockProducer::gated(gate.clone());
        let registry = MarshallerRegistry::default();
        let config = test_config().with_sending_queue(QueueConfig {
            enabled: true,
            num_consumers: 1,
            queue_size: 1,
        });

        let exporter =
            build_traces_exporter_with_producer(config, &registry, producer.clone()).unwrap();

        let mut accepted = 0;
        let mut full = 0;
        for _ in 0..4 {
            match exporter.consume_traces(vec![FakeOTLP::resource_spans(1)]).await {
                Ok(()) => accepted += 1,
                Err(KafkaExportError::Queue(QueueError::Full)) => full += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert!(full >= 1);

        gate.add_permits(10);
        assert_ok!(exporter.shutdown().await);
        assert_eq!(accepted, producer.sent().len());
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_and_closes_once() {
        let producer = MockProducer::default();
        let registry = MarshallerRegistry::default();
        let config = test_config().with_sending_queue(QueueConfig {
            enabled: true,
            num_consumers: 2,
            queue_size: 100,
        });

        let exporter =
            build_traces_exporter_with_producer(config, &registry, producer.clone()).unwrap();
        for _ in 0..5 {
            assert_ok!(exporter.consume_traces(vec![FakeOTLP::resource_spans(2)]).await);
        }
        assert_ok!(exporter.shutdown().await);

        assert_eq!(5, producer.sent().len());
        assert_eq!(1, producer.closes());
    }

    #[tokio::test]
    async fn test_drop_without_shutdown_does_not_close() {
        init_logging();
        let gate = Arc::new(Semaphore::new(0));
        let producer = MockProducer::gated(gate.clone());
        let registry = MarshallerRegistry::default();

        let exporter =
            build_traces_exporter_with_producer(test_config(), &registry, producer.clone())
                .unwrap();
        assert_ok!(exporter.consume_traces(vec![FakeOTLP::resource_spans(1)]).await);
        drop(exporter);

        gate.add_permits(10);
        assert_eq!(0, producer.closes());

        let exporter =
            build_traces_exporter_with_producer(test_config(), &registry, producer.clone())
                .unwrap();
        assert_ok!(exporter.shutdown().await);
        assert_eq!(1, producer.closes());
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_on_first_push() {
        init_logging();
        let registry = MarshallerRegistry::default();
        let config = KafkaExporterConfig::new(vec!["127.0.0.1:1".to_string()])
            .with_metadata_full(false)
            .with_timeout(Duration::from_millis(500))
            .with_sending_queue(inline_queue())
            .with_retry_on_failure(RetryConfig {
                enabled: false,
                ..fast_retry()
            });

        // Connecting is deferred, so building succeeds
        let exporter = assert_ok!(build_traces_exporter(config, &registry).await);

        let err = assert_err!(exporter.consume_traces(vec![FakeOTLP::resource_spans(1)]).await);
        assert!(matches!(err, KafkaExportError::Transport(_)));
        assert!(is_retryable_error(&err));
        let _ = exporter.shutdown().await;
    }

    #[tokio::test]
    async fn test_build_without_metadata_probe() {
        let registry = MarshallerRegistry::default();
        let config = KafkaExporterConfig::new(vec!["invalid:9092".to_string()])
            .with_metadata_full(false)
            .with_timeout(Duration::from_millis(500));

        let exporter = assert_ok!(build_traces_exporter(config, &registry).await);
        assert_eq!("otlp", exporter.topic());
        assert_ok!(exporter.shutdown().await);
    }

    #[tokio::test]
    async fn test_build_fails_when_brokers_unreachable() {
        init_logging();
        let registry = MarshallerRegistry::default();
        let config = KafkaExporterConfig::new(vec!["127.0.0.1:1".to_string()])
            .with_metadata_full(true)
            .with_metadata_retry(1, Duration::from_millis(10))
            .with_timeout(Duration::from_millis(500));

        let res = build_traces_exporter(config, &registry).await;
        assert!(matches!(res, Err(KafkaExportError::Connection(_))));
    }
}
