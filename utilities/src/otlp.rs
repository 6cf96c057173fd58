use chrono::Utc;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value::StringValue;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1;
use opentelemetry_proto::tonic::trace::v1::span::SpanKind;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Status};

pub struct FakeOTLP;

impl FakeOTLP {
    #[allow(dead_code)]
    pub fn trace_service_request() -> ExportTraceServiceRequest {
        Self::trace_service_request_with_spans(1, 1)
    }

    pub fn trace_service_request_with_spans(
        num_res_spans: usize,
        num_spans: usize,
    ) -> ExportTraceServiceRequest {
        let mut exp = ExportTraceServiceRequest {
            resource_spans: Vec::with_capacity(num_res_spans),
        };
        for _i in 0..num_res_spans {
            exp.resource_spans.push(Self::resource_spans(num_spans));
        }
        exp
    }

    pub fn resource_spans(num_spans: usize) -> ResourceSpans {
        let spans = Self::trace_spans(num_spans);

        let scope_spans = ScopeSpans {
            scope: Some(InstrumentationScope {
                name: "scope".to_string(),
                version: "0.0.1".to_string(),
                attributes: vec![string_attr("module", "api")],
                dropped_attributes_count: 0,
            }),
            spans,
            schema_url: "https://opentelemetry.io/schemas/1.21.0".to_string(),
        };
        ResourceSpans {
            resource: Some(Resource {
                attributes: vec![
                    string_attr("service.name", "test-service"),
                    string_attr("telemetry.sdk.version", "1.13.0"),
                    string_attr("telemetry.sdk.name", "open-telemetry"),
                    string_attr("k8s.node.name", "ip-10-250-64-50.ec2.internal"),
                ],
                dropped_attributes_count: 0,
            }),
            scope_spans: vec![scope_spans],
            schema_url: "https://opentelemetry.io/schemas/1.21.0".to_string(),
        }
    }

    /// Spans are named `span-<n>` with span ids derived from `n`, so tests can
    /// check ordering after a decode.
    pub fn trace_spans(num_spans: usize) -> Vec<v1::Span> {
        let now_ns = Utc::now().timestamp_nanos_opt().unwrap();
        let finish_ns = now_ns + 1_000_000;
        let mut spans = Vec::with_capacity(num_spans);
        for i in 0..num_spans {
            let span = v1::Span {
                trace_id: vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
                span_id: (i as u64 + 1).to_be_bytes().to_vec(),
                trace_state: "rojo=00f067aa0ba902b7".to_string(),
                parent_span_id: vec![1, 1, 1, 1, 1, 1, 1, 1],
                flags: 0,
                name: format!("span-{}", i),
                kind: SpanKind::Internal.into(),
                start_time_unix_nano: now_ns as u64,
                end_time_unix_nano: finish_ns as u64,
                attributes: vec![
                    string_attr("http.method", "POST"),
                    string_attr("http.request.path", "/items"),
                ],
                dropped_attributes_count: 0,
                events: vec![],
                dropped_events_count: 0,
                links: vec![],
                dropped_links_count: 0,
                status: Some(Status::default()),
            };
            spans.push(span);
        }
        spans
    }
}

pub fn string_attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(StringValue(value.to_string())),
        }),
    }
}
