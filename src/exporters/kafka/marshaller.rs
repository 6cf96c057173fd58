// SPDX-License-Identifier: Apache-2.0

//! Encodings that turn a batch of spans into Kafka message payloads.
//!
//! Every encoding implements [`Marshaller`] and is installed in a
//! [`MarshallerRegistry`] under its encoding name. The registry starts out with
//! the built-in `otlp_proto` encoding; hosts may register more (or shadow the
//! built-in) before the exporter is built.

use crate::exporters::kafka::errors::{ConfigError, KafkaExportError, Result};
use crate::exporters::kafka::message::MessageEnvelope;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::ResourceSpans;
use prost::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Encoding name of the built-in protobuf marshaller.
pub const OTLP_PROTO_ENCODING: &str = "otlp_proto";

/// Encoding name of the JSON marshaller.
pub const OTLP_JSON_ENCODING: &str = "otlp_json";

const TRACE_ID_LEN: usize = 16;
const SPAN_ID_LEN: usize = 8;

/// Converts a batch of trace data into zero or more Kafka messages.
///
/// Implementations must not keep state between calls that changes the output
/// for a given input. A failed call returns no messages at all.
pub trait Marshaller: Send + Sync {
    /// Name of the encoding this marshaller produces
    fn encoding(&self) -> &str;

    fn marshal(&self, traces: &[ResourceSpans]) -> Result<Vec<MessageEnvelope>>;
}

/// Encodes the whole batch as one protobuf `ExportTraceServiceRequest`.
#[derive(Clone, Debug, Default)]
pub struct OtlpProtoMarshaller;

impl Marshaller for OtlpProtoMarshaller {
    fn encoding(&self) -> &str {
        OTLP_PROTO_ENCODING
    }

    fn marshal(&self, traces: &[ResourceSpans]) -> Result<Vec<MessageEnvelope>> {
        validate_spans(traces)?;

        let request = ExportTraceServiceRequest {
            resource_spans: traces.to_vec(),
        };

        let mut buf = Vec::with_capacity(request.encoded_len());
        request.encode(&mut buf)?;
        Ok(vec![MessageEnvelope::new(buf)])
    }
}

/// Encodes the whole batch as the OTLP/JSON form of an `ExportTraceServiceRequest`.
///
/// Not installed by default, register it to use it.
#[derive(Clone, Debug, Default)]
pub struct OtlpJsonMarshaller;

impl Marshaller for OtlpJsonMarshaller {
    fn encoding(&self) -> &str {
        OTLP_JSON_ENCODING
    }

    fn marshal(&self, traces: &[ResourceSpans]) -> Result<Vec<MessageEnvelope>> {
        validate_spans(traces)?;

        let request = ExportTraceServiceRequest {
            resource_spans: traces.to_vec(),
        };
        let json = serde_json::to_vec(&request)?;
        Ok(vec![MessageEnvelope::new(json)])
    }
}

/// Trace and span ids are fixed width on the wire. Anything else can not be
/// represented by a consumer decoding into fixed size ids.
fn validate_spans(traces: &[ResourceSpans]) -> Result<()> {
    let spans = traces
        .iter()
        .flat_map(|rs| rs.scope_spans.iter())
        .flat_map(|ss| ss.spans.iter());

    for span in spans {
        if span.trace_id.len() != TRACE_ID_LEN {
            return Err(KafkaExportError::Serialization(format!(
                "span \"{}\" has a {} byte trace_id, expected {}",
                span.name,
                span.trace_id.len(),
                TRACE_ID_LEN
            )));
        }
        if span.span_id.len() != SPAN_ID_LEN {
            return Err(KafkaExportError::Serialization(format!(
                "span \"{}\" has a {} byte span_id, expected {}",
                span.name,
                span.span_id.len(),
                SPAN_ID_LEN
            )));
        }
        if !span.parent_span_id.is_empty() && span.parent_span_id.len() != SPAN_ID_LEN {
            return Err(KafkaExportError::Serialization(format!(
                "span \"{}\" has a {} byte parent_span_id, expected {}",
                span.name,
                span.parent_span_id.len(),
                SPAN_ID_LEN
            )));
        }
    }
    Ok(())
}

/// Marshallers keyed by encoding name. Lookups are exact and case-sensitive.
#[derive(Clone)]
pub struct MarshallerRegistry {
    marshallers: HashMap<String, Arc<dyn Marshaller>>,
}

impl Default for MarshallerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            marshallers: HashMap::new(),
        };
        registry.register(OTLP_PROTO_ENCODING, OtlpProtoMarshaller);
        registry
    }
}

impl fmt::Debug for MarshallerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshallerRegistry")
            .field("encodings", &self.encodings())
            .finish()
    }
}

impl MarshallerRegistry {
    /// Create a registry holding the built-in encodings
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `marshaller` under `name`, replacing (and returning) any
    /// marshaller previously registered under the same name.
    pub fn register<M>(
        &mut self,
        name: impl Into<String>,
        marshaller: M,
    ) -> Option<Arc<dyn Marshaller>>
    where
        M: Marshaller + 'static,
    {
        self.marshallers.insert(name.into(), Arc::new(marshaller))
    }

    pub fn with_marshaller<M>(mut self, name: impl Into<String>, marshaller: M) -> Self
    where
        M: Marshaller + 'static,
    {
        self.register(name, marshaller);
        self
    }

    pub fn resolve(&self, name: &str) -> std::result::Result<Arc<dyn Marshaller>, ConfigError> {
        self.marshallers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownEncoding(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.marshallers.contains_key(name)
    }

    /// Installed encoding names, sorted
    pub fn encodings(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.marshallers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
