// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;

/// Payload of a single Kafka message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEnvelope {
    value: Bytes,
}

impl MessageEnvelope {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Bytes {
        self.value
    }
}
