// SPDX-License-Identifier: Apache-2.0

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Meter;

pub trait Counter<T> {
    fn add(&self, value: T, attributes: &[KeyValue]);
}

/// Counter that reports through the global meter provider, or does nothing.
/// Without a provider installed by the host the OTEL variant is a no-op as well.
#[derive(Clone)]
pub enum RotelCounter<T> {
    OTELCounter(opentelemetry::metrics::Counter<T>),
    NoOpCounter,
}

impl<T> Counter<T> for RotelCounter<T> {
    fn add(&self, value: T, attributes: &[KeyValue]) {
        match self {
            RotelCounter::OTELCounter(c) => c.add(value, attributes),
            RotelCounter::NoOpCounter => {}
        }
    }
}

pub fn get_meter() -> Meter {
    global::meter("exporters")
}

pub fn u64_counter(name: &'static str) -> RotelCounter<u64> {
    RotelCounter::OTELCounter(get_meter().u64_counter(name).build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_without_meter_provider_are_noops() {
        let counter = u64_counter("rotel_test_counter");
        counter.add(3, &[KeyValue::new("exporter", "kafka")]);

        let noop: RotelCounter<u64> = RotelCounter::NoOpCounter;
        noop.add(1, &[]);
    }
}
