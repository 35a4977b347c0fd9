// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Trace Context Propagation
//!
//! Carries OpenTelemetry trace context through AMQP message headers so a
//! consumer can continue the trace a producer started. Only propagation lives
//! here; tracer and exporter wiring belong to the application.

use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, ShortString},
};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector},
    Context,
};
use std::collections::BTreeMap;
use tracing::error;

/// Adapter between the configured text-map propagator and the AMQP header
/// map.
pub(crate) struct AmqpTracePropagator<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> AmqpTracePropagator<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for AmqpTracePropagator<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

impl Extractor for AmqpTracePropagator<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Injects `ctx` into an outgoing header map using the globally configured
/// propagator.
pub(crate) fn inject(ctx: &Context, headers: &mut BTreeMap<ShortString, AMQPValue>) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut AmqpTracePropagator::new(headers))
    });
}

/// Extracts the trace context propagated in a delivery's headers.
pub(crate) fn extract(props: &AMQPProperties) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract(&AmqpTracePropagator::new(
            &mut props.headers().clone().unwrap_or_default().inner().clone(),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_read_and_write_string_headers() {
        let mut headers = BTreeMap::new();

        AmqpTracePropagator::new(&mut headers)
            .set("Traceparent", "00-abc-def-01".to_owned());

        let propagator = AmqpTracePropagator::new(&mut headers);
        assert_eq!(propagator.get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(propagator.keys(), vec!["traceparent"]);
    }

    #[test]
    fn should_ignore_non_string_headers() {
        let mut headers = BTreeMap::new();
        headers.insert(ShortString::from("traceparent"), AMQPValue::LongInt(7));

        let propagator = AmqpTracePropagator::new(&mut headers);
        assert_eq!(propagator.get("traceparent"), None);
    }

    #[test]
    fn should_extract_a_context_from_empty_properties() {
        // no propagated headers yields the default context, never a panic
        let _ctx = extract(&AMQPProperties::default());
    }
}
