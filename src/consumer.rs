// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Streaming
//!
//! This module provides the consume path of the adapter. A subscription
//! opens a continuous, non-exclusive delivery stream on a queue and hands
//! the caller a [`DeliveryStream`]: a lazy, unbounded sequence of
//! [`Delivery`] items drained at the caller's own pace. The broker pushes
//! messages as they become available and the underlying transport applies
//! its own flow control.
//!
//! Transport-level disconnection surfaces as the stream ending; the caller
//! detects closure, re-runs setup and subscribes again.

use crate::{errors::BrokerError, otel};
use futures_util::Stream;
use lapin::{options::BasicConsumeOptions, types::FieldTable, Channel, Consumer};
use opentelemetry::Context;
use serde::de::DeserializeOwned;
use std::{pin::Pin, task::Poll};
use tracing::{debug, error};
use uuid::Uuid;

/// Acknowledgment policy for a subscription.
///
/// Under `Auto` the broker considers a message delivered as soon as it is
/// handed to the stream; a caller crash after delivery does not trigger
/// redelivery. `Explicit` leaves every delivery outstanding until the caller
/// confirms it by tag through the ack gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    Auto,
    Explicit,
}

impl AckPolicy {
    /// The value of the AMQP `no-ack` consume flag for this policy.
    pub(crate) fn no_ack(&self) -> bool {
        matches!(self, AckPolicy::Auto)
    }
}

/// A received message with its broker-assigned metadata.
///
/// The delivery tag is scoped to the session that issued it and is used
/// solely to acknowledge this delivery; it is invalid once that session
/// ends.
#[derive(Debug)]
pub struct Delivery {
    pub data: Box<[u8]>,
    pub delivery_tag: u64,
    pub redelivered: bool,
    /// Trace context propagated in the message headers.
    pub ctx: Context,
}

impl Delivery {
    /// Decodes the payload into the caller's type.
    pub fn decode<T>(&self) -> Result<T, BrokerError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.data).map_err(|err| {
            error!(error = err.to_string(), "failure to parse the payload");
            BrokerError::ParsePayloadError {}
        })
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Delivery {
            ctx: otel::extract(&delivery.properties),
            data: delivery.data.into_boxed_slice(),
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
        }
    }
}

/// An unbounded stream of deliveries from one queue.
///
/// The stream yields items in broker delivery order and ends when the
/// session is released or the transport drops. Consuming stops by dropping
/// the stream; there is no other cancellation path.
pub struct DeliveryStream {
    inner: Consumer,
}

impl Stream for DeliveryStream {
    type Item = Delivery;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(delivery))) => return Poll::Ready(Some(delivery.into())),
                Poll::Ready(Some(Err(err))) => {
                    // transport hiccup on one frame, keep draining
                    error!(error = err.to_string(), "error receiving delivery");
                    continue;
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Opens a delivery stream on the given queue.
///
/// # Returns
/// The stream on success, or `ConsumerCreationError` when the queue does not
/// exist or the channel is unusable.
pub(crate) async fn subscribe(
    channel: &Channel,
    queue: &str,
    policy: AckPolicy,
) -> Result<DeliveryStream, BrokerError> {
    let tag = format!("{}-{}", queue, Uuid::new_v4());
    debug!(queue = queue, tag = tag.as_str(), "creating consumer...");

    match channel
        .basic_consume(
            queue,
            &tag,
            BasicConsumeOptions {
                no_local: false,
                no_ack: policy.no_ack(),
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                queue = queue,
                "error to create the consumer"
            );
            Err(BrokerError::ConsumerCreationError(queue.to_owned()))
        }
        Ok(consumer) => {
            debug!(queue = queue, "consumer created");
            Ok(DeliveryStream { inner: consumer })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Envelope;
    use lapin::{acker::Acker, protocol::basic::AMQPProperties, types::ShortString};

    #[test]
    fn should_round_trip_an_envelope_through_a_delivery() {
        let payload = serde_json::json!({"task": "resize", "id": 42});
        let envelope = Envelope::json(&payload).unwrap();

        let raw = lapin::message::Delivery {
            acker: Acker::default(),
            data: envelope.as_bytes().to_vec(),
            delivery_tag: 3,
            exchange: ShortString::from(""),
            properties: AMQPProperties::default(),
            redelivered: false,
            routing_key: ShortString::from("pubsub"),
        };

        let delivery = Delivery::from(raw);

        assert_eq!(delivery.delivery_tag, 3);
        assert!(!delivery.redelivered);

        let decoded: serde_json::Value = delivery.decode().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn should_fail_to_decode_a_non_json_payload() {
        let raw = lapin::message::Delivery {
            acker: Acker::default(),
            data: b"not a json payload".to_vec(),
            delivery_tag: 1,
            exchange: ShortString::from(""),
            properties: AMQPProperties::default(),
            redelivered: true,
            routing_key: ShortString::from("pubsub"),
        };

        let delivery = Delivery::from(raw);

        let res = delivery.decode::<serde_json::Value>();
        assert_eq!(res.unwrap_err(), BrokerError::ParsePayloadError {});
    }

    #[test]
    fn should_map_the_ack_policy_to_the_no_ack_flag() {
        assert!(AckPolicy::Auto.no_ack());
        assert!(!AckPolicy::Explicit.no_ack());
    }
}
