// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publishing
//!
//! This module provides the publish path of the adapter: envelope
//! serialization and the deadline-bounded publish through the default
//! exchange to a named queue. Each publish call gets its own deadline; if the
//! broker does not accept the message in time the call fails with a timeout
//! and the delivery status of the message is unknown to the caller.

use crate::{errors::BrokerError, otel};
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties, Channel,
};
use opentelemetry::Context;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::time::timeout;
use tracing::error;
use uuid::Uuid;

/// Content type stamped on every outgoing message
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Maximum time one publish call may wait for broker accept.
pub const PUBLISH_DEADLINE: Duration = Duration::from_secs(5);

/// A serialized message payload ready to be published.
///
/// Envelopes are encoded up front so a payload that cannot be serialized is
/// rejected before any network interaction. The adapter does not retain the
/// envelope after a publish completes.
#[derive(Debug, Clone)]
pub struct Envelope {
    payload: Box<[u8]>,
}

impl Envelope {
    /// Encodes a caller payload as a JSON envelope.
    ///
    /// # Returns
    /// The encoded envelope, or `SerializationError` when the payload cannot
    /// be converted to bytes.
    pub fn json<T>(payload: &T) -> Result<Envelope, BrokerError>
    where
        T: Serialize,
    {
        let encoded = serde_json::to_vec(payload).map_err(|err| {
            error!(error = err.to_string(), "failure to serialize the payload");
            BrokerError::SerializationError {}
        })?;

        Ok(Envelope {
            payload: encoded.into_boxed_slice(),
        })
    }

    /// The serialized payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }
}

/// Publishes an envelope to the given queue through the default exchange.
///
/// The outgoing message carries a send timestamp, the JSON content-type
/// marker, a generated message id and the current trace context. The call
/// blocks until the broker accepts the message or [`PUBLISH_DEADLINE`]
/// elapses; publisher confirms are not awaited.
pub(crate) async fn publish_to(
    channel: &Channel,
    queue: &str,
    envelope: &Envelope,
) -> Result<(), BrokerError> {
    let mut headers = BTreeMap::<ShortString, lapin::types::AMQPValue>::default();
    otel::inject(&Context::current(), &mut headers);

    let sent_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let publish = channel.basic_publish(
        "",
        queue,
        BasicPublishOptions {
            immediate: false,
            mandatory: false,
        },
        envelope.as_bytes(),
        BasicProperties::default()
            .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
            .with_timestamp(sent_at)
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(FieldTable::from(headers)),
    );

    match timeout(PUBLISH_DEADLINE, publish).await {
        Err(_) => {
            error!(queue = queue, "publish not accepted within the deadline");
            Err(BrokerError::PublishTimeout(queue.to_owned()))
        }
        Ok(Err(err)) => {
            error!(error = err.to_string(), "error publishing message");
            Err(BrokerError::PublishingError {})
        }
        Ok(Ok(_)) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serializer;

    #[test]
    fn should_encode_a_json_envelope() {
        let payload = serde_json::json!({"task": "resize", "id": 42});

        let envelope = Envelope::json(&payload).unwrap();

        let decoded: serde_json::Value = serde_json::from_slice(envelope.as_bytes()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn should_report_serialization_failure_before_publishing() {
        struct Unserializable;

        impl Serialize for Unserializable {
            fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                Err(serde::ser::Error::custom("refused"))
            }
        }

        let res = Envelope::json(&Unserializable {});

        assert_eq!(res.unwrap_err(), BrokerError::SerializationError {});
    }
}
