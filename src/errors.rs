// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Broker Adapter
//!
//! This module defines the error taxonomy for the pubsub broker adapter.
//! Every operation surfaces its failure directly to the caller through
//! `BrokerError`; the adapter performs no silent retries and no internal
//! backoff, so retry policy (including republishing to the dead-letter
//! queue) is entirely a caller decision.

use thiserror::Error;

/// Represents errors that can occur while talking to the AMQP broker.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BrokerError {
    /// Error establishing the network connection to the broker
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel on an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring a queue, typically an attribute conflict with a
    /// pre-existing queue of the same name
    #[error("failure to declare the queue `{0}`")]
    DeclareQueueError(String),

    /// Error serializing an envelope payload, reported before any network
    /// interaction is attempted
    #[error("failure to serialize the message payload")]
    SerializationError,

    /// Error decoding a received payload into the caller's type
    #[error("failure to parse the delivery payload")]
    ParsePayloadError,

    /// The broker did not accept the publish within the deadline; delivery
    /// status of the message is unknown
    #[error("publish to queue `{0}` timed out")]
    PublishTimeout(String),

    /// The broker refused the publish inside the deadline window
    #[error("failure to publish")]
    PublishingError,

    /// Error opening a delivery stream on a queue
    #[error("failure to create a consumer on queue `{0}`")]
    ConsumerCreationError(String),

    /// Error acknowledging a delivery tag, including unknown, duplicate or
    /// stale tags
    #[error("failure to ack delivery tag `{0}`")]
    AckMessageError(u64),

    /// The operation requires a live session but none is open; returned
    /// before setup and after release, without touching the network
    #[error("session is not open")]
    SessionClosed,
}
