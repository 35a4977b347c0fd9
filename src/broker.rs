// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Adapter
//!
//! This module ties the adapter together: the [`Broker`] trait exposes the
//! operations callers integrate against and [`RabbitMQBroker`] implements
//! them over one exclusively-owned session (connection + channel).
//!
//! The adapter performs no internal concurrency management and no retries.
//! A single channel is not safe for unsynchronized concurrent publishing and
//! consuming from multiple callers; integrators that need that run separate
//! adapter instances.

use crate::{
    channel::{new_amqp_channel, Session},
    configs::BrokerConfigs,
    consumer::{self, AckPolicy, DeliveryStream},
    errors::BrokerError,
    publisher::{publish_to, Envelope},
    queue::{QueueDefinition, QueueKind, PUBSUB_DLQ_QUEUE, PUBSUB_QUEUE},
    topology::QueueTopology,
};
use async_trait::async_trait;
use lapin::{options::BasicAckOptions, Channel};
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tracing::{debug, error};

/// Operations exposed by the broker adapter.
///
/// Setup must precede every publish, consume and ack call; release
/// invalidates the session and every delivery tag issued under it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establishes the session and declares the queue topology.
    async fn setup(&mut self) -> Result<(), BrokerError>;

    /// Publishes an envelope to the primary work queue.
    async fn producer(&self, envelope: &Envelope) -> Result<(), BrokerError>;

    /// Publishes an envelope to the dead-letter queue.
    async fn dlq(&self, envelope: &Envelope) -> Result<(), BrokerError>;

    /// Opens an auto-acknowledge delivery stream on the primary queue.
    async fn consumer(&self) -> Result<DeliveryStream, BrokerError>;

    /// Opens an auto-acknowledge delivery stream on the dead-letter queue.
    async fn consumer_dlq(&self) -> Result<DeliveryStream, BrokerError>;

    /// Acknowledges a single delivery by its tag.
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Tears the session down. Safe to call when no session is open.
    async fn release(&mut self);

    /// Last-known message counts for the (primary, dead-letter) queues as
    /// observed at declaration time. Zeros before the first setup.
    fn queue_depths(&self) -> (u32, u32);
}

/// RabbitMQ implementation of the [`Broker`] trait.
pub struct RabbitMQBroker {
    configs: BrokerConfigs,
    session: Option<Session>,
    depths: (u32, u32),
}

impl RabbitMQBroker {
    /// Creates an adapter for the given endpoint, not yet connected.
    pub fn new(configs: BrokerConfigs) -> RabbitMQBroker {
        RabbitMQBroker {
            configs,
            session: None,
            depths: (0, 0),
        }
    }

    /// Opens a delivery stream on the selected queue with the given
    /// acknowledgment policy.
    ///
    /// This is the parameterized form behind [`Broker::consumer`] and
    /// [`Broker::consumer_dlq`]; callers that pair deliveries with
    /// [`Broker::ack`] subscribe here with [`AckPolicy::Explicit`].
    pub async fn subscribe(
        &self,
        queue: QueueKind,
        policy: AckPolicy,
    ) -> Result<DeliveryStream, BrokerError> {
        let channel = self.channel()?;
        consumer::subscribe(channel, queue.name(), policy).await
    }

    fn channel(&self) -> Result<&Arc<Channel>, BrokerError> {
        match &self.session {
            Some(session) => Ok(&session.channel),
            None => Err(BrokerError::SessionClosed {}),
        }
    }

    async fn install_topology(channel: Arc<Channel>) -> Result<(u32, u32), BrokerError> {
        let declared = QueueTopology::new(channel)
            .queue(QueueDefinition::primary())
            .queue(QueueDefinition::dead_letter())
            .install()
            .await?;

        let depth = |name: &str| {
            declared
                .iter()
                .find(|queue| queue.name == name)
                .map(|queue| queue.messages)
                .unwrap_or_default()
        };

        Ok((depth(PUBSUB_QUEUE), depth(PUBSUB_DLQ_QUEUE)))
    }
}

#[async_trait]
impl Broker for RabbitMQBroker {
    /// Establishes the session and declares both durable queues.
    ///
    /// When a session is already open the topology is re-declared on the
    /// existing channel; identical attributes make that a broker-side no-op
    /// and no second connection is dialed. On any failure no partial session
    /// is left usable and setup may be retried.
    async fn setup(&mut self) -> Result<(), BrokerError> {
        if let Some(session) = &self.session {
            debug!("session already open, re-declaring the topology");
            self.depths = Self::install_topology(session.channel.clone()).await?;
            return Ok(());
        }

        let (conn, channel) = new_amqp_channel(&self.configs).await?;

        match Self::install_topology(channel.clone()).await {
            Ok(depths) => {
                self.session = Some(Session { conn, channel });
                self.depths = depths;
                Ok(())
            }
            Err(err) => {
                Session { conn, channel }.close().await;
                Err(err)
            }
        }
    }

    async fn producer(&self, envelope: &Envelope) -> Result<(), BrokerError> {
        let channel = self.channel()?;
        publish_to(channel, QueueKind::Primary.name(), envelope).await
    }

    async fn dlq(&self, envelope: &Envelope) -> Result<(), BrokerError> {
        let channel = self.channel()?;
        publish_to(channel, QueueKind::DeadLetter.name(), envelope).await
    }

    async fn consumer(&self) -> Result<DeliveryStream, BrokerError> {
        self.subscribe(QueueKind::Primary, AckPolicy::Auto).await
    }

    async fn consumer_dlq(&self) -> Result<DeliveryStream, BrokerError> {
        self.subscribe(QueueKind::DeadLetter, AckPolicy::Auto).await
    }

    /// Confirms processing of exactly one prior delivery.
    ///
    /// The tag must come from the current session; unknown, duplicate and
    /// stale tags are reported by the broker and surface as `AckMessageError`
    /// rather than being silently ignored.
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        let channel = self.channel()?;

        match channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    tag = delivery_tag,
                    "error to ack the delivery"
                );
                Err(BrokerError::AckMessageError(delivery_tag))
            }
            _ => Ok(()),
        }
    }

    /// Closes the session and invalidates its delivery tags.
    ///
    /// Outstanding streams on the session end when the connection closes.
    /// Calling release again, or before setup, is a guarded no-op.
    async fn release(&mut self) {
        match self.session.take() {
            Some(session) => session.close().await,
            None => debug!("release called without an open session"),
        }
    }

    fn queue_depths(&self) -> (u32, u32) {
        self.depths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_guard_operations_before_setup() {
        let broker = RabbitMQBroker::new(BrokerConfigs::default());
        let envelope = Envelope::json(&serde_json::json!({"task": "resize", "id": 42})).unwrap();

        assert_eq!(
            broker.producer(&envelope).await.unwrap_err(),
            BrokerError::SessionClosed {}
        );
        assert_eq!(
            broker.dlq(&envelope).await.unwrap_err(),
            BrokerError::SessionClosed {}
        );
        assert_eq!(
            broker.ack(1).await.unwrap_err(),
            BrokerError::SessionClosed {}
        );
        assert!(broker.consumer().await.is_err());
        assert!(broker
            .subscribe(QueueKind::Primary, AckPolicy::Explicit)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn should_release_without_an_open_session() {
        let mut broker = RabbitMQBroker::new(BrokerConfigs::default());

        broker.release().await;
        broker.release().await;

        assert_eq!(broker.queue_depths(), (0, 0));
    }

    #[tokio::test]
    async fn should_reject_operations_after_release() {
        let mut broker = RabbitMQBroker::new(BrokerConfigs::default());
        broker.release().await;

        assert_eq!(
            broker.ack(42).await.unwrap_err(),
            BrokerError::SessionClosed {}
        );

        let envelope = Envelope::json(&serde_json::json!({"task": "cleanup"})).unwrap();
        assert_eq!(
            broker.producer(&envelope).await.unwrap_err(),
            BrokerError::SessionClosed {}
        );
    }

    #[tokio::test]
    async fn should_let_the_caller_dead_letter_a_failed_publish() {
        let mut broker = MockBroker::new();
        broker
            .expect_producer()
            .times(1)
            .returning(|_| Err(BrokerError::PublishTimeout(PUBSUB_QUEUE.to_owned())));
        broker.expect_dlq().times(1).returning(|_| Ok(()));

        let envelope = Envelope::json(&serde_json::json!({"task": "resize", "id": 42})).unwrap();

        if broker.producer(&envelope).await.is_err() {
            broker.dlq(&envelope).await.unwrap();
        }
    }
}
