// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Topology Installation
//!
//! This module declares the adapter's queue topology on the broker: the
//! primary work queue and the dead-letter queue, both durable. Declaration is
//! idempotent by broker semantics, so re-installing the same topology on a
//! live channel is a no-op; a name collision with incompatible attributes
//! surfaces as a declaration error.
//!
//! Publishing goes through the default exchange with the queue name as the
//! routing key, so no exchanges or bindings are declared here.

use crate::{errors::BrokerError, queue::QueueDefinition};
use lapin::{options::QueueDeclareOptions, types::FieldTable, Channel};
use std::sync::Arc;
use tracing::{debug, error};

/// A queue as the broker reported it at declaration time.
///
/// The message and consumer counts are a point-in-time snapshot taken when
/// the declaration happened; they are diagnostic data, not flow-control
/// input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredQueue {
    pub name: String,
    pub messages: u32,
    pub consumers: u32,
}

/// Declares a set of queues on one channel.
///
/// Queue definitions are registered with the builder-style [`queue`] method
/// and created on the broker by [`install`].
///
/// [`queue`]: QueueTopology::queue
/// [`install`]: QueueTopology::install
pub struct QueueTopology {
    channel: Arc<Channel>,
    queues: Vec<QueueDefinition>,
}

impl QueueTopology {
    /// Creates a topology bound to the given channel, with no queues
    /// registered yet.
    pub fn new(channel: Arc<Channel>) -> QueueTopology {
        QueueTopology {
            channel,
            queues: vec![],
        }
    }

    /// Adds a queue definition to the topology.
    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    /// Declares every registered queue on the broker.
    ///
    /// # Returns
    /// The declaration-time snapshot for each queue, in registration order,
    /// or `DeclareQueueError` naming the first queue that failed.
    pub async fn install(&self) -> Result<Vec<DeclaredQueue>, BrokerError> {
        let mut declared = Vec::with_capacity(self.queues.len());

        for def in &self.queues {
            debug!("creating queue: {}", def.name());

            match self
                .channel
                .queue_declare(
                    def.name(),
                    QueueDeclareOptions {
                        passive: false,
                        durable: def.durable,
                        exclusive: def.exclusive,
                        auto_delete: def.delete,
                        nowait: false,
                    },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        name = def.name(),
                        "error to declare the queue"
                    );
                    Err(BrokerError::DeclareQueueError(def.name().to_owned()))
                }
                Ok(queue) => {
                    debug!("queue: {} was created", def.name());
                    declared.push(DeclaredQueue {
                        name: queue.name().to_string(),
                        messages: queue.message_count(),
                        consumers: queue.consumer_count(),
                    });
                    Ok(())
                }
            }?;
        }

        Ok(declared)
    }
}
