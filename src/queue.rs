// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! This module provides the types used to describe the adapter's queue
//! topology: the fixed queue names, the `QueueKind` selector used to address
//! one of the two queues, and the `QueueDefinition` builder consumed by the
//! topology installer.
//!
//! Nothing structurally marks the dead-letter queue on the broker side; it is
//! an ordinary durable queue addressed explicitly by the publish and consume
//! operations.

/// Name of the primary work queue
pub const PUBSUB_QUEUE: &str = "pubsub";
/// Name of the dead-letter queue
pub const PUBSUB_DLQ_QUEUE: &str = "pubsub_dlq";

/// Selects one of the two queues managed by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Primary,
    DeadLetter,
}

impl QueueKind {
    /// The broker-side name of the selected queue.
    pub fn name(&self) -> &'static str {
        match self {
            QueueKind::Primary => PUBSUB_QUEUE,
            QueueKind::DeadLetter => PUBSUB_DLQ_QUEUE,
        }
    }
}

/// Definition of a queue with its declaration attributes.
///
/// This struct implements the builder pattern to create and configure queue
/// definitions. Both adapter queues are declared durable, non-exclusive and
/// non-auto-delete, with no extra arguments.
#[derive(Debug, Clone, Default)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name and default
    /// attributes.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            delete: false,
            exclusive: false,
        }
    }

    /// Definition of the primary work queue.
    pub fn primary() -> QueueDefinition {
        QueueDefinition::new(PUBSUB_QUEUE).durable()
    }

    /// Definition of the dead-letter queue.
    pub fn dead_letter() -> QueueDefinition {
        QueueDefinition::new(PUBSUB_DLQ_QUEUE).durable()
    }

    /// Makes the queue durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the queue exclusive to the declaring connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// The queue name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_the_adapter_queues_durable() {
        let primary = QueueDefinition::primary();
        assert_eq!(primary.name(), PUBSUB_QUEUE);
        assert!(primary.durable);
        assert!(!primary.delete);
        assert!(!primary.exclusive);

        let dlq = QueueDefinition::dead_letter();
        assert_eq!(dlq.name(), PUBSUB_DLQ_QUEUE);
        assert!(dlq.durable);
        assert!(!dlq.delete);
        assert!(!dlq.exclusive);
    }

    #[test]
    fn should_keep_the_two_queue_names_distinct() {
        assert_ne!(QueueKind::Primary.name(), QueueKind::DeadLetter.name());
    }

    #[test]
    fn should_apply_builder_flags() {
        let def = QueueDefinition::new("scratch").delete().exclusive();
        assert!(!def.durable);
        assert!(def.delete);
        assert!(def.exclusive);
    }
}
