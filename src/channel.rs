// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Session Management
//!
//! This module handles the creation and teardown of the adapter's session:
//! one network connection to the broker and one logical channel over it. The
//! session is an owned value threaded explicitly through the adapter, so a
//! released session is detectable instead of being hidden global state.

use crate::{configs::BrokerConfigs, errors::BrokerError};
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{debug, error};

/// AMQP reply code sent on a normal close.
const REPLY_SUCCESS: u16 = 200;

/// The live connection and channel pair owned by one adapter instance.
///
/// A `Session` exists only between setup and release. Delivery tags are
/// scoped to it: once the session is closed, every tag issued under it is
/// invalid.
pub struct Session {
    pub(crate) conn: Arc<Connection>,
    pub(crate) channel: Arc<Channel>,
}

impl Session {
    /// Closes the channel and the connection underneath it.
    ///
    /// Failures are logged rather than returned: the session is gone either
    /// way and there is no recovery path besides a new setup.
    pub(crate) async fn close(self) {
        debug!("closing amqp session...");

        if let Err(err) = self.channel.close(REPLY_SUCCESS, "release").await {
            error!(error = err.to_string(), "error to close the channel");
        }

        if let Err(err) = self.conn.close(REPLY_SUCCESS, "release").await {
            error!(error = err.to_string(), "error to close the connection");
        }

        debug!("amqp session closed");
    }
}

/// Creates a new AMQP connection and channel for the broker described by
/// `cfg`.
///
/// Both the connection and the channel are wrapped in `Arc` so the channel
/// can be shared with delivery streams while the adapter keeps ownership of
/// the session.
///
/// # Returns
/// * The connection and channel on success, `ConnectionError` if the network
///   dial fails, or `ChannelError` if channel creation fails.
pub async fn new_amqp_channel(
    cfg: &BrokerConfigs,
) -> Result<(Arc<Connection>, Arc<Channel>), BrokerError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app_name.clone()));

    let conn = match Connection::connect(&cfg.uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(BrokerError::ConnectionError {})
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((Arc::new(conn), Arc::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(BrokerError::ChannelError {})
        }
    }
}
