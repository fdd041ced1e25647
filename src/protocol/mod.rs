// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message bus plumbing.
//!
//! This module holds everything between the wire and the devices: the topic
//! codec, the router that dispatches decoded messages, and the transports.
//!
//! # Components
//!
//! - [`TopicAddress`]: decoded `did/category/parameter/measure` tuple
//! - [`TopicRouter`]: dispatches inbound messages to registered devices
//! - [`MqttBroker`]: broker connection over MQTT
//! - [`HttpClient`]: HTTP client used by cloud relay devices
//! - [`Publisher`]: the seam devices publish through

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mqtt")]
mod mqtt_broker;
pub mod topic;
mod topic_router;

#[cfg(feature = "http")]
pub use http::{HttpClient, HttpClientBuilder};
#[cfg(feature = "mqtt")]
pub use mqtt_broker::{MessageHandler, MqttBroker, MqttBrokerBuilder};
pub use topic::TopicAddress;
pub use topic_router::{RouteOutcome, TopicRouter};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::ProtocolError;

/// Outbound side of the message bus.
///
/// Publishing is fire-and-forget: implementations queue the message and
/// return without waiting for network I/O. Errors only report that the
/// message could not be queued.
pub trait Publisher: Send + Sync {
    /// Queues a message for publication.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the transport refused the message.
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), ProtocolError>;
}

/// Connection state of the broker link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected; no dispatch happens.
    #[default]
    Disconnected,
    /// Waiting for the broker to acknowledge the connection.
    Connecting,
    /// Connected and operational.
    Connected,
}

impl ConnectionState {
    /// Returns true if the link is connected.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Shared cell holding a [`ConnectionState`].
///
/// Cloning yields another handle to the same cell: the transport writes it,
/// the router reads it, and the gateway can wait for a state.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    state: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

impl ConnectionStatus {
    /// Creates a cell in the given state.
    #[must_use]
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state: Arc::new(watch::Sender::new(state)),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Stores a new state and returns the previous one.
    pub fn set(&self, state: ConnectionState) -> ConnectionState {
        self.state.send_replace(state)
    }

    /// Returns true if the current state is [`ConnectionState::Connected`].
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.get().is_connected()
    }

    /// Waits until connected, for at most `timeout`.
    ///
    /// Returns false if the timeout elapsed first.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|state| state.is_connected()))
            .await
            .is_ok_and(|result| result.is_ok())
    }
}
