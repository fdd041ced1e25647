// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection.
//!
//! [`MqttBroker`] owns one persistent connection to the broker. Its event
//! loop runs on a tokio task: it hands every inbound publish to the installed
//! [`MessageHandler`], restores subscriptions after every (re)connection and
//! retries a lost connection after a fixed period. Publishing never waits
//! for the network.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use iotgate::protocol::{MqttBroker, Publisher};
//!
//! # async fn example() -> Result<(), iotgate::error::ProtocolError> {
//! let broker = MqttBroker::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .last_will("iotgate/status", "offline")
//!     .reconnect_period(Duration::from_secs(30))
//!     .build()?;
//!
//! broker.wait_connected().await?;
//! broker.subscribe("+/status/#");
//! broker.publish("iotgate/status", "online", true)?;
//!
//! broker.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};

use crate::error::ProtocolError;

use super::{ConnectionState, ConnectionStatus, Publisher};

/// Capacity of the request channel between the client and the event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Receiver of inbound traffic and connection events.
///
/// Called from the event loop task; a message is fully handled before the
/// next one is polled.
pub trait MessageHandler: Send + Sync {
    /// Handles one inbound message.
    fn on_message(&self, topic: &str, payload: &str);

    /// Called after every successful (re)connection, once subscriptions
    /// have been restored.
    fn on_connect(&self) {}
}

/// Configuration for an MQTT broker connection.
#[derive(Debug, Clone)]
struct MqttBrokerConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    client_id: Option<String>,
    keep_alive: Duration,
    connection_timeout: Duration,
    reconnect_period: Duration,
    last_will: Option<(String, String)>,
}

impl Default for MqttBrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            reconnect_period: Duration::from_secs(30),
            last_will: None,
        }
    }
}

/// A connection to an MQTT broker.
///
/// Cheaply cloneable; all clones share the same connection.
#[derive(Clone)]
pub struct MqttBroker {
    inner: Arc<MqttBrokerInner>,
}

struct MqttBrokerInner {
    /// The MQTT async client for publishing.
    client: AsyncClient,
    /// Configuration used for this connection.
    config: MqttBrokerConfig,
    /// Client id announced to the broker.
    client_id: String,
    /// Connection status, shared with the router.
    status: ConnectionStatus,
    /// Subscription filters, restored on every connection.
    filters: RwLock<Vec<String>>,
    /// Receiver of inbound messages.
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
    /// Set once `disconnect` was requested.
    shutdown: AtomicBool,
}

impl MqttBroker {
    /// Creates a new builder for configuring an MQTT broker connection.
    #[must_use]
    pub fn builder() -> MqttBrokerBuilder {
        MqttBrokerBuilder::default()
    }

    /// Returns whether the broker is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.status.is_connected()
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.status.get()
    }

    /// Returns a handle to the connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.clone()
    }

    /// Returns the host address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Returns the port of the broker.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Returns the client id announced to the broker.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Installs the receiver of inbound messages, replacing any previous one.
    pub fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.inner.handler.write() = Some(handler);
    }

    /// Waits for the broker to acknowledge the connection.
    ///
    /// The event loop keeps retrying after a timeout; this only reports that
    /// the first attempt did not succeed in time.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ConnectionFailed`] if the connection timeout
    /// elapsed first.
    pub async fn wait_connected(&self) -> Result<(), ProtocolError> {
        let timeout = self.inner.config.connection_timeout;
        if self.inner.status.wait_connected(timeout).await {
            Ok(())
        } else {
            Err(ProtocolError::ConnectionFailed(format!(
                "MQTT connection timeout after {}s",
                timeout.as_secs()
            )))
        }
    }

    /// Adds a subscription filter.
    ///
    /// The filter is subscribed immediately when connected and restored after
    /// every reconnection.
    pub fn subscribe(&self, filter: impl Into<String>) {
        let filter = filter.into();
        {
            let mut filters = self.inner.filters.write();
            if filters.contains(&filter) {
                return;
            }
            filters.push(filter.clone());
        }
        if self.is_connected() {
            self.send_subscribe(&filter);
        }
    }

    /// Returns the registered subscription filters.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.inner.filters.read().clone()
    }

    fn send_subscribe(&self, filter: &str) {
        match self.inner.client.try_subscribe(filter, QoS::AtLeastOnce) {
            Ok(()) => tracing::debug!(filter = %filter, "Subscribed"),
            Err(e) => tracing::error!(filter = %filter, error = %e, "Subscribe failed"),
        }
    }

    fn resubscribe(&self) {
        for filter in self.filters() {
            self.send_subscribe(&filter);
        }
    }

    fn handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.inner.handler.read().clone()
    }

    /// Disconnects from the broker and stops the event loop.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request could not be queued.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );

        self.inner.shutdown.store(true, Ordering::Release);
        let result = self.inner.client.disconnect().await;
        self.inner.status.set(ConnectionState::Disconnected);
        result.map_err(ProtocolError::Mqtt)
    }
}

impl Publisher for MqttBroker {
    fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), ProtocolError> {
        self.inner
            .client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .map_err(ProtocolError::Mqtt)
    }
}

impl std::fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBroker")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("client_id", &self.inner.client_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for creating an MQTT broker connection.
///
/// # Examples
///
/// ```no_run
/// use iotgate::protocol::MqttBroker;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), iotgate::error::ProtocolError> {
/// let broker = MqttBroker::builder()
///     .host("192.168.1.50")
///     .port(1883)
///     .credentials("user", "password")
///     .keep_alive(Duration::from_secs(60))
///     .connection_timeout(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttBrokerBuilder {
    config: MqttBrokerConfig,
}

impl MqttBrokerBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the client id (default: `iotgate-<random>`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the delay between reconnection attempts (default: 30 seconds).
    #[must_use]
    pub fn reconnect_period(mut self, duration: Duration) -> Self {
        self.config.reconnect_period = duration;
        self
    }

    /// Sets the last will, published retained by the broker if the
    /// connection drops without a clean disconnect.
    #[must_use]
    pub fn last_will(mut self, topic: impl Into<String>, payload: impl Into<String>) -> Self {
        self.config.last_will = Some((topic.into(), payload.into()));
        self
    }

    /// Creates the client and starts its event loop.
    ///
    /// Returns without waiting for the connection; see
    /// [`MqttBroker::wait_connected`].
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Host is not set
    /// - No tokio runtime is running
    pub fn build(self) -> Result<MqttBroker, ProtocolError> {
        if self.config.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ProtocolError::ConnectionFailed("MQTT broker requires a tokio runtime".to_string())
        })?;

        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("iotgate-{}", uuid::Uuid::new_v4().simple()));

        let mut mqtt_options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            mqtt_options.set_credentials(username, password);
        }
        if let Some((ref topic, ref payload)) = self.config.last_will {
            mqtt_options.set_last_will(LastWill::new(
                topic,
                payload.as_bytes().to_vec(),
                QoS::AtLeastOnce,
                true,
            ));
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);

        let inner = MqttBrokerInner {
            client,
            config: self.config,
            client_id,
            status: ConnectionStatus::new(ConnectionState::Connecting),
            filters: RwLock::new(Vec::new()),
            handler: RwLock::new(None),
            shutdown: AtomicBool::new(false),
        };

        let broker = MqttBroker {
            inner: Arc::new(inner),
        };

        tracing::info!(
            host = %broker.inner.config.host,
            port = %broker.inner.config.port,
            client_id = %broker.inner.client_id,
            "Connecting to MQTT broker"
        );

        let broker_clone = broker.clone();
        runtime.spawn(async move {
            handle_broker_events(event_loop, broker_clone).await;
        });

        Ok(broker)
    }
}

/// Handles MQTT events for the broker connection.
async fn handle_broker_events(mut event_loop: EventLoop, broker: MqttBroker) {
    use rumqttc::{Event, Outgoing, Packet};

    let reconnect_period = broker.inner.config.reconnect_period;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                broker.inner.status.set(ConnectionState::Connected);
                tracing::info!(
                    host = %broker.inner.config.host,
                    port = %broker.inner.config.port,
                    "Connected to MQTT broker"
                );
                broker.resubscribe();
                if let Some(handler) = broker.handler() {
                    handler.on_connect();
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Ok(payload) = std::str::from_utf8(&publish.payload) else {
                    tracing::warn!(topic = %publish.topic, "Dropping non UTF-8 payload");
                    continue;
                };
                tracing::debug!(
                    topic = %publish.topic,
                    payload = %payload,
                    "MQTT message received"
                );
                match broker.handler() {
                    Some(handler) => handler.on_message(&publish.topic, payload),
                    None => tracing::trace!(topic = %publish.topic, "No handler installed"),
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                broker.inner.status.set(ConnectionState::Disconnected);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                if broker.inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                broker.inner.status.set(ConnectionState::Disconnected);
                if broker.inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
                tracing::error!(
                    error = %e,
                    retry_in = ?reconnect_period,
                    "MQTT connection error"
                );
                tokio::time::sleep(reconnect_period).await;
                if broker.inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
                broker.inner.status.set(ConnectionState::Connecting);
            }
        }
    }

    broker.inner.status.set(ConnectionState::Disconnected);
    tracing::debug!("MQTT event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_default_values() {
        let builder = MqttBrokerBuilder::default();
        assert_eq!(builder.config.port, 1883);
        assert!(builder.config.host.is_empty());
        assert!(builder.config.credentials.is_none());
        assert!(builder.config.last_will.is_none());
        assert_eq!(builder.config.keep_alive, Duration::from_secs(30));
        assert_eq!(builder.config.connection_timeout, Duration::from_secs(10));
        assert_eq!(builder.config.reconnect_period, Duration::from_secs(30));
    }

    #[test]
    fn builder_with_credentials() {
        let builder = MqttBrokerBuilder::default().credentials("user", "pass");
        let creds = builder.config.credentials.unwrap();
        assert_eq!(creds.0, "user");
        assert_eq!(creds.1, "pass");
    }

    #[test]
    fn builder_with_last_will() {
        let builder = MqttBrokerBuilder::default().last_will("iotgate/status", "offline");
        assert_eq!(
            builder.config.last_will,
            Some(("iotgate/status".to_string(), "offline".to_string()))
        );
    }

    #[test]
    fn builder_chain() {
        let builder = MqttBrokerBuilder::default()
            .host("192.168.1.50")
            .port(8883)
            .credentials("admin", "secret")
            .client_id("rack-gateway")
            .keep_alive(Duration::from_secs(45))
            .connection_timeout(Duration::from_secs(15))
            .reconnect_period(Duration::from_secs(5));

        assert_eq!(builder.config.host, "192.168.1.50");
        assert_eq!(builder.config.port, 8883);
        assert!(builder.config.credentials.is_some());
        assert_eq!(builder.config.client_id.as_deref(), Some("rack-gateway"));
        assert_eq!(builder.config.keep_alive, Duration::from_secs(45));
        assert_eq!(builder.config.connection_timeout, Duration::from_secs(15));
        assert_eq!(builder.config.reconnect_period, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn builder_missing_host_fails() {
        let result = MqttBrokerBuilder::default().build();
        assert!(matches!(result, Err(ProtocolError::InvalidAddress(_))));
    }

    #[test]
    fn build_outside_runtime_fails() {
        let result = MqttBroker::builder().host("localhost").build();
        assert!(matches!(result, Err(ProtocolError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn generated_client_ids_are_unique() {
        // Nothing listens on port 1; the event loop just keeps retrying.
        let first = MqttBroker::builder().host("127.0.0.1").port(1).build().unwrap();
        let second = MqttBroker::builder().host("127.0.0.1").port(1).build().unwrap();
        assert!(first.client_id().starts_with("iotgate-"));
        assert_ne!(first.client_id(), second.client_id());
        assert!(!first.is_connected());
    }

    #[tokio::test]
    async fn subscribe_deduplicates_filters() {
        let broker = MqttBroker::builder().host("127.0.0.1").port(1).build().unwrap();
        broker.subscribe("+/status/#");
        broker.subscribe("+/data/#");
        broker.subscribe("+/status/#");
        assert_eq!(broker.filters(), vec!["+/status/#", "+/data/#"]);
    }
}
