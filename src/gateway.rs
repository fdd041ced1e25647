// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gateway lifecycle.
//!
//! The [`Gateway`] owns the broker connection, the device registry and the
//! router. It announces itself on `"<did>/status"` (`online`, or `offline`
//! through the broker's last will), starts every device, and subscribes to
//! the commands of its devices and to every status and data broadcast.
//!
//! # Examples
//!
//! ```no_run
//! use iotgate::config::Config;
//! use iotgate::gateway::Gateway;
//! use iotgate::plugins::builtin_factories;
//!
//! # async fn example() -> iotgate::Result<()> {
//! let config = Config::from_file("iotgate.toml")?;
//! let gateway = Gateway::new(config, &builtin_factories())?;
//! gateway.run_until_shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
#[cfg(feature = "mqtt")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "mqtt")]
use std::time::Duration;

use crate::config::Config;
use crate::device::{DeviceFactories, DeviceRegistry, isolate};
use crate::error::Result;
use crate::protocol::{ConnectionState, ConnectionStatus, Publisher, RouteOutcome, TopicRouter, topic};
use crate::types::{Category, Status};

#[cfg(feature = "mqtt")]
use crate::protocol::{MessageHandler, MqttBroker};

/// The gateway: broker link, registered devices, and the router between them.
pub struct Gateway {
    config: Config,
    registry: Arc<DeviceRegistry>,
    publisher: Arc<dyn Publisher>,
    status: ConnectionStatus,
    router: Arc<TopicRouter>,
    #[cfg(feature = "mqtt")]
    broker: Option<MqttBroker>,
}

impl Gateway {
    /// Builds the devices listed in `[gateway] devices` and the broker
    /// connection described by `[broker]`.
    ///
    /// The broker starts connecting right away; its last will marks the
    /// gateway `offline`.
    ///
    /// # Errors
    ///
    /// Returns error if a device cannot be built, two devices share an id,
    /// or the broker client cannot be created.
    #[cfg(feature = "mqtt")]
    pub fn new(config: Config, factories: &DeviceFactories) -> Result<Self> {
        let registry = Arc::new(DeviceRegistry::from_config(&config, factories)?);

        let status_topic = status_topic(&config);
        let mut builder = MqttBroker::builder()
            .host(config.broker.host.as_str())
            .port(config.broker.port)
            .keep_alive(Duration::from_secs(config.broker.keep_alive))
            .reconnect_period(config.gateway.reconnect_period())
            .last_will(status_topic.as_str(), Status::Offline.as_str());
        if let Some((username, password)) = config.broker.credentials() {
            builder = builder.credentials(username, password);
        }
        let broker = builder.build()?;

        let publisher: Arc<dyn Publisher> = Arc::new(broker.clone());
        let status = broker.status();
        let router = Arc::new(TopicRouter::new(
            Arc::clone(&registry),
            Arc::clone(&publisher),
            status.clone(),
        ));
        broker.set_handler(Arc::new(GatewayLink {
            router: Arc::clone(&router),
            publisher: Arc::clone(&publisher),
            status_topic,
            reconnected: AtomicBool::new(false),
        }));

        tracing::info!(
            did = %config.gateway.did,
            devices = ?registry.dids(),
            "Gateway created"
        );

        Ok(Self {
            config,
            registry,
            publisher,
            status,
            router,
            broker: Some(broker),
        })
    }

    /// Builds a gateway publishing through `publisher` instead of a broker.
    ///
    /// Nothing is received from the outside; feed inbound messages with
    /// [`route`](Self::route). The link counts as connected once
    /// [`begin`](Self::begin) returns.
    #[must_use]
    pub fn with_publisher(
        config: Config,
        registry: DeviceRegistry,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let registry = Arc::new(registry);
        let status = ConnectionStatus::default();
        let router = Arc::new(TopicRouter::new(
            Arc::clone(&registry),
            Arc::clone(&publisher),
            status.clone(),
        ));
        Self {
            config,
            registry,
            publisher,
            status,
            router,
            #[cfg(feature = "mqtt")]
            broker: None,
        }
    }

    /// Returns the gateway's own device id.
    #[must_use]
    pub fn did(&self) -> &str {
        &self.config.gateway.did
    }

    /// Returns the configuration the gateway was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the device registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.get()
    }

    /// Returns true while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// Connects, announces the gateway, starts every device in registration
    /// order and subscribes to their traffic.
    ///
    /// A device failing or panicking while starting is logged; the others
    /// still run. A broker
    /// that does not answer in time is logged too, the connection keeps
    /// being retried in the background.
    pub async fn begin(&self) {
        self.connect().await;

        self.announce(Status::Online);

        for handle in self.registry.iter() {
            if let Err(e) = isolate(|| handle.begin(&self.publisher)) {
                tracing::error!(did = %handle.did(), error = %e, "Device failed to start");
            }
        }

        self.subscribe();
        tracing::info!(did = %self.did(), "Gateway started");
    }

    #[cfg(feature = "mqtt")]
    async fn connect(&self) {
        match &self.broker {
            Some(broker) => {
                if let Err(e) = broker.wait_connected().await {
                    tracing::warn!(error = %e, "Broker not reachable yet, retrying in background");
                }
            }
            None => {
                self.status.set(ConnectionState::Connected);
            }
        }
    }

    #[cfg(not(feature = "mqtt"))]
    async fn connect(&self) {
        self.status.set(ConnectionState::Connected);
    }

    #[cfg(feature = "mqtt")]
    fn subscribe(&self) {
        let Some(broker) = &self.broker else {
            return;
        };
        for handle in self.registry.iter() {
            broker.subscribe(topic::command_filter(handle.did()));
        }
        broker.subscribe(topic::broadcast_filter(Category::Status));
        broker.subscribe(topic::broadcast_filter(Category::Data));
    }

    #[cfg(not(feature = "mqtt"))]
    fn subscribe(&self) {}

    /// Dispatches one inbound message.
    pub fn route(&self, topic: &str, payload: &str) -> RouteOutcome {
        self.router.route(topic, payload)
    }

    /// Stops every device, announces the gateway `offline` and disconnects.
    ///
    /// Safe to call after a partially failed [`begin`](Self::begin).
    pub async fn finish(&self) {
        for handle in self.registry.iter() {
            handle.finish(&self.publisher);
        }

        self.announce(Status::Offline);

        #[cfg(feature = "mqtt")]
        if let Some(broker) = &self.broker
            && let Err(e) = broker.disconnect().await
        {
            tracing::error!(error = %e, "Disconnect failed");
        }
        self.status.set(ConnectionState::Disconnected);
        tracing::info!(did = %self.did(), "Gateway stopped");
    }

    /// Runs [`begin`](Self::begin), waits for Ctrl-C, then runs
    /// [`finish`](Self::finish).
    pub async fn run_until_shutdown(&self) {
        self.begin().await;
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for shutdown signal");
        }
        tracing::info!("Shutdown requested");
        self.finish().await;
    }

    fn announce(&self, status: Status) {
        let topic = status_topic(&self.config);
        tracing::debug!(topic = %topic, status = %status, "Announcing gateway");
        if let Err(e) = self.publisher.publish(&topic, status.as_str(), true) {
            tracing::error!(topic = %topic, error = %e, "Publish failed");
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("did", &self.did())
            .field("devices", &self.registry.dids())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn status_topic(config: &Config) -> String {
    topic::encode(&config.gateway.did, Category::Status, None, None)
}

/// Connects broker events to the router.
#[cfg(feature = "mqtt")]
struct GatewayLink {
    router: Arc<TopicRouter>,
    publisher: Arc<dyn Publisher>,
    status_topic: String,
    reconnected: AtomicBool,
}

#[cfg(feature = "mqtt")]
impl MessageHandler for GatewayLink {
    fn on_message(&self, topic: &str, payload: &str) {
        let outcome = self.router.route(topic, payload);
        tracing::trace!(topic = %topic, ?outcome, "Routed");
    }

    fn on_connect(&self) {
        // The first announcement is made by `Gateway::begin`.
        if !self.reconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(topic = %self.status_topic, "Reconnected, announcing gateway");
        if let Err(e) = self
            .publisher
            .publish(&self.status_topic, Status::Online.as_str(), true)
        {
            tracing::error!(topic = %self.status_topic, error = %e, "Publish failed");
        }
    }
}
