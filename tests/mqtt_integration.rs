// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the MQTT transport using mockforge-mqtt.

#![cfg(feature = "mqtt")]

use std::time::Duration;

use iotgate::protocol::{ConnectionState, MqttBroker, Publisher};
use iotgate::{Config, Gateway};
use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18850);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to start, bind to port, and be ready to accept connections
    sleep(Duration::from_millis(500)).await;
}

// ============================================================================
// MqttBroker Connection Tests
// ============================================================================

mod broker_connection {
    use super::*;

    #[tokio::test]
    async fn connect_to_broker() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = MqttBroker::builder()
            .host("127.0.0.1")
            .port(port)
            .last_will("iotgate/status", "offline")
            .build()
            .unwrap();

        let result = broker.wait_connected().await;
        assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
        assert_eq!(broker.state(), ConnectionState::Connected);
        assert_eq!(broker.port(), port);

        broker.disconnect().await.unwrap();
        assert!(!broker.is_connected());
    }

    #[tokio::test]
    async fn publish_and_subscribe_when_connected() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let broker = MqttBroker::builder()
            .host("127.0.0.1")
            .port(port)
            .client_id("iotgate-test")
            .build()
            .unwrap();
        broker.wait_connected().await.unwrap();

        broker.subscribe("+/status/#");
        assert!(broker.publish("sfan/status/run", "idle", false).is_ok());
        assert!(broker.publish("iotgate/status", "online", true).is_ok());
        assert_eq!(broker.filters(), vec!["+/status/#"]);

        broker.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_broker_times_out() {
        let port = get_test_port();

        let broker = MqttBroker::builder()
            .host("127.0.0.1")
            .port(port)
            .connection_timeout(Duration::from_millis(300))
            .reconnect_period(Duration::from_secs(5))
            .build()
            .unwrap();

        assert!(broker.wait_connected().await.is_err());
        assert!(!broker.is_connected());
    }
}

// ============================================================================
// Gateway Lifecycle Tests
// ============================================================================
//
// NOTE: The mockforge-mqtt broker used for testing doesn't forward published
// messages between clients, so inbound routing is covered by unit tests in
// src/protocol/topic_router.rs and by tests/routing.rs.

mod gateway_lifecycle {
    use super::*;

    #[tokio::test]
    async fn gateway_connects_and_stops() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let config = Config::from_toml_str(&format!(
            "[gateway]\ndid = \"rack\"\ndevices = []\n\n[broker]\nhost = \"127.0.0.1\"\nport = {port}\n"
        ))
        .unwrap();
        let gateway = Gateway::new(config, &iotgate::plugins::builtin_factories()).unwrap();

        gateway.begin().await;
        assert!(gateway.is_connected());

        gateway.finish().await;
        assert_eq!(gateway.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn gateway_rejects_unknown_device_type() {
        let config = Config::from_toml_str("[gateway]\ndevices = [\"toaster\"]").unwrap();
        let result = Gateway::new(config, &iotgate::plugins::builtin_factories());
        assert!(matches!(
            result,
            Err(iotgate::Error::Device(iotgate::DeviceError::UnknownType(_)))
        ));
    }
}
