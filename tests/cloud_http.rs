// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the cloud relay clients using wiremock.

#![cfg(feature = "http")]

use iotgate::ProtocolError;
use iotgate::plugins::{BlynkClient, ThingSpeakClient};
use iotgate::protocol::HttpClient;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// HttpClient Tests
// ============================================================================

mod http_client {
    use super::*;

    #[tokio::test]
    async fn get_returns_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(query_param("who", "gateway"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(mock_server.uri()).unwrap();
        let body = client.get("/ping", &[("who", "gateway")]).await.unwrap();

        assert_eq!(body, "pong");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(mock_server.uri()).unwrap();
        let result = client.get("/anything", &[]).await;

        assert!(matches!(result, Err(ProtocolError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn server_error_maps_to_connection_failed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(mock_server.uri()).unwrap();
        let result = client.get("/anything", &[]).await;

        assert!(matches!(result, Err(ProtocolError::ConnectionFailed(_))));
    }
}

// ============================================================================
// ThingSpeak Tests
// ============================================================================

mod thingspeak {
    use super::*;

    #[tokio::test]
    async fn update_sends_field_and_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/update"))
            .and(query_param("api_key", "WRITEKEY"))
            .and(query_param("field1", "48.3"))
            .and(query_param("status", "FAN State: idle"))
            .respond_with(ResponseTemplate::new(200).set_body_string("17"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ThingSpeakClient::new(mock_server.uri(), "WRITEKEY").unwrap();
        let entry = client
            .update(Some("48.3"), Some("FAN State: idle"))
            .await
            .unwrap();

        assert_eq!(entry, 17);
    }

    #[tokio::test]
    async fn update_without_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/update"))
            .and(query_param("field1", "51"))
            .respond_with(ResponseTemplate::new(200).set_body_string("3\n"))
            .mount(&mock_server)
            .await;

        let client = ThingSpeakClient::new(mock_server.uri(), "WRITEKEY").unwrap();
        let entry = client.update(Some("51"), None).await.unwrap();

        assert_eq!(entry, 3);
    }

    #[tokio::test]
    async fn rejected_update_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200).set_body_string("0"))
            .mount(&mock_server)
            .await;

        let client = ThingSpeakClient::new(mock_server.uri(), "WRITEKEY").unwrap();
        let result = client.update(Some("48.3"), None).await;

        assert!(matches!(result, Err(ProtocolError::UnexpectedResponse(_))));
    }
}

// ============================================================================
// Blynk Tests
// ============================================================================

mod blynk {
    use super::*;

    #[tokio::test]
    async fn update_writes_virtual_pin() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/external/api/update"))
            .and(query_param("token", "AUTH"))
            .and(query_param("V1", "48.3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = BlynkClient::new(mock_server.uri(), "AUTH").unwrap();
        client.update("V1", "48.3").await.unwrap();
    }

    #[tokio::test]
    async fn get_reads_plain_value() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/external/api/get"))
            .and(query_param("token", "AUTH"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1"))
            .mount(&mock_server)
            .await;

        let client = BlynkClient::new(mock_server.uri(), "AUTH").unwrap();
        assert_eq!(client.get("V3").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn get_reads_json_array_value() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/external/api/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["0"])))
            .mount(&mock_server)
            .await;

        let client = BlynkClient::new(mock_server.uri(), "AUTH").unwrap();
        assert_eq!(client.get("V3").await.unwrap(), "0");
    }

    #[tokio::test]
    async fn invalid_token_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let client = BlynkClient::new(mock_server.uri(), "WRONG").unwrap();
        let result = client.update("V1", "1").await;

        assert!(matches!(result, Err(ProtocolError::AuthenticationFailed)));
    }
}
