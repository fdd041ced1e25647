// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the gateway.
//!
//! The hierarchy follows the places where things go wrong: decoding topics,
//! running device logic, talking to the broker or a cloud service, and loading
//! configuration. None of them is fatal to a running gateway; they are logged
//! at the point where a message is dropped.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A topic string could not be decoded.
    #[error("topic error: {0}")]
    Topic(#[from] TopicError),

    /// A device failed while handling a message or lifecycle call.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Broker or cloud communication failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors produced by the topic codec.
///
/// Every variant means the message is dropped without dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// The topic has more than four separator-delimited segments.
    #[error("topic has {0} segments, at most 4 allowed")]
    TooManySegments(usize),

    /// A mandatory segment (device id or category) is absent.
    #[error("topic is missing its {0} segment")]
    MissingSegment(&'static str),

    /// The category segment is not one of `command`, `status`, `data`.
    #[error("unknown topic category: {0}")]
    UnknownCategory(String),
}

/// Errors related to device plugins.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A payload could not be interpreted as the expected type.
    #[error("invalid value {value:?} for parameter {parameter}")]
    InvalidValue {
        /// Parameter the payload was addressed to.
        parameter: String,
        /// The raw payload.
        value: String,
    },

    /// Two devices were registered under the same device id.
    #[error("device id {0} is already registered")]
    DuplicateDid(String),

    /// The configuration asks for a device type nobody registered.
    #[error("unknown device type: {0}")]
    UnknownType(String),

    /// Direct hardware access failed.
    #[error("hardware access failed: {0}")]
    Hardware(#[from] std::io::Error),

    /// The device needs a configuration option that is not present.
    #[error("missing configuration option {section}.{option}")]
    MissingOption {
        /// Configuration section.
        section: String,
        /// Option name.
        option: String,
    },

    /// A cloud relay could not set up or reach its service.
    #[error("cloud service: {0}")]
    Protocol(#[from] ProtocolError),

    /// A handler panicked; the panic was contained by the router.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Errors related to broker and cloud communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker or service failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The remote service answered with something unexpected.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Errors related to loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered back to TOML.
    #[error("cannot render configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
