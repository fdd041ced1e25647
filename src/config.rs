// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gateway configuration.
//!
//! The configuration is a TOML document with two typed sections and any
//! number of free-form device sections:
//!
//! ```toml
//! [gateway]
//! did = "iotgate"
//! devices = ["server", "sfan"]
//! reconnect_period = 30
//!
//! [broker]
//! host = "localhost"
//! port = 1883
//!
//! [sfan]
//! gpio = 4
//! ```
//!
//! Device sections are read through [`Config::option`] when devices are
//! constructed, before any of them begins.

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Bounds of the broker reconnection period, in seconds.
const RECONNECT_PERIOD_RANGE: (f64, f64) = (5.0, 180.0);

/// Complete gateway configuration.
///
/// # Examples
///
/// ```
/// use iotgate::config::Config;
///
/// let config = Config::from_toml_str(r#"
///     [broker]
///     host = "10.0.0.2"
///
///     [sfan]
///     gpio = 17
/// "#).unwrap();
///
/// assert_eq!(config.broker.host, "10.0.0.2");
/// assert_eq!(config.option::<u32>("sfan", "gpio"), Some(17));
/// assert_eq!(config.option_or("sfan", "missing", 4_u32), 4);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway identity and device list.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Broker connection.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Free-form device sections.
    #[serde(flatten)]
    sections: toml::Table,
}

/// The `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Device id of the gateway itself, used for its online/offline status.
    pub did: String,
    /// Device type keys to instantiate, in registration order.
    pub devices: Vec<String>,
    /// Seconds to wait before retrying a lost broker connection.
    pub reconnect_period: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            did: "iotgate".to_string(),
            devices: vec!["server".to_string(), "sfan".to_string()],
            reconnect_period: 30.0,
        }
    }
}

impl GatewayConfig {
    /// Returns the reconnection period, clamped to 5..=180 seconds.
    #[must_use]
    pub fn reconnect_period(&self) -> Duration {
        let (minimum, maximum) = RECONNECT_PERIOD_RANGE;
        let seconds = if self.reconnect_period.is_finite() {
            self.reconnect_period.abs().clamp(minimum, maximum)
        } else {
            maximum
        };
        Duration::from_secs_f64(seconds)
    }
}

/// The `[broker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional user name.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            keep_alive: 30,
        }
    }
}

impl BrokerConfig {
    /// Returns credentials when both user name and password are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}

impl Config {
    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if a value cannot be rendered.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads an option from a free-form section.
    ///
    /// Returns `None` when the section or option is absent, or when the value
    /// does not have the requested type (logged as a warning).
    #[must_use]
    pub fn option<T: DeserializeOwned>(&self, section: &str, name: &str) -> Option<T> {
        let value = self.sections.get(section)?.as_table()?.get(name)?;
        match value.clone().try_into() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    section = %section,
                    option = %name,
                    error = %e,
                    "Ignoring mistyped configuration option"
                );
                None
            }
        }
    }

    /// Reads an option, falling back to `default`.
    #[must_use]
    pub fn option_or<T: DeserializeOwned>(&self, section: &str, name: &str, default: T) -> T {
        self.option(section, name).unwrap_or(default)
    }

    /// Sets an option in a free-form section, creating the section if needed.
    pub fn set_option(&mut self, section: &str, name: &str, value: impl Into<toml::Value>) {
        let entry = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if let toml::Value::Table(table) = entry {
            table.insert(name.to_string(), value.into());
        } else {
            tracing::warn!(section = %section, "Configuration key is not a section");
        }
    }

    /// Returns true if a free-form section is present.
    #[must_use]
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.get(section).is_some_and(toml::Value::is_table)
    }
}
