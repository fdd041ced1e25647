// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `iotgate` - An MQTT gateway for small hardware-control devices.
//!
//! The gateway connects a set of device plugins to an MQTT broker. Every
//! message is addressed by a topic of up to four segments:
//!
//! ```text
//! did/category[/parameter[/measure]]
//! ```
//!
//! where `category` is one of `command`, `status` or `data`. Commands go to
//! the addressed device only; status and data messages are broadcast to
//! every other device, which decide for themselves what they care about.
//!
//! # Built-in Devices
//!
//! - **server**: SoC temperature sensor
//! - **sfan**: cooling fan with hysteresis control on a GPIO line
//! - **thingspeak**: relays temperature and fan state to a ThingSpeak channel
//! - **blynk**: relays to a Blynk dashboard and takes fan commands from it
//!
//! # Quick Start
//!
//! ```no_run
//! use iotgate::{Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> iotgate::Result<()> {
//!     let config = Config::from_toml_str(
//!         r#"
//!         [gateway]
//!         devices = ["server", "sfan"]
//!
//!         [broker]
//!         host = "192.168.1.50"
//!
//!         [sfan]
//!         gpio = 17
//!         "#,
//!     )?;
//!
//!     let gateway = Gateway::new(config, &iotgate::plugins::builtin_factories())?;
//!     gateway.run_until_shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Writing a Device
//!
//! Implement [`Device`] and register a constructor in a [`DeviceFactories`]
//! table; see the [`device`] module.

pub mod actuator;
pub mod config;
pub mod device;
pub mod error;
pub mod gateway;
pub mod plugins;
pub mod protocol;
pub mod timer;
pub mod types;

pub use actuator::{Activity, HysteresisActuator, OutputPin, ThresholdKind, ThresholdPair};
pub use config::Config;
pub use device::{Device, DeviceContext, DeviceFactories, DeviceRegistry, ParameterStore, Source};
pub use error::{ConfigError, DeviceError, Error, ProtocolError, Result, TopicError};
pub use gateway::Gateway;
#[cfg(feature = "mqtt")]
pub use protocol::MqttBroker;
pub use protocol::{Publisher, RouteOutcome, TopicAddress, TopicRouter};
pub use timer::PeriodicTrigger;
pub use types::{Category, Command, Measure, ParamValue, Status};
