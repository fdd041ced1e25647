// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay to a Blynk mobile dashboard.
//!
//! The server temperature is written to virtual pin `V1` and the fan state
//! to `V3`. `V3` is also a button in the app: it is polled periodically and
//! a change is turned into an `on` or `off` command for the fan.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI8, Ordering};

use crate::actuator::Activity;
use crate::config::Config;
use crate::device::{BoundedParam, Device, DeviceContext, Source};
use crate::error::{DeviceError, ProtocolError};
use crate::protocol::{HttpClient, topic};
use crate::types::{Category, Command, Measure, parse_number};

use super::{Schedule, fan, server, spawn_request};

pub(crate) const DID: &str = "blynk";

const TIMER: &str = "poll";

const DEFAULT_HOST: &str = "https://blynk.cloud";

/// Virtual pin showing the temperature.
const TEMPERATURE_PIN: &str = "V1";

/// Virtual pin showing and switching the fan.
const FAN_PIN: &str = "V3";

const VOCABULARY: &[&str] = &["temp", "cfan", "period"];

/// Client of the Blynk HTTP device API.
#[derive(Clone)]
pub struct BlynkClient {
    http: HttpClient,
    token: String,
}

impl BlynkClient {
    /// Creates a client authenticated by a device auth token.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Result<Self, ProtocolError> {
        Ok(Self {
            http: HttpClient::new(host)?,
            token: token.into(),
        })
    }

    /// Writes a virtual pin.
    ///
    /// # Errors
    ///
    /// Returns the transport error.
    pub async fn update(&self, pin: &str, value: &str) -> Result<(), ProtocolError> {
        self.http
            .get("/external/api/update", &[("token", self.token.as_str()), (pin, value)])
            .await?;
        Ok(())
    }

    /// Reads a virtual pin.
    ///
    /// # Errors
    ///
    /// Returns the transport error.
    pub async fn get(&self, pin: &str) -> Result<String, ProtocolError> {
        let body = self
            .http
            .get("/external/api/get", &[("token", self.token.as_str()), (pin, "")])
            .await?;
        Ok(pin_value(&body))
    }
}

impl fmt::Debug for BlynkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlynkClient")
            .field("base_url", &self.http.base_url())
            .finish_non_exhaustive()
    }
}

/// Extracts a pin value from a response body.
///
/// The API answers plain text for a single pin, but JSON strings, numbers
/// and arrays are also seen.
fn pin_value(body: &str) -> String {
    fn from_json(value: serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::String(text) => Some(text),
            serde_json::Value::Number(number) => Some(number.to_string()),
            serde_json::Value::Bool(flag) => Some(u8::from(flag).to_string()),
            serde_json::Value::Array(items) => items.into_iter().next().and_then(from_json),
            _ => None,
        }
    }

    let body = body.trim();
    serde_json::from_str(body)
        .ok()
        .and_then(from_json)
        .unwrap_or_else(|| body.to_string())
}

/// Last known position of the app button, shared with poll tasks.
#[derive(Debug, Clone)]
struct ButtonState(Arc<AtomicI8>);

impl ButtonState {
    const UNKNOWN: i8 = -1;

    fn new() -> Self {
        Self(Arc::new(AtomicI8::new(Self::UNKNOWN)))
    }

    /// Records the position shown by the gateway.
    fn record(&self, on: bool) {
        self.0.store(i8::from(on), Ordering::Release);
    }

    /// Records a polled position. Returns the command to send if the user
    /// moved the button since the last known position.
    fn observe(&self, on: bool) -> Option<Command> {
        let previous = self.0.swap(i8::from(on), Ordering::AcqRel);
        if previous == Self::UNKNOWN || previous == i8::from(on) {
            return None;
        }
        Some(if on { Command::TurnOn } else { Command::TurnOff })
    }
}

/// Device forwarding temperature and fan state to Blynk, and the app button
/// back to the fan.
#[derive(Debug)]
pub struct BlynkDevice {
    client: BlynkClient,
    fan: String,
    schedule: Schedule,
    button: ButtonState,
}

pub(crate) fn factory(config: &Config) -> Result<Box<dyn Device>, DeviceError> {
    Ok(Box::new(BlynkDevice::from_config(config)?))
}

impl BlynkDevice {
    /// Creates the relay from the `[blynk]` section.
    ///
    /// Options: `host`, `token` (required), `fan` (device switched by the
    /// button, default `sfan`), and `poll_period` (seconds, default 2,
    /// range 1 to 60).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::MissingOption`] without a token.
    pub fn from_config(config: &Config) -> Result<Self, DeviceError> {
        let token = config
            .option::<String>(DID, "token")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| DeviceError::MissingOption {
                section: DID.to_string(),
                option: "token".to_string(),
            })?;
        let host = config.option_or(DID, "host", DEFAULT_HOST.to_string());

        Ok(Self {
            client: BlynkClient::new(host, token)?,
            fan: config.option_or(DID, "fan", fan::DID.to_string()),
            schedule: Schedule::from_config(
                TIMER,
                config,
                DID,
                "poll_period",
                BoundedParam::new("period", 2.0, 1.0, 60.0),
            ),
            button: ButtonState::new(),
        })
    }

    fn send(&self, ctx: &DeviceContext<'_>, pin: &'static str, value: String) {
        let client = self.client.clone();
        spawn_request(ctx.did(), "update", async move {
            client.update(pin, &value).await
        });
    }

    fn poll(&self, ctx: &DeviceContext<'_>) {
        let client = self.client.clone();
        let button = self.button.clone();
        let publisher = ctx.publisher();
        let command_topic = topic::encode(&self.fan, Category::Command, None, None);
        spawn_request(ctx.did(), "poll", async move {
            let value = client.get(FAN_PIN).await?;
            let level = parse_number(&value).ok_or(ProtocolError::UnexpectedResponse(value))?;
            if let Some(command) = button.observe(level != 0.0) {
                tracing::info!(topic = %command_topic, command = %command, "Fan switched from app");
                publisher.publish(&command_topic, command.as_str(), false)?;
            }
            Ok(())
        });
    }
}

impl Device for BlynkDevice {
    fn did(&self) -> &str {
        DID
    }

    fn vocabulary(&self) -> &'static [&'static str] {
        VOCABULARY
    }

    fn begin(&mut self, ctx: &mut DeviceContext<'_>) -> Result<(), DeviceError> {
        ctx.set_param("temp", Some(Measure::Gpio), TEMPERATURE_PIN);
        ctx.set_param("cfan", Some(Measure::Gpio), FAN_PIN);
        self.schedule.start(ctx);
        self.publish_status(ctx);
        Ok(())
    }

    fn process_own_command(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
    ) -> Result<(), DeviceError> {
        match parameter {
            Some("period") if Measure::Value.matches(measure) => {
                self.schedule.command(ctx, value);
            }
            _ => tracing::trace!(value = %value, ?parameter, "Ignoring command"),
        }
        Ok(())
    }

    fn process_status(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
        source: Source<'_>,
    ) -> Result<(), DeviceError> {
        if !source.is(&self.fan) || parameter != Some("run") || measure.is_some() {
            return Ok(());
        }
        let on = match Activity::from_token(value) {
            Some(Activity::Active) => true,
            Some(Activity::Idle) => false,
            Some(Activity::Unknown) => return Ok(()),
            None => {
                return Err(DeviceError::InvalidValue {
                    parameter: "run".to_string(),
                    value: value.to_string(),
                });
            }
        };
        self.button.record(on);
        self.send(ctx, FAN_PIN, u8::from(on).to_string());
        Ok(())
    }

    fn process_data(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
        source: Source<'_>,
    ) -> Result<(), DeviceError> {
        if !source.is(server::DID) || parameter != Some("temp") || !Measure::Value.matches(measure) {
            return Ok(());
        }
        let temperature = parse_number(value).ok_or_else(|| DeviceError::InvalidValue {
            parameter: "temp".to_string(),
            value: value.to_string(),
        })?;
        self.send(ctx, TEMPERATURE_PIN, format!("{temperature:.1}"));
        Ok(())
    }

    fn publish_status(&mut self, ctx: &mut DeviceContext<'_>) {
        ctx.publish_param(Category::Status, "temp", Some(Measure::Gpio));
        ctx.publish_param(Category::Status, "cfan", Some(Measure::Gpio));
        self.schedule.publish(ctx);
    }

    fn reset(&mut self, ctx: &mut DeviceContext<'_>) {
        self.schedule.reset(ctx);
    }

    fn on_tick(&mut self, ctx: &mut DeviceContext<'_>, timer: &str) -> Result<(), DeviceError> {
        if timer == self.schedule.timer() {
            self.poll(ctx);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::Bench;

    fn device() -> BlynkDevice {
        let config = Config::from_toml_str("[blynk]\ntoken = \"t0k\"\npoll_period = 0.5").unwrap();
        BlynkDevice::from_config(&config).unwrap()
    }

    #[test]
    fn token_is_required() {
        let config = Config::from_toml_str("[blynk]\ntoken = \"\"").unwrap();
        assert!(matches!(
            BlynkDevice::from_config(&config),
            Err(DeviceError::MissingOption { .. })
        ));
    }

    #[test]
    fn poll_period_is_clamped() {
        assert_eq!(device().schedule.period().value(), 1.0);
    }

    #[test]
    fn pin_value_formats() {
        assert_eq!(pin_value("1"), "1");
        assert_eq!(pin_value(" 0\n"), "0");
        assert_eq!(pin_value("[\"1\"]"), "1");
        assert_eq!(pin_value("[0]"), "0");
        assert_eq!(pin_value("\"48.3\""), "48.3");
        assert_eq!(pin_value("true"), "1");
        assert_eq!(pin_value("Invalid token."), "Invalid token.");
    }

    #[test]
    fn button_changes_become_commands() {
        let button = ButtonState::new();
        assert_eq!(button.observe(true), None);
        assert_eq!(button.observe(true), None);
        assert_eq!(button.observe(false), Some(Command::TurnOff));
        assert_eq!(button.observe(true), Some(Command::TurnOn));
    }

    #[test]
    fn fan_state_updates_known_button_position() {
        let mut bench = Bench::new();
        let mut device = device();

        device
            .process_status(
                &mut bench.ctx(DID),
                "active",
                Some("run"),
                None,
                Source::Unregistered("sfan"),
            )
            .unwrap();

        // The app still shows the state the gateway pushed: nothing to do.
        assert_eq!(device.button.observe(true), None);
        assert_eq!(device.button.observe(false), Some(Command::TurnOff));
    }

    #[test]
    fn invalid_fan_state_is_rejected() {
        let mut bench = Bench::new();
        let mut device = device();

        let result = device.process_status(
            &mut bench.ctx(DID),
            "spinning",
            Some("run"),
            None,
            Source::Unregistered("sfan"),
        );
        assert!(matches!(result, Err(DeviceError::InvalidValue { .. })));
    }

    #[test]
    fn begin_publishes_virtual_pins() {
        let mut bench = Bench::new();
        let recorder = bench.recorder();
        let mut device = device();

        device.begin(&mut bench.ctx(DID)).unwrap();

        assert_eq!(recorder.on_topic("blynk/status/temp/gpio"), vec!["V1"]);
        assert_eq!(recorder.on_topic("blynk/status/cfan/gpio"), vec!["V3"]);
        assert_eq!(recorder.on_topic("blynk/status/period/value"), vec!["1.0"]);
    }
}
