// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay to a ThingSpeak channel.
//!
//! Buffers the server temperature as `field1` and the fan state as the
//! entry status, and pushes the buffer to the channel on every tick of its
//! `publish` trigger.

use std::fmt;

use crate::actuator::Activity;
use crate::config::Config;
use crate::device::{BoundedParam, Device, DeviceContext, Source};
use crate::error::{DeviceError, ProtocolError};
use crate::protocol::HttpClient;
use crate::types::{Category, Measure, parse_number};

use super::{Schedule, fan, server, spawn_request};

pub(crate) const DID: &str = "thingspeak";

const TIMER: &str = "publish";

const DEFAULT_HOST: &str = "https://api.thingspeak.com";

const VOCABULARY: &[&str] = &["period", "channel"];

/// Client of the ThingSpeak write API.
///
/// # Examples
///
/// ```no_run
/// use iotgate::plugins::ThingSpeakClient;
///
/// # async fn example() -> Result<(), iotgate::error::ProtocolError> {
/// let client = ThingSpeakClient::new("https://api.thingspeak.com", "WRITEKEY")?;
/// let entry = client.update(Some("48.3"), Some("FAN State: idle")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ThingSpeakClient {
    http: HttpClient,
    api_key: String,
}

impl ThingSpeakClient {
    /// Creates a client writing with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ProtocolError> {
        Ok(Self {
            http: HttpClient::new(host)?,
            api_key: api_key.into(),
        })
    }

    /// Appends an entry to the channel and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedResponse`] if the service rejected
    /// the entry (it answers `0`, e.g. when updates come too fast), or the
    /// transport error.
    pub async fn update(
        &self,
        field1: Option<&str>,
        status: Option<&str>,
    ) -> Result<u64, ProtocolError> {
        let mut query = vec![("api_key", self.api_key.as_str())];
        if let Some(field1) = field1 {
            query.push(("field1", field1));
        }
        if let Some(status) = status {
            query.push(("status", status));
        }

        let body = self.http.get("/update", &query).await?;
        match body.trim().parse::<u64>() {
            Ok(0) => Err(ProtocolError::UnexpectedResponse(
                "update rejected".to_string(),
            )),
            Ok(entry) => Ok(entry),
            Err(_) => Err(ProtocolError::UnexpectedResponse(body)),
        }
    }
}

impl fmt::Debug for ThingSpeakClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThingSpeakClient")
            .field("base_url", &self.http.base_url())
            .finish_non_exhaustive()
    }
}

/// Device forwarding temperature and fan state to ThingSpeak.
#[derive(Debug)]
pub struct ThingSpeakDevice {
    client: ThingSpeakClient,
    channel: Option<String>,
    schedule: Schedule,
    field1: Option<String>,
    status: Option<String>,
}

pub(crate) fn factory(config: &Config) -> Result<Box<dyn Device>, DeviceError> {
    Ok(Box::new(ThingSpeakDevice::from_config(config)?))
}

impl ThingSpeakDevice {
    /// Creates the relay from the `[thingspeak]` section.
    ///
    /// Options: `host`, `write_api_key` (required), `channel_id`, and
    /// `period` (seconds, default 30, range 15 to 600).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::MissingOption`] without a write key.
    pub fn from_config(config: &Config) -> Result<Self, DeviceError> {
        let api_key = config
            .option::<String>(DID, "write_api_key")
            .filter(|key| !key.is_empty())
            .ok_or_else(|| DeviceError::MissingOption {
                section: DID.to_string(),
                option: "write_api_key".to_string(),
            })?;
        let host = config.option_or(DID, "host", DEFAULT_HOST.to_string());
        // Channel ids are often written as bare integers.
        let channel = config
            .option::<toml::Value>(DID, "channel_id")
            .map(|value| match value {
                toml::Value::String(channel) => channel,
                other => other.to_string(),
            });

        Ok(Self {
            client: ThingSpeakClient::new(host, api_key)?,
            channel,
            schedule: Schedule::from_config(
                TIMER,
                config,
                DID,
                "period",
                BoundedParam::new("period", 30.0, 15.0, 600.0),
            ),
            field1: None,
            status: None,
        })
    }

    /// Returns the buffered `field1` and status.
    #[must_use]
    pub fn buffer(&self) -> (Option<&str>, Option<&str>) {
        (self.field1.as_deref(), self.status.as_deref())
    }

    /// Sends the buffer in the background, then clears the status.
    fn flush(&mut self, ctx: &DeviceContext<'_>) {
        let field1 = self.field1.clone();
        let status = self.status.take();
        if field1.is_none() && status.is_none() {
            tracing::trace!(did = %ctx.did(), "Nothing to send");
            return;
        }
        let client = self.client.clone();
        spawn_request(ctx.did(), "update", async move {
            let entry = client.update(field1.as_deref(), status.as_deref()).await?;
            tracing::debug!(entry, "ThingSpeak entry created");
            Ok(())
        });
    }
}

impl Device for ThingSpeakDevice {
    fn did(&self) -> &str {
        DID
    }

    fn vocabulary(&self) -> &'static [&'static str] {
        VOCABULARY
    }

    fn begin(&mut self, ctx: &mut DeviceContext<'_>) -> Result<(), DeviceError> {
        if let Some(channel) = &self.channel {
            ctx.set_param("channel", None, channel.as_str());
        }
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
        _ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
        source: Source<'_>,
    ) -> Result<(), DeviceError> {
        if !source.is(fan::DID) || parameter != Some("run") || measure.is_some() {
            return Ok(());
        }
        let activity = Activity::from_token(value).ok_or_else(|| DeviceError::InvalidValue {
            parameter: "run".to_string(),
            value: value.to_string(),
        })?;
        self.status = Some(format!("FAN State: {activity}"));
        Ok(())
    }

    fn process_data(
        &mut self,
        _ctx: &mut DeviceContext<'_>,
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
        self.field1 = Some(format!("{temperature:.1}"));
        Ok(())
    }

    fn publish_status(&mut self, ctx: &mut DeviceContext<'_>) {
        self.schedule.publish(ctx);
        ctx.publish_param(Category::Status, "channel", None);
    }

    fn reset(&mut self, ctx: &mut DeviceContext<'_>) {
        self.schedule.reset(ctx);
    }

    fn on_tick(&mut self, ctx: &mut DeviceContext<'_>, timer: &str) -> Result<(), DeviceError> {
        if timer == self.schedule.timer() {
            self.flush(ctx);
        }
        Ok(())
    }
}
