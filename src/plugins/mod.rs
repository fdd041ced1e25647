// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Built-in devices.
//!
//! | Key          | Device                                              |
//! |--------------|-----------------------------------------------------|
//! | `server`     | [`ServerDevice`]: SoC temperature sensor            |
//! | `sfan`       | [`FanDevice`]: cooling fan with hysteresis control  |
//! | `thingspeak` | [`ThingSpeakDevice`]: relay to a ThingSpeak channel |
//! | `blynk`      | [`BlynkDevice`]: relay to a Blynk mobile dashboard  |
//!
//! Each device reads its options from the configuration section named after
//! its key.

#[cfg(feature = "http")]
mod blynk;
mod fan;
mod server;
#[cfg(feature = "http")]
mod thingspeak;

#[cfg(feature = "http")]
pub use blynk::{BlynkClient, BlynkDevice};
pub use fan::FanDevice;
pub use server::{ServerDevice, SimulatedThermal, SysfsThermal, TemperatureSource};
#[cfg(feature = "http")]
pub use thingspeak::{ThingSpeakClient, ThingSpeakDevice};

use std::time::Duration;

use crate::device::{BoundedParam, DeviceContext, DeviceFactories};
use crate::types::{Category, Measure};

/// Returns the factory table of every built-in device.
#[must_use]
pub fn builtin_factories() -> DeviceFactories {
    let mut factories = DeviceFactories::new();
    factories
        .register(server::DID, server::factory)
        .register(fan::DID, fan::factory);
    #[cfg(feature = "http")]
    factories
        .register(thingspeak::DID, thingspeak::factory)
        .register(blynk::DID, blynk::factory);
    factories
}

/// A device's periodic trigger together with its bounded `period` parameter.
#[derive(Debug, Clone)]
pub(crate) struct Schedule {
    timer: &'static str,
    period: BoundedParam,
}

impl Schedule {
    /// Creates a schedule, taking the initial period in seconds from
    /// `[section] name` when set. Negative values are taken as absolute;
    /// NaN and infinities keep the default.
    pub(crate) fn from_config(
        timer: &'static str,
        config: &crate::config::Config,
        section: &str,
        name: &str,
        period: BoundedParam,
    ) -> Self {
        let mut period = period;
        if let Some(seconds) = config
            .option::<f64>(section, name)
            .filter(|seconds| seconds.is_finite())
        {
            period.set_value(seconds.abs());
        }
        Self { timer, period }
    }

    pub(crate) fn timer(&self) -> &'static str {
        self.timer
    }

    pub(crate) fn period(&self) -> &BoundedParam {
        &self.period
    }

    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.period.value())
    }

    /// Stores the period measures and starts the trigger.
    pub(crate) fn start(&self, ctx: &mut DeviceContext<'_>) {
        self.period.store_into(ctx.params());
        ctx.start_timer(self.timer, self.duration());
    }

    /// Applies a `period` command. Returns true if the period changed.
    pub(crate) fn command(&mut self, ctx: &mut DeviceContext<'_>, raw: &str) -> bool {
        if self.period.set(Some(raw)).is_none() {
            return false;
        }
        self.apply(ctx);
        ctx.publish_param(Category::Status, self.period.parameter(), Some(Measure::Value));
        true
    }

    /// Restores the default period without publishing.
    pub(crate) fn reset(&mut self, ctx: &mut DeviceContext<'_>) {
        if self.period.reset().is_some() {
            self.apply(ctx);
        }
    }

    fn apply(&self, ctx: &mut DeviceContext<'_>) {
        self.period.store_into(ctx.params());
        ctx.set_timer_period(self.timer, self.duration());
        tracing::info!(did = %ctx.did(), timer = self.timer, period = self.period.value(), "Period changed");
    }

    /// Publishes value, default and bounds of the period.
    pub(crate) fn publish(&self, ctx: &DeviceContext<'_>) {
        publish_bounded(ctx, &self.period);
    }
}

/// Publishes the four measures of a bounded parameter as status.
pub(crate) fn publish_bounded(ctx: &DeviceContext<'_>, param: &BoundedParam) {
    for measure in [
        Measure::Value,
        Measure::Default,
        Measure::Minimum,
        Measure::Maximum,
    ] {
        ctx.publish_param(Category::Status, param.parameter(), Some(measure));
    }
}

/// Runs a cloud request on the current tokio runtime without waiting for it.
///
/// Failures are logged. Outside a runtime the request is dropped with a
/// warning.
#[cfg(feature = "http")]
pub(crate) fn spawn_request<F>(did: &str, request: &'static str, future: F)
where
    F: std::future::Future<Output = Result<(), crate::error::ProtocolError>> + Send + 'static,
{
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(did = %did, request, "No tokio runtime, request dropped");
        return;
    };
    let did = did.to_string();
    runtime.spawn(async move {
        match future.await {
            Ok(()) => tracing::debug!(did = %did, request, "Cloud request done"),
            Err(e) => tracing::error!(did = %did, request, error = %e, "Cloud request failed"),
        }
    });
}
