// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cooling fan switched by the SoC temperature.
//!
//! The fan follows the `temp/value` data of its source device (`server` by
//! default), expressed as a percentage of the source's `temp/maximum`. It
//! turns on at `percon` percent and off at `percoff` percent.
//!
//! Commands: `sfan/command/percon <n>`, `sfan/command/percoff <n>`,
//! `sfan/command on` and `sfan/command off`.

use crate::actuator::{Activity, HysteresisActuator, OutputPin, SYSFS_GPIO_ROOT, SysfsPin, ThresholdPair};
use crate::config::Config;
use crate::device::{Device, DeviceContext, Source};
use crate::error::DeviceError;
use crate::types::{Category, Command, Measure, parse_number};

pub(crate) const DID: &str = "sfan";

/// Maximum temperature assumed until the source publishes its own.
const DEFAULT_MAXIMUM: f64 = 75.0;

const DEFAULT_GPIO: u32 = 4;

const VOCABULARY: &[&str] = &["run", "percon", "percoff"];

/// Fan driven by a [`HysteresisActuator`] on the `run` parameter.
#[derive(Debug)]
pub struct FanDevice<P> {
    source: String,
    gpio: u32,
    actuator: HysteresisActuator<P>,
    maximum: f64,
}

pub(crate) fn factory(config: &Config) -> Result<Box<dyn Device>, DeviceError> {
    let gpio = config.option_or(DID, "gpio", DEFAULT_GPIO);
    let root = config.option_or(DID, "gpio_root", SYSFS_GPIO_ROOT.to_string());
    let source = config.option_or(DID, "source", super::server::DID.to_string());
    Ok(Box::new(FanDevice::new(source, gpio, SysfsPin::with_root(root, gpio))))
}

impl<P: OutputPin> FanDevice<P> {
    /// Creates a fan following `source`, driving `pin`.
    ///
    /// `gpio` is only reported as the `run/gpio` parameter.
    #[must_use]
    pub fn new(source: impl Into<String>, gpio: u32, pin: P) -> Self {
        Self {
            source: source.into(),
            gpio,
            actuator: HysteresisActuator::new("run", pin, ThresholdPair::default()),
            maximum: DEFAULT_MAXIMUM,
        }
    }

    /// Returns the fan state.
    #[must_use]
    pub fn activity(&self) -> Activity {
        self.actuator.activity()
    }

    /// Returns the switch-on and switch-off thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &ThresholdPair {
        self.actuator.thresholds()
    }

    fn is_temperature(&self, source: &Source<'_>, parameter: Option<&str>) -> bool {
        source.is(&self.source) && parameter == Some("temp") && source.owns("temp")
    }
}

impl<P: OutputPin + 'static> Device for FanDevice<P> {
    fn did(&self) -> &str {
        DID
    }

    fn vocabulary(&self) -> &'static [&'static str] {
        VOCABULARY
    }

    fn begin(&mut self, ctx: &mut DeviceContext<'_>) -> Result<(), DeviceError> {
        ctx.set_param("run", Some(Measure::Gpio), self.gpio.to_string());
        self.actuator.store_into(ctx.params());
        self.actuator.drive(ctx, Activity::Idle)?;
        self.publish_status(ctx);
        Ok(())
    }

    fn finish(&mut self, ctx: &mut DeviceContext<'_>) {
        if let Err(e) = self.actuator.apply(ctx, Activity::Idle) {
            tracing::error!(did = %ctx.did(), error = %e, "Cannot stop fan");
        }
    }

    fn process_own_command(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
    ) -> Result<(), DeviceError> {
        if let Some(parameter) = parameter {
            match self.thresholds().kind_of(parameter) {
                Some(kind) if Measure::Value.matches(measure) => {
                    self.actuator.set_threshold(ctx, kind, Some(value))?;
                }
                _ => tracing::trace!(parameter = %parameter, "Ignoring command"),
            }
            return Ok(());
        }

        let target = match Command::from_token(value) {
            Some(Command::TurnOn) => Activity::Active,
            Some(Command::TurnOff) => Activity::Idle,
            _ => {
                return Err(DeviceError::InvalidValue {
                    parameter: "run".to_string(),
                    value: value.to_string(),
                });
            }
        };
        self.actuator.force(ctx, target)?;
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
        if !self.is_temperature(&source, parameter) || !Measure::Maximum.matches(measure) {
            return Ok(());
        }
        match parse_number(value).filter(|maximum| *maximum > 0.0) {
            Some(maximum) => {
                self.maximum = maximum;
                Ok(())
            }
            None => Err(DeviceError::InvalidValue {
                parameter: "temp".to_string(),
                value: value.to_string(),
            }),
        }
    }

    fn process_data(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
        source: Source<'_>,
    ) -> Result<(), DeviceError> {
        if !self.is_temperature(&source, parameter) || !Measure::Value.matches(measure) {
            return Ok(());
        }
        let Some(temperature) = parse_number(value) else {
            return Err(DeviceError::InvalidValue {
                parameter: "temp".to_string(),
                value: value.to_string(),
            });
        };
        let maximum = source
            .param("temp", Some(Measure::Maximum))
            .and_then(|maximum| maximum.as_f64())
            .filter(|maximum| *maximum > 0.0)
            .unwrap_or(self.maximum);
        let percentage = temperature / maximum * 100.0;
        tracing::trace!(temperature, maximum, percentage, "Fan input");

        self.actuator.evaluate(ctx, percentage)?;
        Ok(())
    }

    fn publish_status(&mut self, ctx: &mut DeviceContext<'_>) {
        self.actuator.publish_status(ctx);
        ctx.publish_param(Category::Status, "run", Some(Measure::Gpio));
    }

    fn reset(&mut self, ctx: &mut DeviceContext<'_>) {
        self.actuator.reset(ctx);
    }
}
