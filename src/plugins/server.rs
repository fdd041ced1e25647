// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SoC temperature sensor.
//!
//! Publishes, on every tick of its `temperature` trigger:
//!
//! - `server/data/temp/value`: temperature in °C
//! - `server/data/temp/percentage`: temperature relative to the trip point
//!
//! The trip point is published once as `server/status/temp/maximum`.

use std::ops::RangeInclusive;
use std::path::PathBuf;

use rand::Rng;

use crate::config::Config;
use crate::device::{BoundedParam, Device, DeviceContext};
use crate::error::DeviceError;
use crate::types::{Category, Measure};

use super::Schedule;

pub(crate) const DID: &str = "server";

/// Name of the sampling trigger.
const TIMER: &str = "temperature";

/// Root of the default thermal zone.
const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0";

/// Readings above this are millidegrees.
const MILLIDEGREE_THRESHOLD: f64 = 85.0;

/// Trip point used when the zone does not expose one.
const DEFAULT_MAXIMUM: f64 = 75.0;

/// Span of simulated readings.
const SIMULATED_RANGE: RangeInclusive<f64> = 40.0..=70.0;

const VOCABULARY: &[&str] = &["temp", "period"];

/// Source of temperature readings.
pub trait TemperatureSource: Send {
    /// Reads the current temperature in °C.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if no reading is available.
    fn temperature(&mut self) -> std::io::Result<f64>;

    /// Returns the temperature considered critical, if known.
    fn maximum(&mut self) -> Option<f64>;
}

/// Thermal zone read through sysfs.
#[derive(Debug, Clone)]
pub struct SysfsThermal {
    zone: PathBuf,
}

impl Default for SysfsThermal {
    fn default() -> Self {
        Self::new(THERMAL_ZONE)
    }
}

impl SysfsThermal {
    /// Creates a source reading the given thermal zone directory.
    #[must_use]
    pub fn new(zone: impl Into<PathBuf>) -> Self {
        Self { zone: zone.into() }
    }

    fn read(&self, file: &str) -> std::io::Result<f64> {
        let content = std::fs::read_to_string(self.zone.join(file))?;
        let value = content.trim().parse::<f64>().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{file}: {e}"))
        })?;
        Ok(normalize(value))
    }
}

impl TemperatureSource for SysfsThermal {
    fn temperature(&mut self) -> std::io::Result<f64> {
        self.read("temp")
    }

    fn maximum(&mut self) -> Option<f64> {
        match self.read("trip_point_0_temp") {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(zone = %self.zone.display(), error = %e, "No trip point");
                None
            }
        }
    }
}

/// Random readings for running without a thermal zone, e.g. off-board.
///
/// Readings are uniform in 40 to 70 °C; no trip point is reported.
#[derive(Debug, Clone)]
pub struct SimulatedThermal {
    range: RangeInclusive<f64>,
}

impl Default for SimulatedThermal {
    fn default() -> Self {
        Self {
            range: SIMULATED_RANGE,
        }
    }
}

impl TemperatureSource for SimulatedThermal {
    fn temperature(&mut self) -> std::io::Result<f64> {
        Ok(rand::thread_rng().gen_range(self.range.clone()))
    }

    fn maximum(&mut self) -> Option<f64> {
        None
    }
}

/// Converts millidegrees to degrees.
fn normalize(value: f64) -> f64 {
    if value > MILLIDEGREE_THRESHOLD {
        value / 1000.0
    } else {
        value
    }
}

/// Temperature sensor publishing the SoC temperature periodically.
#[derive(Debug)]
pub struct ServerDevice<S> {
    source: S,
    schedule: Schedule,
    maximum: f64,
}

pub(crate) fn factory(config: &Config) -> Result<Box<dyn Device>, DeviceError> {
    if config.option_or(DID, "simulate", false) {
        tracing::info!(did = DID, "Using simulated temperature readings");
        return Ok(Box::new(ServerDevice::new(SimulatedThermal::default(), config)));
    }
    let zone = config.option_or(DID, "thermal_zone", THERMAL_ZONE.to_string());
    Ok(Box::new(ServerDevice::new(SysfsThermal::new(zone), config)))
}

impl<S: TemperatureSource> ServerDevice<S> {
    /// Creates the sensor. The sampling period comes from `[server] period`
    /// (seconds, default 5, range 1 to 60).
    #[must_use]
    pub fn new(source: S, config: &Config) -> Self {
        let schedule = Schedule::from_config(
            TIMER,
            config,
            DID,
            "period",
            BoundedParam::new("period", 5.0, 1.0, 60.0),
        );
        Self {
            source,
            schedule,
            maximum: DEFAULT_MAXIMUM,
        }
    }

    /// Returns the sampling period in seconds.
    #[must_use]
    pub fn period(&self) -> f64 {
        self.schedule.period().value()
    }

    /// Takes one reading and publishes it.
    fn sample(&mut self, ctx: &DeviceContext<'_>) -> Result<(), DeviceError> {
        let value = self.source.temperature()?;
        let percentage = value / self.maximum * 100.0;
        tracing::trace!(value, percentage, "Temperature sampled");

        ctx.set_param("temp", Some(Measure::Value), value);
        ctx.set_param("temp", Some(Measure::Percentage), percentage);
        ctx.publish_param(Category::Data, "temp", Some(Measure::Value));
        ctx.publish_param(Category::Data, "temp", Some(Measure::Percentage));
        Ok(())
    }
}

impl<S: TemperatureSource + 'static> Device for ServerDevice<S> {
    fn did(&self) -> &str {
        DID
    }

    fn vocabulary(&self) -> &'static [&'static str] {
        VOCABULARY
    }

    fn begin(&mut self, ctx: &mut DeviceContext<'_>) -> Result<(), DeviceError> {
        self.maximum = self
            .source
            .maximum()
            .filter(|maximum| *maximum > 0.0)
            .unwrap_or(DEFAULT_MAXIMUM);
        ctx.set_param("temp", Some(Measure::Maximum), self.maximum);
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

    fn publish_status(&mut self, ctx: &mut DeviceContext<'_>) {
        ctx.publish_param(Category::Status, "temp", Some(Measure::Maximum));
        self.schedule.publish(ctx);
    }

    fn reset(&mut self, ctx: &mut DeviceContext<'_>) {
        self.schedule.reset(ctx);
    }

    fn on_tick(&mut self, ctx: &mut DeviceContext<'_>, timer: &str) -> Result<(), DeviceError> {
        if timer == self.schedule.timer() {
            self.sample(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::Bench;

    struct FixedSource {
        readings: Vec<f64>,
        maximum: Option<f64>,
    }

    impl TemperatureSource for FixedSource {
        fn temperature(&mut self) -> std::io::Result<f64> {
            self.readings
                .pop()
                .ok_or_else(|| std::io::Error::other("no reading"))
        }

        fn maximum(&mut self) -> Option<f64> {
            self.maximum
        }
    }

    fn server(readings: Vec<f64>, maximum: Option<f64>) -> ServerDevice<FixedSource> {
        let config = Config::from_toml_str("").unwrap();
        ServerDevice::new(FixedSource { readings, maximum }, &config)
    }

    #[test]
    fn millidegrees_are_converted() {
        assert_eq!(normalize(48_312.0), 48.312);
        assert_eq!(normalize(48.3), 48.3);
    }

    #[test]
    fn sysfs_thermal_reads_zone_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("temp"), "52100\n").unwrap();
        std::fs::write(dir.path().join("trip_point_0_temp"), "80000\n").unwrap();

        let mut source = SysfsThermal::new(dir.path());
        assert!((source.temperature().unwrap() - 52.1).abs() < 1e-9);
        assert_eq!(source.maximum(), Some(80.0));
    }

    #[test]
    fn sysfs_thermal_without_trip_point() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("temp"), "garbage").unwrap();

        let mut source = SysfsThermal::new(dir.path());
        assert!(source.temperature().is_err());
        assert_eq!(source.maximum(), None);
    }

    #[test]
    fn simulated_readings_stay_in_range() {
        let mut source = SimulatedThermal::default();
        for _ in 0..100 {
            let value = source.temperature().unwrap();
            assert!((40.0..=70.0).contains(&value), "{value}");
        }
        assert_eq!(source.maximum(), None);
    }

    #[tokio::test]
    async fn simulated_server_runs_without_thermal_zone() {
        let config = Config::from_toml_str(
            "[server]\nsimulate = true\nthermal_zone = \"/nonexistent\"",
        )
        .unwrap();
        let mut device = factory(&config).unwrap();
        let mut bench = Bench::new();
        let recorder = bench.recorder();

        device.begin(&mut bench.ctx(DID)).unwrap();
        device.on_tick(&mut bench.ctx(DID), TIMER).unwrap();

        assert_eq!(recorder.on_topic("server/status/temp/maximum"), vec!["75.0"]);
        let value: f64 = recorder.on_topic("server/data/temp/value")[0].parse().unwrap();
        assert!((40.0..=70.0).contains(&value));
        bench.ctx(DID).stop_timers();
    }

    #[test]
    fn tick_publishes_value_and_percentage() {
        let mut bench = Bench::new();
        let recorder = bench.recorder();
        let mut device = server(vec![60.0], None);

        device.on_tick(&mut bench.ctx(DID), TIMER).unwrap();

        assert_eq!(recorder.on_topic("server/data/temp/value"), vec!["60.0"]);
        assert_eq!(recorder.on_topic("server/data/temp/percentage"), vec!["80.0"]);
    }

    #[test]
    fn failed_reading_is_reported_and_publishes_nothing() {
        let mut bench = Bench::new();
        let recorder = bench.recorder();
        let mut device = server(vec![], None);

        let result = device.on_tick(&mut bench.ctx(DID), TIMER);
        assert!(matches!(result, Err(DeviceError::Hardware(_))));
        assert!(recorder.messages().is_empty());
    }

    #[tokio::test]
    async fn begin_publishes_trip_point_and_period() {
        let mut bench = Bench::new();
        let recorder = bench.recorder();
        let mut device = server(vec![], Some(82.0));

        device.begin(&mut bench.ctx(DID)).unwrap();

        assert_eq!(recorder.on_topic("server/status/temp/maximum"), vec!["82.0"]);
        assert_eq!(recorder.on_topic("server/status/period/value"), vec!["5.0"]);
        assert_eq!(recorder.on_topic("server/status/period/maximum"), vec!["60.0"]);
        assert!(bench.ctx(DID).timer_running(TIMER));
    }

    #[tokio::test]
    async fn period_command_is_clamped_and_deduplicated() {
        let mut bench = Bench::new();
        let recorder = bench.recorder();
        let mut device = server(vec![], None);
        device.begin(&mut bench.ctx(DID)).unwrap();
        recorder.clear();

        device
            .process_own_command(&mut bench.ctx(DID), "120", Some("period"), None)
            .unwrap();
        assert_eq!(device.period(), 60.0);
        assert_eq!(recorder.on_topic("server/status/period/value"), vec!["60.0"]);

        device
            .process_own_command(&mut bench.ctx(DID), "75", Some("period"), Some("value"))
            .unwrap();
        assert_eq!(recorder.messages().len(), 1);
    }

    #[test]
    fn unknown_command_is_ignored() {
        let mut bench = Bench::new();
        let recorder = bench.recorder();
        let mut device = server(vec![], None);

        device
            .process_own_command(&mut bench.ctx(DID), "1", Some("fan"), None)
            .unwrap();
        assert!(recorder.messages().is_empty());
    }
}
