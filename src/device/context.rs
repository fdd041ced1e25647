// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-callback view handed to devices.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::protocol::{Publisher, topic};
use crate::timer::PeriodicTrigger;
use crate::types::{Category, Measure, ParamValue};

use super::handle::DeviceHandle;
use super::params::ParameterStore;

/// Everything a device may touch while one of its callbacks runs.
///
/// The context is only valid for the duration of the callback. Publishing is
/// fire-and-forget: a transport failure is logged and otherwise ignored.
pub struct DeviceContext<'a> {
    did: &'a str,
    params: &'a ParameterStore,
    publisher: &'a Arc<dyn Publisher>,
    timers: &'a mut HashMap<String, PeriodicTrigger>,
    handle: &'a Weak<DeviceHandle>,
}

impl<'a> DeviceContext<'a> {
    pub(crate) fn new(
        did: &'a str,
        params: &'a ParameterStore,
        publisher: &'a Arc<dyn Publisher>,
        timers: &'a mut HashMap<String, PeriodicTrigger>,
        handle: &'a Weak<DeviceHandle>,
    ) -> Self {
        Self {
            did,
            params,
            publisher,
            timers,
            handle,
        }
    }

    /// Returns the id of the device being called.
    #[must_use]
    pub fn did(&self) -> &str {
        self.did
    }

    /// Returns the device's parameter store.
    #[must_use]
    pub fn params(&self) -> &ParameterStore {
        self.params
    }

    /// Writes a parameter.
    pub fn set_param(&self, parameter: &str, measure: Option<Measure>, value: impl Into<ParamValue>) {
        self.params.set(parameter, measure, value);
    }

    /// Reads a parameter, returning `fallback` when unset.
    #[must_use]
    pub fn get_param(
        &self,
        parameter: &str,
        measure: Option<Measure>,
        fallback: impl Into<ParamValue>,
    ) -> ParamValue {
        self.params.get_or(parameter, measure, fallback)
    }

    /// Reads a numeric parameter, returning `fallback` when unset or not numeric.
    #[must_use]
    pub fn get_f64(&self, parameter: &str, measure: Option<Measure>, fallback: f64) -> f64 {
        self.params.get_f64_or(parameter, measure, fallback)
    }

    /// Publishes the stored value of a parameter on this device's topic.
    ///
    /// Nothing is published for a parameter that was never set.
    pub fn publish_param(&self, category: Category, parameter: &str, measure: Option<Measure>) {
        let Some(value) = self.params.get(parameter, measure) else {
            tracing::trace!(
                did = %self.did,
                parameter = %parameter,
                "Parameter unset, nothing to publish"
            );
            return;
        };
        self.publish(
            category,
            Some(parameter),
            measure.as_ref().map(Measure::as_str),
            &value.to_string(),
        );
    }

    /// Publishes a raw payload on this device's topic.
    pub fn publish(
        &self,
        category: Category,
        parameter: Option<&str>,
        measure: Option<&str>,
        payload: &str,
    ) {
        self.publish_to(self.did, category, parameter, measure, payload);
    }

    /// Publishes a raw payload on another device's topic, typically a command.
    pub fn publish_to(
        &self,
        did: &str,
        category: Category,
        parameter: Option<&str>,
        measure: Option<&str>,
        payload: &str,
    ) {
        let topic = topic::encode(did, category, parameter, measure);
        tracing::debug!(topic = %topic, payload = %payload, "Publishing");
        if let Err(e) = self.publisher.publish(&topic, payload, false) {
            tracing::error!(topic = %topic, error = %e, "Publish failed");
        }
    }

    /// Returns a publisher handle usable outside the callback, e.g. by a
    /// spawned task.
    #[must_use]
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::clone(self.publisher)
    }

    /// Starts a named periodic trigger calling [`Device::on_tick`].
    ///
    /// If the trigger already exists its period is updated and it is
    /// restarted if stopped.
    ///
    /// [`Device::on_tick`]: super::Device::on_tick
    pub fn start_timer(&mut self, name: &str, period: Duration) {
        let trigger = self.timers.entry(name.to_string()).or_insert_with(|| {
            let handle = Weak::clone(self.handle);
            let publisher = Arc::clone(self.publisher);
            let timer = name.to_string();
            PeriodicTrigger::new(name, period, move || {
                if let Some(handle) = handle.upgrade() {
                    handle.tick(&publisher, &timer);
                }
            })
        });
        trigger.set_period(period);
        trigger.start();
    }

    /// Changes a trigger's period; takes effect on its next firing.
    ///
    /// Returns false if no trigger has that name.
    pub fn set_timer_period(&mut self, name: &str, period: Duration) -> bool {
        match self.timers.get(name) {
            Some(trigger) => {
                trigger.set_period(period);
                true
            }
            None => false,
        }
    }

    /// Returns true if the named trigger is running.
    #[must_use]
    pub fn timer_running(&self, name: &str) -> bool {
        self.timers.get(name).is_some_and(PeriodicTrigger::is_running)
    }

    /// Stops every trigger of this device.
    pub fn stop_timers(&mut self) {
        for trigger in self.timers.values_mut() {
            trigger.stop();
        }
    }
}

impl std::fmt::Debug for DeviceContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("did", &self.did)
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Weak};

    use crate::device::handle::DeviceHandle;
    use crate::device::params::ParameterStore;
    use crate::protocol::Publisher;
    use crate::protocol::testing::RecordingPublisher;
    use crate::timer::PeriodicTrigger;

    use super::DeviceContext;

    /// Standalone context owner for exercising device logic without a registry.
    pub(crate) struct Bench {
        pub params: ParameterStore,
        recorder: Arc<RecordingPublisher>,
        publisher: Arc<dyn Publisher>,
        timers: HashMap<String, PeriodicTrigger>,
        handle: Weak<DeviceHandle>,
    }

    impl Bench {
        pub(crate) fn new() -> Self {
            let recorder = Arc::new(RecordingPublisher::default());
            let publisher: Arc<dyn Publisher> = recorder.clone();
            Self {
                params: ParameterStore::new(),
                recorder,
                publisher,
                timers: HashMap::new(),
                handle: Weak::new(),
            }
        }

        pub(crate) fn recorder(&self) -> Arc<RecordingPublisher> {
            Arc::clone(&self.recorder)
        }

        pub(crate) fn ctx(&mut self, did: &'static str) -> DeviceContext<'_> {
            DeviceContext::new(
                did,
                &self.params,
                &self.publisher,
                &mut self.timers,
                &self.handle,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Bench;
    use super::*;

    #[test]
    fn get_param_returns_fallback_when_unset() {
        let mut bench = Bench::new();
        let ctx = bench.ctx("sfan");

        assert_eq!(
            ctx.get_param("temp", Some(Measure::Maximum), 75.0),
            ParamValue::Number(75.0)
        );
        assert_eq!(ctx.get_param("run", None, "unknown"), ParamValue::from("unknown"));
        assert_eq!(ctx.get_f64("percon", Some(Measure::Value), 90.0), 90.0);
    }

    #[test]
    fn get_param_prefers_stored_value() {
        let mut bench = Bench::new();
        let ctx = bench.ctx("sfan");

        ctx.set_param("temp", Some(Measure::Maximum), 82.0);
        ctx.set_param("run", None, "active");

        assert_eq!(
            ctx.get_param("temp", Some(Measure::Maximum), 75.0),
            ParamValue::Number(82.0)
        );
        assert_eq!(ctx.get_param("run", None, "unknown"), ParamValue::from("active"));
        // Another measure of the same parameter is a different key.
        assert_eq!(
            ctx.get_param("temp", Some(Measure::Value), 0.0),
            ParamValue::Number(0.0)
        );
    }

    #[test]
    fn publish_param_sends_stored_value() {
        let mut bench = Bench::new();
        let recorder = bench.recorder();
        let ctx = bench.ctx("server");

        ctx.set_param("temp", Some(Measure::Value), 48.31);
        ctx.publish_param(Category::Data, "temp", Some(Measure::Value));

        assert_eq!(recorder.on_topic("server/data/temp/value"), vec!["48.3"]);
    }
}
