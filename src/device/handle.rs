// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registered device wrapper.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::DeviceError;
use crate::protocol::Publisher;
use crate::timer::PeriodicTrigger;
use crate::types::Command;

use super::context::DeviceContext;
use super::params::ParameterStore;
use super::{Device, Source};

/// Mutable part of a device, guarded by the device's own lock.
struct DeviceSlot {
    device: Box<dyn Device>,
    timers: HashMap<String, PeriodicTrigger>,
    begun: bool,
    finished: bool,
}

/// A device as held by the registry.
///
/// The handle serializes every callback into the device behind a per-device
/// lock. Inbound messages and the device's own periodic triggers therefore
/// never run concurrently for the same device, while unrelated devices do not
/// block each other. The parameter store has a separate lock so other devices
/// can read it while this one is busy.
pub struct DeviceHandle {
    did: String,
    vocabulary: &'static [&'static str],
    params: ParameterStore,
    slot: Mutex<DeviceSlot>,
    this: Weak<DeviceHandle>,
}

impl DeviceHandle {
    /// Wraps a device.
    #[must_use]
    pub fn new(device: Box<dyn Device>) -> Arc<Self> {
        let did = device.did().to_string();
        let vocabulary = device.vocabulary();
        Arc::new_cyclic(|this| Self {
            did,
            vocabulary,
            params: ParameterStore::new(),
            slot: Mutex::new(DeviceSlot {
                device,
                timers: HashMap::new(),
                begun: false,
                finished: false,
            }),
            this: Weak::clone(this),
        })
    }

    /// Returns the device id.
    #[must_use]
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Returns the parameter names the device publishes.
    #[must_use]
    pub fn vocabulary(&self) -> &'static [&'static str] {
        self.vocabulary
    }

    /// Returns true if `parameter` belongs to the device's vocabulary.
    #[must_use]
    pub fn owns(&self, parameter: &str) -> bool {
        self.vocabulary.contains(&parameter)
    }

    /// Returns the device's parameter store.
    #[must_use]
    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    /// Returns true once [`finish`](Self::finish) has run.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.slot.lock().finished
    }

    /// Starts the device. Runs at most once; later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns the device's own error if it failed to start.
    pub fn begin(&self, publisher: &Arc<dyn Publisher>) -> Result<(), DeviceError> {
        let mut slot = self.slot.lock();
        if slot.begun || slot.finished {
            return Ok(());
        }
        slot.begun = true;
        tracing::info!(did = %self.did, "Starting device");
        self.call(&mut slot, publisher, |device, ctx| device.begin(ctx))
    }

    /// Stops the device's triggers, then calls its `finish`. Runs at most once.
    ///
    /// Once this returns no trigger of the device fires again.
    pub fn finish(&self, publisher: &Arc<dyn Publisher>) {
        let mut slot = self.slot.lock();
        if slot.finished {
            return;
        }
        slot.finished = true;
        for trigger in slot.timers.values_mut() {
            trigger.stop();
        }
        tracing::info!(did = %self.did, begun = slot.begun, "Finishing device");
        self.call(&mut slot, publisher, |device, ctx| device.finish(ctx));
        // A trigger started from within `finish` must not outlive it.
        for trigger in slot.timers.values_mut() {
            trigger.stop();
        }
    }

    /// Delivers a command addressed to this device.
    ///
    /// `status` and `reset` without parameter and measure are handled here:
    /// the first republishes the status, the second restores defaults and
    /// republishes the status once.
    ///
    /// # Errors
    ///
    /// Returns the device's error for a command it could not apply.
    pub fn process_command(
        &self,
        publisher: &Arc<dyn Publisher>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
    ) -> Result<(), DeviceError> {
        let mut slot = self.slot.lock();
        if slot.finished {
            return Ok(());
        }
        let generic = if parameter.is_none() && measure.is_none() {
            Command::from_token(value)
        } else {
            None
        };
        self.call(&mut slot, publisher, |device, ctx| match generic {
            Some(Command::GetStatus) => {
                device.publish_status(ctx);
                Ok(())
            }
            Some(Command::Reset) => {
                tracing::info!(did = %ctx.did(), "Resetting device");
                device.reset(ctx);
                device.publish_status(ctx);
                Ok(())
            }
            _ => device.process_own_command(ctx, value, parameter, measure),
        })
    }

    /// Delivers a status broadcast from another device.
    ///
    /// # Errors
    ///
    /// Returns the device's error.
    pub fn process_status(
        &self,
        publisher: &Arc<dyn Publisher>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
        source: Source<'_>,
    ) -> Result<(), DeviceError> {
        let mut slot = self.slot.lock();
        if slot.finished {
            return Ok(());
        }
        self.call(&mut slot, publisher, |device, ctx| {
            device.process_status(ctx, value, parameter, measure, source)
        })
    }

    /// Delivers a data broadcast from another device.
    ///
    /// # Errors
    ///
    /// Returns the device's error.
    pub fn process_data(
        &self,
        publisher: &Arc<dyn Publisher>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
        source: Source<'_>,
    ) -> Result<(), DeviceError> {
        let mut slot = self.slot.lock();
        if slot.finished {
            return Ok(());
        }
        self.call(&mut slot, publisher, |device, ctx| {
            device.process_data(ctx, value, parameter, measure, source)
        })
    }

    /// Runs a periodic trigger's work. Faults are logged, never propagated.
    pub(crate) fn tick(&self, publisher: &Arc<dyn Publisher>, timer: &str) {
        let result = isolate(|| {
            let mut slot = self.slot.lock();
            if slot.finished {
                return Ok(());
            }
            self.call(&mut slot, publisher, |device, ctx| device.on_tick(ctx, timer))
        });
        if let Err(e) = result {
            tracing::error!(did = %self.did, timer = %timer, error = %e, "Periodic work failed");
        }
    }

    fn call<R>(
        &self,
        slot: &mut DeviceSlot,
        publisher: &Arc<dyn Publisher>,
        f: impl FnOnce(&mut dyn Device, &mut DeviceContext<'_>) -> R,
    ) -> R {
        let DeviceSlot { device, timers, .. } = slot;
        let mut ctx = DeviceContext::new(&self.did, &self.params, publisher, timers, &self.this);
        f(device.as_mut(), &mut ctx)
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("did", &self.did)
            .field("vocabulary", &self.vocabulary)
            .finish_non_exhaustive()
    }
}

/// Runs a handler, turning a panic into [`DeviceError::Panicked`].
///
/// The device lock is released during unwinding, so the device stays usable.
pub(crate) fn isolate<F>(f: F) -> Result<(), DeviceError>
where
    F: FnOnce() -> Result<(), DeviceError>,
{
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| Err(panic_error(panic.as_ref())))
}

fn panic_error(panic: &(dyn Any + Send)) -> DeviceError {
    let message = panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DeviceError::Panicked(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::RecordingPublisher;
    use crate::types::{Category, Measure};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        commands: AtomicU32,
        statuses: AtomicU32,
        resets: AtomicU32,
        begins: AtomicU32,
        finishes: AtomicU32,
        ticks: AtomicU32,
    }

    struct Probe {
        counters: Arc<Counters>,
    }

    impl Device for Probe {
        fn did(&self) -> &str {
            "probe"
        }

        fn vocabulary(&self) -> &'static [&'static str] {
            &["level"]
        }

        fn begin(&mut self, ctx: &mut DeviceContext<'_>) -> Result<(), DeviceError> {
            self.counters.begins.fetch_add(1, Ordering::SeqCst);
            ctx.start_timer("sample", Duration::from_secs(1));
            Ok(())
        }

        fn finish(&mut self, _ctx: &mut DeviceContext<'_>) {
            self.counters.finishes.fetch_add(1, Ordering::SeqCst);
        }

        fn process_own_command(
            &mut self,
            ctx: &mut DeviceContext<'_>,
            value: &str,
            parameter: Option<&str>,
            _measure: Option<&str>,
        ) -> Result<(), DeviceError> {
            self.counters.commands.fetch_add(1, Ordering::SeqCst);
            if parameter == Some("explode") {
                panic!("boom");
            }
            ctx.set_param("level", Some(Measure::Value), value);
            Ok(())
        }

        fn publish_status(&mut self, ctx: &mut DeviceContext<'_>) {
            self.counters.statuses.fetch_add(1, Ordering::SeqCst);
            ctx.publish_param(Category::Status, "level", Some(Measure::Value));
        }

        fn reset(&mut self, ctx: &mut DeviceContext<'_>) {
            self.counters.resets.fetch_add(1, Ordering::SeqCst);
            ctx.set_param("level", Some(Measure::Value), 0.0);
        }

        fn on_tick(&mut self, _ctx: &mut DeviceContext<'_>, _timer: &str) -> Result<(), DeviceError> {
            self.counters.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn probe() -> (Arc<DeviceHandle>, Arc<Counters>, Arc<RecordingPublisher>, Arc<dyn Publisher>) {
        let counters = Arc::new(Counters::default());
        let handle = DeviceHandle::new(Box::new(Probe {
            counters: Arc::clone(&counters),
        }));
        let recorder = Arc::new(RecordingPublisher::default());
        let publisher: Arc<dyn Publisher> = recorder.clone();
        (handle, counters, recorder, publisher)
    }

    #[test]
    fn status_command_is_intercepted() {
        let (handle, counters, recorder, publisher) = probe();
        handle.params().set("level", Some(Measure::Value), 3.0);

        handle.process_command(&publisher, "status", None, None).unwrap();

        assert_eq!(counters.statuses.load(Ordering::SeqCst), 1);
        assert_eq!(counters.commands.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.on_topic("probe/status/level/value"), vec!["3.0"]);
    }

    #[test]
    fn reset_command_resets_then_publishes_once() {
        let (handle, counters, recorder, publisher) = probe();
        handle.params().set("level", Some(Measure::Value), 7.0);

        handle.process_command(&publisher, "reset", None, None).unwrap();

        assert_eq!(counters.resets.load(Ordering::SeqCst), 1);
        assert_eq!(counters.statuses.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.on_topic("probe/status/level/value"), vec!["0.0"]);
    }

    #[test]
    fn reserved_word_with_parameter_goes_to_device() {
        let (handle, counters, _recorder, publisher) = probe();
        handle
            .process_command(&publisher, "reset", Some("level"), None)
            .unwrap();
        assert_eq!(counters.commands.load(Ordering::SeqCst), 1);
        assert_eq!(counters.resets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panic_is_contained_and_device_stays_usable() {
        let (handle, counters, _recorder, publisher) = probe();

        let result = isolate(|| handle.process_command(&publisher, "1", Some("explode"), None));
        assert!(matches!(result, Err(DeviceError::Panicked(ref m)) if m == "boom"));

        handle
            .process_command(&publisher, "5", Some("level"), None)
            .unwrap();
        assert_eq!(counters.commands.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn owns_checks_vocabulary() {
        let (handle, ..) = probe();
        assert!(handle.owns("level"));
        assert!(!handle.owns("temp"));
    }

    #[tokio::test(start_paused = true)]
    async fn begin_and_finish_run_once() {
        let (handle, counters, _recorder, publisher) = probe();

        handle.begin(&publisher).unwrap();
        handle.begin(&publisher).unwrap();
        assert_eq!(counters.begins.load(Ordering::SeqCst), 1);

        handle.finish(&publisher);
        handle.finish(&publisher);
        assert_eq!(counters.finishes.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_after_finish() {
        let (handle, counters, _recorder, publisher) = probe();
        handle.begin(&publisher).unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 2);

        handle.finish(&publisher);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn messages_after_finish_are_ignored() {
        let (handle, counters, _recorder, publisher) = probe();
        handle.finish(&publisher);
        handle
            .process_command(&publisher, "5", Some("level"), None)
            .unwrap();
        assert_eq!(counters.commands.load(Ordering::SeqCst), 0);
        assert_eq!(counters.finishes.load(Ordering::SeqCst), 1);
    }
}
