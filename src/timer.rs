// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic triggers driving scheduled device work.
//!
//! A [`PeriodicTrigger`] runs a callback on a tokio task until it is stopped.
//! The period can be changed while running; the new value is used from the
//! next firing on.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// Repeating timer firing a zero-argument callback.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use iotgate::timer::PeriodicTrigger;
///
/// # async fn example() {
/// let mut trigger = PeriodicTrigger::new("telemetry", Duration::from_secs(5), || {
///     println!("tick");
/// });
/// trigger.start();
/// trigger.set_period(Duration::from_secs(10));
/// trigger.stop();
/// # }
/// ```
pub struct PeriodicTrigger {
    name: String,
    period: watch::Sender<Duration>,
    callback: TickCallback,
    task: Option<JoinHandle<()>>,
}

impl PeriodicTrigger {
    /// Creates a stopped trigger.
    pub fn new<F>(name: impl Into<String>, period: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (period, _) = watch::channel(period);
        Self {
            name: name.into(),
            period,
            callback: Arc::new(callback),
            task: None,
        }
    }

    /// Returns the trigger name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current period.
    #[must_use]
    pub fn period(&self) -> Duration {
        *self.period.borrow()
    }

    /// Changes the period; takes effect on the next firing.
    pub fn set_period(&self, period: Duration) {
        self.period.send_replace(period);
    }

    /// Returns true if the trigger task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts firing. Does nothing if already running.
    ///
    /// Must be called from within a tokio runtime; outside of one the
    /// trigger stays stopped and a warning is logged.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(timer = %self.name, "No tokio runtime, timer not started");
            return;
        };

        let mut period_rx = self.period.subscribe();
        let callback = Arc::clone(&self.callback);
        let name = self.name.clone();

        tracing::debug!(timer = %name, period = ?self.period(), "Starting timer");
        self.task = Some(runtime.spawn(async move {
            loop {
                let period = *period_rx.borrow_and_update();
                tokio::time::sleep(period).await;
                tracing::trace!(timer = %name, "Timer fired");
                callback();
            }
        }));
    }

    /// Stops firing. The task is aborted before this returns; calling it on a
    /// stopped trigger is a no-op.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(timer = %self.name, "Timer stopped");
        }
    }
}

impl Drop for PeriodicTrigger {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for PeriodicTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTrigger")
            .field("name", &self.name)
            .field("period", &self.period())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
