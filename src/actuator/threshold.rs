// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Two-threshold (hysteresis) control of a binary actuator.

use std::fmt;

use crate::device::{BoundedParam, DeviceContext, ParameterStore};
use crate::error::DeviceError;
use crate::types::{Category, Measure, ParamValue, Status};

use super::pin::OutputPin;

/// State of a binary actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Activity {
    /// Switched on.
    Active,
    /// Switched off.
    Idle,
    /// Not established yet.
    #[default]
    Unknown,
}

impl Activity {
    /// Returns the status token published for this state.
    #[must_use]
    pub const fn status(self) -> Status {
        match self {
            Self::Active => Status::Active,
            Self::Idle => Status::Idle,
            Self::Unknown => Status::Unknown,
        }
    }

    /// Parses an activity payload (`active`, `idle` or `unknown`).
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match Status::from_token(token)? {
            Status::Active => Some(Self::Active),
            Status::Idle => Some(Self::Idle),
            Status::Unknown => Some(Self::Unknown),
            Status::Online | Status::Offline => None,
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.status().fmt(f)
    }
}

impl From<Activity> for ParamValue {
    fn from(activity: Activity) -> Self {
        activity.status().into()
    }
}

/// Which of the two thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdKind {
    /// Switch-on threshold.
    On,
    /// Switch-off threshold.
    Off,
}

/// Switch-on and switch-off thresholds of an actuator.
///
/// By convention the on threshold is above the off threshold; the band in
/// between is where no transition happens.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdPair {
    on: BoundedParam,
    off: BoundedParam,
}

impl Default for ThresholdPair {
    /// `percon` defaults to 90 and `percoff` to 60, both within `[50, 95]`.
    fn default() -> Self {
        Self::new(
            BoundedParam::new("percon", 90.0, 50.0, 95.0),
            BoundedParam::new("percoff", 60.0, 50.0, 95.0),
        )
    }
}

impl ThresholdPair {
    /// Creates a pair from its two bounded parameters.
    #[must_use]
    pub fn new(on: BoundedParam, off: BoundedParam) -> Self {
        Self { on, off }
    }

    /// Returns the switch-on threshold.
    #[must_use]
    pub fn on(&self) -> f64 {
        self.on.value()
    }

    /// Returns the switch-off threshold.
    #[must_use]
    pub fn off(&self) -> f64 {
        self.off.value()
    }

    /// Returns one threshold.
    #[must_use]
    pub fn get(&self, kind: ThresholdKind) -> &BoundedParam {
        match kind {
            ThresholdKind::On => &self.on,
            ThresholdKind::Off => &self.off,
        }
    }

    fn get_mut(&mut self, kind: ThresholdKind) -> &mut BoundedParam {
        match kind {
            ThresholdKind::On => &mut self.on,
            ThresholdKind::Off => &mut self.off,
        }
    }

    /// Maps a parameter name to the threshold it designates.
    #[must_use]
    pub fn kind_of(&self, parameter: &str) -> Option<ThresholdKind> {
        if parameter == self.on.parameter() {
            Some(ThresholdKind::On)
        } else if parameter == self.off.parameter() {
            Some(ThresholdKind::Off)
        } else {
            None
        }
    }

    fn iter(&self) -> impl Iterator<Item = &BoundedParam> {
        [&self.on, &self.off].into_iter()
    }
}

/// Binary actuator switched by a monitored value crossing two thresholds.
///
/// - `Idle` and value `>=` on threshold: switch on.
/// - `Active` and value `<=` off threshold: switch off.
/// - `Unknown`: whichever of the two applies.
///
/// Anything else leaves the actuator alone. The pin is written before the
/// state changes; the activity parameter is stored and published only on an
/// actual transition.
#[derive(Debug)]
pub struct HysteresisActuator<P> {
    parameter: &'static str,
    pin: P,
    activity: Activity,
    thresholds: ThresholdPair,
    last_value: Option<f64>,
}

impl<P: OutputPin> HysteresisActuator<P> {
    /// Creates an actuator in the `Unknown` state.
    ///
    /// `parameter` names the activity parameter (e.g. `run`).
    #[must_use]
    pub fn new(parameter: &'static str, pin: P, thresholds: ThresholdPair) -> Self {
        Self {
            parameter,
            pin,
            activity: Activity::Unknown,
            thresholds,
            last_value: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn activity(&self) -> Activity {
        self.activity
    }

    /// Returns the thresholds.
    #[must_use]
    pub fn thresholds(&self) -> &ThresholdPair {
        &self.thresholds
    }

    /// Returns the last monitored value, if any.
    #[must_use]
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Returns the name of the activity parameter.
    #[must_use]
    pub fn parameter(&self) -> &'static str {
        self.parameter
    }

    /// Writes activity and thresholds into a store without publishing.
    pub fn store_into(&self, store: &ParameterStore) {
        store.set(self.parameter, None, self.activity);
        for threshold in self.thresholds.iter() {
            threshold.store_into(store);
        }
    }

    /// Feeds a monitored value.
    ///
    /// Returns the new state if a transition happened.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Hardware`] if the pin could not be driven; the
    /// state is then unchanged.
    pub fn evaluate(
        &mut self,
        ctx: &DeviceContext<'_>,
        value: f64,
    ) -> Result<Option<Activity>, DeviceError> {
        self.last_value = Some(value);
        let switch_on = value >= self.thresholds.on();
        let switch_off = value <= self.thresholds.off();
        let target = match self.activity {
            Activity::Idle if switch_on => Activity::Active,
            Activity::Active if switch_off => Activity::Idle,
            Activity::Unknown if switch_on => Activity::Active,
            Activity::Unknown if switch_off => Activity::Idle,
            _ => return Ok(None),
        };
        tracing::debug!(
            did = %ctx.did(),
            value,
            on = self.thresholds.on(),
            off = self.thresholds.off(),
            "Threshold crossed"
        );
        self.apply(ctx, target)?;
        Ok(Some(target))
    }

    /// Forces a state regardless of the thresholds.
    ///
    /// Returns true if the state changed.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Hardware`] if the pin could not be driven.
    pub fn force(&mut self, ctx: &DeviceContext<'_>, target: Activity) -> Result<bool, DeviceError> {
        if target == self.activity {
            return Ok(false);
        }
        self.apply(ctx, target)?;
        Ok(true)
    }

    /// Drives the pin to match `target`, then stores and publishes the
    /// activity unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Hardware`] if the pin could not be driven.
    pub fn apply(&mut self, ctx: &DeviceContext<'_>, target: Activity) -> Result<(), DeviceError> {
        self.drive(ctx, target)?;
        ctx.publish_param(Category::Status, self.parameter, None);
        Ok(())
    }

    /// Drives the pin to match `target` and stores the activity without
    /// publishing it.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Hardware`] if the pin could not be driven.
    pub fn drive(&mut self, ctx: &DeviceContext<'_>, target: Activity) -> Result<(), DeviceError> {
        self.pin.write(target == Activity::Active)?;
        if target != self.activity {
            tracing::info!(
                did = %ctx.did(),
                from = %self.activity,
                to = %target,
                "Actuator switched"
            );
        }
        self.activity = target;
        ctx.set_param(self.parameter, None, target);
        Ok(())
    }

    /// Writes a threshold from a raw command payload.
    ///
    /// The payload is sanitized (default when absent or invalid, clamped to
    /// range). An unchanged result is a no-op. Otherwise the new value is
    /// stored, published, and the last monitored value is re-evaluated.
    ///
    /// Returns true if the threshold changed.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Hardware`] if re-evaluation failed to drive the pin.
    pub fn set_threshold(
        &mut self,
        ctx: &DeviceContext<'_>,
        kind: ThresholdKind,
        raw: Option<&str>,
    ) -> Result<bool, DeviceError> {
        let threshold = self.thresholds.get_mut(kind);
        let Some(value) = threshold.set(raw) else {
            return Ok(false);
        };
        let name = threshold.parameter();
        ctx.set_param(name, Some(Measure::Value), value);
        ctx.publish_param(Category::Status, name, Some(Measure::Value));

        if let Some(monitored) = self.last_value {
            self.evaluate(ctx, monitored)?;
        }
        Ok(true)
    }

    /// Restores both thresholds to their defaults without publishing.
    pub fn reset(&mut self, ctx: &DeviceContext<'_>) {
        self.thresholds.on.reset();
        self.thresholds.off.reset();
        for threshold in self.thresholds.iter() {
            threshold.store_into(ctx.params());
        }
    }

    /// Publishes activity and all threshold measures.
    pub fn publish_status(&self, ctx: &DeviceContext<'_>) {
        ctx.publish_param(Category::Status, self.parameter, None);
        for threshold in self.thresholds.iter() {
            for measure in [
                Measure::Value,
                Measure::Default,
                Measure::Minimum,
                Measure::Maximum,
            ] {
                ctx.publish_param(Category::Status, threshold.parameter(), Some(measure));
            }
        }
    }
}
