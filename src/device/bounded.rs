// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Numeric parameters confined to a fixed range.

use crate::types::{Measure, parse_number};

use super::params::ParameterStore;

/// A numeric parameter with a default and a `[minimum, maximum]` range.
///
/// Used for actuator thresholds and timer periods. Writes are sanitized:
/// an absent or unparsable payload becomes the default, and every value is
/// clamped into range. A write that leaves the value unchanged reports no
/// change so callers can skip publishing.
///
/// # Examples
///
/// ```
/// use iotgate::device::BoundedParam;
///
/// let mut period = BoundedParam::new("period", 30.0, 15.0, 600.0);
/// assert_eq!(period.set(Some("5")), Some(15.0));
/// assert_eq!(period.set(Some("15")), None);
/// assert_eq!(period.set(None), Some(30.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedParam {
    parameter: &'static str,
    value: f64,
    default: f64,
    minimum: f64,
    maximum: f64,
}

impl BoundedParam {
    /// Creates a parameter holding its default.
    ///
    /// The default is clamped into range, and swapped bounds are reordered.
    #[must_use]
    pub fn new(parameter: &'static str, default: f64, minimum: f64, maximum: f64) -> Self {
        let (minimum, maximum) = if minimum <= maximum {
            (minimum, maximum)
        } else {
            (maximum, minimum)
        };
        let default = default.clamp(minimum, maximum);
        Self {
            parameter,
            value: default,
            default,
            minimum,
            maximum,
        }
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn parameter(&self) -> &'static str {
        self.parameter
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the default value.
    #[must_use]
    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Returns the lower bound.
    #[must_use]
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// Returns the upper bound.
    #[must_use]
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Clamps a value into range.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.minimum, self.maximum)
    }

    /// Writes a raw payload.
    ///
    /// Returns the new value if it changed, `None` if the write was a no-op.
    pub fn set(&mut self, raw: Option<&str>) -> Option<f64> {
        let parsed = raw.and_then(parse_number);
        if parsed.is_none()
            && let Some(raw) = raw
        {
            tracing::warn!(
                parameter = self.parameter,
                value = %raw,
                default = self.default,
                "Invalid value replaced by default"
            );
        }
        self.set_value(parsed.unwrap_or(self.default))
    }

    /// Writes a number. Returns the new value if it changed.
    ///
    /// NaN and infinities are ignored.
    pub fn set_value(&mut self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            tracing::warn!(parameter = self.parameter, value, "Ignoring non-finite value");
            return None;
        }
        let value = self.clamp(value);
        if (value - self.value).abs() < f64::EPSILON {
            return None;
        }
        self.value = value;
        Some(value)
    }

    /// Restores the default. Returns the new value if it changed.
    pub fn reset(&mut self) -> Option<f64> {
        self.set_value(self.default)
    }

    /// Mirrors value, default and bounds into a parameter store.
    pub fn store_into(&self, store: &ParameterStore) {
        store.set(self.parameter, Some(Measure::Value), self.value);
        store.set(self.parameter, Some(Measure::Default), self.default);
        store.set(self.parameter, Some(Measure::Minimum), self.minimum);
        store.set(self.parameter, Some(Measure::Maximum), self.maximum);
    }
}
