// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device parameter store.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{Measure, ParamValue};

/// Key of a parameter entry.
///
/// The measure is optional: single-valued parameters such as an actuator's
/// activity are stored and published without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamKey {
    /// Parameter name.
    pub parameter: String,
    /// Measure qualifying the parameter.
    pub measure: Option<Measure>,
}

impl ParamKey {
    /// Creates a key.
    #[must_use]
    pub fn new(parameter: impl Into<String>, measure: Option<Measure>) -> Self {
        Self {
            parameter: parameter.into(),
            measure,
        }
    }
}

/// Mapping from `(parameter, measure)` to the latest scalar value.
///
/// The store keeps no history and performs no validation; callers sanitize
/// values before writing. It has its own lock, separate from the lock that
/// serializes the owning device's handlers, so other devices can read it
/// while that device is busy.
///
/// # Examples
///
/// ```
/// use iotgate::device::ParameterStore;
/// use iotgate::types::{Measure, ParamValue};
///
/// let store = ParameterStore::new();
/// assert_eq!(store.get_or("period", Some(Measure::Value), 30.0), ParamValue::Number(30.0));
///
/// store.set("period", Some(Measure::Value), 10.0);
/// assert_eq!(store.get_f64_or("period", Some(Measure::Value), 30.0), 10.0);
/// ```
#[derive(Debug, Default)]
pub struct ParameterStore {
    entries: RwLock<HashMap<ParamKey, ParamValue>>,
}

impl ParameterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a value, overwriting any previous one.
    pub fn set(
        &self,
        parameter: &str,
        measure: Option<Measure>,
        value: impl Into<ParamValue>,
    ) {
        self.entries
            .write()
            .insert(ParamKey::new(parameter, measure), value.into());
    }

    /// Reads a value if it has been set.
    #[must_use]
    pub fn get(&self, parameter: &str, measure: Option<Measure>) -> Option<ParamValue> {
        self.entries
            .read()
            .get(&ParamKey::new(parameter, measure))
            .cloned()
    }

    /// Reads a value, returning `fallback` when it has never been set.
    #[must_use]
    pub fn get_or(
        &self,
        parameter: &str,
        measure: Option<Measure>,
        fallback: impl Into<ParamValue>,
    ) -> ParamValue {
        self.get(parameter, measure)
            .unwrap_or_else(|| fallback.into())
    }

    /// Reads a numeric value, returning `fallback` when unset or not numeric.
    #[must_use]
    pub fn get_f64_or(&self, parameter: &str, measure: Option<Measure>, fallback: f64) -> f64 {
        self.get(parameter, measure)
            .and_then(|value| value.as_f64())
            .unwrap_or(fallback)
    }
}
