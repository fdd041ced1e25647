// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Threshold-driven actuators.
//!
//! A [`HysteresisActuator`] switches an [`OutputPin`] on when a monitored
//! value reaches the on threshold and off when it falls to the off
//! threshold. Between the two nothing happens, so a value hovering around a
//! single setpoint does not make the output flap.
//!
//! # Examples
//!
//! ```
//! use iotgate::actuator::{ThresholdKind, ThresholdPair};
//!
//! let pair = ThresholdPair::default();
//! assert_eq!(pair.on(), 90.0);
//! assert_eq!(pair.off(), 60.0);
//! assert_eq!(pair.kind_of("percoff"), Some(ThresholdKind::Off));
//! ```

mod pin;
mod threshold;

pub use pin::{OutputPin, SYSFS_GPIO_ROOT, SysfsPin};
pub use threshold::{Activity, HysteresisActuator, ThresholdKind, ThresholdPair};

#[cfg(test)]
pub(crate) use pin::testing;
