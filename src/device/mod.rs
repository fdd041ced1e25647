// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device plugin framework.
//!
//! A device is a self-contained unit of business logic attached to the bus:
//! a sensor, an actuator, or a relay to a cloud service. Devices implement the
//! [`Device`] trait and are registered once at startup in a
//! [`DeviceRegistry`]. The router then delivers three kinds of messages:
//!
//! - commands addressed to the device's own id
//! - status broadcasts from every other device
//! - data broadcasts from every other device
//!
//! Devices never touch the transport directly. Every callback receives a
//! [`DeviceContext`] giving access to the device's [`ParameterStore`], the
//! publisher, and the device's periodic triggers.
//!
//! # Examples
//!
//! ```
//! use iotgate::device::{Device, DeviceContext};
//! use iotgate::error::DeviceError;
//! use iotgate::types::{Category, Measure, Status};
//!
//! struct Lamp;
//!
//! impl Device for Lamp {
//!     fn did(&self) -> &str {
//!         "lamp"
//!     }
//!
//!     fn process_own_command(
//!         &mut self,
//!         ctx: &mut DeviceContext<'_>,
//!         value: &str,
//!         _parameter: Option<&str>,
//!         _measure: Option<&str>,
//!     ) -> Result<(), DeviceError> {
//!         let status = if value == "on" { Status::Active } else { Status::Idle };
//!         ctx.set_param("run", None, status);
//!         ctx.publish_param(Category::Status, "run", None);
//!         Ok(())
//!     }
//!
//!     fn publish_status(&mut self, ctx: &mut DeviceContext<'_>) {
//!         ctx.publish_param(Category::Status, "run", None);
//!     }
//! }
//! ```

mod bounded;
mod context;
mod handle;
mod params;
mod registry;

pub use bounded::BoundedParam;
pub use context::DeviceContext;
pub use handle::DeviceHandle;
pub use params::{ParamKey, ParameterStore};
pub use registry::{DeviceFactories, DeviceFactory, DeviceRegistry};

pub(crate) use handle::isolate;

#[cfg(test)]
pub(crate) use context::testing;

use crate::error::DeviceError;
use crate::types::{Measure, ParamValue};

/// Behaviour shared by every device plugin.
///
/// Handlers run with the device's lock held, so a device never sees two of
/// its own callbacks at once. Payload parsing failures should be logged and
/// swallowed, or reported as [`DeviceError::InvalidValue`]; in both cases
/// stored parameters must be left untouched.
pub trait Device: Send {
    /// Unique device id, used as the first topic segment.
    fn did(&self) -> &str;

    /// Parameter names this device publishes.
    ///
    /// Consumers use it through [`Source::owns`] to check that a broadcast
    /// parameter really belongs to the expected producer.
    fn vocabulary(&self) -> &'static [&'static str] {
        &[]
    }

    /// Called once after the device is wired into the transport.
    ///
    /// The default implementation publishes the device status.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` if the device could not start. The gateway
    /// logs it and keeps running the remaining devices.
    fn begin(&mut self, ctx: &mut DeviceContext<'_>) -> Result<(), DeviceError> {
        self.publish_status(ctx);
        Ok(())
    }

    /// Called once at shutdown, after the device's timers are stopped.
    ///
    /// Also called when `begin` failed half-way.
    fn finish(&mut self, ctx: &mut DeviceContext<'_>) {
        let _ = ctx;
    }

    /// Handles a command addressed to this device.
    ///
    /// The generic `status` and `reset` commands are handled by the framework
    /// and never reach this method.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` if the command could not be applied.
    fn process_own_command(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
    ) -> Result<(), DeviceError>;

    /// Handles a status broadcast from another device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` if the message was relevant but unusable.
    fn process_status(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
        source: Source<'_>,
    ) -> Result<(), DeviceError> {
        let _ = (ctx, value, parameter, measure, source);
        Ok(())
    }

    /// Handles a data broadcast from another device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` if the message was relevant but unusable.
    fn process_data(
        &mut self,
        ctx: &mut DeviceContext<'_>,
        value: &str,
        parameter: Option<&str>,
        measure: Option<&str>,
        source: Source<'_>,
    ) -> Result<(), DeviceError> {
        let _ = (ctx, value, parameter, measure, source);
        Ok(())
    }

    /// Republishes the device's full status.
    fn publish_status(&mut self, ctx: &mut DeviceContext<'_>);

    /// Restores parameter defaults without publishing.
    ///
    /// The framework publishes the status once afterwards.
    fn reset(&mut self, ctx: &mut DeviceContext<'_>) {
        let _ = ctx;
    }

    /// Called when one of the device's periodic triggers fires.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError` if the scheduled work failed.
    fn on_tick(&mut self, ctx: &mut DeviceContext<'_>, timer: &str) -> Result<(), DeviceError> {
        let _ = (ctx, timer);
        Ok(())
    }
}

/// The sender of a status or data broadcast.
///
/// A message from a device that is not in the local registry (another
/// gateway, a test client) is still delivered, with only its raw id known.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    /// A device registered with this gateway.
    Registered(&'a DeviceHandle),
    /// An id not found in the registry.
    Unregistered(&'a str),
}

impl Source<'_> {
    /// Returns the sender's device id.
    #[must_use]
    pub fn did(&self) -> &str {
        match self {
            Self::Registered(handle) => handle.did(),
            Self::Unregistered(did) => did,
        }
    }

    /// Returns true if the sender has the given device id.
    #[must_use]
    pub fn is(&self, did: &str) -> bool {
        self.did() == did
    }

    /// Returns true if the sender is registered with this gateway.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }

    /// Returns true if `parameter` belongs to the sender's vocabulary.
    ///
    /// An unregistered sender has no known vocabulary and is trusted.
    #[must_use]
    pub fn owns(&self, parameter: &str) -> bool {
        match self {
            Self::Registered(handle) => handle.owns(parameter),
            Self::Unregistered(_) => true,
        }
    }

    /// Reads a parameter from the sender's store, if registered.
    #[must_use]
    pub fn param(&self, parameter: &str, measure: Option<Measure>) -> Option<ParamValue> {
        match self {
            Self::Registered(handle) => handle.params().get(parameter, measure),
            Self::Unregistered(_) => None,
        }
    }
}
