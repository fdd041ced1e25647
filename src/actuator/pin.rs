// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Digital outputs driving actuators.

use std::path::PathBuf;

/// Default root of the sysfs GPIO interface.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A binary output line.
pub trait OutputPin: Send {
    /// Drives the line high (`true`) or low (`false`).
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the line could not be written.
    fn write(&mut self, high: bool) -> std::io::Result<()>;
}

/// GPIO line exported through sysfs.
///
/// Writes `1` or `0` to `<root>/gpio<N>/value`. The line must already be
/// exported and configured as an output.
#[derive(Debug, Clone)]
pub struct SysfsPin {
    number: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Creates a pin under the default sysfs root.
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self::with_root(SYSFS_GPIO_ROOT, number)
    }

    /// Creates a pin under a custom root.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>, number: u32) -> Self {
        let value_path = root.into().join(format!("gpio{number}")).join("value");
        Self { number, value_path }
    }

    /// Returns the GPIO number.
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl OutputPin for SysfsPin {
    fn write(&mut self, high: bool) -> std::io::Result<()> {
        tracing::trace!(gpio = self.number, high, "Writing GPIO");
        std::fs::write(&self.value_path, if high { "1" } else { "0" })
    }
}
