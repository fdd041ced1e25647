// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device registry and the table of device constructors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::DeviceError;

use super::Device;
use super::handle::DeviceHandle;

/// Constructor of a device type, reading its options from the configuration.
pub type DeviceFactory = fn(&Config) -> Result<Box<dyn Device>, DeviceError>;

/// Table mapping device type keys to their constructors.
///
/// New device types are made available by registering them here at startup.
///
/// # Examples
///
/// ```
/// use iotgate::device::DeviceFactories;
///
/// let factories = iotgate::plugins::builtin_factories();
/// assert!(factories.contains("sfan"));
/// assert!(!DeviceFactories::new().contains("sfan"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeviceFactories {
    table: HashMap<&'static str, DeviceFactory>,
}

impl DeviceFactories {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor, replacing any previous one with the same key.
    pub fn register(&mut self, key: &'static str, factory: DeviceFactory) -> &mut Self {
        if self.table.insert(key, factory).is_some() {
            tracing::debug!(key = %key, "Replacing device factory");
        }
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, key: &'static str, factory: DeviceFactory) -> Self {
        self.register(key, factory);
        self
    }

    /// Returns true if a constructor is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Builds a device of the given type.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnknownType`] for an unregistered key, or the
    /// constructor's own error.
    pub fn build(&self, key: &str, config: &Config) -> Result<Box<dyn Device>, DeviceError> {
        let factory = self
            .table
            .get(key)
            .ok_or_else(|| DeviceError::UnknownType(key.to_string()))?;
        factory(config)
    }
}

/// All devices known to the gateway.
///
/// Filled once at startup and then shared read-only. Iteration follows
/// registration order. Devices are never removed; a device that resets
/// clears its own state but stays registered.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Arc<DeviceHandle>>,
    index: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates every device listed in `[gateway] devices`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnknownType`] for an unknown type key,
    /// [`DeviceError::DuplicateDid`] for an id collision, or a constructor
    /// error.
    pub fn from_config(config: &Config, factories: &DeviceFactories) -> Result<Self, DeviceError> {
        let mut registry = Self::new();
        for key in &config.gateway.devices {
            let device = factories.build(key, config)?;
            registry.register(device)?;
        }
        Ok(registry)
    }

    /// Registers a device.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::DuplicateDid`] if the id is already taken.
    pub fn register(&mut self, device: Box<dyn Device>) -> Result<Arc<DeviceHandle>, DeviceError> {
        let did = device.did().to_string();
        if self.index.contains_key(&did) {
            return Err(DeviceError::DuplicateDid(did));
        }
        let handle = DeviceHandle::new(device);
        tracing::debug!(did = %did, "Registered device");
        self.index.insert(did, self.devices.len());
        self.devices.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// Looks up a device by id.
    #[must_use]
    pub fn get(&self, did: &str) -> Option<&Arc<DeviceHandle>> {
        self.index.get(did).and_then(|&i| self.devices.get(i))
    }

    /// Returns true if a device with that id is registered.
    #[must_use]
    pub fn contains(&self, did: &str) -> bool {
        self.index.contains_key(did)
    }

    /// Iterates devices in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DeviceHandle>> {
        self.devices.iter()
    }

    /// Returns the registered ids in registration order.
    #[must_use]
    pub fn dids(&self) -> Vec<&str> {
        self.devices.iter().map(|handle| handle.did()).collect()
    }

    /// Returns the number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if no device is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
