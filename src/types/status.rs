// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Status and command payload tokens shared by all devices.

use std::fmt;

/// Status token published as payload of status messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Device or gateway is running.
    Online,
    /// Device or gateway is shut down (also the last-will payload).
    Offline,
    /// Actuator is switched on.
    Active,
    /// Actuator is switched off.
    Idle,
    /// Actuator state has not been established.
    Unknown,
}

impl Status {
    /// Returns the wire token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a payload, ignoring surrounding whitespace.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            "active" => Some(Self::Active),
            "idle" => Some(Self::Idle),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic command payloads understood by devices.
///
/// `GetStatus` and `Reset` are reserved: every device honours them when they
/// arrive without parameter and measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Republish the full status of the device.
    GetStatus,
    /// Restore parameter defaults and republish status.
    Reset,
    /// Switch an actuator on.
    TurnOn,
    /// Switch an actuator off.
    TurnOff,
}

impl Command {
    /// Returns the wire token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GetStatus => "status",
            Self::Reset => "reset",
            Self::TurnOn => "on",
            Self::TurnOff => "off",
        }
    }

    /// Parses a payload, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "status" => Some(Self::GetStatus),
            "reset" => Some(Self::Reset),
            "on" => Some(Self::TurnOn),
            "off" => Some(Self::TurnOff),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
