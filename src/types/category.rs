// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic categories and parameter measures.

use std::fmt;
use std::str::FromStr;

use crate::error::TopicError;

/// Message category, the second segment of every topic.
///
/// # Examples
///
/// ```
/// use iotgate::types::Category;
///
/// let category: Category = "data".parse().unwrap();
/// assert_eq!(category, Category::Data);
/// assert_eq!(Category::Command.as_str(), "command");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Instruction addressed to exactly one device.
    Command,
    /// Configuration or state broadcast by a device.
    Status,
    /// Measurement broadcast by a device.
    Data,
}

impl Category {
    /// Returns the wire token of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Status => "status",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command" => Ok(Self::Command),
            "status" => Ok(Self::Status),
            "data" => Ok(Self::Data),
            _ => Err(TopicError::UnknownCategory(s.to_string())),
        }
    }
}

/// Qualifier of a parameter's role, the fourth topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    /// Current value.
    Value,
    /// Value restored by a reset.
    Default,
    /// Lower bound of the allowed range.
    Minimum,
    /// Upper bound of the allowed range.
    Maximum,
    /// Value expressed as a percentage of the maximum.
    Percentage,
    /// Pin (physical or virtual) the parameter is bound to.
    Gpio,
}

impl Measure {
    /// Returns the wire token of the measure.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Default => "default",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::Percentage => "percentage",
            Self::Gpio => "gpio",
        }
    }

    /// Parses a wire token, returning `None` for measures outside the known set.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "value" => Some(Self::Value),
            "default" => Some(Self::Default),
            "minimum" => Some(Self::Minimum),
            "maximum" => Some(Self::Maximum),
            "percentage" => Some(Self::Percentage),
            "gpio" => Some(Self::Gpio),
            _ => None,
        }
    }

    /// Returns true if `segment` names this measure.
    ///
    /// An absent segment matches [`Measure::Value`], since single-valued
    /// parameters are commonly addressed without a measure.
    #[must_use]
    pub fn matches(&self, segment: Option<&str>) -> bool {
        match segment {
            Some(token) => token == self.as_str(),
            None => *self == Self::Value,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
