// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic codec.
//!
//! Every topic on the bus has the shape
//!
//! ```text
//! did/category/parameter/measure
//! ```
//!
//! where trailing segments may be omitted. A topic with more than four
//! segments is rejected rather than truncated.

use std::fmt;

use crate::error::TopicError;
use crate::types::Category;

/// Separator between topic segments.
pub const SEPARATOR: char = '/';

/// Maximum number of segments in a valid topic.
pub const MAX_SEGMENTS: usize = 4;

/// Decoded addressing tuple of a topic.
///
/// # Examples
///
/// ```
/// use iotgate::protocol::TopicAddress;
/// use iotgate::types::Category;
///
/// let address = TopicAddress::decode("server/data/temp/value").unwrap();
/// assert_eq!(address.did, "server");
/// assert_eq!(address.category, Category::Data);
/// assert_eq!(address.parameter.as_deref(), Some("temp"));
/// assert_eq!(address.measure.as_deref(), Some("value"));
/// assert_eq!(address.encode(), "server/data/temp/value");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicAddress {
    /// Device the message belongs to (target of commands, source of broadcasts).
    pub did: String,
    /// Message category.
    pub category: Category,
    /// Parameter name, absent for generic commands and device-level status.
    pub parameter: Option<String>,
    /// Measure qualifying the parameter.
    pub measure: Option<String>,
}

impl TopicAddress {
    /// Creates an address with only device id and category.
    #[must_use]
    pub fn new(did: impl Into<String>, category: Category) -> Self {
        Self {
            did: did.into(),
            category,
            parameter: None,
            measure: None,
        }
    }

    /// Sets the parameter segment.
    #[must_use]
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    /// Sets the measure segment.
    #[must_use]
    pub fn with_measure(mut self, measure: impl Into<String>) -> Self {
        self.measure = Some(measure.into());
        self
    }

    /// Encodes the address into a topic string.
    #[must_use]
    pub fn encode(&self) -> String {
        encode(
            &self.did,
            self.category,
            self.parameter.as_deref(),
            self.measure.as_deref(),
        )
    }

    /// Decodes a topic string.
    ///
    /// # Errors
    ///
    /// Returns [`TopicError::TooManySegments`] for more than four segments,
    /// [`TopicError::MissingSegment`] when the device id or category is
    /// absent, and [`TopicError::UnknownCategory`] for a foreign category.
    pub fn decode(topic: &str) -> Result<Self, TopicError> {
        decode(topic)
    }
}

impl fmt::Display for TopicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Joins the present segments into a topic string.
///
/// Trailing absent segments are omitted. An absent parameter followed by a
/// present measure leaves an empty segment, which decodes back to absent.
#[must_use]
pub fn encode(did: &str, category: Category, parameter: Option<&str>, measure: Option<&str>) -> String {
    let mut topic = format!("{did}{SEPARATOR}{category}");
    match (parameter, measure) {
        (None, None) => {}
        (Some(parameter), None) => {
            topic.push(SEPARATOR);
            topic.push_str(parameter);
        }
        (parameter, Some(measure)) => {
            topic.push(SEPARATOR);
            topic.push_str(parameter.unwrap_or_default());
            topic.push(SEPARATOR);
            topic.push_str(measure);
        }
    }
    topic
}

/// Splits a topic string into its addressing tuple.
///
/// # Errors
///
/// See [`TopicAddress::decode`].
pub fn decode(topic: &str) -> Result<TopicAddress, TopicError> {
    let segments: Vec<&str> = topic.split(SEPARATOR).collect();
    if segments.len() > MAX_SEGMENTS {
        return Err(TopicError::TooManySegments(segments.len()));
    }

    let segment = |index: usize| {
        segments
            .get(index)
            .copied()
            .filter(|segment| !segment.is_empty())
    };

    let did = segment(0).ok_or(TopicError::MissingSegment("device id"))?;
    let category = segment(1)
        .ok_or(TopicError::MissingSegment("category"))?
        .parse::<Category>()?;

    Ok(TopicAddress {
        did: did.to_string(),
        category,
        parameter: segment(2).map(str::to_string),
        measure: segment(3).map(str::to_string),
    })
}

/// Subscription filter for all commands addressed to `did`.
#[must_use]
pub fn command_filter(did: &str) -> String {
    format!("{did}{SEPARATOR}{}{SEPARATOR}#", Category::Command)
}

/// Subscription filter for broadcasts of `category` from every device.
#[must_use]
pub fn broadcast_filter(category: Category) -> String {
    format!("+{SEPARATOR}{category}{SEPARATOR}#")
}
