// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scalar values held in a device's parameter store.

use std::fmt;

/// A scalar parameter value.
///
/// Numbers are rendered with one decimal place when formatted as a message
/// payload, text is rendered verbatim.
///
/// # Examples
///
/// ```
/// use iotgate::types::ParamValue;
///
/// assert_eq!(ParamValue::from(72.46).to_string(), "72.5");
/// assert_eq!(ParamValue::from("V1").to_string(), "V1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Numeric value.
    Number(f64),
    /// Textual value.
    Text(String),
}

impl ParamValue {
    /// Returns the numeric value, parsing text if necessary.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Returns the text value, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n:.1}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<super::Status> for ParamValue {
    fn from(value: super::Status) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

/// Parses a payload as a finite float.
///
/// Returns `None` for empty, non-numeric, infinite and NaN payloads.
#[must_use]
pub fn parse_number(payload: &str) -> Option<f64> {
    payload
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;

    #[test]
    fn number_display_has_one_decimal() {
        assert_eq!(ParamValue::Number(30.0).to_string(), "30.0");
        assert_eq!(ParamValue::Number(96.666).to_string(), "96.7");
    }

    #[test]
    fn text_as_f64_parses() {
        assert_eq!(ParamValue::from(" 12.5 ").as_f64(), Some(12.5));
        assert_eq!(ParamValue::from("abc").as_f64(), None);
    }

    #[test]
    fn status_converts_to_text() {
        assert_eq!(
            ParamValue::from(Status::Active),
            ParamValue::Text("active".to_string())
        );
    }

    #[test]
    fn parse_number_rejects_garbage() {
        assert_eq!(parse_number("72.5"), Some(72.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("hot"), None);
    }
}
