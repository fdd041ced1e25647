// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the router and device plugins.
//!
//! # Types
//!
//! - [`Category`] - Topic category (command, status, data)
//! - [`Measure`] - Qualifier of a parameter (value, default, minimum, ...)
//! - [`Status`] - Status payload tokens (online, active, idle, ...)
//! - [`Command`] - Generic command payloads (status, reset, on, off)
//! - [`ParamValue`] - Scalar stored in a parameter store

mod category;
mod status;
mod value;

pub use category::{Category, Measure};
pub use status::{Command, Status};
pub use value::{ParamValue, parse_number};
