// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The steering engine.
//!
//! Leaf first: filters and their compiler, steering expressions, table
//! layouts and the colour-table builder, the register channel, and
//! finally the configuration loader which drives them all.
pub mod colour;
pub mod compile;
pub mod config;
pub mod expr;
pub mod filter;
pub mod layout;
pub mod loader;
pub mod regs;
#[cfg(any(feature = "test-help", test))]
pub mod sim;

pub use steer_api::SteerError;
pub use steer_api::SteerResult;
