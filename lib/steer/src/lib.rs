// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Packet steering for a capture card's comparison filters and colour
//! table.
//!
//! A caller describes filters in protocol terms and per-stream steering
//! conditions over filter hits, interface, and HLB outcome. The engine
//! compiles those into byte/mask pairs and a packed colour table, and
//! loads them onto the card through a register protocol which never
//! exposes live traffic to a half-written rule or a torn table.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[macro_use]
extern crate alloc;

#[macro_use]
extern crate cfg_if;

pub mod api;
pub mod engine;
#[cfg(any(feature = "std", test))]
pub mod print;
pub mod provider;

/// Return value with `bit` set.
pub const fn bit_on(bit: u8) -> u32 {
    0x1 << bit
}
