// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod dump;
pub mod error;
pub mod ip;
pub mod mac;
pub mod tcp;

pub use dump::*;
pub use error::*;
pub use ip::*;
pub use mac::*;
pub use tcp::*;

/// The number of hardware comparison filters on the card.
///
/// This is also the number of virtual filter identities a
/// configuration exposes, one of which is reserved as [`SWAP_SLOT`].
pub const FILTER_COUNT: usize = 8;

/// The virtual slot reserved as a staging area for live filter
/// replacement.
pub const SWAP_SLOT: usize = FILTER_COUNT - 1;

/// The number of capture interfaces which may appear as a steering
/// dimension.
pub const INTERFACE_COUNT: usize = 4;

/// The number of discrete HLB bits on classic hardware.
pub const HLB_COUNT: usize = 2;

/// The largest number of HLB hash buckets of any hashed table layout.
pub const HLB_HASH_COUNT: usize = 8;

/// The number of bytes compared by a single filter.
pub const MATCH_DEPTH: usize = 96;

/// The number of bytes in one filter element, the granularity of
/// early termination.
pub const ELEMENT_BYTES: usize = 8;

/// The index of the last element of a filter.
pub const LAST_FILTER_ELEMENT: u8 = (MATCH_DEPTH / ELEMENT_BYTES - 1) as u8;

/// The maximum number of receive streams a configuration may steer to.
pub const MAX_RX_STREAMS: usize = 64;

/// The three-valued state of a single steering condition.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum Term {
    /// The condition holds when the input is present.
    Assert,
    /// The condition holds when the input is absent.
    Negate,
    /// The input takes no part in the condition.
    #[default]
    DontCare,
}

impl Term {
    /// Does this term hold for an input which is (or isn't) `present`?
    ///
    /// A `DontCare` term never holds.
    #[inline]
    pub fn holds(self, present: bool) -> bool {
        match self {
            Self::Assert => present,
            Self::Negate => !present,
            Self::DontCare => false,
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Assert => "+",
            Self::Negate => "!",
            Self::DontCare => "*",
        };
        write!(f, "{s}")
    }
}

/// One of the two physical copies of the colour table.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum Bank {
    A,
    B,
}

impl Bank {
    /// The bank which is not `self`.
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// The value of the bank-select bit for this bank.
    pub fn bit(self) -> bool {
        matches!(self, Self::B)
    }

    pub fn from_bit(bit: bool) -> Self {
        if bit { Self::B } else { Self::A }
    }
}

impl Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}
