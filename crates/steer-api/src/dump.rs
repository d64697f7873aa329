// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Snapshots of the live hardware state, for use in debugging or
//! administrative purposes.

use super::Bank;
use alloc::vec::Vec;
use serde::Deserialize;
use serde::Serialize;

/// The programmed state of one physical filter slot.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SlotDump {
    /// The physical slot number.
    pub slot: u8,
    /// Whether the slot's enable bit is set.
    pub enabled: bool,
    /// The programmed early-termination element.
    pub termination: u8,
    /// The programmed compare value.
    pub value: Vec<u8>,
    /// The programmed compare mask.
    pub mask: Vec<u8>,
}

impl SlotDump {
    /// The number of bytes this slot actually compares on: the
    /// position just past the last non-zero mask byte.
    pub fn compare_len(&self) -> usize {
        self.mask.iter().rposition(|m| *m != 0).map_or(0, |i| i + 1)
    }
}

/// A read-back of every filter slot and the bank selector.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HwDump {
    pub active_bank: Bank,
    pub slots: Vec<SlotDump>,
}
