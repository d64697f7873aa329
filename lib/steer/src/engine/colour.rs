// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The colour table: for every (filter hits, interface, HLB) index,
//! the receive stream a packet goes to, or drop.
//!
//! Entries are `bits_per_entry` wide with the top bit as the drop
//! marker. They are packed little-endian into 16-bit rows, as many
//! whole entries to a row as fit; an entry never spans two rows.

use super::config::Configuration;
use crate::api::SteerError;
use crate::api::SteerResult;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;

/// The width of one colour-table row.
pub const ROW_BITS: u32 = u16::BITS;

/// The decoded value of one colour-table entry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Colour {
    Stream(u8),
    Drop,
}

impl Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Stream(s) => write!(f, "rx{s}"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColourTable {
    bits_per_entry: u32,
    entries: usize,
    rows: Vec<u16>,
}

impl ColourTable {
    /// Allocate a table of `entries` entries, every one of them zero.
    ///
    /// Allocation failure is reported rather than aborting.
    pub fn alloc(entries: usize, bits_per_entry: u32) -> SteerResult<Self> {
        if bits_per_entry == 0 || bits_per_entry > ROW_BITS {
            return Err(SteerError::BadValue {
                field: "bits per entry".into(),
                value: u64::from(bits_per_entry),
            });
        }

        let per_row = (ROW_BITS / bits_per_entry) as usize;
        let nrows = entries.div_ceil(per_row);
        let mut rows = Vec::new();
        rows.try_reserve_exact(nrows).map_err(|_| SteerError::NoMemory {
            bytes: nrows * core::mem::size_of::<u16>(),
        })?;
        rows.resize(nrows, 0);

        Ok(Self { bits_per_entry, entries, rows })
    }

    /// Allocate a table sized for `config`.
    pub fn for_config(config: &Configuration) -> SteerResult<Self> {
        Self::alloc(config.layout().entries(), config.bits_per_entry())
    }

    pub fn bits_per_entry(&self) -> u32 {
        self.bits_per_entry
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn entries_per_row(&self) -> usize {
        (ROW_BITS / self.bits_per_entry) as usize
    }

    /// The raw entry value meaning drop.
    pub fn drop_marker(&self) -> u16 {
        1 << (self.bits_per_entry - 1)
    }

    fn entry_mask(&self) -> u16 {
        (((1u32 << self.bits_per_entry) - 1) & 0xFFFF) as u16
    }

    fn locate(&self, idx: usize) -> (usize, u32) {
        let per_row = self.entries_per_row();
        let shift = (idx % per_row) as u32 * self.bits_per_entry;
        (idx / per_row, shift)
    }

    /// The colour of entry `idx`.
    ///
    /// # Panics
    ///
    /// If `idx` is not less than [`Self::entries`].
    pub fn get(&self, idx: usize) -> Colour {
        assert!(idx < self.entries, "colour index {idx} out of range");
        let (row, shift) = self.locate(idx);
        let raw = (self.rows[row] >> shift) & self.entry_mask();
        if raw & self.drop_marker() != 0 {
            Colour::Drop
        } else {
            Colour::Stream(raw as u8)
        }
    }

    pub(crate) fn set(&mut self, idx: usize, colour: Colour) {
        let raw = match colour {
            Colour::Stream(s) => u16::from(s) & !self.drop_marker(),
            Colour::Drop => self.drop_marker(),
        };
        let mask = self.entry_mask();
        let (row, shift) = self.locate(idx);
        let r = &mut self.rows[row];
        *r = (*r & !(mask << shift)) | ((raw & mask) << shift);
    }

    pub fn rows(&self) -> &[u16] {
        &self.rows
    }

    pub(crate) fn set_row(&mut self, row: usize, data: u16) {
        self.rows[row] = data;
    }

    pub fn iter(&self) -> impl Iterator<Item = Colour> + '_ {
        (0..self.entries).map(|i| self.get(i))
    }

    /// Mark every entry as drop.
    pub fn fill_drop(&mut self) {
        for i in 0..self.entries {
            self.set(i, Colour::Drop);
        }
    }

    /// Fill the table from `config`.
    ///
    /// Each index is decoded by the configuration's layout, its filter
    /// hits renumbered from physical to virtual slots, and the first
    /// stream whose expression matches wins. No match is a drop.
    pub fn fill(&mut self, config: &Configuration) {
        let layout = config.layout();
        let slots = config.slot_map();

        for idx in 0..self.entries {
            let key = layout.decode_index(idx);
            let colour = match config.steer(&slots, &key) {
                Some(stream) => Colour::Stream(stream as u8),
                None => Colour::Drop,
            };
            self.set(idx, colour);
        }
    }
}

/// Build the colour table for `config`.
pub fn build(config: &Configuration) -> SteerResult<ColourTable> {
    let mut table = ColourTable::for_config(config)?;
    table.fill(config);
    Ok(table)
}
