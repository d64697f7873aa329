// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The register protocol for the filter slots and colour-table banks.
//!
//! Four 32-bit registers are involved:
//!
//! * `FILTER_CMD` latches the address (slot, target, word) of the next
//!   `FILTER_DATA` access, and requests a read-back when bit 31 is set.
//! * `FILTER_DATA` carries one word of compare value, compare mask, or
//!   the early-termination element.
//! * `COLOUR` writes one 16-bit row of a colour-table bank, or with the
//!   read bit set latches a row for read-back.
//! * `CONTROL` holds one enable bit per filter slot and, in its top
//!   bit, the active colour-table bank.
//!
//! The card needs time to absorb every write: each write is followed by
//! [`SETTLE_READS`] dummy reads of `CONTROL`.

use super::colour::ColourTable;
use super::compile::CompiledFilter;
use crate::api::Bank;
use crate::api::MATCH_DEPTH;
use crate::api::SteerResult;
use crate::bit_on;

pub const FILTER_CMD: u32 = 0x00;
pub const FILTER_DATA: u32 = 0x04;
pub const COLOUR: u32 = 0x08;
pub const CONTROL: u32 = 0x0c;

/// The number of dummy reads which follow every register write.
pub const SETTLE_READS: usize = 16;

pub const CMD_WORD_MASK: u32 = 0xFF;
pub const CMD_SLOT_SHIFT: u32 = 8;
pub const CMD_SLOT_MASK: u32 = 0xF;
pub const CMD_TARGET_SHIFT: u32 = 12;
pub const CMD_TARGET_MASK: u32 = 0x3;
pub const CMD_READ: u32 = bit_on(31);

pub const COLOUR_BANK: u32 = bit_on(31);
pub const COLOUR_READ: u32 = bit_on(30);
pub const COLOUR_ROW_SHIFT: u32 = 16;
pub const COLOUR_ROW_MASK: u32 = 0x3FFF;
pub const COLOUR_DATA_MASK: u32 = 0xFFFF;

pub const CONTROL_BANK: u32 = bit_on(31);

/// The number of 32-bit words in a compare value or mask.
pub const FILTER_WORDS: usize = MATCH_DEPTH / 4;

/// Which part of a filter a `FILTER_DATA` access touches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterTarget {
    Value = 0,
    Mask = 1,
    Termination = 2,
}

impl FilterTarget {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Value),
            1 => Some(Self::Mask),
            2 => Some(Self::Termination),
            _ => None,
        }
    }
}

/// Build a `FILTER_CMD` address.
pub fn filter_cmd(slot: u8, target: FilterTarget, word: usize) -> u32 {
    (word as u32 & CMD_WORD_MASK)
        | (u32::from(slot) & CMD_SLOT_MASK) << CMD_SLOT_SHIFT
        | (target as u32) << CMD_TARGET_SHIFT
}

/// Access to the card's register block, supplied by the card driver.
pub trait RegisterAccess {
    fn read(&mut self, offset: u32) -> u32;
    fn write(&mut self, offset: u32, val: u32);
}

impl<R: RegisterAccess + ?Sized> RegisterAccess for &mut R {
    fn read(&mut self, offset: u32) -> u32 {
        (**self).read(offset)
    }

    fn write(&mut self, offset: u32, val: u32) {
        (**self).write(offset, val)
    }
}

/// The register-level primitives for filter slots and colour banks.
pub struct FilterChannel<R> {
    regs: R,
}

impl<R: RegisterAccess> FilterChannel<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn into_inner(self) -> R {
        self.regs
    }

    pub fn settle(&mut self) {
        for _ in 0..SETTLE_READS {
            let _ = self.regs.read(CONTROL);
        }
    }

    fn write(&mut self, offset: u32, val: u32) {
        self.regs.write(offset, val);
        self.settle();
    }

    fn control(&mut self) -> u32 {
        self.regs.read(CONTROL)
    }

    /// The enable bits of every slot.
    pub fn enabled_mask(&mut self) -> u8 {
        (self.control() & 0xFF) as u8
    }

    pub fn is_enabled(&mut self, slot: u8) -> bool {
        self.control() & bit_on(slot) != 0
    }

    pub fn enable(&mut self, slot: u8) {
        let ctl = self.control();
        self.write(CONTROL, ctl | bit_on(slot));
    }

    pub fn disable(&mut self, slot: u8) {
        let ctl = self.control();
        self.write(CONTROL, ctl & !bit_on(slot));
    }

    fn write_words(&mut self, slot: u8, target: FilterTarget, bytes: &[u8]) {
        for (word, chunk) in bytes.chunks(4).enumerate() {
            let mut be = [0u8; 4];
            be[..chunk.len()].copy_from_slice(chunk);
            self.write(FILTER_CMD, filter_cmd(slot, target, word));
            self.write(FILTER_DATA, u32::from_be_bytes(be));
        }
    }

    fn read_word(
        &mut self,
        slot: u8,
        target: FilterTarget,
        word: usize,
    ) -> u32 {
        self.write(FILTER_CMD, CMD_READ | filter_cmd(slot, target, word));
        self.regs.read(FILTER_DATA)
    }

    /// Program `filter` into `slot`.
    ///
    /// The slot must be disabled; the card would otherwise compare
    /// live traffic against a partly written rule.
    pub fn write_filter(&mut self, slot: u8, filter: &CompiledFilter) {
        self.write_words(slot, FilterTarget::Value, &filter.value);
        self.write_words(slot, FilterTarget::Mask, &filter.mask);
        self.write(
            FILTER_CMD,
            filter_cmd(slot, FilterTarget::Termination, 0),
        );
        self.write(FILTER_DATA, u32::from(filter.termination));
    }

    /// Read back what is programmed into `slot`.
    pub fn read_filter(&mut self, slot: u8) -> CompiledFilter {
        let mut out = CompiledFilter {
            value: [0; MATCH_DEPTH],
            mask: [0; MATCH_DEPTH],
            termination: 0,
        };

        for word in 0..FILTER_WORDS {
            let v = self.read_word(slot, FilterTarget::Value, word);
            let m = self.read_word(slot, FilterTarget::Mask, word);
            let at = word * 4;
            out.value[at..at + 4].copy_from_slice(&v.to_be_bytes());
            out.mask[at..at + 4].copy_from_slice(&m.to_be_bytes());
        }

        out.termination =
            (self.read_word(slot, FilterTarget::Termination, 0) & 0xFF) as u8;
        out
    }

    pub fn active_bank(&mut self) -> Bank {
        Bank::from_bit(self.control() & CONTROL_BANK != 0)
    }

    /// Make `bank` the bank the card steers by.
    pub fn set_active_bank(&mut self, bank: Bank) {
        let ctl = self.control() & !CONTROL_BANK;
        let bit = if bank.bit() { CONTROL_BANK } else { 0 };
        self.write(CONTROL, ctl | bit);
    }

    fn colour_addr(bank: Bank, row: usize) -> u32 {
        let bank = if bank.bit() { COLOUR_BANK } else { 0 };
        bank | (row as u32 & COLOUR_ROW_MASK) << COLOUR_ROW_SHIFT
    }

    /// Write every row of `table` into `bank`.
    ///
    /// The bank must not be the active one.
    pub fn write_colour_table(&mut self, bank: Bank, table: &ColourTable) {
        for (row, data) in table.rows().iter().enumerate() {
            let addr = Self::colour_addr(bank, row);
            self.write(COLOUR, addr | u32::from(*data));
        }
    }

    pub fn read_colour_row(&mut self, bank: Bank, row: usize) -> u16 {
        self.write(COLOUR, COLOUR_READ | Self::colour_addr(bank, row));
        (self.regs.read(COLOUR) & COLOUR_DATA_MASK) as u16
    }

    /// Read back a whole bank as a table of the given shape.
    pub fn read_colour_table(
        &mut self,
        bank: Bank,
        entries: usize,
        bits_per_entry: u32,
    ) -> SteerResult<ColourTable> {
        let mut table = ColourTable::alloc(entries, bits_per_entry)?;
        for row in 0..table.rows().len() {
            let data = self.read_colour_row(bank, row);
            table.set_row(row, data);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec::Vec;

    /// Records every access and answers reads of CONTROL from a plain
    /// register.
    #[derive(Default)]
    struct Recorder {
        control: u32,
        reads: usize,
        writes: Vec<(u32, u32)>,
    }

    impl RegisterAccess for Recorder {
        fn read(&mut self, offset: u32) -> u32 {
            self.reads += 1;
            match offset {
                CONTROL => self.control,
                _ => 0,
            }
        }

        fn write(&mut self, offset: u32, val: u32) {
            if offset == CONTROL {
                self.control = val;
            }
            self.writes.push((offset, val));
        }
    }

    #[test]
    fn cmd_encoding() {
        assert_eq!(filter_cmd(3, FilterTarget::Mask, 23), 0x1317);
        assert_eq!(filter_cmd(7, FilterTarget::Termination, 0), 0x2700);
        assert_eq!(FilterTarget::from_bits(2), Some(FilterTarget::Termination));
        assert_eq!(FilterTarget::from_bits(3), None);
    }

    #[test]
    fn enable_preserves_other_bits() {
        let mut chan = FilterChannel::new(Recorder {
            control: CONTROL_BANK | 0b1001,
            ..Default::default()
        });
        chan.enable(2);
        chan.disable(0);
        assert_eq!(chan.regs().control, CONTROL_BANK | 0b1100);
        assert!(chan.is_enabled(3));
        assert!(!chan.is_enabled(0));
        assert_eq!(chan.active_bank(), Bank::B);

        chan.set_active_bank(Bank::A);
        assert_eq!(chan.regs().control, 0b1100);
    }

    #[test]
    fn every_write_settles() {
        let mut chan = FilterChannel::new(Recorder::default());
        chan.enable(1);
        // One read for the read-modify-write, then the settle.
        assert_eq!(chan.regs().reads, 1 + SETTLE_READS);
        assert_eq!(chan.regs().writes.len(), 1);
    }

    #[test]
    fn filter_words_are_big_endian() {
        let mut f = CompiledFilter {
            value: [0; MATCH_DEPTH],
            mask: [0; MATCH_DEPTH],
            termination: 4,
        };
        f.value[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let mut chan = FilterChannel::new(Recorder::default());
        chan.write_filter(5, &f);
        let w = &chan.regs().writes;
        // Address then data, for each value word, mask word, and the
        // termination.
        assert_eq!(w.len(), 2 * (2 * FILTER_WORDS + 1));
        assert_eq!(w[0], (FILTER_CMD, 0x0500));
        assert_eq!(w[1], (FILTER_DATA, 0xdeadbeef));
        assert_eq!(w[w.len() - 2], (FILTER_CMD, 0x2500));
        assert_eq!(w[w.len() - 1], (FILTER_DATA, 4));
    }
}
