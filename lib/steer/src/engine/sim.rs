// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A simulated card register block.
//!
//! [`SimCard`] decodes the register protocol into filter slots, enable
//! bits and two colour-table banks, and classifies frames the way the
//! card would. It records every state change as an [`HwEvent`], and
//! after each one re-classifies a set of watched probe frames, so a
//! test can see exactly when live steering changed.

use super::colour::Colour;
use super::colour::ColourTable;
use super::config::Configuration;
use super::layout::HlbKey;
use super::layout::TableKey;
use super::layout::TableLayout;
use super::layout::TableVariant;
use super::regs::*;
use crate::api::Bank;
use crate::api::ELEMENT_BYTES;
use crate::api::FILTER_COUNT;
use crate::api::MATCH_DEPTH;
use crate::api::SteerResult;
use crate::bit_on;
use alloc::vec::Vec;

/// A decoded change to card state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HwEvent {
    FilterEnable(u8),
    FilterDisable(u8),
    /// Some part of a slot's rule was written. `live` says whether the
    /// slot was enabled at the time.
    FilterWrite { slot: u8, live: bool },
    /// Rows of a bank were written. `live` says whether the bank was
    /// the active one at the time.
    ColourWrite { bank: Bank, live: bool },
    BankFlip(Bank),
}

/// A frame to classify after every state change.
#[derive(Clone, Debug)]
pub struct Probe {
    pub frame: Vec<u8>,
    pub interface: u8,
    pub hlb: HlbKey,
}

/// The classification of every watched probe, as of `event`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Observation {
    /// The index into [`SimCard::events`] which produced this state.
    pub event: Option<usize>,
    pub colours: Vec<Colour>,
}

#[derive(Clone, Copy)]
struct SimSlot {
    value: [u32; FILTER_WORDS],
    mask: [u32; FILTER_WORDS],
    termination: u32,
}

impl SimSlot {
    fn bytes(words: &[u32; FILTER_WORDS]) -> [u8; MATCH_DEPTH] {
        let mut out = [0; MATCH_DEPTH];
        for (i, w) in words.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&w.to_be_bytes());
        }
        out
    }

    /// Does `frame` match this slot? Bytes beyond the end of the frame
    /// compare as zero.
    fn matches(&self, frame: &[u8]) -> bool {
        let value = Self::bytes(&self.value);
        let mask = Self::bytes(&self.mask);
        let depth = ((self.termination as usize + 1) * ELEMENT_BYTES)
            .min(MATCH_DEPTH);

        (0..depth).all(|i| {
            let b = frame.get(i).copied().unwrap_or(0);
            b & mask[i] == value[i] & mask[i]
        })
    }
}

pub struct SimCard {
    layout: &'static dyn TableLayout,
    slots: [SimSlot; FILTER_COUNT],
    control: u32,
    filter_addr: u32,
    colour_latch: (Bank, usize),
    banks: [ColourTable; 2],
    reads_since_write: usize,
    settle_violations: usize,
    events: Vec<HwEvent>,
    probes: Vec<Probe>,
    observations: Vec<Observation>,
}

impl SimCard {
    /// A card with every slot disabled and zeroed, bank A active, and
    /// both banks dropping everything.
    pub fn new(
        variant: TableVariant,
        bits_per_entry: u32,
    ) -> SteerResult<Self> {
        let layout = variant.layout();
        let mut bank = ColourTable::alloc(layout.entries(), bits_per_entry)?;
        bank.fill_drop();

        Ok(Self {
            layout,
            slots: [SimSlot {
                value: [0; FILTER_WORDS],
                mask: [0; FILTER_WORDS],
                termination: 0,
            }; FILTER_COUNT],
            control: 0,
            filter_addr: 0,
            colour_latch: (Bank::A, 0),
            banks: [bank.clone(), bank],
            reads_since_write: SETTLE_READS,
            settle_violations: 0,
            events: Vec::new(),
            probes: Vec::new(),
            observations: Vec::new(),
        })
    }

    /// A card shaped for `config`.
    pub fn for_config(config: &Configuration) -> SteerResult<Self> {
        Self::new(config.variant(), config.bits_per_entry())
    }

    pub fn events(&self) -> &[HwEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
        self.observations.clear();
        self.observe(None);
    }

    /// The number of writes issued before the previous write had
    /// settled.
    pub fn settle_violations(&self) -> usize {
        self.settle_violations
    }

    pub fn active_bank(&self) -> Bank {
        Bank::from_bit(self.control & CONTROL_BANK != 0)
    }

    pub fn bank(&self, bank: Bank) -> &ColourTable {
        match bank {
            Bank::A => &self.banks[0],
            Bank::B => &self.banks[1],
        }
    }

    fn bank_mut(&mut self, bank: Bank) -> &mut ColourTable {
        match bank {
            Bank::A => &mut self.banks[0],
            Bank::B => &mut self.banks[1],
        }
    }

    pub fn is_enabled(&self, slot: u8) -> bool {
        self.control & bit_on(slot) != 0
    }

    /// The physical slots hit by `frame`.
    pub fn filter_hits(&self, frame: &[u8]) -> u8 {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, s)| self.is_enabled(*i as u8) && s.matches(frame))
            .fold(0u8, |acc, (i, _)| acc | (1 << i))
    }

    /// Where the card would steer `frame` right now.
    pub fn classify(
        &self,
        frame: &[u8],
        interface: u8,
        hlb: HlbKey,
    ) -> Colour {
        let filters = self.filter_hits(frame);
        let key = TableKey { filters, interface, hlb };
        let idx = self.layout.encode_key(&key);
        self.bank(self.active_bank()).get(idx)
    }

    /// Watch `probe`, classifying it after every state change.
    pub fn watch(&mut self, probe: Probe) {
        self.probes.push(probe);
        self.observations.clear();
        self.observe(None);
    }

    /// Each distinct classification of the watched probes, in order.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    fn observe(&mut self, event: Option<usize>) {
        let colours: Vec<Colour> = self
            .probes
            .iter()
            .map(|p| self.classify(&p.frame, p.interface, p.hlb))
            .collect();

        if self.observations.last().is_some_and(|o| o.colours == colours) {
            return;
        }
        self.observations.push(Observation { event, colours });
    }

    fn record(&mut self, ev: HwEvent) {
        // Coalesce bursts of row and word writes.
        let dup = matches!(
            ev,
            HwEvent::FilterWrite { .. } | HwEvent::ColourWrite { .. }
        ) && self.events.last() == Some(&ev);

        if !dup {
            self.events.push(ev);
        }
        let idx = self.events.len() - 1;
        self.observe(Some(idx));
    }

    fn write_control(&mut self, val: u32) {
        let old = self.control;
        self.control = val;

        for slot in 0..FILTER_COUNT as u8 {
            let bit = bit_on(slot);
            if old & bit == val & bit {
                continue;
            }
            if val & bit != 0 {
                self.record(HwEvent::FilterEnable(slot));
            } else {
                self.record(HwEvent::FilterDisable(slot));
            }
        }

        if (old ^ val) & CONTROL_BANK != 0 {
            self.record(HwEvent::BankFlip(self.active_bank()));
        }
    }

    fn write_filter_data(&mut self, val: u32) {
        let addr = self.filter_addr;
        let word = (addr & CMD_WORD_MASK) as usize;
        let slot = ((addr >> CMD_SLOT_SHIFT) & CMD_SLOT_MASK) as u8;
        let target = FilterTarget::from_bits(
            (addr >> CMD_TARGET_SHIFT) & CMD_TARGET_MASK,
        );

        let Some(s) = self.slots.get_mut(usize::from(slot)) else {
            return;
        };

        match target {
            Some(FilterTarget::Value) if word < FILTER_WORDS => {
                s.value[word] = val
            }
            Some(FilterTarget::Mask) if word < FILTER_WORDS => {
                s.mask[word] = val
            }
            Some(FilterTarget::Termination) => s.termination = val,
            _ => return,
        }

        let live = self.is_enabled(slot);
        self.record(HwEvent::FilterWrite { slot, live });
    }

    fn read_filter_data(&self) -> u32 {
        let addr = self.filter_addr;
        let word = (addr & CMD_WORD_MASK) as usize;
        let slot = ((addr >> CMD_SLOT_SHIFT) & CMD_SLOT_MASK) as usize;
        let target = FilterTarget::from_bits(
            (addr >> CMD_TARGET_SHIFT) & CMD_TARGET_MASK,
        );

        let Some(s) = self.slots.get(slot) else {
            return 0;
        };

        match target {
            Some(FilterTarget::Value) => {
                s.value.get(word).copied().unwrap_or(0)
            }
            Some(FilterTarget::Mask) => s.mask.get(word).copied().unwrap_or(0),
            Some(FilterTarget::Termination) => s.termination,
            None => 0,
        }
    }

    fn write_colour(&mut self, val: u32) {
        let bank = Bank::from_bit(val & COLOUR_BANK != 0);
        let row = ((val >> COLOUR_ROW_SHIFT) & COLOUR_ROW_MASK) as usize;

        if val & COLOUR_READ != 0 {
            self.colour_latch = (bank, row);
            return;
        }

        let data = (val & COLOUR_DATA_MASK) as u16;
        let table = self.bank_mut(bank);
        if row >= table.rows().len() {
            return;
        }
        table.set_row(row, data);

        let live = bank == self.active_bank();
        self.record(HwEvent::ColourWrite { bank, live });
    }

    fn read_colour(&self) -> u32 {
        let (bank, row) = self.colour_latch;
        self.bank(bank).rows().get(row).map_or(0, |r| u32::from(*r))
    }
}

impl RegisterAccess for SimCard {
    fn read(&mut self, offset: u32) -> u32 {
        self.reads_since_write += 1;
        match offset {
            FILTER_DATA => self.read_filter_data(),
            COLOUR => self.read_colour(),
            CONTROL => self.control,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, val: u32) {
        if self.reads_since_write < SETTLE_READS {
            self.settle_violations += 1;
        }
        self.reads_since_write = 0;

        match offset {
            FILTER_CMD => self.filter_addr = val,
            FILTER_DATA => self.write_filter_data(val),
            COLOUR => self.write_colour(val),
            CONTROL => self.write_control(val),
            _ => {}
        }
    }
}
