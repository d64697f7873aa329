// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Loading a configuration onto the card.
//!
//! Two invariants hold across every operation here. A filter slot is
//! always disabled while its rule is written, so live traffic is never
//! compared against half a rule. The colour table is only ever written
//! into the inactive bank and made live by a single flip of the bank
//! selector, so live traffic is never steered by half a table.

use super::colour::ColourTable;
use super::compile::compile;
use super::config::Configuration;
use super::filter::FilterSpec;
use super::regs::FilterChannel;
use super::regs::RegisterAccess;
use crate::api::Bank;
use crate::api::FILTER_COUNT;
use crate::api::HwDump;
use crate::api::SWAP_SLOT;
use crate::api::SlotDump;
use crate::api::SteerError;
use crate::api::SteerResult;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use crate::provider::Providers;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;

/// What a load (or swap) did to the card.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoadSummary {
    /// Slots enabled on the card but not in the configuration.
    pub disabled: usize,
    /// Slots whose programmed rule was replaced.
    pub rewritten: usize,
    /// Slots whose rule was current but which needed enabling.
    pub enabled: usize,
    /// Slots left exactly as they were.
    pub untouched: usize,
    /// The colour-table bank active afterwards.
    pub bank: Bank,
}

impl LoadSummary {
    fn new(bank: Bank) -> Self {
        Self { disabled: 0, rewritten: 0, enabled: 0, untouched: 0, bank }
    }
}

impl Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "disabled: {} rewritten: {} enabled: {} untouched: {} bank: {}",
            self.disabled, self.rewritten, self.enabled, self.untouched,
            self.bank,
        )
    }
}

/// Drives the register protocol for one card.
///
/// The loader assumes it has the card's registers to itself for the
/// duration of each call.
pub struct Loader<R> {
    chan: FilterChannel<R>,
    log: Box<dyn LogProvider>,
}

impl<R: RegisterAccess> Loader<R> {
    pub fn new(regs: R, providers: Providers) -> Self {
        Self { chan: FilterChannel::new(regs), log: providers.log }
    }

    pub fn channel(&mut self) -> &mut FilterChannel<R> {
        &mut self.chan
    }

    pub fn regs(&self) -> &R {
        self.chan.regs()
    }

    pub fn into_regs(self) -> R {
        self.chan.into_inner()
    }

    /// Bring the card in line with `config`.
    ///
    /// Each filter slot is brought up to date in turn: slots the
    /// configuration disables are switched off first, and a slot whose
    /// rule changed is disabled, rewritten, and re-enabled. Then the
    /// colour table is rebuilt, written to the inactive bank, and made
    /// live.
    ///
    /// The only failure is allocating the table, which happens before
    /// the card is touched.
    pub fn load(&mut self, config: &Configuration) -> SteerResult<LoadSummary> {
        let mut table = ColourTable::for_config(config)?;
        let mut summary = LoadSummary::new(self.chan.active_bank());

        for spec in config.filters() {
            self.sync_filter(spec, &mut summary);
        }

        table.fill(config);
        summary.bank = self.publish(&table);
        Ok(summary)
    }

    fn sync_filter(&mut self, spec: &FilterSpec, summary: &mut LoadSummary) {
        let slot = spec.physical_slot();
        let live = self.chan.is_enabled(slot);

        if !spec.is_enabled() {
            if live {
                self.chan.disable(slot);
                self.log.log(LogLevel::Warn, &format!("disabled {spec}"));
                summary.disabled += 1;
            } else {
                summary.untouched += 1;
            }
            return;
        }

        let want = compile(spec.rule());
        let have = self.chan.read_filter(slot);

        if want != have {
            self.chan.disable(slot);
            self.chan.write_filter(slot, &want);
            self.chan.enable(slot);
            self.note(&format!("rewrote {spec}"));
            summary.rewritten += 1;
        } else if !live {
            self.chan.enable(slot);
            self.note(&format!("enabled {spec}"));
            summary.enabled += 1;
        } else {
            summary.untouched += 1;
        }
    }

    /// Write `table` to the inactive bank and flip to it.
    fn publish(&mut self, table: &ColourTable) -> Bank {
        let bank = self.chan.active_bank().other();
        self.chan.write_colour_table(bank, table);
        self.chan.set_active_bank(bank);
        self.note(&format!("colour table live in bank {bank}"));
        bank
    }

    /// Replace the rule of virtual slot `target` with the rule staged
    /// in [`SWAP_SLOT`], with no instant at which traffic is steered
    /// by anything but the old rule or the new one.
    ///
    /// 1. Publish the colour table for the current configuration.
    /// 2. Program the staged rule into the swap slot's physical filter
    ///    and enable it. Nothing steers on the swap slot, so this has
    ///    no visible effect.
    /// 3. Exchange the physical slots of `target` and the swap slot.
    /// 4. Publish the colour table again. The bank flip is the instant
    ///    `target` starts steering by the new rule.
    /// 5. Disable the physical filter still holding the old rule.
    ///
    /// Afterwards `target` holds the staged rule, enabled, on the
    /// physical filter now carrying it. The swap slot holds the old
    /// rule, disabled, ready to stage the next swap.
    pub fn swap_filter(
        &mut self,
        config: &mut Configuration,
        target: usize,
    ) -> SteerResult<LoadSummary> {
        if target == SWAP_SLOT {
            return Err(SteerError::SwapTarget(target));
        }
        config.filter(target)?;

        let mut table = ColourTable::for_config(config)?;
        let mut summary = LoadSummary::new(self.chan.active_bank());

        // 1
        table.fill(config);
        self.publish(&table);

        // 2
        let staged = config.filter(SWAP_SLOT)?;
        let staging = staged.physical_slot();
        let rule = compile(staged.rule());
        self.chan.disable(staging);
        self.chan.write_filter(staging, &rule);
        self.chan.enable(staging);
        self.note(&format!("swap: staged {staged}"));
        summary.rewritten += 1;

        // 3
        config.swap_physical(SWAP_SLOT, target);

        // 4
        table.fill(config);
        summary.bank = self.publish(&table);

        // 5
        let retired = config.filter(SWAP_SLOT)?.physical_slot();
        self.chan.disable(retired);
        summary.disabled += 1;

        config.exchange_rules(SWAP_SLOT, target);
        config.filter_mut(target)?.set_enabled(true);
        config.filter_mut(SWAP_SLOT)?.set_enabled(false);
        self.note(&format!(
            "swap: filter {target} now on hw {staging}, hw {retired} retired"
        ));

        summary.untouched = FILTER_COUNT - summary.rewritten - summary.disabled;
        Ok(summary)
    }

    /// Read back everything programmed on the card.
    pub fn dump(&mut self) -> HwDump {
        let active_bank = self.chan.active_bank();
        let mut slots = Vec::with_capacity(FILTER_COUNT);

        for slot in 0..FILTER_COUNT as u8 {
            let enabled = self.chan.is_enabled(slot);
            let f = self.chan.read_filter(slot);
            slots.push(SlotDump {
                slot,
                enabled,
                termination: f.termination,
                value: f.value.to_vec(),
                mask: f.mask.to_vec(),
            });
        }

        HwDump { active_bank, slots }
    }

    fn note(&self, msg: &str) {
        self.log.log(LogLevel::Note, msg);
    }
}
