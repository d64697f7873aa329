// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The steering configuration for one card.
//!
//! A [`Configuration`] owns every filter, the arena of partial
//! expressions, and one output expression per receive stream. Callers
//! build it up through the setters here and in [`super::filter`], then
//! hand it to a [`super::loader::Loader`].

use super::expr::OutputExpression;
use super::expr::PartialExpression;
use super::expr::PartialId;
use super::filter::FilterSpec;
use super::layout::TableKey;
use super::layout::TableLayout;
use super::layout::TableVariant;
use crate::api::FILTER_COUNT;
use crate::api::MAX_RX_STREAMS;
use crate::api::SteerError;
use crate::api::SteerResult;
use alloc::vec::Vec;
use serde::Serialize;

/// The translation from physical filter slots to virtual ones.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SlotMap {
    // Indexed by physical slot.
    virt: [u8; FILTER_COUNT],
}

impl SlotMap {
    /// Every virtual slot in the physical slot of the same number.
    pub fn identity() -> Self {
        let mut virt = [0; FILTER_COUNT];
        for (i, v) in virt.iter_mut().enumerate() {
            *v = i as u8;
        }
        Self { virt }
    }

    /// Build the map from the physical slot of each filter. A slot past
    /// the last filter is left on its identity mapping.
    pub fn from_filters(filters: &[FilterSpec]) -> Self {
        let mut map = Self::identity();
        for f in filters {
            let phys = usize::from(f.physical_slot());
            if let Some(v) = map.virt.get_mut(phys) {
                *v = f.virtual_slot();
            }
        }
        map
    }

    /// The virtual slot carried by physical slot `phys`, if there is
    /// such a physical slot.
    pub fn virtual_slot(&self, phys: usize) -> Option<u8> {
        self.virt.get(phys).copied()
    }

    /// Exchange the physical slots of virtual slots `a` and `b`.
    pub fn exchange(&mut self, a: usize, b: usize) {
        let pa = self.virt.iter().position(|v| usize::from(*v) == a);
        let pb = self.virt.iter().position(|v| usize::from(*v) == b);
        if let (Some(pa), Some(pb)) = (pa, pb) {
            self.virt.swap(pa, pb);
        }
    }

    /// Renumber a filter-hit bitmask from physical to virtual slots.
    pub fn to_virtual(&self, phys_bits: u8) -> u8 {
        self.virt
            .iter()
            .enumerate()
            .filter(|(phys, _)| phys_bits & (1 << phys) != 0)
            .fold(0u8, |acc, (_, v)| acc | (1 << *v))
    }
}

/// Every filter, partial and stream of one card. Its setters keep each
/// filter slot and partial handle in range.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Configuration {
    variant: TableVariant,
    filters: Vec<FilterSpec>,
    partials: Vec<PartialExpression>,
    streams: Vec<OutputExpression>,
}

impl Configuration {
    /// A configuration steering to `stream_count` receive streams, with
    /// every filter disabled and every stream empty (so everything is
    /// dropped).
    pub fn new(
        variant: TableVariant,
        stream_count: usize,
    ) -> SteerResult<Self> {
        if stream_count == 0 || stream_count > MAX_RX_STREAMS {
            return Err(SteerError::BadStreamCount(stream_count));
        }

        Ok(Self {
            variant,
            filters: (0..FILTER_COUNT as u8).map(FilterSpec::new).collect(),
            partials: Vec::new(),
            streams: vec![OutputExpression::new(); stream_count],
        })
    }

    pub fn variant(&self) -> TableVariant {
        self.variant
    }

    pub fn layout(&self) -> &'static dyn TableLayout {
        self.variant.layout()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// The width of one colour-table entry.
    pub fn bits_per_entry(&self) -> u32 {
        self.layout().bits_per_entry(self.stream_count())
    }

    pub fn filters(&self) -> &[FilterSpec] {
        &self.filters
    }

    pub fn filter(&self, slot: usize) -> SteerResult<&FilterSpec> {
        self.filters.get(slot).ok_or(SteerError::BadFilterSlot(slot))
    }

    pub fn filter_mut(&mut self, slot: usize) -> SteerResult<&mut FilterSpec> {
        self.filters.get_mut(slot).ok_or(SteerError::BadFilterSlot(slot))
    }

    pub fn slot_map(&self) -> SlotMap {
        SlotMap::from_filters(&self.filters)
    }

    /// Add a blank (never matching) partial expression.
    pub fn new_partial(&mut self) -> PartialId {
        self.partials.push(PartialExpression::new());
        PartialId(self.partials.len() - 1)
    }

    pub fn partials(&self) -> &[PartialExpression] {
        &self.partials
    }

    pub fn partial(&self, id: PartialId) -> SteerResult<&PartialExpression> {
        self.partials.get(id.0).ok_or(SteerError::PartialNotFound(id.0))
    }

    pub fn partial_mut(
        &mut self,
        id: PartialId,
    ) -> SteerResult<&mut PartialExpression> {
        self.partials.get_mut(id.0).ok_or(SteerError::PartialNotFound(id.0))
    }

    pub fn streams(&self) -> &[OutputExpression] {
        &self.streams
    }

    pub fn stream(&self, stream: usize) -> SteerResult<&OutputExpression> {
        self.streams.get(stream).ok_or(SteerError::BadStream(stream))
    }

    /// Add partial `id` to the condition for `stream`, inverted or not.
    pub fn add_partial_expression(
        &mut self,
        stream: usize,
        id: PartialId,
        invert: bool,
    ) -> SteerResult<()> {
        self.partial(id)?;
        let out = self
            .streams
            .get_mut(stream)
            .ok_or(SteerError::BadStream(stream))?;
        out.add_partial_expression(id, invert);
        Ok(())
    }

    /// Remove every partial from the condition for `stream`.
    pub fn clear_stream(&mut self, stream: usize) -> SteerResult<()> {
        self.streams
            .get_mut(stream)
            .ok_or(SteerError::BadStream(stream))?
            .clear();
        Ok(())
    }

    /// The stream a packet with `key` is steered to, or `None` for a
    /// drop. The key's filter hits are numbered by physical slot.
    ///
    /// Streams are tried in order; the first match wins.
    pub fn steer(&self, slots: &SlotMap, key: &TableKey) -> Option<usize> {
        let key = TableKey { filters: slots.to_virtual(key.filters), ..*key };
        self.streams
            .iter()
            .position(|s| s.is_match_virtual(&self.partials, &key))
    }

    /// Exchange the physical slots carrying virtual slots `a` and `b`.
    pub(crate) fn swap_physical(&mut self, a: usize, b: usize) {
        let pa = self.filters[a].physical_slot();
        let pb = self.filters[b].physical_slot();
        self.filters[a].set_physical_slot(pb);
        self.filters[b].set_physical_slot(pa);
    }

    /// Exchange the rules held by virtual slots `a` and `b`, leaving
    /// their slot identities alone.
    pub(crate) fn exchange_rules(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = (a.min(b), a.max(b));
        let (head, tail) = self.filters.split_at_mut(hi);
        head[lo].exchange_rule(&mut tail[0]);
    }
}
