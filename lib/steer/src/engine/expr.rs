// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Steering expressions.
//!
//! A [`PartialExpression`] is an OR over three-valued terms on filter
//! hits, interface, and HLB outcome. An [`OutputExpression`] decides
//! whether a packet goes to one receive stream: every positive partial
//! must hold and every negated partial must not.
//!
//! Expressions are always written against virtual filter slots.

use super::config::SlotMap;
use super::layout::HlbKey;
use super::layout::TableKey;
use crate::api::FILTER_COUNT;
use crate::api::HLB_COUNT;
use crate::api::HLB_HASH_COUNT;
use crate::api::INTERFACE_COUNT;
use crate::api::SteerError;
use crate::api::SteerResult;
use crate::api::Term;
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

/// A handle on a [`PartialExpression`] owned by a configuration.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
pub struct PartialId(pub(crate) usize);

impl PartialId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for PartialId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PartialExpression {
    filters: [Term; FILTER_COUNT],
    interfaces: [Term; INTERFACE_COUNT],
    hlb: [Term; HLB_COUNT],
    hlb_hash: [Term; HLB_HASH_COUNT],
}

impl PartialExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self, slot: usize) -> SteerResult<Term> {
        self.filters.get(slot).copied().ok_or(SteerError::BadFilterSlot(slot))
    }

    pub fn set_filter(&mut self, slot: usize, term: Term) -> SteerResult<()> {
        let t = self
            .filters
            .get_mut(slot)
            .ok_or(SteerError::BadFilterSlot(slot))?;
        *t = term;
        Ok(())
    }

    pub fn interface(&self, iface: usize) -> SteerResult<Term> {
        self.interfaces
            .get(iface)
            .copied()
            .ok_or(SteerError::BadInterface(iface))
    }

    pub fn set_interface(
        &mut self,
        iface: usize,
        term: Term,
    ) -> SteerResult<()> {
        let t = self
            .interfaces
            .get_mut(iface)
            .ok_or(SteerError::BadInterface(iface))?;
        *t = term;
        Ok(())
    }

    pub fn hlb(&self, bit: usize) -> SteerResult<Term> {
        self.hlb.get(bit).copied().ok_or(SteerError::BadHlb(bit))
    }

    pub fn set_hlb(&mut self, bit: usize, term: Term) -> SteerResult<()> {
        let t = self.hlb.get_mut(bit).ok_or(SteerError::BadHlb(bit))?;
        *t = term;
        Ok(())
    }

    pub fn hlb_hash(&self, bucket: usize) -> SteerResult<Term> {
        self.hlb_hash
            .get(bucket)
            .copied()
            .ok_or(SteerError::BadHlbBucket(bucket))
    }

    pub fn set_hlb_hash(
        &mut self,
        bucket: usize,
        term: Term,
    ) -> SteerResult<()> {
        let t = self
            .hlb_hash
            .get_mut(bucket)
            .ok_or(SteerError::BadHlbBucket(bucket))?;
        *t = term;
        Ok(())
    }

    /// Does every term in every dimension say don't care?
    pub fn is_dont_care(&self) -> bool {
        self.filters
            .iter()
            .chain(&self.interfaces)
            .chain(&self.hlb)
            .chain(&self.hlb_hash)
            .all(|t| *t == Term::DontCare)
    }

    /// Evaluate against a key whose filter bits are virtual slots.
    ///
    /// An expression with nothing but don't-care terms is false.
    pub fn is_match(&self, key: &TableKey) -> bool {
        if self.is_dont_care() {
            return false;
        }

        let filters = self
            .filters
            .iter()
            .enumerate()
            .any(|(i, t)| t.holds(key.filter_hit(i)));
        if filters {
            return true;
        }

        let current = usize::from(key.interface);
        let iface = self
            .interfaces
            .iter()
            .enumerate()
            .any(|(i, t)| t.holds(i == current));
        if iface {
            return true;
        }

        match key.hlb {
            HlbKey::Bits(bits) => self
                .hlb
                .iter()
                .enumerate()
                .any(|(i, t)| t.holds(bits & (1 << i) != 0)),

            HlbKey::Hash { bucket, buckets } => self
                .hlb_hash
                .iter()
                .take(usize::from(buckets))
                .enumerate()
                .any(|(i, t)| t.holds(i == usize::from(bucket))),
        }
    }
}

impl Display for PartialExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dim = |terms: &[Term]| -> String {
            terms.iter().map(|t| t.to_string()).collect()
        };

        write!(
            f,
            "filt={} if={} hlb={} hash={}",
            dim(&self.filters),
            dim(&self.interfaces),
            dim(&self.hlb),
            dim(&self.hlb_hash),
        )
    }
}

/// The steering condition for one receive stream.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OutputExpression {
    positive: Vec<PartialId>,
    negated: Vec<PartialId>,
}

impl OutputExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positive(&self) -> &[PartialId] {
        &self.positive
    }

    pub fn negated(&self) -> &[PartialId] {
        &self.negated
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negated.is_empty()
    }

    /// Require `id` to hold, or with `invert`, to not hold.
    pub fn add_partial_expression(&mut self, id: PartialId, invert: bool) {
        if invert {
            self.negated.push(id);
        } else {
            self.positive.push(id);
        }
    }

    pub fn clear(&mut self) {
        self.positive.clear();
        self.negated.clear();
    }

    /// Evaluate against a key as reported by hardware, with filter hits
    /// numbered by physical slot.
    pub fn is_match(
        &self,
        partials: &[PartialExpression],
        slots: &SlotMap,
        key: &TableKey,
    ) -> bool {
        let key = TableKey { filters: slots.to_virtual(key.filters), ..*key };
        self.is_match_virtual(partials, &key)
    }

    /// Evaluate against a key whose filter hits are already numbered
    /// by virtual slot.
    ///
    /// An empty expression is false.
    pub fn is_match_virtual(
        &self,
        partials: &[PartialExpression],
        key: &TableKey,
    ) -> bool {
        if self.is_empty() {
            return false;
        }

        let eval = |id: &PartialId| {
            partials.get(id.0).is_some_and(|p| p.is_match(key))
        };

        self.positive.iter().all(eval) && !self.negated.iter().any(eval)
    }
}

impl Display for OutputExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "never");
        }

        let terms = self
            .positive
            .iter()
            .map(|id| id.to_string())
            .chain(self.negated.iter().map(|id| format!("!{id}")));
        write!(f, "{}", terms.format(" & "))
    }
}
