// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Colour-table layouts.
//!
//! The colour table is indexed by a packed integer combining the
//! filter-hit bitmask, the interface, and the HLB outcome. How those
//! are packed, and how wide each table entry is, depends on the
//! generation of hardware. Each generation is a [`TableLayout`]; the
//! rest of the engine only ever sees the decoded [`TableKey`].

use crate::api::FILTER_COUNT;
use crate::api::INTERFACE_COUNT;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

const FILTER_BITS: u32 = FILTER_COUNT as u32;
const INTERFACE_BITS: u32 = INTERFACE_COUNT.trailing_zeros();
const FILTER_MASK: usize = (1 << FILTER_BITS) - 1;
const INTERFACE_MASK: usize = (1 << INTERFACE_BITS) - 1;
const HLB_SHIFT: u32 = FILTER_BITS + INTERFACE_BITS;

/// The HLB outcome for a table index.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HlbKey {
    /// Classic hardware: bit 0 is HLB0, bit 1 is HLB1.
    Bits(u8),
    /// Hashed hardware: the bucket the packet hashed to, out of
    /// `buckets`.
    Hash { bucket: u8, buckets: u8 },
}

/// A colour-table index decoded into its named dimensions.
///
/// `filters` is in whichever slot numbering produced it: hardware
/// reports hits by physical slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TableKey {
    pub filters: u8,
    pub interface: u8,
    pub hlb: HlbKey,
}

impl TableKey {
    /// Is the filter at `slot` hit?
    #[inline]
    pub fn filter_hit(&self, slot: usize) -> bool {
        self.filters & (1 << slot) != 0
    }
}

/// How one generation of hardware packs its colour table.
pub trait TableLayout: Send + Sync {
    fn name(&self) -> &'static str;

    /// The number of bits in a table index.
    fn index_bits(&self) -> u32;

    /// The number of HLB hash buckets, or zero for a layout using
    /// discrete HLB bits.
    fn hash_buckets(&self) -> usize;

    /// The width of a table entry when steering to `stream_count`
    /// receive streams.
    ///
    /// The entry's high bit is the drop marker.
    fn bits_per_entry(&self, stream_count: usize) -> u32;

    fn decode_index(&self, index: usize) -> TableKey;

    fn encode_key(&self, key: &TableKey) -> usize;

    /// The number of entries in the table.
    fn entries(&self) -> usize {
        1 << self.index_bits()
    }
}

/// The number of bits needed to name one of `stream_count` streams.
pub fn stream_bits(stream_count: usize) -> u32 {
    if stream_count <= 2 {
        1
    } else {
        usize::BITS - (stream_count - 1).leading_zeros()
    }
}

/// Discrete HLB0/HLB1 bits above the interface.
pub struct Classic;

impl TableLayout for Classic {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn index_bits(&self) -> u32 {
        HLB_SHIFT + 2
    }

    fn hash_buckets(&self) -> usize {
        0
    }

    fn bits_per_entry(&self, stream_count: usize) -> u32 {
        stream_bits(stream_count) + 1
    }

    fn decode_index(&self, index: usize) -> TableKey {
        TableKey {
            filters: (index & FILTER_MASK) as u8,
            interface: ((index >> FILTER_BITS) & INTERFACE_MASK) as u8,
            hlb: HlbKey::Bits(((index >> HLB_SHIFT) & 0x3) as u8),
        }
    }

    fn encode_key(&self, key: &TableKey) -> usize {
        let hlb = match key.hlb {
            HlbKey::Bits(bits) => usize::from(bits & 0x3),
            HlbKey::Hash { .. } => 0,
        };
        usize::from(key.filters)
            | (usize::from(key.interface) & INTERFACE_MASK) << FILTER_BITS
            | hlb << HLB_SHIFT
    }
}

/// An HLB hash bucket above the interface.
pub struct Hashed {
    name: &'static str,
    hash_bits: u32,
}

impl TableLayout for Hashed {
    fn name(&self) -> &'static str {
        self.name
    }

    fn index_bits(&self) -> u32 {
        HLB_SHIFT + self.hash_bits
    }

    fn hash_buckets(&self) -> usize {
        1 << self.hash_bits
    }

    fn bits_per_entry(&self, stream_count: usize) -> u32 {
        (stream_bits(stream_count) + 1).next_power_of_two().max(4)
    }

    fn decode_index(&self, index: usize) -> TableKey {
        let bucket_mask = (1 << self.hash_bits) - 1;
        TableKey {
            filters: (index & FILTER_MASK) as u8,
            interface: ((index >> FILTER_BITS) & INTERFACE_MASK) as u8,
            hlb: HlbKey::Hash {
                bucket: ((index >> HLB_SHIFT) & bucket_mask) as u8,
                buckets: self.hash_buckets() as u8,
            },
        }
    }

    fn encode_key(&self, key: &TableKey) -> usize {
        let bucket_mask = (1 << self.hash_bits) - 1;
        let bucket = match key.hlb {
            HlbKey::Hash { bucket, .. } => usize::from(bucket) & bucket_mask,
            HlbKey::Bits(_) => 0,
        };
        usize::from(key.filters)
            | (usize::from(key.interface) & INTERFACE_MASK) << FILTER_BITS
            | bucket << HLB_SHIFT
    }
}

pub static CLASSIC: Classic = Classic;
pub static HASHED_V1_4: Hashed = Hashed { name: "hashed-v1.4", hash_bits: 2 };
pub static HASHED_V1_8: Hashed = Hashed { name: "hashed-v1.8", hash_bits: 3 };

/// Which layout a card uses, selected once per configuration.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum TableVariant {
    #[default]
    Classic,
    HashedV1_4,
    HashedV1_8,
}

impl TableVariant {
    pub fn layout(self) -> &'static dyn TableLayout {
        match self {
            Self::Classic => &CLASSIC,
            Self::HashedV1_4 => &HASHED_V1_4,
            Self::HashedV1_8 => &HASHED_V1_8,
        }
    }
}

impl Display for TableVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.layout().name())
    }
}
