// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use alloc::string::String;
use core::ffi::c_int;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub const ENOMEM: c_int = 12;
pub const EINVAL: c_int = 22;

/// Errors produced while describing or loading a steering
/// configuration.
///
/// A failing operation leaves the configuration as it was before the
/// call.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum SteerError {
    #[error("filter slot {0} out of range")]
    BadFilterSlot(usize),

    #[error("interface {0} out of range")]
    BadInterface(usize),

    #[error("HLB bit {0} out of range")]
    BadHlb(usize),

    #[error("HLB hash bucket {0} out of range")]
    BadHlbBucket(usize),

    #[error("receive stream {0} out of range")]
    BadStream(usize),

    #[error("invalid receive stream count {0}")]
    BadStreamCount(usize),

    #[error("partial expression {0} not found")]
    PartialNotFound(usize),

    /// The field exists, but not for the filter's current layer
    /// selection or mode.
    #[error("{field} requires {needs}")]
    WrongMode { field: String, needs: String },

    /// Raw value and mask must be the same length and no longer than
    /// the match depth.
    #[error("bad raw filter lengths: value {value}, mask {mask}")]
    RawLength { value: usize, mask: usize },

    #[error("invalid {field}: {value}")]
    BadValue { field: String, value: u64 },

    /// The swap slot cannot be the target of a swap.
    #[error("slot {0} cannot be swapped")]
    SwapTarget(usize),

    #[error("failed to allocate {bytes} bytes")]
    NoMemory { bytes: usize },
}

impl SteerError {
    /// Convert to an errno value.
    pub fn to_errno(&self) -> c_int {
        match self {
            Self::NoMemory { .. } => ENOMEM,
            Self::BadFilterSlot(_) => EINVAL,
            Self::BadInterface(_) => EINVAL,
            Self::BadHlb(_) => EINVAL,
            Self::BadHlbBucket(_) => EINVAL,
            Self::BadStream(_) => EINVAL,
            Self::BadStreamCount(_) => EINVAL,
            Self::PartialNotFound(_) => EINVAL,
            Self::WrongMode { .. } => EINVAL,
            Self::RawLength { .. } => EINVAL,
            Self::BadValue { .. } => EINVAL,
            Self::SwapTarget(_) => EINVAL,
        }
    }

    /// Shorthand for building a [`SteerError::WrongMode`].
    pub fn wrong_mode(field: &str, needs: &str) -> Self {
        Self::WrongMode { field: field.into(), needs: needs.into() }
    }
}

pub type SteerResult<T> = core::result::Result<T, SteerError>;

#[cfg(test)]
mod test {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn errno_mapping() {
        assert_eq!(SteerError::NoMemory { bytes: 8 }.to_errno(), ENOMEM);
        assert_eq!(SteerError::BadFilterSlot(9).to_errno(), EINVAL);
        assert_eq!(
            SteerError::wrong_mode("tcp.flags", "layer 4 TCP").to_string(),
            "tcp.flags requires layer 4 TCP"
        );
    }
}
