// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use bitflags::bitflags;
use serde::Deserialize;
use serde::Serialize;

bitflags! {
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
/// The control bits of a TCP header, as found in byte 13 of the
/// header.
pub struct TcpFlags: u8 {
    const FIN = 1 << 0;
    const SYN = 1 << 1;
    const RST = 1 << 2;
    const PSH = 1 << 3;
    const ACK = 1 << 4;
    const URG = 1 << 5;
    const ECE = 1 << 6;
    const CWR = 1 << 7;
}
}
