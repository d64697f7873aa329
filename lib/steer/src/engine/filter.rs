// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Filters described in protocol terms.
//!
//! A [`FilterSpec`] pairs a [`FilterRule`], the protocol-level
//! description of what a hardware filter compares, with the identity of
//! the filter: the stable virtual slot callers address it by, and the
//! physical slot currently carrying it on the card.

use super::compile;
use crate::api::ELEMENT_BYTES;
use crate::api::Ipv4Addr;
use crate::api::LAST_FILTER_ELEMENT;
use crate::api::MATCH_DEPTH;
use crate::api::MacAddr;
use crate::api::Protocol;
use crate::api::SteerError;
use crate::api::SteerResult;
use crate::api::TcpFlags;
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

/// The largest VLAN identifier.
pub const VLAN_ID_MAX: u16 = 0x0FFF;

/// The IPv4 header length field occupies the low nibble of its byte.
pub const IHL_MASK: u8 = 0x0F;

/// A type whose bits may be selectively compared.
pub trait MaskBits: Copy + Default + Eq {
    /// A mask comparing every bit.
    const ALL: Self;

    /// Clear every bit of `self` which is not set in `mask`.
    fn and(self, mask: Self) -> Self;
}

macro_rules! mask_bits_int {
    ($($t:ty),*) => {
        $(
            impl MaskBits for $t {
                const ALL: Self = <$t>::MAX;

                fn and(self, mask: Self) -> Self {
                    self & mask
                }
            }
        )*
    };
}

mask_bits_int!(u8, u16, u32);

impl MaskBits for MacAddr {
    const ALL: Self = MacAddr::BROADCAST;

    fn and(self, mask: Self) -> Self {
        self.masked(mask)
    }
}

impl MaskBits for Ipv4Addr {
    const ALL: Self = Ipv4Addr::LOCAL_BCAST;

    fn and(self, mask: Self) -> Self {
        self.masked(mask)
    }
}

impl MaskBits for TcpFlags {
    const ALL: Self = TcpFlags::all();

    fn and(self, mask: Self) -> Self {
        self & mask
    }
}

/// A value along with the mask of its bits which take part in a
/// compare.
///
/// The value never carries a bit its mask does not claim: both
/// constructors clear it.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct Masked<T> {
    value: T,
    mask: T,
}

impl<T: MaskBits> Masked<T> {
    pub fn new(value: T, mask: T) -> Self {
        Self { value: value.and(mask), mask }
    }

    /// Compare every bit of `value`.
    pub fn exact(value: T) -> Self {
        Self::new(value, T::ALL)
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn mask(&self) -> T {
        self.mask
    }

    /// Does this field take no part in the compare?
    pub fn is_dont_care(&self) -> bool {
        self.mask == T::default()
    }
}

impl<T: Display + MaskBits> Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.mask == T::ALL {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{}/{}", self.value, self.mask)
        }
    }
}

/// The fields of an Ethernet header.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct EtherFields {
    pub dst: Masked<MacAddr>,
    pub src: Masked<MacAddr>,
    pub ether_type: Masked<u16>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum Layer2 {
    Ethernet(EtherFields),
    EthernetVlan { ether: EtherFields, vlan_id: Masked<u16> },
    /// Packet over SONET, described by its 32-bit HDLC header.
    Pos(Masked<u32>),
}

impl Default for Layer2 {
    fn default() -> Self {
        Self::Ethernet(EtherFields::default())
    }
}

impl Layer2 {
    /// The byte offset of the layer-3 header within a capture record.
    pub fn l3_offset(&self) -> usize {
        match self {
            Self::Ethernet(_) => 16,
            Self::EthernetVlan { .. } => 20,
            Self::Pos(_) => 4,
        }
    }

    pub fn kind(&self) -> Layer2Kind {
        match self {
            Self::Ethernet(_) => Layer2Kind::Ethernet,
            Self::EthernetVlan { .. } => Layer2Kind::EthernetVlan,
            Self::Pos(_) => Layer2Kind::Pos,
        }
    }

    fn ether_mut(&mut self) -> Option<&mut EtherFields> {
        match self {
            Self::Ethernet(ether) | Self::EthernetVlan { ether, .. } => {
                Some(ether)
            }
            Self::Pos(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Layer2Kind {
    Ethernet,
    EthernetVlan,
    Pos,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct Ipv4Fields {
    pub protocol: Masked<u8>,
    pub src: Masked<Ipv4Addr>,
    pub dst: Masked<Ipv4Addr>,
    /// The header length, in 32-bit words.
    pub ihl: Masked<u8>,
    /// Only match unfragmented packets (or the first fragment).
    pub reject_fragments: bool,
}

impl Ipv4Fields {
    /// The offset of the layer-4 header from the start of the IPv4
    /// header.
    ///
    /// The header length is only trusted when it is compared in full;
    /// otherwise the header is assumed to carry no options.
    pub fn l4_offset(&self) -> usize {
        if self.ihl.mask() == IHL_MASK {
            usize::from(self.ihl.value()) * 4
        } else {
            20
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub enum Layer3 {
    #[default]
    None,
    Ipv4(Ipv4Fields),
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Layer3Kind {
    None,
    Ipv4,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct PortFields {
    pub src: Masked<u16>,
    pub dst: Masked<u16>,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct TcpFields {
    pub ports: PortFields,
    pub flags: Masked<TcpFlags>,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct IcmpFields {
    pub icmp_type: Masked<u8>,
    pub code: Masked<u8>,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub enum Layer4 {
    #[default]
    None,
    Tcp(TcpFields),
    Udp(PortFields),
    Icmp(IcmpFields),
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Layer4Kind {
    None,
    Tcp,
    Udp,
    Icmp,
}

/// A filter given directly as compare bytes.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct RawFilter {
    value: Vec<u8>,
    mask: Vec<u8>,
}

impl RawFilter {
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn mask(&self) -> &[u8] {
        &self.mask
    }
}

/// What a filter compares, in protocol terms.
///
/// Every setter validates its input against the current layer
/// selection and leaves the rule untouched on error. While a raw
/// filter is set, all structured setters are refused.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct FilterRule {
    layer2: Layer2,
    layer3: Layer3,
    layer4: Layer4,
    raw: Option<RawFilter>,
    termination: u8,
}

impl Default for FilterRule {
    fn default() -> Self {
        Self {
            layer2: Layer2::default(),
            layer3: Layer3::default(),
            layer4: Layer4::default(),
            raw: None,
            termination: LAST_FILTER_ELEMENT,
        }
    }
}

impl FilterRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer2(&self) -> &Layer2 {
        &self.layer2
    }

    pub fn layer3(&self) -> &Layer3 {
        &self.layer3
    }

    pub fn layer4(&self) -> &Layer4 {
        &self.layer4
    }

    /// The raw compare bytes, if this rule is in raw mode.
    pub fn raw_filter(&self) -> Option<(&[u8], &[u8])> {
        self.raw.as_ref().map(|r| (r.value(), r.mask()))
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    /// The last filter element which takes part in the compare.
    pub fn termination(&self) -> u8 {
        self.termination
    }

    /// Set the early-termination element.
    ///
    /// Values beyond the last element are clamped to it.
    pub fn set_termination(&mut self, depth: u8) {
        self.termination = depth.min(LAST_FILTER_ELEMENT);
    }

    /// The smallest early-termination element which still covers every
    /// byte this rule compares on.
    pub fn tight_termination(&self) -> u8 {
        let compiled = compile::compile(self);
        match compiled.mask.iter().rposition(|m| *m != 0) {
            Some(last) => (last / ELEMENT_BYTES) as u8,
            None => 0,
        }
    }

    /// Set the early-termination element to [`Self::tight_termination`].
    pub fn set_auto_termination(&mut self) {
        self.termination = self.tight_termination();
    }

    /// Compare `value` against the start of the record, bit for bit
    /// where `mask` is set, in place of any structured fields.
    ///
    /// Both slices must have the same length, no more than
    /// [`MATCH_DEPTH`]. The bytes are kept verbatim and read back
    /// unchanged by [`Self::raw_filter`].
    pub fn set_raw_filter(
        &mut self,
        value: &[u8],
        mask: &[u8],
    ) -> SteerResult<()> {
        if value.len() != mask.len() || value.len() > MATCH_DEPTH {
            return Err(SteerError::RawLength {
                value: value.len(),
                mask: mask.len(),
            });
        }

        self.raw = Some(RawFilter { value: value.to_vec(), mask: mask.to_vec() });
        Ok(())
    }

    /// Leave raw mode, going back to the structured fields held before
    /// it was entered.
    pub fn clear_raw_mode(&mut self) {
        self.raw = None;
    }

    fn ensure_structured(&self, field: &str) -> SteerResult<()> {
        if self.is_raw() {
            return Err(SteerError::wrong_mode(field, "structured mode"));
        }
        Ok(())
    }

    /// Select the layer-2 encapsulation.
    ///
    /// Moving between plain and VLAN-tagged Ethernet keeps the Ethernet
    /// fields; any other change starts from a blank header.
    pub fn set_layer2(&mut self, kind: Layer2Kind) -> SteerResult<()> {
        self.ensure_structured("layer2")?;

        if self.layer2.kind() == kind {
            return Ok(());
        }

        let ether = self.layer2.ether_mut().copied().unwrap_or_default();
        self.layer2 = match kind {
            Layer2Kind::Ethernet => Layer2::Ethernet(ether),
            Layer2Kind::EthernetVlan => {
                Layer2::EthernetVlan { ether, vlan_id: Masked::default() }
            }
            Layer2Kind::Pos => Layer2::Pos(Masked::default()),
        };
        Ok(())
    }

    /// Select the layer-3 protocol. Removing IPv4 also removes any
    /// layer-4 selection.
    pub fn set_layer3(&mut self, kind: Layer3Kind) -> SteerResult<()> {
        self.ensure_structured("layer3")?;

        match (kind, &self.layer3) {
            (Layer3Kind::Ipv4, Layer3::Ipv4(_)) => {}
            (Layer3Kind::Ipv4, Layer3::None) => {
                self.layer3 = Layer3::Ipv4(Ipv4Fields::default());
            }
            (Layer3Kind::None, _) => {
                self.layer3 = Layer3::None;
                self.layer4 = Layer4::None;
            }
        }
        Ok(())
    }

    /// Select the layer-4 protocol.
    ///
    /// Choosing TCP, UDP, or ICMP also compares the IPv4 protocol
    /// number in full.
    pub fn set_layer4(&mut self, kind: Layer4Kind) -> SteerResult<()> {
        self.ensure_structured("layer4")?;
        let ip = match &mut self.layer3 {
            Layer3::Ipv4(ip) => ip,
            Layer3::None => {
                return Err(SteerError::wrong_mode("layer4", "layer 3 IPv4"));
            }
        };

        let (layer4, proto) = match kind {
            Layer4Kind::None => (Layer4::None, None),
            Layer4Kind::Tcp => {
                (Layer4::Tcp(TcpFields::default()), Some(Protocol::TCP))
            }
            Layer4Kind::Udp => {
                (Layer4::Udp(PortFields::default()), Some(Protocol::UDP))
            }
            Layer4Kind::Icmp => {
                (Layer4::Icmp(IcmpFields::default()), Some(Protocol::ICMP))
            }
        };

        if let Some(proto) = proto {
            ip.protocol = Masked::exact(u8::from(proto));
        }
        self.layer4 = layer4;
        Ok(())
    }

    fn ether_mut(&mut self, field: &str) -> SteerResult<&mut EtherFields> {
        self.ensure_structured(field)?;
        self.layer2
            .ether_mut()
            .ok_or_else(|| SteerError::wrong_mode(field, "layer 2 Ethernet"))
    }

    pub fn set_ether_dst(
        &mut self,
        addr: MacAddr,
        mask: MacAddr,
    ) -> SteerResult<()> {
        self.ether_mut("ether.dst")?.dst = Masked::new(addr, mask);
        Ok(())
    }

    pub fn set_ether_src(
        &mut self,
        addr: MacAddr,
        mask: MacAddr,
    ) -> SteerResult<()> {
        self.ether_mut("ether.src")?.src = Masked::new(addr, mask);
        Ok(())
    }

    pub fn set_ether_type(&mut self, et: u16, mask: u16) -> SteerResult<()> {
        self.ether_mut("ether.type")?.ether_type = Masked::new(et, mask);
        Ok(())
    }

    /// Compare the VLAN identifier. Only the low 12 bits of `mask` are
    /// honored.
    pub fn set_vlan_id(&mut self, id: u16, mask: u16) -> SteerResult<()> {
        self.ensure_structured("vlan.id")?;
        if id > VLAN_ID_MAX {
            return Err(SteerError::BadValue {
                field: "vlan.id".to_string(),
                value: u64::from(id),
            });
        }

        match &mut self.layer2 {
            Layer2::EthernetVlan { vlan_id, .. } => {
                *vlan_id = Masked::new(id, mask & VLAN_ID_MAX);
                Ok(())
            }
            _ => Err(SteerError::wrong_mode("vlan.id", "layer 2 Ethernet VLAN")),
        }
    }

    pub fn set_hdlc_header(&mut self, hdr: u32, mask: u32) -> SteerResult<()> {
        self.ensure_structured("hdlc")?;
        match &mut self.layer2 {
            Layer2::Pos(hdlc) => {
                *hdlc = Masked::new(hdr, mask);
                Ok(())
            }
            _ => Err(SteerError::wrong_mode("hdlc", "layer 2 PoS")),
        }
    }

    fn ipv4_mut(&mut self, field: &str) -> SteerResult<&mut Ipv4Fields> {
        self.ensure_structured(field)?;
        match &mut self.layer3 {
            Layer3::Ipv4(ip) => Ok(ip),
            Layer3::None => Err(SteerError::wrong_mode(field, "layer 3 IPv4")),
        }
    }

    /// Compare the IPv4 protocol number under `mask`.
    pub fn set_ip_protocol(
        &mut self,
        proto: Protocol,
        mask: u8,
    ) -> SteerResult<()> {
        self.ipv4_mut("ip.proto")?.protocol =
            Masked::new(u8::from(proto), mask);
        Ok(())
    }

    pub fn set_ip_src(
        &mut self,
        addr: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> SteerResult<()> {
        self.ipv4_mut("ip.src")?.src = Masked::new(addr, mask);
        Ok(())
    }

    pub fn set_ip_dst(
        &mut self,
        addr: Ipv4Addr,
        mask: Ipv4Addr,
    ) -> SteerResult<()> {
        self.ipv4_mut("ip.dst")?.dst = Masked::new(addr, mask);
        Ok(())
    }

    /// Compare the IPv4 header length, in 32-bit words.
    ///
    /// When compared in full the header length also positions the
    /// layer-4 fields.
    pub fn set_ihl(&mut self, ihl: u8, mask: u8) -> SteerResult<()> {
        let mask = mask & IHL_MASK;
        if mask != 0 && !(5..=15).contains(&ihl) {
            return Err(SteerError::BadValue {
                field: "ip.ihl".to_string(),
                value: u64::from(ihl),
            });
        }
        self.ipv4_mut("ip.ihl")?.ihl = Masked::new(ihl, mask);
        Ok(())
    }

    pub fn set_reject_fragments(&mut self, reject: bool) -> SteerResult<()> {
        self.ipv4_mut("ip.frag")?.reject_fragments = reject;
        Ok(())
    }

    fn ports_mut(&mut self, field: &str) -> SteerResult<&mut PortFields> {
        self.ensure_structured(field)?;
        match &mut self.layer4 {
            Layer4::Tcp(tcp) => Ok(&mut tcp.ports),
            Layer4::Udp(ports) => Ok(ports),
            _ => Err(SteerError::wrong_mode(field, "layer 4 TCP or UDP")),
        }
    }

    pub fn set_src_port(&mut self, port: u16, mask: u16) -> SteerResult<()> {
        self.ports_mut("ulp.src")?.src = Masked::new(port, mask);
        Ok(())
    }

    pub fn set_dst_port(&mut self, port: u16, mask: u16) -> SteerResult<()> {
        self.ports_mut("ulp.dst")?.dst = Masked::new(port, mask);
        Ok(())
    }

    pub fn set_tcp_flags(
        &mut self,
        flags: TcpFlags,
        mask: TcpFlags,
    ) -> SteerResult<()> {
        self.ensure_structured("tcp.flags")?;
        match &mut self.layer4 {
            Layer4::Tcp(tcp) => {
                tcp.flags = Masked::new(flags, mask);
                Ok(())
            }
            _ => Err(SteerError::wrong_mode("tcp.flags", "layer 4 TCP")),
        }
    }

    fn icmp_mut(&mut self, field: &str) -> SteerResult<&mut IcmpFields> {
        self.ensure_structured(field)?;
        match &mut self.layer4 {
            Layer4::Icmp(icmp) => Ok(icmp),
            _ => Err(SteerError::wrong_mode(field, "layer 4 ICMP")),
        }
    }

    pub fn set_icmp_type(&mut self, ty: u8, mask: u8) -> SteerResult<()> {
        self.icmp_mut("icmp.type")?.icmp_type = Masked::new(ty, mask);
        Ok(())
    }

    pub fn set_icmp_code(&mut self, code: u8, mask: u8) -> SteerResult<()> {
        self.icmp_mut("icmp.code")?.code = Masked::new(code, mask);
        Ok(())
    }
}

impl Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(raw) = &self.raw {
            return write!(f, "raw[{}]", raw.value.len());
        }

        let mut parts: Vec<String> = vec![];

        match &self.layer2 {
            Layer2::Ethernet(ether) | Layer2::EthernetVlan { ether, .. } => {
                if !ether.dst.is_dont_care() {
                    parts.push(format!("ether.dst={}", ether.dst));
                }
                if !ether.src.is_dont_care() {
                    parts.push(format!("ether.src={}", ether.src));
                }
                if !ether.ether_type.is_dont_care() {
                    parts.push(format!(
                        "ether.type=0x{:04X}",
                        ether.ether_type.value()
                    ));
                }
                if let Layer2::EthernetVlan { vlan_id, .. } = &self.layer2 {
                    parts.push(format!("vlan={vlan_id}"));
                }
            }
            Layer2::Pos(hdlc) => {
                parts.push(format!("hdlc=0x{:08X}", hdlc.value()))
            }
        }

        if let Layer3::Ipv4(ip) = &self.layer3 {
            if ip.protocol.mask() == u8::MAX {
                let proto = Protocol::from(ip.protocol.value());
                parts.push(format!("ip.proto={proto}"));
            } else if !ip.protocol.is_dont_care() {
                parts.push(format!("ip.proto={}", ip.protocol));
            }
            if !ip.src.is_dont_care() {
                parts.push(format!("ip.src={}", ip.src));
            }
            if !ip.dst.is_dont_care() {
                parts.push(format!("ip.dst={}", ip.dst));
            }
            if !ip.ihl.is_dont_care() {
                parts.push(format!("ip.ihl={}", ip.ihl));
            }
            if ip.reject_fragments {
                parts.push("ip.nofrag".to_string());
            }
        }

        match &self.layer4 {
            Layer4::None => {}
            Layer4::Tcp(TcpFields { ports, .. }) | Layer4::Udp(ports) => {
                if !ports.src.is_dont_care() {
                    parts.push(format!("ulp.src={}", ports.src));
                }
                if !ports.dst.is_dont_care() {
                    parts.push(format!("ulp.dst={}", ports.dst));
                }
                if let Layer4::Tcp(tcp) = &self.layer4 {
                    if !tcp.flags.is_dont_care() {
                        parts.push(format!(
                            "tcp.flags=0x{:02X}/0x{:02X}",
                            tcp.flags.value().bits(),
                            tcp.flags.mask().bits()
                        ));
                    }
                }
            }
            Layer4::Icmp(icmp) => {
                if !icmp.icmp_type.is_dont_care() {
                    parts.push(format!("icmp.type={}", icmp.icmp_type));
                }
                if !icmp.code.is_dont_care() {
                    parts.push(format!("icmp.code={}", icmp.code));
                }
            }
        }

        if parts.is_empty() {
            write!(f, "any")
        } else {
            write!(f, "{}", parts.iter().join(" "))
        }
    }
}

/// A filter: its rule plus the slots identifying it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FilterSpec {
    virtual_slot: u8,
    physical_slot: u8,
    enabled: bool,
    rule: FilterRule,
}

impl FilterSpec {
    /// A disabled, match-anything filter whose virtual and physical
    /// slots coincide.
    pub fn new(slot: u8) -> Self {
        Self {
            virtual_slot: slot,
            physical_slot: slot,
            enabled: false,
            rule: FilterRule::default(),
        }
    }

    pub fn virtual_slot(&self) -> u8 {
        self.virtual_slot
    }

    pub fn physical_slot(&self) -> u8 {
        self.physical_slot
    }

    pub(crate) fn set_physical_slot(&mut self, slot: u8) {
        self.physical_slot = slot;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn rule(&self) -> &FilterRule {
        &self.rule
    }

    pub fn rule_mut(&mut self) -> &mut FilterRule {
        &mut self.rule
    }

    /// Trade rules (and enable intent) with `other`, leaving both
    /// filters' slot identities in place.
    pub(crate) fn exchange_rule(&mut self, other: &mut FilterSpec) {
        core::mem::swap(&mut self.rule, &mut other.rule);
        core::mem::swap(&mut self.enabled, &mut other.enabled);
    }
}

impl Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "filter {} (hw {}) {}: {}",
            self.virtual_slot,
            self.physical_slot,
            if self.enabled { "on" } else { "off" },
            self.rule
        )
    }
}
