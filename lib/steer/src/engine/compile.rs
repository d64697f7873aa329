// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Compile a [`FilterRule`] into the value/mask bytes loaded into a
//! hardware filter.

use super::filter::EtherFields;
use super::filter::FilterRule;
use super::filter::Ipv4Fields;
use super::filter::Layer2;
use super::filter::Layer3;
use super::filter::Layer4;
use super::filter::PortFields;
use crate::api::ETHER_TYPE_VLAN;
use crate::api::MATCH_DEPTH;

// Offsets within a layer-2 capture record.
const ETHER_DST: usize = 2;
const ETHER_SRC: usize = 8;
const ETHER_TYPE: usize = 14;
const VLAN_TCI: usize = 16;
const VLAN_INNER_TYPE: usize = 18;

// Offsets within the IPv4 header.
const IP_VER_IHL: usize = 0;
const IP_FRAG: usize = 6;
const IP_PROTO: usize = 9;
const IP_SRC: usize = 12;
const IP_DST: usize = 16;

// Offsets within the layer-4 header.
const ULP_SRC_PORT: usize = 0;
const ULP_DST_PORT: usize = 2;
const TCP_FLAGS: usize = 13;
const ICMP_TYPE: usize = 0;
const ICMP_CODE: usize = 1;

/// The bytes loaded into one hardware filter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CompiledFilter {
    pub value: [u8; MATCH_DEPTH],
    pub mask: [u8; MATCH_DEPTH],
    /// The last element taking part in the compare.
    pub termination: u8,
}

impl CompiledFilter {
    fn empty(termination: u8) -> Self {
        Self {
            value: [0; MATCH_DEPTH],
            mask: [0; MATCH_DEPTH],
            termination,
        }
    }

    /// Merge `value` under `mask` into the bytes starting at `off`.
    ///
    /// Bits outside `mask` keep whatever an earlier field put there.
    fn put(&mut self, off: usize, value: &[u8], mask: &[u8]) {
        let end = off + value.len();
        let vals = &mut self.value[off..end];
        let masks = &mut self.mask[off..end];
        for (i, (v, m)) in value.iter().zip(mask).enumerate() {
            vals[i] = (vals[i] & !m) | (v & m);
            masks[i] |= m;
        }
    }

    fn put_u8(&mut self, off: usize, value: u8, mask: u8) {
        self.put(off, &[value], &[mask]);
    }

    fn put_u16(&mut self, off: usize, value: u16, mask: u16) {
        self.put(off, &value.to_be_bytes(), &mask.to_be_bytes());
    }

    fn put_u32(&mut self, off: usize, value: u32, mask: u32) {
        self.put(off, &value.to_be_bytes(), &mask.to_be_bytes());
    }

    /// A compare bit is never set where its mask bit is clear.
    fn apply_mask(&mut self) {
        for (v, m) in self.value.iter_mut().zip(self.mask) {
            *v &= m;
        }
    }
}

/// Compile `rule` into its hardware value/mask bytes.
///
/// The arrays always span the full match depth; early termination
/// travels alongside them rather than truncating them. Raw bytes past
/// the match depth are never loaded.
pub fn compile(rule: &FilterRule) -> CompiledFilter {
    let mut out = CompiledFilter::empty(rule.termination());

    if let Some((value, mask)) = rule.raw_filter() {
        let n = value.len().min(mask.len()).min(MATCH_DEPTH);
        out.value[..n].copy_from_slice(&value[..n]);
        out.mask[..n].copy_from_slice(&mask[..n]);
        out.apply_mask();
        return out;
    }

    let l2 = rule.layer2();
    match l2 {
        Layer2::Ethernet(ether) => {
            put_ether(&mut out, ether);
        }

        Layer2::EthernetVlan { ether, vlan_id } => {
            out.put(ETHER_DST, &ether.dst.value(), &ether.dst.mask());
            out.put(ETHER_SRC, &ether.src.value(), &ether.src.mask());
            out.put_u16(ETHER_TYPE, ETHER_TYPE_VLAN, u16::MAX);
            out.put_u16(VLAN_TCI, vlan_id.value(), vlan_id.mask());
            out.put_u16(
                VLAN_INNER_TYPE,
                ether.ether_type.value(),
                ether.ether_type.mask(),
            );
        }

        Layer2::Pos(hdlc) => {
            out.put_u32(0, hdlc.value(), hdlc.mask());
        }
    }

    if let Layer3::Ipv4(ip) = rule.layer3() {
        put_ipv4(&mut out, l2.l3_offset(), ip, rule.layer4());
    }

    out.apply_mask();
    out
}

fn put_ether(out: &mut CompiledFilter, ether: &EtherFields) {
    out.put(ETHER_DST, &ether.dst.value(), &ether.dst.mask());
    out.put(ETHER_SRC, &ether.src.value(), &ether.src.mask());
    out.put_u16(ETHER_TYPE, ether.ether_type.value(), ether.ether_type.mask());
}

fn put_ipv4(
    out: &mut CompiledFilter,
    l3: usize,
    ip: &Ipv4Fields,
    layer4: &Layer4,
) {
    out.put_u8(l3 + IP_VER_IHL, ip.ihl.value(), ip.ihl.mask());
    out.put(l3 + IP_SRC, &ip.src.value(), &ip.src.mask());
    out.put(l3 + IP_DST, &ip.dst.value(), &ip.dst.mask());

    if ip.reject_fragments {
        // MF and the fragment offset must be zero; the reserved and DF
        // bits are left alone.
        out.put_u8(l3 + IP_FRAG, 0, 0x3F);
        out.put_u8(l3 + IP_FRAG + 1, 0, 0xFF);
    }

    out.put_u8(l3 + IP_PROTO, ip.protocol.value(), ip.protocol.mask());

    let l4 = l3 + ip.l4_offset();
    match layer4 {
        Layer4::None => {}

        Layer4::Tcp(tcp) => {
            put_ports(out, l4, &tcp.ports);
            out.put_u8(
                l4 + TCP_FLAGS,
                tcp.flags.value().bits(),
                tcp.flags.mask().bits(),
            );
        }

        Layer4::Udp(ports) => put_ports(out, l4, ports),

        Layer4::Icmp(icmp) => {
            out.put_u8(
                l4 + ICMP_TYPE,
                icmp.icmp_type.value(),
                icmp.icmp_type.mask(),
            );
            out.put_u8(l4 + ICMP_CODE, icmp.code.value(), icmp.code.mask());
        }
    }
}

fn put_ports(out: &mut CompiledFilter, l4: usize, ports: &PortFields) {
    out.put_u16(l4 + ULP_SRC_PORT, ports.src.value(), ports.src.mask());
    out.put_u16(l4 + ULP_DST_PORT, ports.dst.value(), ports.dst.mask());
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::ETHER_TYPE_IPV4;
    use crate::api::Ipv4Addr;
    use crate::api::LAST_FILTER_ELEMENT;
    use crate::api::MacAddr;
    use crate::api::Protocol;
    use crate::api::TcpFlags;
    use crate::engine::filter::Layer2Kind;
    use crate::engine::filter::Layer3Kind;
    use crate::engine::filter::Layer4Kind;
    use crate::engine::filter::VLAN_ID_MAX;
    use alloc::vec::Vec;
    use rand::Rng;

    fn assert_mask_consistent(c: &CompiledFilter) {
        for (i, (v, m)) in c.value.iter().zip(c.mask).enumerate() {
            assert_eq!(v & !m, 0, "byte {i}: value {v:#04x} mask {m:#04x}");
        }
    }

    #[test]
    fn ethernet_fields() {
        let mut rule = FilterRule::new();
        let dst: MacAddr = "01:00:5e:00:00:fb".parse().unwrap();
        rule.set_ether_dst(dst, MacAddr::BROADCAST).unwrap();
        rule.set_ether_type(ETHER_TYPE_IPV4, 0xFFFF).unwrap();

        let c = compile(&rule);
        assert_eq!(&c.value[2..8], &dst.bytes());
        assert_eq!(&c.mask[2..8], &[0xFF; 6]);
        assert_eq!(&c.mask[8..14], &[0; 6]);
        assert_eq!(&c.value[14..16], &[0x08, 0x00]);
        assert_eq!(c.termination, LAST_FILTER_ELEMENT);
        assert!(c.mask[16..].iter().all(|m| *m == 0));
    }

    #[test]
    fn vlan_shifts_layer3() {
        let mut rule = FilterRule::new();
        rule.set_layer2(Layer2Kind::EthernetVlan).unwrap();
        rule.set_vlan_id(100, 0xFFF).unwrap();
        rule.set_ether_type(ETHER_TYPE_IPV4, 0xFFFF).unwrap();
        rule.set_layer3(Layer3Kind::Ipv4).unwrap();
        rule.set_layer4(Layer4Kind::Udp).unwrap();

        let c = compile(&rule);
        assert_eq!(&c.value[14..16], &[0x81, 0x00]);
        assert_eq!(&c.mask[14..16], &[0xFF, 0xFF]);
        assert_eq!(&c.value[16..18], &[0x00, 100]);
        assert_eq!(&c.mask[16..18], &[0x0F, 0xFF]);
        assert_eq!(&c.value[18..20], &[0x08, 0x00]);
        // The protocol byte lands at 20 + 9.
        assert_eq!(c.value[29], 17);
        assert_eq!(c.mask[29], 0xFF);
    }

    #[test]
    fn pos_header() {
        let mut rule = FilterRule::new();
        rule.set_layer2(Layer2Kind::Pos).unwrap();
        rule.set_hdlc_header(0xFF03_0021, 0xFFFF_FFFF).unwrap();
        rule.set_layer3(Layer3Kind::Ipv4).unwrap();
        rule.set_ip_dst(
            "192.168.1.1".parse().unwrap(),
            "255.255.255.255".parse().unwrap(),
        )
        .unwrap();

        let c = compile(&rule);
        assert_eq!(&c.value[0..4], &[0xFF, 0x03, 0x00, 0x21]);
        assert_eq!(&c.value[20..24], &[192, 168, 1, 1]);
        assert_eq!(&c.mask[20..24], &[0xFF; 4]);
    }

    #[test]
    fn tcp_ports_and_flags() {
        let mut rule = FilterRule::new();
        rule.set_layer3(Layer3Kind::Ipv4).unwrap();
        rule.set_layer4(Layer4Kind::Tcp).unwrap();
        rule.set_src_port(0x1234, 0xFFFF).unwrap();
        rule.set_dst_port(80, 0xFFFF).unwrap();
        rule.set_tcp_flags(TcpFlags::SYN, TcpFlags::SYN | TcpFlags::ACK)
            .unwrap();

        let c = compile(&rule);
        // Layer 4 starts at 16 + 20.
        assert_eq!(&c.value[36..40], &[0x12, 0x34, 0x00, 80]);
        assert_eq!(c.value[49], 0x02);
        assert_eq!(c.mask[49], 0x12);
        assert_eq!(c.value[25], 6);
    }

    #[test]
    fn full_ihl_moves_layer4() {
        let mut rule = FilterRule::new();
        rule.set_layer3(Layer3Kind::Ipv4).unwrap();
        rule.set_ihl(6, 0x0F).unwrap();
        rule.set_layer4(Layer4Kind::Icmp).unwrap();
        rule.set_icmp_type(8, 0xFF).unwrap();
        rule.set_icmp_code(0, 0xFF).unwrap();

        let c = compile(&rule);
        assert_eq!(c.value[16], 6);
        assert_eq!(c.mask[16], 0x0F);
        // 16 + 6 * 4
        assert_eq!(c.value[40], 8);
        assert_eq!(c.mask[40], 0xFF);
        assert_eq!(c.mask[41], 0xFF);

        // A partially compared header length does not position layer 4.
        rule.set_ihl(6, 0x0E).unwrap();
        let c = compile(&rule);
        assert_eq!(c.value[36], 8);
    }

    #[test]
    fn fragment_reject_pattern() {
        let mut rule = FilterRule::new();
        rule.set_layer3(Layer3Kind::Ipv4).unwrap();
        rule.set_reject_fragments(true).unwrap();

        let c = compile(&rule);
        assert_eq!(c.value[22], 0);
        assert_eq!(c.mask[22], 0x3F);
        assert_eq!(c.value[23], 0);
        assert_eq!(c.mask[23], 0xFF);
    }

    #[test]
    fn raw_filter_padded_and_masked() {
        let mut rule = FilterRule::new();
        rule.set_raw_filter(&[0xFF, 0xAA, 0x01], &[0x0F, 0xFF, 0x00])
            .unwrap();
        rule.set_termination(0);

        let c = compile(&rule);
        assert_eq!(&c.value[..3], &[0x0F, 0xAA, 0x00]);
        assert_eq!(&c.mask[..3], &[0x0F, 0xFF, 0x00]);
        assert!(c.value[3..].iter().all(|v| *v == 0));
        assert_eq!(c.termination, 0);
        assert_mask_consistent(&c);

        // The stored raw bytes themselves are untouched.
        assert_eq!(rule.raw_filter().unwrap().0, &[0xFF, 0xAA, 0x01]);
    }

    #[test]
    fn every_setter_keeps_mask_consistency() {
        let mut rule = FilterRule::new();
        rule.set_layer2(Layer2Kind::EthernetVlan).unwrap();
        rule.set_ether_dst(
            "ff:ff:ff:ff:ff:ff".parse().unwrap(),
            "0f:f0:0f:f0:0f:f0".parse().unwrap(),
        )
        .unwrap();
        rule.set_ether_src(
            "12:34:56:78:9a:bc".parse().unwrap(),
            "ff:00:ff:00:ff:00".parse().unwrap(),
        )
        .unwrap();
        rule.set_ether_type(0xFFFF, 0x00FF).unwrap();
        rule.set_vlan_id(0xFFF, 0x0F0).unwrap();
        rule.set_layer3(Layer3Kind::Ipv4).unwrap();
        rule.set_ip_protocol(Protocol::Other(0xFF), 0x0F).unwrap();
        rule.set_ip_src(
            "255.255.255.255".parse().unwrap(),
            "255.0.255.0".parse().unwrap(),
        )
        .unwrap();
        rule.set_ip_dst(
            "10.1.2.3".parse().unwrap(),
            "255.255.0.0".parse().unwrap(),
        )
        .unwrap();
        rule.set_ihl(15, 0x0F).unwrap();
        rule.set_reject_fragments(true).unwrap();
        rule.set_layer4(Layer4Kind::Tcp).unwrap();
        rule.set_src_port(0xFFFF, 0xF0F0).unwrap();
        rule.set_dst_port(0xFFFF, 0x0F0F).unwrap();
        rule.set_tcp_flags(TcpFlags::all(), TcpFlags::SYN).unwrap();

        let c = compile(&rule);
        assert_mask_consistent(&c);
        // The deepest field: 20 + 60 + 13.
        assert_eq!(c.mask[93], TcpFlags::SYN.bits());
    }

    // Set every field the layer selection allows from one value byte
    // and one mask byte.
    fn fill_rule(
        l2: Layer2Kind,
        l3: Layer3Kind,
        l4: Layer4Kind,
        v: u8,
        m: u8,
    ) -> FilterRule {
        let v16 = u16::from_be_bytes([v, v]);
        let m16 = u16::from_be_bytes([m, m]);
        let v32 = u32::from_be_bytes([v; 4]);
        let m32 = u32::from_be_bytes([m; 4]);

        let mut rule = FilterRule::new();
        rule.set_layer2(l2).unwrap();
        match l2 {
            Layer2Kind::Pos => rule.set_hdlc_header(v32, m32).unwrap(),
            Layer2Kind::Ethernet | Layer2Kind::EthernetVlan => {
                let mm = MacAddr::from([m; 6]);
                rule.set_ether_dst(MacAddr::from([v; 6]), mm).unwrap();
                rule.set_ether_src(MacAddr::from([!v; 6]), mm).unwrap();
                rule.set_ether_type(v16, m16).unwrap();
                if l2 == Layer2Kind::EthernetVlan {
                    rule.set_vlan_id(v16 & VLAN_ID_MAX, m16).unwrap();
                }
            }
        }

        if l3 == Layer3Kind::None {
            assert!(rule.set_layer4(l4).is_err() || l4 == Layer4Kind::None);
            return rule;
        }

        rule.set_layer3(l3).unwrap();
        rule.set_ip_protocol(Protocol::from(v), m).unwrap();
        rule.set_ip_src(Ipv4Addr::from(v32), Ipv4Addr::from(m32)).unwrap();
        rule.set_ip_dst(Ipv4Addr::from(!v32), Ipv4Addr::from(m32)).unwrap();
        rule.set_ihl(5 + v % 11, m).unwrap();
        rule.set_reject_fragments(m & 1 == 1).unwrap();
        rule.set_layer4(l4).unwrap();

        match l4 {
            Layer4Kind::None => {}
            Layer4Kind::Tcp | Layer4Kind::Udp => {
                rule.set_src_port(v16, m16).unwrap();
                rule.set_dst_port(!v16, m16).unwrap();
                if l4 == Layer4Kind::Tcp {
                    rule.set_tcp_flags(
                        TcpFlags::from_bits_truncate(v),
                        TcpFlags::from_bits_truncate(m),
                    )
                    .unwrap();
                }
            }
            Layer4Kind::Icmp => {
                rule.set_icmp_type(v, m).unwrap();
                rule.set_icmp_code(!v, m).unwrap();
            }
        }
        rule
    }

    #[test]
    fn mask_consistency_across_layer_combinations() {
        const L2: [Layer2Kind; 3] =
            [Layer2Kind::Ethernet, Layer2Kind::EthernetVlan, Layer2Kind::Pos];
        const L3: [Layer3Kind; 2] = [Layer3Kind::None, Layer3Kind::Ipv4];
        const L4: [Layer4Kind; 4] = [
            Layer4Kind::None,
            Layer4Kind::Tcp,
            Layer4Kind::Udp,
            Layer4Kind::Icmp,
        ];
        const PATTERNS: [(u8, u8); 8] = [
            (0x00, 0x00),
            (0xFF, 0x00),
            (0x00, 0xFF),
            (0xFF, 0xFF),
            (0xFF, 0x0F),
            (0xA5, 0x5A),
            (0x5A, 0xF0),
            (0x3C, 0xC3),
        ];

        let mut rng = rand::rng();
        let random: Vec<(u8, u8)> =
            (0..16).map(|_| (rng.random(), rng.random())).collect();

        for l2 in L2 {
            for l3 in L3 {
                for l4 in L4 {
                    for (v, m) in PATTERNS.iter().chain(&random) {
                        let rule = fill_rule(l2, l3, l4, *v, *m);
                        let c = compile(&rule);
                        assert_mask_consistent(&c);

                        if *m == 0 && l2 == Layer2Kind::Ethernet {
                            // Only the protocol byte chosen by layer 4
                            // takes part in the compare.
                            let want = match (l3, l4) {
                                (Layer3Kind::Ipv4, Layer4Kind::None) => 0,
                                (Layer3Kind::None, _) => 0,
                                _ => 1,
                            };
                            let compared =
                                c.mask.iter().filter(|b| **b != 0).count();
                            assert_eq!(
                                compared,
                                want,
                                "{l2:?}/{l3:?}/{l4:?} {rule}"
                            );
                        }
                    }
                }
            }
        }
    }
}
