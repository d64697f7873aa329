// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than its worth here.
#![allow(dead_code)]

use slog::Drain;

// Let's make our lives easier and pub use a bunch of stuff.
pub use steer::api::Bank;
pub use steer::api::ETHER_TYPE_IPV4;
pub use steer::api::FILTER_COUNT;
pub use steer::api::INTERFACE_COUNT;
pub use steer::api::Ipv4Addr;
pub use steer::api::MacAddr;
pub use steer::api::SWAP_SLOT;
pub use steer::api::SteerError;
pub use steer::api::TcpFlags;
pub use steer::api::Term;
pub use steer::engine::colour;
pub use steer::engine::colour::Colour;
pub use steer::engine::compile::compile;
pub use steer::engine::config::Configuration;
pub use steer::engine::filter::Layer3Kind;
pub use steer::engine::filter::Layer4Kind;
pub use steer::engine::layout::HlbKey;
pub use steer::engine::layout::TableVariant;
pub use steer::engine::loader::Loader;
pub use steer::engine::sim::HwEvent;
pub use steer::engine::sim::Probe;
pub use steer::engine::sim::SimCard;
pub use steer::provider::Providers;
pub use steer::provider::SlogLog;

pub const CLIENT: Ipv4Addr = Ipv4Addr::from_const([10, 0, 0, 5]);
pub const SERVER: Ipv4Addr = Ipv4Addr::from_const([172, 20, 14, 2]);

pub fn test_logger() -> slog::Logger {
    let decorator = slog_term::PlainDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!("unit" => "steer-test"))
}

pub fn providers() -> Providers {
    Providers { log: Box::new(SlogLog::new(test_logger())) }
}

/// A loader driving a fresh simulated card shaped for `cfg`.
pub fn sim_loader(cfg: &Configuration) -> Loader<SimCard> {
    let sim = SimCard::for_config(cfg).unwrap();
    Loader::new(sim, providers())
}

/// A capture record holding Ethernet, IPv4, and TCP headers.
pub fn tcp_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    sport: u16,
    dport: u16,
    flags: TcpFlags,
) -> Vec<u8> {
    let mut frame = ipv4_frame(src, dst, 6, 20);
    frame[36..38].copy_from_slice(&sport.to_be_bytes());
    frame[38..40].copy_from_slice(&dport.to_be_bytes());
    // Data offset of 5 words.
    frame[48] = 0x50;
    frame[49] = flags.bits();
    frame
}

/// A capture record holding Ethernet, IPv4, and UDP headers.
pub fn udp_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    sport: u16,
    dport: u16,
) -> Vec<u8> {
    let mut frame = ipv4_frame(src, dst, 17, 8);
    frame[36..38].copy_from_slice(&sport.to_be_bytes());
    frame[38..40].copy_from_slice(&dport.to_be_bytes());
    frame
}

fn ipv4_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    proto: u8,
    ulp_len: usize,
) -> Vec<u8> {
    let guest: MacAddr = "a8:40:25:ff:00:01".parse().unwrap();
    let gw: MacAddr = "a8:40:25:00:00:01".parse().unwrap();

    // Two bytes of record padding ahead of the Ethernet header.
    let mut frame = vec![0u8; 2];
    frame.extend_from_slice(&gw.bytes());
    frame.extend_from_slice(&guest.bytes());
    frame.extend_from_slice(&ETHER_TYPE_IPV4.to_be_bytes());

    let total_len = (20 + ulp_len) as u16;
    frame.extend_from_slice(&[0x45, 0x00]);
    frame.extend_from_slice(&total_len.to_be_bytes());
    // Identification, then DF with no fragment offset.
    frame.extend_from_slice(&[0x12, 0x34, 0x40, 0x00]);
    frame.extend_from_slice(&[64, proto, 0x00, 0x00]);
    frame.extend_from_slice(&src.bytes());
    frame.extend_from_slice(&dst.bytes());
    frame.resize(frame.len() + ulp_len, 0);
    frame
}

/// A probe on interface 0 with both HLB bits clear.
pub fn probe(frame: Vec<u8>) -> Probe {
    Probe { frame, interface: 0, hlb: HlbKey::Bits(0) }
}

/// Make virtual `slot` an enabled filter on TCP destination `port`.
pub fn tcp_dport_filter(cfg: &mut Configuration, slot: usize, port: u16) {
    let f = cfg.filter_mut(slot).unwrap();
    let rule = f.rule_mut();
    rule.set_ether_type(ETHER_TYPE_IPV4, 0xFFFF).unwrap();
    rule.set_layer3(Layer3Kind::Ipv4).unwrap();
    rule.set_layer4(Layer4Kind::Tcp).unwrap();
    rule.set_dst_port(port, 0xFFFF).unwrap();
    rule.set_auto_termination();
    f.set_enabled(true);
}

/// Steer hits on virtual `slot` to `stream`.
pub fn steer_filter_to(cfg: &mut Configuration, slot: usize, stream: usize) {
    let id = cfg.new_partial();
    cfg.partial_mut(id).unwrap().set_filter(slot, Term::Assert).unwrap();
    cfg.add_partial_expression(stream, id, false).unwrap();
}

/// The positions of every event matching `pred`.
pub fn event_positions(
    events: &[HwEvent],
    pred: impl Fn(&HwEvent) -> bool,
) -> Vec<usize> {
    events
        .iter()
        .enumerate()
        .filter(|(_, ev)| pred(ev))
        .map(|(i, _)| i)
        .collect()
}

/// Assert that no rule or table row was ever written while live, and
/// that every write was allowed to settle.
pub fn assert_no_live_writes(sim: &SimCard) {
    for ev in sim.events() {
        match ev {
            HwEvent::FilterWrite { live: true, .. }
            | HwEvent::ColourWrite { live: true, .. } => {
                panic!("live write: {ev:?}\nevents: {:#?}", sim.events());
            }
            _ => {}
        }
    }
    assert_eq!(sim.settle_violations(), 0);
}
