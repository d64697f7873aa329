// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Integration tests for loading configurations onto a simulated card.

mod common;

use common::*;
use steer::print::print_config;
use steer::print::print_dump;

const HTTPS: u16 = 443;
const HTTP: u16 = 80;

/// Filter 0 is HTTPS, steered to stream 0; filter 1 is HTTP, steered
/// to stream 1.
fn web_config(variant: TableVariant) -> Configuration {
    let mut cfg = Configuration::new(variant, 2).unwrap();
    tcp_dport_filter(&mut cfg, 0, HTTPS);
    tcp_dport_filter(&mut cfg, 1, HTTP);
    steer_filter_to(&mut cfg, 0, 0);
    steer_filter_to(&mut cfg, 1, 1);
    cfg
}

fn syn(dport: u16) -> Vec<u8> {
    tcp_frame(CLIENT, SERVER, 51000, dport, TcpFlags::SYN)
}

// The two-stream example: stream 0 on filter 0, stream 1 on filter 1.
// With only filter 0 hit every (interface, HLB) combination goes to
// stream 0; with nothing hit, everything drops.
#[test]
fn example_scenario() {
    let mut cfg = Configuration::new(TableVariant::Classic, 2).unwrap();
    steer_filter_to(&mut cfg, 0, 0);
    steer_filter_to(&mut cfg, 1, 1);

    let mut ldr = sim_loader(&cfg);
    let s = ldr.load(&cfg).unwrap();
    let built = colour::build(&cfg).unwrap();
    let layout = cfg.layout();

    let live = ldr
        .channel()
        .read_colour_table(s.bank, layout.entries(), cfg.bits_per_entry())
        .unwrap();
    assert_eq!(live, built);

    for iface in 0..INTERFACE_COUNT as u8 {
        for hlb in 0..4 {
            let idx = |filters| {
                layout.encode_key(&steer::engine::layout::TableKey {
                    filters,
                    interface: iface,
                    hlb: HlbKey::Bits(hlb),
                })
            };
            assert_eq!(live.get(idx(0b01)), Colour::Stream(0));
            assert_eq!(live.get(idx(0b10)), Colour::Stream(1));
            assert_eq!(live.get(idx(0b00)), Colour::Drop);
        }
    }
}

#[test]
fn first_load_programs_and_steers() {
    let cfg = web_config(TableVariant::Classic);
    let mut ldr = sim_loader(&cfg);
    let s = ldr.load(&cfg).unwrap();
    assert_eq!(s.rewritten, 2);
    assert_eq!(s.untouched, FILTER_COUNT - 2);
    assert_eq!(s.bank, Bank::B);

    let sim = ldr.regs();
    assert_no_live_writes(sim);
    let hlb = HlbKey::Bits(0);
    assert_eq!(sim.classify(&syn(HTTPS), 0, hlb), Colour::Stream(0));
    assert_eq!(sim.classify(&syn(HTTP), 2, hlb), Colour::Stream(1));
    assert_eq!(sim.classify(&syn(22), 0, hlb), Colour::Drop);
    let dns = udp_frame(CLIENT, SERVER, 51000, HTTPS);
    assert_eq!(sim.classify(&dns, 0, hlb), Colour::Drop);

    print_config(&cfg).unwrap();
    print_dump(&ldr.dump()).unwrap();
}

#[test]
fn reload_touches_only_changed_slots() {
    let mut cfg = web_config(TableVariant::Classic);
    let mut ldr = sim_loader(&cfg);
    ldr.load(&cfg).unwrap();
    ldr.channel().regs_mut().clear_events();

    // Move the HTTP filter to port 8080.
    cfg.filter_mut(1).unwrap().rule_mut().set_dst_port(8080, 0xFFFF).unwrap();
    let s = ldr.load(&cfg).unwrap();
    assert_eq!(s.rewritten, 1);
    assert_eq!(s.disabled, 0);
    assert_eq!(s.enabled, 0);
    assert_eq!(s.untouched, FILTER_COUNT - 1);

    let sim = ldr.regs();
    assert_eq!(
        sim.events(),
        &[
            HwEvent::FilterDisable(1),
            HwEvent::FilterWrite { slot: 1, live: false },
            HwEvent::FilterEnable(1),
            HwEvent::ColourWrite { bank: Bank::A, live: false },
            HwEvent::BankFlip(Bank::A),
        ]
    );
    assert_no_live_writes(sim);
    let hlb = HlbKey::Bits(0);
    assert_eq!(sim.classify(&syn(8080), 0, hlb), Colour::Stream(1));
    assert_eq!(sim.classify(&syn(HTTP), 0, hlb), Colour::Drop);
}

#[test]
fn unchanged_reload_only_flips_banks() {
    let cfg = web_config(TableVariant::HashedV1_4);
    let mut ldr = sim_loader(&cfg);
    ldr.load(&cfg).unwrap();
    ldr.channel().regs_mut().clear_events();

    let s = ldr.load(&cfg).unwrap();
    assert_eq!(s.untouched, FILTER_COUNT);
    assert_eq!(
        ldr.regs().events(),
        &[
            HwEvent::ColourWrite { bank: Bank::A, live: false },
            HwEvent::BankFlip(Bank::A),
        ]
    );
}

#[test]
fn disabled_filter_goes_dark_first() {
    let mut cfg = web_config(TableVariant::Classic);
    let mut ldr = sim_loader(&cfg);
    ldr.load(&cfg).unwrap();
    ldr.channel().regs_mut().clear_events();

    cfg.filter_mut(0).unwrap().set_enabled(false);
    let s = ldr.load(&cfg).unwrap();
    assert_eq!(s.disabled, 1);
    assert_eq!(s.untouched, FILTER_COUNT - 1);

    let sim = ldr.regs();
    assert_eq!(sim.events()[0], HwEvent::FilterDisable(0));
    assert!(
        event_positions(sim.events(), |ev| matches!(
            ev,
            HwEvent::FilterWrite { .. }
        ))
        .is_empty()
    );
    assert_eq!(
        sim.classify(&syn(HTTPS), 0, HlbKey::Bits(0)),
        Colour::Drop
    );

    // Turning it back on needs no rewrite: the rule is still there.
    ldr.channel().regs_mut().clear_events();
    cfg.filter_mut(0).unwrap().set_enabled(true);
    let s = ldr.load(&cfg).unwrap();
    assert_eq!(s.enabled, 1);
    assert_eq!(s.rewritten, 0);
    assert_eq!(ldr.regs().events()[0], HwEvent::FilterEnable(0));
}

#[test]
fn table_goes_live_only_after_it_is_written() {
    let mut cfg = web_config(TableVariant::HashedV1_8);
    let mut ldr = sim_loader(&cfg);
    ldr.load(&cfg).unwrap();

    // Swap which stream each filter feeds.
    cfg.clear_stream(0).unwrap();
    cfg.clear_stream(1).unwrap();
    steer_filter_to(&mut cfg, 1, 0);
    steer_filter_to(&mut cfg, 0, 1);

    let sim = ldr.channel().regs_mut();
    sim.clear_events();
    sim.watch(Probe {
        frame: syn(HTTPS),
        interface: 1,
        hlb: HlbKey::Hash { bucket: 5, buckets: 8 },
    });
    ldr.load(&cfg).unwrap();

    let sim = ldr.regs();
    let writes = event_positions(sim.events(), |ev| {
        matches!(ev, HwEvent::ColourWrite { .. })
    });
    let flips =
        event_positions(sim.events(), |ev| matches!(ev, HwEvent::BankFlip(_)));
    assert_eq!(flips.len(), 1);
    assert!(writes.iter().all(|w| *w < flips[0]));
    assert_eq!(flips[0], sim.events().len() - 1);

    // The probe changed stream exactly once, at the flip.
    let obs = sim.observations();
    assert_eq!(obs.len(), 2);
    assert_eq!(obs[0].colours, vec![Colour::Stream(0)]);
    assert_eq!(obs[1].colours, vec![Colour::Stream(1)]);
    assert_eq!(obs[1].event, Some(flips[0]));
    assert_no_live_writes(sim);
}

#[test]
fn hash_buckets_split_traffic() {
    let mut cfg = Configuration::new(TableVariant::HashedV1_4, 2).unwrap();
    tcp_dport_filter(&mut cfg, 0, HTTPS);

    // HTTPS in buckets 0 and 1 goes to stream 0, the rest to stream 1.
    let low = cfg.new_partial();
    let p = cfg.partial_mut(low).unwrap();
    p.set_hlb_hash(0, Term::Assert).unwrap();
    p.set_hlb_hash(1, Term::Assert).unwrap();
    let https = cfg.new_partial();
    cfg.partial_mut(https).unwrap().set_filter(0, Term::Assert).unwrap();
    cfg.add_partial_expression(0, https, false).unwrap();
    cfg.add_partial_expression(0, low, false).unwrap();
    cfg.add_partial_expression(1, https, false).unwrap();
    cfg.add_partial_expression(1, low, true).unwrap();

    let mut ldr = sim_loader(&cfg);
    ldr.load(&cfg).unwrap();
    let sim = ldr.regs();
    let frame = syn(HTTPS);
    for bucket in 0..4 {
        let hlb = HlbKey::Hash { bucket, buckets: 4 };
        let want = if bucket < 2 {
            Colour::Stream(0)
        } else {
            Colour::Stream(1)
        };
        assert_eq!(sim.classify(&frame, 3, hlb), want, "bucket {bucket}");
    }
    let hlb = HlbKey::Hash { bucket: 0, buckets: 4 };
    assert_eq!(sim.classify(&syn(HTTP), 3, hlb), Colour::Drop);
}

#[test]
fn many_streams() {
    let mut cfg = Configuration::new(TableVariant::Classic, 48).unwrap();
    assert_eq!(cfg.bits_per_entry(), 7);
    let https = cfg.new_partial();
    cfg.partial_mut(https).unwrap().set_filter(0, Term::Assert).unwrap();
    let iface = cfg.new_partial();
    cfg.partial_mut(iface).unwrap().set_interface(2, Term::Assert).unwrap();
    cfg.add_partial_expression(47, https, false).unwrap();
    cfg.add_partial_expression(47, iface, false).unwrap();
    tcp_dport_filter(&mut cfg, 0, HTTPS);

    let mut ldr = sim_loader(&cfg);
    ldr.load(&cfg).unwrap();
    let sim = ldr.regs();
    let hlb = HlbKey::Bits(0b11);
    assert_eq!(sim.classify(&syn(HTTPS), 2, hlb), Colour::Stream(47));
    assert_eq!(sim.classify(&syn(HTTPS), 1, hlb), Colour::Drop);
}
