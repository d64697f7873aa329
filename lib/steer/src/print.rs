// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Print configurations and card state in a human-friendly manner.
//!
//! This is mostly a place to hang printing routines so that they can be
//! used by both card tooling and integration tests.

use crate::api::HwDump;
use crate::engine::colour::Colour;
use crate::engine::colour::ColourTable;
use crate::engine::config::Configuration;
use std::collections::BTreeMap;
use std::io::Write;
use std::string::String;
use tabwriter::TabWriter;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Print a [`HwDump`].
pub fn print_dump(dump: &HwDump) -> std::io::Result<()> {
    print_dump_into(&mut std::io::stdout(), dump)
}

/// Print a [`HwDump`] into a given writer.
///
/// Compare bytes are shown up to the last byte with a non-zero mask.
pub fn print_dump_into(
    writer: &mut impl Write,
    dump: &HwDump,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(t, "Active colour bank: {}", dump.active_bank)?;
    write_hrb(&mut t)?;
    writeln!(t, "SLOT\tENABLED\tTERM\tVALUE\tMASK")?;
    for s in &dump.slots {
        let len = s.compare_len();
        writeln!(
            t,
            "{}\t{}\t{}\t{}\t{}",
            s.slot,
            s.enabled,
            s.termination,
            hex(&s.value[..len]),
            hex(&s.mask[..len]),
        )?;
    }
    t.flush()
}

/// Print a [`Configuration`].
pub fn print_config(config: &Configuration) -> std::io::Result<()> {
    print_config_into(&mut std::io::stdout(), config)
}

/// Print a [`Configuration`] into a given writer.
pub fn print_config_into(
    writer: &mut impl Write,
    config: &Configuration,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(
        t,
        "Layout: {} ({} bits per entry, {} streams)",
        config.variant(),
        config.bits_per_entry(),
        config.stream_count(),
    )?;

    writeln!(t, "\nFilters")?;
    write_hr(&mut t)?;
    writeln!(t, "SLOT\tHW\tENABLED\tTERM\tRULE")?;
    for f in config.filters() {
        writeln!(
            t,
            "{}\t{}\t{}\t{}\t{}",
            f.virtual_slot(),
            f.physical_slot(),
            f.is_enabled(),
            f.rule().termination(),
            f.rule(),
        )?;
    }
    t.flush()?;

    writeln!(t, "\nPartial Expressions")?;
    write_hr(&mut t)?;
    writeln!(t, "ID\tTERMS")?;
    for (i, p) in config.partials().iter().enumerate() {
        writeln!(t, "p{i}\t{p}")?;
    }
    t.flush()?;

    writeln!(t, "\nStreams")?;
    write_hr(&mut t)?;
    writeln!(t, "STREAM\tEXPRESSION")?;
    for (i, s) in config.streams().iter().enumerate() {
        writeln!(t, "{i}\t{s}")?;
    }
    t.flush()
}

/// Print how many colour-table entries go to each destination.
pub fn print_colour_summary(table: &ColourTable) -> std::io::Result<()> {
    print_colour_summary_into(&mut std::io::stdout(), table)
}

/// Print how many colour-table entries go to each destination into a
/// given writer.
pub fn print_colour_summary_into(
    writer: &mut impl Write,
    table: &ColourTable,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    let mut counts: BTreeMap<Colour, usize> = BTreeMap::new();
    for c in table.iter() {
        *counts.entry(c).or_default() += 1;
    }

    writeln!(
        t,
        "Colour table: {} entries, {} bits each",
        table.entries(),
        table.bits_per_entry(),
    )?;
    write_hr(&mut t)?;
    writeln!(t, "DEST\tENTRIES")?;
    for (c, n) in &counts {
        writeln!(t, "{c}\t{n}")?;
    }
    t.flush()
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}
