//! Writers for the textual artifacts of an assembled program: the object
//! module (H/D/R/T/M/E records) and the aligned program listing.

use std::io::{self, Write};

use crate::command::{CommandKind, DirectiveOp};
use crate::program::Program;
use crate::section::Section;

/// Writes one object module per section, in the exact fixed-width record
/// layout the loader and the linker consume. All numeric fields are
/// uppercase zero-padded hex. A single space may optionally separate
/// fields without changing their widths.
pub struct ObjectWriter<'a> {
    program: &'a Program,
    add_space: bool,
}

impl<'a> ObjectWriter<'a> {
    pub fn new(program: &'a Program) -> Self {
        ObjectWriter {
            program,
            add_space: false,
        }
    }

    pub fn with_space(mut self, add_space: bool) -> Self {
        self.add_space = add_space;
        self
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for section in &self.program.sections {
            self.write_section(w, section)?;
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = Vec::new();
        self.write(&mut out).expect("writing to a Vec cannot fail");
        String::from_utf8(out).expect("records are ASCII")
    }

    fn write_section<W: Write>(&self, w: &mut W, section: &Section) -> io::Result<()> {
        let sp = if self.add_space { " " } else { "" };
        let start = if section.is_default() { self.program.start } else { 0 };
        let name = if section.is_default() { self.program.name() } else { &section.name };

        // header record
        writeln!(w, "H{}{:<6}{}{:06X}{}{:06X}", sp, name, sp, start, sp, section.size)?;

        // define records (exported symbols), omitting the self-name entry
        let mut cnt = 0;
        for sym in section.symbols.as_sorted_list() {
            if !sym.is_exported() || sym.name == name {
                continue;
            }
            if cnt == 0 {
                write!(w, "D")?;
            }
            write!(w, "{}{:<6}{}{:06X}", sp, sym.name, sp, sym.value - start)?;
            cnt += 1;
            if cnt >= 6 {
                cnt = 0;
                writeln!(w)?;
            }
        }
        if cnt > 0 {
            writeln!(w)?;
        }

        // refer records (imported symbols)
        let mut cnt = 0;
        for sym in section.symbols.as_sorted_list() {
            if !sym.is_imported() {
                continue;
            }
            if cnt == 0 {
                write!(w, "R")?;
            }
            write!(w, "{}{:<6}", sp, sym.name)?;
            cnt += 1;
            if cnt >= 12 {
                cnt = 0;
                writeln!(w)?;
            }
        }
        if cnt > 0 {
            writeln!(w)?;
        }

        // text records: accumulate raw code, flush at thirty bytes, at an
        // origin override, at a reservation, and at the end of the section
        let mut buf: Vec<u8> = Vec::new();
        let mut record_addr = start;
        for bi in 0..section.blocks.len() {
            for cmd in section.commands.iter().filter(|c| c.block == bi) {
                let force_flush = matches!(
                    &cmd.kind,
                    CommandKind::Directive(DirectiveOp::Org { .. }) | CommandKind::StorageRes { .. }
                );
                if force_flush {
                    self.flush_text(w, sp, &mut record_addr, &mut buf, true)?;
                    continue;
                }
                if buf.is_empty() {
                    record_addr = cmd.addr;
                }
                buf.extend(cmd.emit_raw_code());
                self.flush_text(w, sp, &mut record_addr, &mut buf, false)?;
            }
        }
        self.flush_text(w, sp, &mut record_addr, &mut buf, true)?;

        // modification records
        for r in &section.relocations {
            match &r.action {
                None => writeln!(w, "M{}{:06X}{}{:02X}", sp, r.address, sp, r.nibbles)?,
                Some((sign, symbol)) => writeln!(
                    w,
                    "M{}{:06X}{}{:02X}{}{}{:<6}",
                    sp, r.address, sp, r.nibbles, sp, sign, symbol
                )?,
            }
        }

        // end record
        let first = if section.is_default() { self.program.first } else { start };
        writeln!(w, "E{}{:06X}", sp, first)
    }

    fn flush_text<W: Write>(
        &self,
        w: &mut W,
        sp: &str,
        record_addr: &mut i32,
        buf: &mut Vec<u8>,
        all: bool,
    ) -> io::Result<()> {
        while buf.len() >= 30 || (all && !buf.is_empty()) {
            let take = buf.len().min(30);
            write!(w, "T{}{:06X}{}{:02X}{}", sp, *record_addr, sp, take, sp)?;
            for b in buf.drain(..take) {
                write!(w, "{:02X}", b)?;
            }
            writeln!(w)?;
            *record_addr += take as i32;
        }
        Ok(())
    }
}

/// Writes the human-oriented listing: address, raw code, label, mnemonic
/// and operand per command, one aligned line each.
pub struct ListingWriter<'a> {
    program: &'a Program,
}

impl<'a> ListingWriter<'a> {
    pub fn new(program: &'a Program) -> Self {
        ListingWriter { program }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let label_len = self.program.max_label_length();
        for section in &self.program.sections {
            for cmd in &section.commands {
                let code: String = cmd.emit_raw_code().iter().map(|b| format!("{:02X}", b)).collect();
                writeln!(
                    w,
                    "{:06X}  {:<8}  {:<width$}  {:<7}  {}",
                    cmd.addr,
                    code,
                    cmd.label(),
                    cmd.name_to_string(),
                    cmd.operand_to_string(),
                    width = label_len,
                )?;
            }
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = Vec::new();
        self.write(&mut out).expect("writing to a Vec cannot fail");
        String::from_utf8(out).expect("listing is ASCII")
    }
}
