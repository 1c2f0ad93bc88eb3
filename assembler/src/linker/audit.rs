//! The audit trail of a link: placed sections, resolved symbols, and the
//! exact raw-hex patches applied during the second pass. Used for
//! relisting and debugging; never consulted for the produced bytes.

use std::fmt::{Display, Formatter};

use crate::linker::estab::ExtDef;
use crate::linker::module::ObjectModule;

#[derive(Clone, Debug, PartialEq)]
pub struct ControlSectionInfo {
    pub name: String,
    pub start: i32,
    pub length: i32,
}

impl Display for ControlSectionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>6} | 0x{:06X} | 0x{:06X}", self.name, self.start, self.length)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternalSymbolInfo {
    pub name: String,
    pub cs_address: i32,
    pub address: i32,
}

impl Display for ExternalSymbolInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>6} | 0x{:06X} | 0x{:06X}", self.name, self.cs_address, self.address)
    }
}

/// One concrete half-byte patch applied to a text record. A fix that
/// spans two records produces two entries, one per record.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchInfo {
    /// Control section the patch was applied in.
    pub section_name: String,
    /// Absolute start address of the patched text record.
    pub t_record_start_addr: i32,
    /// Offset into the record's text, in half-bytes.
    pub text_offset_half_bytes: usize,
    /// Number of half-bytes replaced.
    pub length_half_bytes: usize,
    /// Original half-bytes, uppercase hex.
    pub before_hex: String,
    /// Patched half-bytes, uppercase hex.
    pub after_hex: String,
    /// External symbol that drove the modification, if any.
    pub symbol_name: Option<String>,
}

impl Display for PatchInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Patch[{}] T@0x{:06X} +{} nibbles len={} : {} -> {} (sym={})",
            self.section_name,
            self.t_record_start_addr,
            self.text_offset_half_bytes,
            self.length_half_bytes,
            self.before_hex,
            self.after_hex,
            self.symbol_name.as_deref().unwrap_or("-"),
        )
    }
}

#[derive(Debug, Default)]
pub struct Audit {
    pub control_sections: Vec<ControlSectionInfo>,
    pub external_symbols: Vec<ExternalSymbolInfo>,
    pub patches: Vec<PatchInfo>,
}

impl Audit {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_sections<'a>(&mut self, placed: impl Iterator<Item = (&'a ObjectModule, i32)>) {
        for (m, base) in placed {
            self.control_sections.push(ControlSectionInfo {
                name: m.name.clone(),
                start: base,
                length: m.length,
            });
        }
    }

    pub fn record_symbols<'a>(&mut self, defs: impl Iterator<Item = &'a ExtDef>) {
        for d in defs {
            if d.section {
                continue;
            }
            self.external_symbols.push(ExternalSymbolInfo {
                name: d.name.clone(),
                cs_address: d.cs_address,
                address: d.address,
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_patch(
        &mut self,
        section_name: &str,
        t_record_start_addr: i32,
        text_offset_half_bytes: usize,
        length_half_bytes: usize,
        before_hex: &str,
        after_hex: &str,
        symbol_name: Option<&str>,
    ) {
        self.patches.push(PatchInfo {
            section_name: section_name.to_string(),
            t_record_start_addr,
            text_offset_half_bytes,
            length_half_bytes,
            before_hex: before_hex.to_uppercase(),
            after_hex: after_hex.to_uppercase(),
            symbol_name: symbol_name.map(|s| s.to_string()),
        });
    }
}

impl Display for Audit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Control Sections:")?;
        for c in &self.control_sections {
            writeln!(f, "{}", c)?;
        }
        writeln!(f)?;
        writeln!(f, "External Symbols:")?;
        for e in &self.external_symbols {
            writeln!(f, "{}", e)?;
        }
        if !self.patches.is_empty() {
            writeln!(f)?;
            writeln!(f, "Patches:")?;
            for p in &self.patches {
                writeln!(f, "{}", p)?;
            }
        }
        Ok(())
    }
}
