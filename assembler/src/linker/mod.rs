//! The linker: combine object modules into one executable module.
//!
//! Two passes. The first places every control section and builds the
//! external-symbol table; the second rewrites every modification-record
//! target in the already-emitted text. Both run strictly in module
//! order: base addresses depend on preceding sections' lengths, and
//! patches mutate one section's text-record buffer at a time.

pub mod audit;
pub mod estab;
pub mod module;

mod patch;

pub use audit::{Audit, ControlSectionInfo, ExternalSymbolInfo, PatchInfo};
pub use estab::{Estab, ExtDef};
pub use module::{ModRecord, ObjectModule, TextRecord};

pub use crate::error::LinkError;

#[derive(Clone, Copy, Debug, Default)]
pub struct LinkOptions {
    /// Absolute address for the first (control) module. Defaults to the
    /// module's own start address.
    pub load_address: Option<i32>,
    /// Keep going over duplicate or undefined external symbols, with a
    /// diagnostic per skipped record.
    pub force: bool,
}

#[derive(Debug)]
pub struct LinkOutput {
    /// The merged module: recomputed header, patched text, merged
    /// directory, single entry record.
    pub module: ObjectModule,
    /// What was placed and patched, for relisting and debugging.
    pub audit: Audit,
    /// Notes about records skipped under force-linking.
    pub diagnostics: Vec<String>,
}

pub fn link(mut modules: Vec<ObjectModule>, options: &LinkOptions) -> Result<LinkOutput, LinkError> {
    if modules.is_empty() {
        return Err(LinkError::MalformedModule {
            line: 0,
            reason: "no input modules".to_string(),
        });
    }

    let mut diagnostics = Vec::new();
    let (bases, estab) = estab::first_pass(&modules, options, &mut diagnostics)?;

    let mut audit = Audit::new();
    audit.record_sections(modules.iter().zip(bases.iter().copied()));
    audit.record_symbols(estab.iter());

    patch::second_pass(&mut modules, &bases, &estab, options, &mut audit, &mut diagnostics)?;

    Ok(LinkOutput {
        module: merge(&modules, &bases, &estab),
        audit,
        diagnostics,
    })
}

/// Read object modules from files, link them, and write the result.
pub fn link_files<W: std::io::Write>(
    inputs: &[std::path::PathBuf],
    output: &mut W,
    options: &LinkOptions,
) -> Result<LinkOutput, LinkError> {
    let mut modules = Vec::new();
    for path in inputs {
        let source = std::fs::read_to_string(path)?;
        modules.extend(ObjectModule::parse(&source)?);
    }
    let out = link(modules, options)?;
    out.module.write(output, false)?;
    Ok(out)
}

/// Assemble the output module: every record rebased to its section's
/// final placement, directory records merged, one entry record taken
/// from the control module.
fn merge(modules: &[ObjectModule], bases: &[i32], estab: &Estab) -> ObjectModule {
    let control = &modules[0];
    let mut merged = ObjectModule {
        name: control.name.clone(),
        start: bases[0],
        length: modules.iter().map(|m| m.length).sum(),
        defs: estab
            .iter()
            .filter(|d| !d.section)
            .map(|d| (d.name.clone(), d.address))
            .collect(),
        refs: Vec::new(),
        texts: Vec::new(),
        mods: Vec::new(),
        entry: control.entry - control.start + bases[0],
    };

    for (m, base) in modules.iter().zip(bases.iter().copied()) {
        let shift = base - m.start;
        for t in &m.texts {
            merged.texts.push(TextRecord {
                addr: t.addr + shift,
                text: t.text.clone(),
            });
        }
        // only force-skipped records survive the second pass
        for r in &m.mods {
            merged.mods.push(ModRecord {
                addr: r.addr + shift,
                nibbles: r.nibbles,
                action: r.action.clone(),
            });
            if let Some((_, name)) = &r.action {
                if !merged.refs.contains(name) {
                    merged.refs.push(name.clone());
                }
            }
        }
    }

    merged
}
