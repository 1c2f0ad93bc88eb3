//! The linker's second pass: rewrite every modification-record target
//! byte range in place, splicing across two adjacent text records when
//! the range straddles them.

use crate::error::LinkError;
use crate::linker::audit::Audit;
use crate::linker::estab::Estab;
use crate::linker::module::{ModRecord, ObjectModule, TextRecord};
use crate::linker::LinkOptions;

pub(crate) fn second_pass(
    modules: &mut [ObjectModule],
    bases: &[i32],
    estab: &Estab,
    options: &LinkOptions,
    audit: &mut Audit,
    diagnostics: &mut Vec<String>,
) -> Result<(), LinkError> {
    for (m, base) in modules.iter_mut().zip(bases.iter().copied()) {
        let mods = std::mem::take(&mut m.mods);
        let mut kept = Vec::new();

        for mr in mods {
            let (delta, symbol) = match &mr.action {
                Some((sign, name)) => match estab.get(name) {
                    Some(def) => {
                        let delta = if *sign == '-' { -def.address } else { def.address };
                        (delta, Some(name.clone()))
                    }
                    None => {
                        if options.force {
                            diagnostics.push(format!(
                                "undefined external symbol '{}' in module {}; record skipped",
                                name, m.name
                            ));
                            kept.push(mr);
                            continue;
                        }
                        return Err(LinkError::UndefinedExternalSymbol {
                            name: name.clone(),
                            module: m.name.clone(),
                        });
                    }
                },
                // a plain fix shifts by the section's load address
                None => (base, None),
            };
            apply(&m.name, &mut m.texts, base, &mr, delta, symbol.as_deref(), audit)?;
        }

        m.mods = kept;
    }
    Ok(())
}

/// Patch one nibble range. The range may lie inside one text record or
/// span exactly two adjacent records of the same section; either way the
/// corrected value is computed over the concatenated nibbles and spliced
/// back in the same split.
fn apply(
    section: &str,
    texts: &mut [TextRecord],
    base: i32,
    mr: &ModRecord,
    delta: i32,
    symbol: Option<&str>,
    audit: &mut Audit,
) -> Result<(), LinkError> {
    let nibbles = mr.nibbles as usize;
    let not_covered = || LinkError::PatchRangeNotInAnyTextRecord {
        section: section.to_string(),
        address: base + mr.addr,
        nibbles: mr.nibbles,
    };

    // an odd length starts in the middle of the first byte
    let start_nibble = mr.addr * 2 + (mr.nibbles % 2) as i32;

    let first = texts
        .iter()
        .position(|t| {
            let lo = t.addr * 2;
            let hi = lo + t.text.len() as i32;
            lo <= start_nibble && start_nibble < hi
        })
        .ok_or_else(not_covered)?;

    let first_off = (start_nibble - texts[first].addr * 2) as usize;
    let first_take = nibbles.min(texts[first].text.len() - first_off);
    let rest = nibbles - first_take;

    if rest > 0 {
        // the tail must continue in the immediately adjacent record
        let adjacent = first + 1 < texts.len()
            && texts[first + 1].addr == texts[first].addr + texts[first].byte_len();
        if !adjacent || texts[first + 1].text.len() < rest {
            return Err(not_covered());
        }
    }

    let mut old = texts[first].text[first_off..first_off + first_take].to_string();
    if rest > 0 {
        old.push_str(&texts[first + 1].text[..rest]);
    }

    let old_value = i64::from_str_radix(&old, 16).map_err(|_| not_covered())?;
    let mask = (1i64 << (4 * nibbles)) - 1;
    let corrected = (old_value + delta as i64) & mask;
    let new = format!("{:0width$X}", corrected, width = nibbles);

    texts[first]
        .text
        .replace_range(first_off..first_off + first_take, &new[..first_take]);
    audit.record_patch(
        section,
        base + texts[first].addr,
        first_off,
        first_take,
        &old[..first_take],
        &new[..first_take],
        symbol,
    );
    if rest > 0 {
        texts[first + 1].text.replace_range(..rest, &new[first_take..]);
        audit.record_patch(
            section,
            base + texts[first + 1].addr,
            0,
            rest,
            &old[first_take..],
            &new[first_take..],
            symbol,
        );
    }

    Ok(())
}
