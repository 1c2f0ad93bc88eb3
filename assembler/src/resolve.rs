//! Pass 2: resolve symbols, select addressing modes, assign relocations.
//!
//! Commands are walked in source order so that BASE/NOBASE and
//! EXTDEF/EXTREF take effect exactly from the line they appear on.
//! Every address was fixed by the layout pass; failures here are
//! collected per command and never stop the walk.

use crate::arch::{self, Features};
use crate::command::{CommandKind, Data, DirectiveOp, MemOperand, Operand};
use crate::error::{AsmError, AsmErrorKind, ErrorCatcher, Phase};
use crate::expr::{Expr, EvalContext};
use crate::flags;
use crate::mnemonics::Format;
use crate::program::{Pass, Program};
use crate::section::{Relocation, Section};
use crate::symbols::SymbolTable;
use crate::Span;

pub(crate) fn run(program: &mut Program, errors: &mut ErrorCatcher) {
    debug_assert_eq!(program.pass, Pass::Symbols);

    let features = program.features;
    let start = program.start;
    let mut entry: Option<i32> = None;

    for section in program.sections.iter_mut() {
        let Section {
            commands,
            symbols,
            relocations,
            base,
            ..
        } = section;

        for cmd in commands.iter_mut() {
            let addr = cmd.addr;
            let format = cmd.mnemonic.format;
            let fallback_span = cmd.span;

            match &mut cmd.kind {
                CommandKind::Directive(DirectiveOp::Base { expr }) => {
                    let ctx = EvalContext::new(symbols, addr);
                    match expr.eval(&ctx) {
                        Ok(value) => *base = Some(value),
                        Err(err) => errors.add(err),
                    }
                }
                CommandKind::Directive(DirectiveOp::NoBase) => {
                    *base = None;
                }
                CommandKind::Directive(DirectiveOp::Extdef { names }) => {
                    for (name, span) in names.iter() {
                        symbols.export(name, *span);
                    }
                }
                CommandKind::Directive(DirectiveOp::Extref { names }) => {
                    for (name, span) in names.iter() {
                        if let Err(err) = symbols.import(name, *span) {
                            errors.add(err);
                        }
                    }
                }
                CommandKind::Directive(DirectiveOp::End { expr }) => {
                    if let Some(e) = expr {
                        let ctx = EvalContext::new(symbols, addr);
                        match e.eval(&ctx) {
                            Ok(value) => entry = Some(value),
                            Err(err) => errors.add(err),
                        }
                    }
                }
                CommandKind::InstructionF34(mem) => {
                    let active_base = *base;
                    resolve_addressing(
                        format,
                        addr,
                        fallback_span,
                        mem,
                        symbols,
                        active_base,
                        relocations,
                        features,
                        errors,
                    );
                }
                CommandKind::StorageData {
                    data: Data::Num { exprs, size },
                    values,
                } => {
                    resolve_data(addr, exprs, *size, values, symbols, relocations, errors);
                }
                _ => {}
            }
        }

        for err in symbols.validate_exports() {
            errors.add(err);
        }
    }

    program.first = entry.unwrap_or(start);
}

/// Select exactly one encoding for a format-3/4 memory operand.
///
/// The attempts, in order: absolute direct (absolute symbols and plain
/// values), PC-relative, base-relative, absolute with a relocation entry,
/// and finally the legacy 15-bit SIC encoding for simple operands when
/// that policy is switched on.
#[allow(clippy::too_many_arguments)]
fn resolve_addressing(
    format: Format,
    addr: i32,
    fallback_span: Span,
    mem: &mut MemOperand,
    symbols: &SymbolTable,
    base: Option<i32>,
    relocations: &mut Vec<Relocation>,
    features: Features,
    errors: &mut ErrorCatcher,
) {
    let span = mem.operand_span.or(Some(fallback_span));

    // `,X` combines with simple addressing; indirect only by policy.
    if mem.flags.is_indexed()
        && (mem.flags.is_immediate() || (mem.flags.is_indirect() && !features.indexed_indirect))
    {
        errors.add(AsmError::new(
            Phase::Resolve,
            AsmErrorKind::IndexedAddressingNotSupported,
            span,
        ));
        return;
    }

    let (value, symbol) = match &mem.operand {
        Operand::Value(v) => (*v, None),
        Operand::Literal(_) => return, // decomposed when the program was built
        Operand::Symbol(name) => match symbols.get(name) {
            Some(sym) if sym.imported => {
                if format != Format::F4m {
                    errors.add(AsmError::new(
                        Phase::Resolve,
                        AsmErrorKind::ExternalSymbolNotAllowedHere { name: name.clone() },
                        span,
                    ));
                    return;
                }
                (0, Some(sym))
            }
            Some(sym) if sym.defined => (sym.value, Some(sym)),
            _ => {
                errors.add(AsmError::new(
                    Phase::Resolve,
                    AsmErrorKind::UndefinedSymbol { name: name.clone() },
                    span,
                ));
                return;
            }
        },
    };

    if format == Format::F4m {
        // The assembler cannot know the section's final base, so format 4
        // always defers relocatable symbols to the linker.
        if let Some(sym) = symbol {
            if sym.imported {
                relocations.push(Relocation {
                    address: addr + 1,
                    nibbles: 5,
                    action: Some(('+', sym.name.clone())),
                });
            } else if !sym.is_absolute() {
                relocations.push(Relocation {
                    address: addr + 1,
                    nibbles: 5,
                    action: None,
                });
            }
        }
        if value >= mem.flags.min_operand() && value <= mem.flags.max_operand() {
            mem.resolved = value;
        } else {
            errors.add(AsmError::new(
                Phase::Resolve,
                AsmErrorKind::CannotAddressSymbol {
                    symbol: operand_name(&mem.operand),
                    value,
                },
                span,
            ));
        }
        return;
    }

    // 1. absolute (direct) addressing of an absolute value
    if symbol.map(|s| s.is_absolute()).unwrap_or(true) {
        let fits = if mem.flags.is_immediate() {
            arch::is_cdisp(value)
        } else {
            arch::is_disp(value)
        };
        if fits {
            mem.resolved = value;
            return;
        }
    }

    if features.relative_addressing {
        // 2. PC-relative, from the address of the next instruction
        let disp = value - addr - 3;
        if arch::is_sdisp(disp) {
            mem.flags.set_pc_relative();
            mem.resolved = arch::int_to_sdisp(disp);
            return;
        }
        // 3. base-relative, while a base is active
        if let Some(base) = base {
            let disp = value - base;
            if arch::is_disp(disp) {
                mem.flags.set_base_relative();
                mem.resolved = arch::int_to_disp(disp);
                return;
            }
        }
    }

    // 4. direct addressing of a relative value, patched at load time
    {
        let fits = if mem.flags.is_immediate() {
            arch::is_sdisp(value)
        } else {
            arch::is_disp(value)
        };
        if fits {
            relocations.push(Relocation {
                address: addr + 1,
                nibbles: 3,
                action: None,
            });
            mem.resolved = value;
            return;
        }
    }

    // 5. legacy fallback: the wider 15-bit SIC field, simple operands only
    if features.sic_fallback && mem.flags.is_simple() && arch::is_sic_addr(value) {
        mem.flags.set_ni(flags::SIC);
        mem.resolved = value;
        return;
    }

    errors.add(AsmError::new(
        Phase::Resolve,
        AsmErrorKind::CannotAddressSymbol {
            symbol: operand_name(&mem.operand),
            value,
        },
        span,
    ));
}

fn operand_name(operand: &Operand) -> String {
    match operand {
        Operand::Symbol(name) => name.clone(),
        Operand::Value(value) => value.to_string(),
        Operand::Literal(_) => "=literal".to_string(),
    }
}

/// Evaluate word/byte initializer expressions and classify them for
/// relocation. A simple-relocatable expression (net one section-relative
/// term) gets a plain entry; every imported term gets a signed,
/// symbol-carrying entry; anything else is not expressible in an object
/// module.
fn resolve_data(
    addr: i32,
    exprs: &[Expr],
    size: u8,
    values: &mut Vec<i32>,
    symbols: &SymbolTable,
    relocations: &mut Vec<Relocation>,
    errors: &mut ErrorCatcher,
) {
    values.clear();
    for (i, expr) in exprs.iter().enumerate() {
        let element_addr = addr + i as i32 * size as i32;
        let nibbles = 2 * size;

        if expr.count_add_sub() == i32::max_value() {
            errors.add(AsmError::new(
                Phase::Resolve,
                AsmErrorKind::ExpressionNotRelocatable,
                Some(expr.span()),
            ));
            values.push(0);
            continue;
        }

        let mut net_local = 0;
        let mut externals = Vec::new();
        for (name, sign) in expr.extract_signed_syms() {
            match symbols.get(&name) {
                Some(sym) if sym.imported => externals.push((name, sign)),
                Some(sym) if sym.defined && !sym.is_absolute() => net_local += sign,
                _ => {}
            }
        }

        let mut ctx = EvalContext::new(symbols, element_addr);
        ctx.externals_as_zero = true;
        match expr.eval(&ctx) {
            Ok(value) => values.push(value),
            Err(err) => {
                errors.add(err);
                values.push(0);
                continue;
            }
        }

        for (name, sign) in externals {
            relocations.push(Relocation {
                address: element_addr,
                nibbles,
                action: Some((if sign >= 0 { '+' } else { '-' }, name)),
            });
        }
        match net_local {
            0 => {}
            1 => relocations.push(Relocation {
                address: element_addr,
                nibbles,
                action: None,
            }),
            _ => errors.add(AsmError::new(
                Phase::Resolve,
                AsmErrorKind::ExpressionNotRelocatable,
                Some(expr.span()),
            )),
        }
    }
}
