//! Pass 1: fix every command's address and define every label.
//!
//! Two walks. The first resolves what must be absolute up front: START
//! placement and storage reservation counts. The second walks each
//! section block by block, chains block start addresses, advances the
//! location counters and defines labels at command starting addresses.

use crate::command::{CommandKind, DirectiveOp};
use crate::error::{AsmError, AsmErrorKind, ErrorCatcher, Phase};
use crate::expr::EvalContext;
use crate::program::{Pass, Program};
use crate::section::Section;
use crate::symbols::StorageInfo;

pub(crate) fn run(program: &mut Program, errors: &mut ErrorCatcher) {
    debug_assert_eq!(program.pass, Pass::Layout);

    resolve_start(program, errors);

    let start = program.start;
    for section in program.sections.iter_mut() {
        layout_section(section, start, errors);
    }

    program.first = program.start;
    program.pass = Pass::Symbols;
}

/// Validate START and bind the program name and start address.
/// A malformed START aborts the section, so these errors are breaking.
fn resolve_start(program: &mut Program, errors: &mut ErrorCatcher) {
    let mut seen_code = false;
    let mut name: Option<String> = None;
    let mut start = 0;

    for section in program.sections.iter() {
        for cmd in section.commands.iter() {
            match &cmd.kind {
                CommandKind::Directive(DirectiveOp::Start { expr }) => {
                    if seen_code {
                        errors.add(AsmError::breaking(
                            Phase::Layout,
                            AsmErrorKind::StartMustPrecedeInstructions,
                            cmd.spans.mnemonic.or(Some(cmd.span)),
                        ));
                        continue;
                    }
                    if name.is_some() {
                        errors.add(AsmError::breaking(
                            Phase::Layout,
                            AsmErrorKind::MultipleStarts,
                            cmd.spans.mnemonic.or(Some(cmd.span)),
                        ));
                        continue;
                    }
                    match &cmd.label {
                        None => {
                            errors.add(AsmError::new(
                                Phase::Layout,
                                AsmErrorKind::MissingLabel { directive: "START".to_string() },
                                Some(cmd.span),
                            ));
                        }
                        Some(label) if label.len() > 6 => {
                            errors.add(AsmError::new(
                                Phase::Layout,
                                AsmErrorKind::ProgramNameTooLong { name: label.clone() },
                                cmd.spans.label.or(Some(cmd.span)),
                            ));
                        }
                        Some(label) => name = Some(label.clone()),
                    }
                    let ctx = EvalContext::new(&section.symbols, 0);
                    match expr.eval(&ctx) {
                        Ok(value) => start = value,
                        Err(mut err) => {
                            err.phase = Phase::Layout;
                            errors.add(err);
                        }
                    }
                }
                _ => {
                    if potential_size(&cmd.kind) {
                        seen_code = true;
                    }
                }
            }
        }
    }

    program.name = name;
    program.start = start;
}

/// Does this command occupy space in the image? Used before reservation
/// counts are known, so a reservation always counts.
fn potential_size(kind: &CommandKind) -> bool {
    match kind {
        CommandKind::Directive(_) => false,
        CommandKind::InstructionF1
        | CommandKind::InstructionF2(_)
        | CommandKind::InstructionF34(_)
        | CommandKind::StorageRes { .. }
        | CommandKind::StorageData { .. } => true,
    }
}

fn layout_section(section: &mut Section, program_start: i32, errors: &mut ErrorCatcher) {
    let is_default = section.is_default();
    let Section {
        commands,
        symbols,
        blocks,
        size,
        ..
    } = section;

    let mut block_start = if is_default { program_start } else { 0 };

    for bi in 0..blocks.len() {
        blocks[bi].set_start(block_start);

        for cmd in commands.iter_mut().filter(|c| c.block == bi) {
            let locctr = blocks[bi].locctr;
            cmd.addr = locctr;

            match &mut cmd.kind {
                CommandKind::Directive(DirectiveOp::Equ { expr }) => {
                    let ctx = EvalContext::new(symbols, locctr);
                    match expr.eval(&ctx) {
                        Ok(value) => {
                            let absolute = expr.count_add_sub() == 0;
                            if let Some(label) = &cmd.label {
                                let span = cmd.spans.label.unwrap_or(cmd.span);
                                if let Err(err) = symbols.define_equ(label, span, value, absolute) {
                                    errors.add(err);
                                }
                            }
                        }
                        Err(mut err) => {
                            err.phase = Phase::Layout;
                            errors.add(err);
                        }
                    }
                }
                CommandKind::Directive(DirectiveOp::Org { expr }) => {
                    let ctx = EvalContext::new(symbols, locctr);
                    match expr {
                        Some(e) if e.can_eval(&ctx) => match e.eval(&ctx) {
                            Ok(target) => blocks[bi].set_origin(target),
                            Err(mut err) => {
                                err.phase = Phase::Layout;
                                errors.add(err);
                            }
                        },
                        _ => {
                            if !blocks[bi].restore_locctr() {
                                errors.add(AsmError::new(
                                    Phase::Layout,
                                    AsmErrorKind::OriginUnavailable,
                                    Some(cmd.span),
                                ));
                            }
                        }
                    }
                }
                CommandKind::StorageRes { kind: _, expr, count } => {
                    let ctx = EvalContext::new(symbols, locctr);
                    let resolved = if expr.count_add_sub() == 0 && expr.can_eval(&ctx) {
                        expr.eval(&ctx).ok()
                    } else {
                        None
                    };
                    match resolved {
                        Some(n) if n >= 0 => *count = n,
                        _ => {
                            errors.add(AsmError::new(
                                Phase::Layout,
                                AsmErrorKind::InvalidReservationCount { shown: expr.to_string() },
                                Some(expr.span()),
                            ));
                        }
                    }
                }
                _ => {}
            }

            // define the label at the command's starting address
            if let Some(label) = &cmd.label {
                if !matches!(cmd.kind, CommandKind::Directive(DirectiveOp::Equ { .. })) {
                    let storage = match &cmd.kind {
                        CommandKind::StorageRes { kind, count, .. } => {
                            Some(StorageInfo::new(*kind, kind.element_size() * count))
                        }
                        CommandKind::StorageData { data, .. } => {
                            Some(StorageInfo::new(data.data_type(), data.size()))
                        }
                        _ => None,
                    };
                    let span = cmd.spans.label.unwrap_or(cmd.span);
                    if let Err(err) = symbols.define_label(label, span, locctr, storage) {
                        errors.add(err);
                    }
                }
            }

            let step = cmd.size();
            blocks[bi].step(step);
        }

        block_start = blocks[bi].start + blocks[bi].size();
    }

    *size = blocks.iter().map(|b| b.size()).sum();
}
