//! The program container and the assembly driver.

use std::collections::HashMap;

use crate::arch::Features;
use crate::command::{Command, CommandKind, DirectiveOp, Operand};
use crate::error::{AsmError, AsmErrorKind, ErrorCatcher, Phase};
use crate::mnemonics::{Format, Mnemonic};
use crate::section::Section;
use crate::symbols::StorageInfo;
use crate::{layout, resolve};

/// Where the pipeline currently stands. Pass 1 must fully complete before
/// Pass 2 begins: symbol lookups in Pass 2 assume final addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    Layout,
    Symbols,
    Done,
}

#[derive(Debug)]
pub struct Program {
    pub name: Option<String>,
    /// Load address of the default section; 0 for a relocatable program.
    pub start: i32,
    /// Address of the first executed instruction.
    pub first: i32,
    pub sections: Vec<Section>,
    pub features: Features,
    pub pass: Pass,
    /// Last block appended to, per section. Literal flushes land there.
    last_block: Vec<usize>,
}

impl Program {
    fn new(features: Features) -> Self {
        Program {
            name: None,
            start: 0,
            first: 0,
            sections: vec![Section::new("")],
            features,
            pass: Pass::Layout,
            last_block: vec![0],
        }
    }

    pub fn default_section(&self) -> &Section {
        &self.sections[0]
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Labels bound to storage commands, with their data descriptions.
    /// A projection for variable-watch consumers.
    pub fn storage_map(&self) -> HashMap<String, StorageInfo> {
        let mut map = HashMap::new();
        for section in &self.sections {
            for sym in section.symbols.as_sorted_list() {
                if let Some(info) = sym.storage {
                    map.insert(sym.name.clone(), info);
                }
            }
        }
        map
    }

    pub fn max_label_length(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| s.commands.iter())
            .map(|c| c.label().len())
            .max()
            .unwrap_or(0)
            .max(6)
    }

    /// Distribute the front end's command stream into sections and blocks.
    ///
    /// CSECT switches (and resets) the active section, USE the active
    /// block. Literal operands are decomposed here: the instruction is
    /// rewritten against a synthesized label and the data goes to the
    /// section's pool, to be materialized at the next LTORG or at END.
    pub fn build(commands: Vec<Command>, features: Features, errors: &mut ErrorCatcher) -> Program {
        let mut program = Program::new(features);
        let mut cur_section = 0;
        let mut cur_block = 0;

        for mut cmd in commands {
            if let Some(err) = check_features(&cmd, features) {
                errors.add(err);
            }
            let has_label = cmd.has_label();
            match &mut cmd.kind {
                CommandKind::Directive(DirectiveOp::Csect) => {
                    match cmd.label.clone() {
                        None => {
                            errors.add(AsmError::new(
                                Phase::Layout,
                                AsmErrorKind::MissingLabel { directive: "CSECT".to_string() },
                                Some(cmd.span),
                            ));
                            continue;
                        }
                        Some(name) => {
                            cur_section = program.switch_section(&name);
                            program.sections[cur_section].reset();
                            cur_block = 0;
                        }
                    }
                    program.push(cur_section, cur_block, cmd);
                }
                CommandKind::Directive(DirectiveOp::Use { block }) => {
                    cur_block = program.sections[cur_section].block_index(block);
                    program.push(cur_section, cur_block, cmd);
                }
                CommandKind::Directive(DirectiveOp::Equ { .. }) if !has_label => {
                    errors.add(AsmError::new(
                        Phase::Layout,
                        AsmErrorKind::MissingLabel { directive: "EQU".to_string() },
                        Some(cmd.span),
                    ));
                }
                CommandKind::Directive(DirectiveOp::Ltorg) => {
                    program.push(cur_section, cur_block, cmd);
                    program.flush_literals(cur_section);
                }
                CommandKind::Directive(DirectiveOp::End { .. }) => {
                    for index in 0..program.sections.len() {
                        program.flush_literals(index);
                    }
                    cur_section = 0;
                    cur_block = program.last_block[0];
                    program.push(cur_section, cur_block, cmd);
                }
                CommandKind::InstructionF34(mem) => {
                    if let Operand::Literal(data) = &mem.operand {
                        let name = program.sections[cur_section].literals.intern(data.clone());
                        mem.operand = Operand::Symbol(name);
                    }
                    program.push(cur_section, cur_block, cmd);
                }
                _ => {
                    program.push(cur_section, cur_block, cmd);
                }
            }
        }

        program
    }

    fn push(&mut self, section: usize, block: usize, mut cmd: Command) {
        cmd.block = block;
        self.sections[section].commands.push(cmd);
        self.last_block[section] = block;
    }

    fn switch_section(&mut self, name: &str) -> usize {
        match self.sections.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(name));
                self.last_block.push(0);
                self.sections.len() - 1
            }
        }
    }

    /// Materialize the section's pending literals as storage commands.
    fn flush_literals(&mut self, section: usize) {
        let pooled = self.sections[section].literals.drain();
        let block = self.last_block[section];
        for (name, data) in pooled {
            let cmd = Command::new(&literal_mnemonic(), CommandKind::StorageData { data, values: vec![] })
                .with_label(&name, Default::default());
            self.push(section, block, cmd);
        }
    }
}

fn literal_mnemonic() -> Mnemonic {
    Mnemonic::new("BYTE", 0, Format::Sd, "storage", "Pooled literal data.")
}

fn check_features(cmd: &Command, features: Features) -> Option<AsmError> {
    let unavailable = |what| {
        Some(AsmError::new(
            Phase::Layout,
            AsmErrorKind::NotAvailable { what },
            Some(cmd.span),
        ))
    };
    if !features.location_counter && command_exprs(cmd).any(|e| e.uses_locctr()) {
        return unavailable("the location counter is");
    }
    match &cmd.kind {
        CommandKind::InstructionF1 | CommandKind::InstructionF2(_) if !features.extra_formats => {
            unavailable("this instruction format is")
        }
        CommandKind::InstructionF34(mem) => {
            if cmd.mnemonic.format == Format::F4m && !features.extra_formats {
                unavailable("format 4 is")
            } else if !mem.flags.is_simple() && !features.immediate_indirect {
                unavailable("immediate and indirect addressing are")
            } else {
                None
            }
        }
        _ => None,
    }
}

fn command_exprs<'a>(cmd: &'a Command) -> Box<dyn Iterator<Item = &'a crate::expr::Expr> + 'a> {
    use crate::command::Data;
    match &cmd.kind {
        CommandKind::Directive(DirectiveOp::Start { expr })
        | CommandKind::Directive(DirectiveOp::Base { expr })
        | CommandKind::Directive(DirectiveOp::Equ { expr }) => Box::new(std::iter::once(expr)),
        CommandKind::Directive(DirectiveOp::End { expr })
        | CommandKind::Directive(DirectiveOp::Org { expr }) => Box::new(expr.iter()),
        CommandKind::StorageRes { expr, .. } => Box::new(std::iter::once(expr)),
        CommandKind::StorageData { data: Data::Num { exprs, .. }, .. } => Box::new(exprs.iter()),
        _ => Box::new(std::iter::empty()),
    }
}

/// Assemble an already-parsed command stream: build the program, lay it
/// out, resolve every operand. Errors are collected and returned as a
/// list, never thrown past this boundary.
pub fn assemble(commands: Vec<Command>, features: Features) -> (Program, Vec<AsmError>) {
    let mut catcher = ErrorCatcher::new();
    let mut program = Program::build(commands, features, &mut catcher);
    layout::run(&mut program, &mut catcher);
    if !catcher.has_breaking() {
        resolve::run(&mut program, &mut catcher);
    }
    if !catcher.has_breaking() {
        program.pass = Pass::Done;
    }
    (program, catcher.into_errors())
}
