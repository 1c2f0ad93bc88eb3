//! The command model: one source line that produces code or directs
//! assembly. Commands arrive from the front end already shaped; every pass
//! matches exhaustively on [`CommandKind`], so adding a kind is a
//! compile-time-checked change across the whole pipeline.

use itertools::Itertools;

use crate::arch;
use crate::expr::Expr;
use crate::flags::Flags;
use crate::mnemonics::{reg_to_name, Format, Mnemonic};
use crate::symbols::DataType;
use crate::Span;

/// Locations of the fields shared by every command variant.
/// Operand locations live with their variant's data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandSpans {
    pub label: Option<Span>,
    pub mnemonic: Option<Span>,
}

/// Payload of a storage initializer or a literal.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    /// C'..': bytes of the characters.
    Chr(String),
    /// X'..': bytes decoded from pairs of hex digits.
    Hex(Vec<u8>),
    /// Numeric elements of `size` bytes each (1 for BYTE, 3 for WORD).
    Num { exprs: Vec<Expr>, size: u8 },
    /// F'..': one 48-bit float.
    Float(f64),
}

impl Data {
    pub fn size(&self) -> i32 {
        match self {
            Data::Chr(s) => s.len() as i32,
            Data::Hex(bytes) => bytes.len() as i32,
            Data::Num { exprs, size } => exprs.len() as i32 * *size as i32,
            Data::Float(_) => 6,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Data::Chr(_) | Data::Hex(_) => DataType::Byte,
            Data::Num { size: 1, .. } => DataType::Byte,
            Data::Num { .. } => DataType::Word,
            Data::Float(_) => DataType::Float,
        }
    }
}

/// The memory operand of a format-3/4 instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A literal value: `LDA #3`.
    Value(i32),
    /// A symbolic operand: `LDA FIVE`.
    Symbol(String),
    /// An inline literal: `LDA =C'EOF'`. Decomposed into a synthesized
    /// symbol plus a pooled storage initializer when the program is built.
    Literal(Data),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemOperand {
    pub flags: Flags,
    pub operand: Operand,
    pub operand_span: Option<Span>,
    /// The operand field contents after addressing resolution.
    pub resolved: i32,
}

impl MemOperand {
    pub fn new(flags: Flags, operand: Operand, operand_span: Option<Span>) -> Self {
        MemOperand {
            flags,
            operand,
            operand_span,
            resolved: 0,
        }
    }
}

/// Operands of a format-2 instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum F2Operands {
    Reg(u8),
    RegReg(u8, u8),
    Count(u8),
    RegCount(u8, u8),
}

#[derive(Clone, Debug, PartialEq)]
pub enum DirectiveOp {
    Start { expr: Expr },
    End { expr: Option<Expr> },
    Org { expr: Option<Expr> },
    Ltorg,
    Base { expr: Expr },
    NoBase,
    Equ { expr: Expr },
    Use { block: String },
    Csect,
    Extdef { names: Vec<(String, Span)> },
    Extref { names: Vec<(String, Span)> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandKind {
    InstructionF1,
    InstructionF2(F2Operands),
    InstructionF34(MemOperand),
    Directive(DirectiveOp),
    StorageRes { kind: DataType, expr: Expr, count: i32 },
    StorageData { data: Data, values: Vec<i32> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub span: Span,
    pub label: Option<String>,
    pub mnemonic: Mnemonic,
    pub spans: CommandSpans,
    /// Address of the command's first byte, fixed by the layout pass.
    pub addr: i32,
    /// Index of the owning block within its section.
    pub(crate) block: usize,
    pub kind: CommandKind,
}

impl Command {
    pub fn new(mnemonic: &Mnemonic, kind: CommandKind) -> Self {
        let mut kind = kind;
        // format 4 explicitly sets the extended bit
        if let CommandKind::InstructionF34(mem) = &mut kind {
            if mnemonic.is_extended() {
                mem.flags.set_extended();
            }
        }
        Command {
            span: Span::default(),
            label: None,
            mnemonic: mnemonic.clone(),
            spans: CommandSpans::default(),
            addr: 0,
            block: 0,
            kind,
        }
    }

    pub fn with_label(mut self, label: &str, span: Span) -> Self {
        self.label = Some(label.to_string());
        self.spans.label = Some(span);
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn has_label(&self) -> bool {
        self.label.is_some()
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }

    pub fn name_to_string(&self) -> &str {
        &self.mnemonic.name
    }

    /// Size of the object code represented by this command, in bytes.
    /// Fixed after the layout pass.
    pub fn size(&self) -> i32 {
        match &self.kind {
            CommandKind::InstructionF1 => 1,
            CommandKind::InstructionF2(_) => 2,
            CommandKind::InstructionF34(_) => {
                if self.mnemonic.format == Format::F4m {
                    4
                } else {
                    3
                }
            }
            CommandKind::Directive(_) => 0,
            CommandKind::StorageRes { kind, count, .. } => kind.element_size() * count,
            CommandKind::StorageData { data, .. } => data.size(),
        }
    }

    /// Emit raw code. Operates purely on already-resolved values and
    /// never fails; any problem has already surfaced during resolution.
    pub fn emit_raw_code(&self) -> Vec<u8> {
        match &self.kind {
            CommandKind::InstructionF1 => vec![self.mnemonic.opcode],
            CommandKind::InstructionF2(ops) => {
                let (op1, op2) = match *ops {
                    F2Operands::Reg(r) => (r, 0),
                    F2Operands::RegReg(r1, r2) => (r1, r2),
                    F2Operands::Count(n) => (n, 0),
                    F2Operands::RegCount(r, n) => (r, n),
                };
                vec![self.mnemonic.opcode, op1 << 4 & 0xF0 | op2 & 0x0F]
            }
            CommandKind::InstructionF34(mem) => {
                let value = mem.resolved;
                let mut data = Vec::with_capacity(self.size() as usize);
                data.push(mem.flags.combine_with_opcode(self.mnemonic.opcode));
                if self.mnemonic.format == Format::F4m {
                    data.push(mem.flags.get_xbpe() | (value >> 16) as u8 & 0x0F);
                    data.push((value >> 8) as u8);
                    data.push(value as u8);
                } else if mem.flags.is_sic() {
                    data.push(mem.flags.get_x() | (value >> 8) as u8 & 0x7F);
                    data.push(value as u8);
                } else {
                    data.push(mem.flags.get_xbpe() | (value >> 8) as u8 & 0x0F);
                    data.push(value as u8);
                }
                data
            }
            CommandKind::Directive(_) => vec![],
            // reservations emit no text; the loader leaves the region zeroed
            CommandKind::StorageRes { .. } => vec![],
            CommandKind::StorageData { data, values } => match data {
                Data::Chr(s) => s.bytes().collect(),
                Data::Hex(bytes) => bytes.clone(),
                Data::Num { exprs, size } => {
                    let mut out = Vec::with_capacity(exprs.len() * *size as usize);
                    for i in 0..exprs.len() {
                        let value = values.get(i).copied().unwrap_or(0);
                        match size {
                            1 => out.extend_from_slice(&arch::int_to_data_byte(value)),
                            _ => out.extend_from_slice(&arch::int_to_data_word(value)),
                        }
                    }
                    out
                }
                Data::Float(value) => arch::double_to_data_float(*value).to_vec(),
            },
        }
    }

    /// Address the resolved memory operand refers to, for debugger-style
    /// consumers. `address_pc` is the address of this instruction.
    pub fn resolve_operand_address(&self, address_pc: i32) -> Option<i32> {
        match &self.kind {
            CommandKind::InstructionF34(mem) => {
                if mem.flags.is_pc_relative() {
                    Some(address_pc + self.size() + arch::sdisp_to_int(mem.resolved))
                } else if !mem.flags.is_immediate() && mem.flags.is_absolute() && !mem.flags.is_indexed() {
                    Some(mem.resolved)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn operand_to_string(&self) -> String {
        match &self.kind {
            CommandKind::InstructionF1 => String::new(),
            CommandKind::InstructionF2(ops) => match *ops {
                F2Operands::Reg(r) => reg_to_name(r).to_string(),
                F2Operands::RegReg(r1, r2) => format!("{},{}", reg_to_name(r1), reg_to_name(r2)),
                F2Operands::Count(n) => n.to_string(),
                F2Operands::RegCount(r, n) => format!("{},{}", reg_to_name(r), n),
            },
            CommandKind::InstructionF34(mem) => {
                let op = match &mem.operand {
                    Operand::Symbol(name) => name.clone(),
                    Operand::Literal(data) => format!("={}", data_to_string(data)),
                    Operand::Value(value) => {
                        if mem.flags.is_pc_relative() {
                            format!("(PC){}{}", if *value >= 0 { "+" } else { "" }, value)
                        } else if mem.flags.is_base_relative() {
                            format!("(B)+{}", value)
                        } else {
                            value.to_string()
                        }
                    }
                };
                mem.flags.operand_to_string(&op)
            }
            CommandKind::Directive(op) => match op {
                DirectiveOp::Start { expr } | DirectiveOp::Base { expr } | DirectiveOp::Equ { expr } => {
                    expr.to_string()
                }
                DirectiveOp::End { expr } | DirectiveOp::Org { expr } => {
                    expr.as_ref().map(|e| e.to_string()).unwrap_or_default()
                }
                DirectiveOp::Use { block } => block.clone(),
                DirectiveOp::Extdef { names } | DirectiveOp::Extref { names } => {
                    names.iter().map(|(name, _)| name.as_str()).join(",")
                }
                DirectiveOp::Ltorg | DirectiveOp::NoBase | DirectiveOp::Csect => String::new(),
            },
            CommandKind::StorageRes { expr, .. } => expr.to_string(),
            CommandKind::StorageData { data, .. } => data_to_string(data),
        }
    }
}

fn data_to_string(data: &Data) -> String {
    match data {
        Data::Chr(s) => format!("C'{}'", s),
        Data::Hex(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            format!("X'{}'", hex)
        }
        Data::Num { exprs, .. } => exprs.iter().map(|e| e.to_string()).join(","),
        Data::Float(value) => format!("F'{}'", value),
    }
}
