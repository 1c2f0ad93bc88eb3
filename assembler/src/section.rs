//! Control sections and their blocks.

use crate::arch;
use crate::command::{Command, Data};
use crate::symbols::SymbolTable;

/// A named region of a section. Blocks let non-contiguous source regions
/// (switched with USE) lay out contiguously in the final image.
#[derive(Clone, Debug)]
pub struct Block {
    pub name: String,
    /// First address of the block, chained after the previous block.
    pub start: i32,
    /// Running location counter during a pass.
    pub locctr: i32,
    /// Saved counter for ORG restoration.
    saved: Option<i32>,
    /// High-water mark of the location counter.
    watermark: i32,
}

impl Block {
    pub fn new(name: &str) -> Self {
        Block {
            name: name.to_string(),
            start: 0,
            locctr: 0,
            saved: None,
            watermark: 0,
        }
    }

    pub fn set_start(&mut self, start: i32) {
        self.start = start;
        self.locctr = start;
        self.watermark = start;
    }

    pub fn step(&mut self, bytes: i32) {
        self.locctr += bytes;
        if self.locctr > self.watermark {
            self.watermark = self.locctr;
        }
    }

    /// Override the location counter, remembering the old one.
    pub fn set_origin(&mut self, target: i32) {
        self.saved = Some(self.locctr);
        self.locctr = target;
        if self.locctr > self.watermark {
            self.watermark = self.locctr;
        }
    }

    /// Restore the counter saved by the last origin override.
    pub fn restore_locctr(&mut self) -> bool {
        match self.saved.take() {
            Some(saved) => {
                self.locctr = saved;
                true
            }
            None => false,
        }
    }

    pub fn size(&self) -> i32 {
        self.watermark - self.start
    }
}

/// An assembler-side note that a byte range's value depends on final
/// section placement and must be patched at link time.
#[derive(Clone, Debug, PartialEq)]
pub struct Relocation {
    /// Address of the patched range's first byte.
    pub address: i32,
    /// Length of the range in half-bytes.
    pub nibbles: u8,
    /// Sign and external symbol, for fixes against an imported name.
    /// `None` denotes a plain additive fix against the load address.
    pub action: Option<(char, String)>,
}

/// Literals collected while building a section, waiting for LTORG or END
/// to materialize them as storage.
#[derive(Debug, Default)]
pub struct LiteralPool {
    pending: Vec<(String, Data)>,
    counter: usize,
}

impl LiteralPool {
    /// Register a literal and return its synthesized label. Identical
    /// pending literals share one entry.
    pub fn intern(&mut self, data: Data) -> String {
        if let Some((name, _)) = self.pending.iter().find(|(_, d)| *d == data) {
            return name.clone();
        }
        let name = format!("*{:03}", self.counter);
        self.counter += 1;
        self.pending.push((name.clone(), data));
        name
    }

    pub fn drain(&mut self) -> Vec<(String, Data)> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// An independently relocatable unit of code and data with its own
/// symbol table. The unnamed section is the default one.
#[derive(Debug)]
pub struct Section {
    pub name: String,
    pub blocks: Vec<Block>,
    pub commands: Vec<Command>,
    pub symbols: SymbolTable,
    pub literals: LiteralPool,
    /// Base register value; base-relative addressing is available only
    /// while set.
    pub base: Option<i32>,
    pub relocations: Vec<Relocation>,
    pub size: i32,
}

impl Section {
    pub fn new(name: &str) -> Self {
        Section {
            name: name.to_string(),
            blocks: vec![Block::new("")],
            commands: Vec::new(),
            symbols: SymbolTable::new(),
            literals: LiteralPool::default(),
            base: None,
            relocations: Vec::new(),
            size: 0,
        }
    }

    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    /// Re-entering a section (a repeated CSECT) starts with a clean
    /// addressing state.
    pub fn reset(&mut self) {
        self.base = None;
    }

    pub fn enable_base_addressing(&mut self, value: i32) {
        self.base = Some(value);
    }

    pub fn disable_base_addressing(&mut self) {
        self.base = None;
    }

    /// Is `value` within signed 12-bit reach of the instruction that
    /// follows a format-3 instruction at `locctr`?
    pub fn is_pc_relative_addressing(&self, locctr: i32, value: i32) -> bool {
        arch::is_sdisp(self.pc_displacement(locctr, value))
    }

    pub fn pc_displacement(&self, locctr: i32, value: i32) -> i32 {
        value - locctr - 3
    }

    /// Is `value` within unsigned 12-bit reach of the base register?
    pub fn is_base_addressing(&self, value: i32) -> bool {
        match self.base {
            Some(base) => arch::is_disp(value - base),
            None => false,
        }
    }

    pub fn base_displacement(&self, value: i32) -> i32 {
        value - self.base.unwrap_or(0)
    }

    pub fn add_relocation(&mut self, address: i32, nibbles: u8) {
        self.relocations.push(Relocation {
            address,
            nibbles,
            action: None,
        });
    }

    pub fn add_symbol_relocation(&mut self, address: i32, nibbles: u8, sign: char, symbol: &str) {
        self.relocations.push(Relocation {
            address,
            nibbles,
            action: Some((sign, symbol.to_string())),
        });
    }

    pub(crate) fn block_index(&mut self, name: &str) -> usize {
        match self.blocks.iter().position(|b| b.name == name) {
            Some(i) => i,
            None => {
                self.blocks.push(Block::new(name));
                self.blocks.len() - 1
            }
        }
    }
}
