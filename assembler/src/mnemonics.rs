//! Mnemonic descriptors: what the front end looks up to shape each command.

use std::collections::HashMap;

use crate::arch::Features;

/// Instruction opcodes. All are multiples of 4; the low two bits of the
/// first instruction byte belong to the ni flags.
pub mod opcode {
    // load and store
    pub const LDA: u8 = 0x00;
    pub const LDX: u8 = 0x04;
    pub const LDL: u8 = 0x08;
    pub const STA: u8 = 0x0C;
    pub const STX: u8 = 0x10;
    pub const STL: u8 = 0x14;

    // fixed point arithmetic
    pub const ADD: u8 = 0x18;
    pub const SUB: u8 = 0x1C;
    pub const MUL: u8 = 0x20;
    pub const DIV: u8 = 0x24;
    pub const COMP: u8 = 0x28;
    pub const TIX: u8 = 0x2C;

    // jumps
    pub const JEQ: u8 = 0x30;
    pub const JGT: u8 = 0x34;
    pub const JLT: u8 = 0x38;
    pub const J: u8 = 0x3C;

    // bit/logic
    pub const AND: u8 = 0x40;
    pub const OR: u8 = 0x44;

    // subroutines
    pub const JSUB: u8 = 0x48;
    pub const RSUB: u8 = 0x4C;

    // bytes and status word
    pub const LDCH: u8 = 0x50;
    pub const STCH: u8 = 0x54;
    pub const STSW: u8 = 0xE8;

    // devices
    pub const RD: u8 = 0xD8;
    pub const WD: u8 = 0xDC;
    pub const TD: u8 = 0xE0;

    // XE: floating point
    pub const ADDF: u8 = 0x58;
    pub const SUBF: u8 = 0x5C;
    pub const MULF: u8 = 0x60;
    pub const DIVF: u8 = 0x64;
    pub const COMPF: u8 = 0x88;
    pub const LDF: u8 = 0x70;
    pub const STF: u8 = 0x80;
    pub const FLOAT: u8 = 0xC0;
    pub const FIX: u8 = 0xC4;
    pub const NORM: u8 = 0xC8;

    // XE: extra registers
    pub const LDB: u8 = 0x68;
    pub const LDS: u8 = 0x6C;
    pub const LDT: u8 = 0x74;
    pub const STB: u8 = 0x78;
    pub const STS: u8 = 0x7C;
    pub const STT: u8 = 0x84;

    // XE: register-register arithmetic
    pub const ADDR: u8 = 0x90;
    pub const SUBR: u8 = 0x94;
    pub const MULR: u8 = 0x98;
    pub const DIVR: u8 = 0x9C;
    pub const COMPR: u8 = 0xA0;
    pub const SHIFTL: u8 = 0xA4;
    pub const SHIFTR: u8 = 0xA8;
    pub const RMO: u8 = 0xAC;
    pub const CLEAR: u8 = 0xB4;
    pub const TIXR: u8 = 0xB8;

    // XE: system
    pub const SVC: u8 = 0xB0;
    pub const LPS: u8 = 0xD0;
    pub const STI: u8 = 0xD4;
    pub const SSK: u8 = 0xEC;
    pub const SIO: u8 = 0xF0;
    pub const HIO: u8 = 0xF4;
    pub const TIO: u8 = 0xF8;
}

/// Register numbers.
pub mod reg {
    pub const A: u8 = 0;
    pub const X: u8 = 1;
    pub const L: u8 = 2;
    pub const B: u8 = 3;
    pub const S: u8 = 4;
    pub const T: u8 = 5;
    pub const F: u8 = 6;
    pub const PC: u8 = 8;
    pub const SW: u8 = 9;
}

pub fn reg_to_name(r: u8) -> &'static str {
    match r {
        reg::A => "A",
        reg::X => "X",
        reg::L => "L",
        reg::B => "B",
        reg::S => "S",
        reg::T => "T",
        reg::F => "F",
        reg::PC => "PC",
        reg::SW => "SW",
        _ => "?",
    }
}

pub fn name_to_reg(name: &str) -> Option<u8> {
    match name {
        "A" => Some(reg::A),
        "X" => Some(reg::X),
        "L" => Some(reg::L),
        "B" => Some(reg::B),
        "S" => Some(reg::S),
        "T" => Some(reg::T),
        "F" => Some(reg::F),
        "PC" => Some(reg::PC),
        "SW" => Some(reg::SW),
        _ => None,
    }
}

/// Shape of a command: what operands it takes and how it is encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Directive with no operand (CSECT, NOBASE, LTORG).
    D,
    /// Directive with an expression operand (START, END, ORG, BASE, EQU).
    De,
    /// Directive with a name-list operand (USE, EXTDEF, EXTREF).
    Dn,
    /// Storage reservation (RESB, RESW, RESF).
    Se,
    /// Storage initialization (BYTE, WORD, FLOT).
    Sd,
    /// One-byte instruction, no operand.
    F1,
    /// Two-byte instruction, one number.
    F2n,
    /// Two-byte instruction, one register.
    F2r,
    /// Two-byte instruction, two registers.
    F2rr,
    /// Two-byte instruction, register and number.
    F2rn,
    /// Three-byte instruction, no operand (RSUB).
    F3,
    /// Three-byte instruction with a memory operand.
    F3m,
    /// Four-byte instruction with a memory operand.
    F4m,
}

impl Format {
    pub fn hint(&self) -> &'static str {
        use Format::*;
        match self {
            D => "directive",
            De => "directive expr",
            Dn => "directive names",
            Se => "storage n",
            Sd => "storage data",
            F1 => "op",
            F2n => "op n",
            F2r => "op r",
            F2rr => "op r1,r2",
            F2rn => "op r,n",
            F3 => "op",
            F3m => "op m",
            F4m => "+op m",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mnemonic {
    pub name: String,
    pub opcode: u8,
    pub format: Format,
    pub hint: &'static str,
    pub desc: &'static str,
}

impl Mnemonic {
    pub fn new(name: &str, opcode: u8, format: Format, hint: &'static str, desc: &'static str) -> Self {
        Mnemonic {
            name: name.to_string(),
            opcode,
            format,
            hint,
            desc,
        }
    }

    pub fn is_extended(&self) -> bool {
        self.format == Format::F4m
    }
}

/// The registry of legal mnemonics for one machine variant.
pub struct Mnemonics {
    map: HashMap<String, Mnemonic>,
}

impl Mnemonics {
    pub fn new(features: Features) -> Self {
        let mut m = Mnemonics { map: HashMap::new() };
        m.init(features);
        m
    }

    pub fn get(&self, name: &str) -> Option<&Mnemonic> {
        self.map.get(name)
    }

    fn put(&mut self, name: &str, opcode: u8, format: Format, hint: &'static str, desc: &'static str) {
        self.map
            .insert(name.to_string(), Mnemonic::new(name, opcode, format, hint, desc));
    }

    /// Register a memory instruction: the format-3 name and, when format 4
    /// is available, the `+`-prefixed format-4 twin.
    fn put34(&mut self, extra: bool, name: &str, opcode: u8, hint: &'static str, desc: &'static str) {
        self.put(name, opcode, Format::F3m, hint, desc);
        if extra {
            let extended = format!("+{}", name);
            self.map.insert(
                extended.clone(),
                Mnemonic::new(&extended, opcode, Format::F4m, hint, desc),
            );
        }
    }

    pub fn sort_by_name(&self) -> Vec<&Mnemonic> {
        use itertools::Itertools;
        self.map.values().sorted_by(|a, b| a.name.cmp(&b.name)).collect()
    }

    fn init(&mut self, features: Features) {
        use Format::*;

        // directives
        self.put("START", 0, De, "directive", "Define program name and start address (hex).");
        self.put("END", 0, De, "directive", "End of program, define entry point.");
        self.put("RESB", 0, Se, "storage", "Reserve n bytes.");
        self.put("RESW", 0, Se, "storage", "Reserve n words.");
        self.put("BYTE", 0, Sd, "storage", "Initialize bytes (C'..' or X'..').");
        self.put("WORD", 0, Sd, "storage", "Initialize words.");

        // load and store
        self.put34(features.extra_formats, "LDA", opcode::LDA, "A<-(m..m+2)", "Load A from memory.");
        self.put34(features.extra_formats, "LDCH", opcode::LDCH, "A.1<-(m)", "Load byte to A from memory.");
        self.put34(features.extra_formats, "LDL", opcode::LDL, "L<-(m..m+2)", "Load L from memory.");
        self.put34(features.extra_formats, "LDX", opcode::LDX, "X<-(m..m+2)", "Load X from memory.");
        self.put34(features.extra_formats, "STA", opcode::STA, "m..m+2<-(A)", "Store A to memory.");
        self.put34(features.extra_formats, "STCH", opcode::STCH, "m<-(A.1)", "Store byte from A to memory.");
        self.put34(features.extra_formats, "STL", opcode::STL, "m..m+2<-(L)", "Store L to memory.");
        self.put34(features.extra_formats, "STX", opcode::STX, "m..m+2<-(X)", "Store X to memory.");
        self.put34(features.extra_formats, "STSW", opcode::STSW, "m..m+2<-(SW)", "Store status word.");

        // fixed point arithmetic and logic
        self.put34(features.extra_formats, "ADD", opcode::ADD, "A<-(A)+(m..m+2)", "Add to accumulator.");
        self.put34(features.extra_formats, "SUB", opcode::SUB, "A<-(A)-(m..m+2)", "Subtract from accumulator.");
        self.put34(features.extra_formats, "MUL", opcode::MUL, "A<-(A)*(m..m+2)", "Multiply accumulator.");
        self.put34(features.extra_formats, "DIV", opcode::DIV, "A<-(A)/(m..m+2)", "Divide accumulator.");
        self.put34(features.extra_formats, "COMP", opcode::COMP, "A<-(A):(m..m+2)", "Compare accumulator.");
        self.put34(features.extra_formats, "AND", opcode::AND, "A<-(A)&(m..m+2)", "Bitwise AND accumulator.");
        self.put34(features.extra_formats, "OR", opcode::OR, "A<-(A)|(m..m+2)", "Bitwise OR accumulator.");
        self.put34(features.extra_formats, "TIX", opcode::TIX, "X<-(X)+1;(X):(m..m+2)", "Increment X and compare.");

        // jumps and subroutines
        self.put34(features.extra_formats, "J", opcode::J, "PC<-m", "Unconditional jump.");
        self.put34(features.extra_formats, "JEQ", opcode::JEQ, "PC<-m if CC is =", "Jump if equal.");
        self.put34(features.extra_formats, "JGT", opcode::JGT, "PC<-m if CC is >", "Jump if greater.");
        self.put34(features.extra_formats, "JLT", opcode::JLT, "PC<-m if CC is <", "Jump if lower.");
        self.put34(features.extra_formats, "JSUB", opcode::JSUB, "L<-(PC);PC<-m", "Jump to subroutine.");
        self.put("RSUB", opcode::RSUB, F3, "PC<-(L)", "Return from subroutine.");

        // devices
        self.put34(features.extra_formats, "RD", opcode::RD, "A.1<-readdev(m)", "Read from device.");
        self.put34(features.extra_formats, "WD", opcode::WD, "writedev(m),A.1", "Write to device.");
        self.put34(features.extra_formats, "TD", opcode::TD, "testdev(m)", "Test device.");

        if !features.extra_formats {
            return;
        }

        // XE directives
        self.put("ORG", 0, De, "directive", "Override the location counter.");
        self.put("BASE", 0, De, "directive", "Enable base-relative addressing.");
        self.put("NOBASE", 0, D, "directive", "Disable base-relative addressing.");
        self.put("EQU", 0, De, "directive", "Define a symbol.");
        self.put("USE", 0, Dn, "directive", "Switch to a named block.");
        self.put("CSECT", 0, D, "directive", "Declare a control section.");
        self.put("EXTDEF", 0, Dn, "directive", "Export symbols.");
        self.put("EXTREF", 0, Dn, "directive", "Import symbols.");
        self.put("LTORG", 0, D, "directive", "Flush the literal pool.");
        self.put("RESF", 0, Se, "storage", "Reserve n floats.");
        self.put("FLOT", 0, Sd, "storage", "Initialize floats.");

        // XE floating point
        self.put34(true, "ADDF", opcode::ADDF, "F<-(F)+(m..m+5)", "Add float.");
        self.put34(true, "SUBF", opcode::SUBF, "F<-(F)-(m..m+5)", "Subtract float.");
        self.put34(true, "MULF", opcode::MULF, "F<-(F)*(m..m+5)", "Multiply float.");
        self.put34(true, "DIVF", opcode::DIVF, "F<-(F)/(m..m+5)", "Divide float.");
        self.put34(true, "COMPF", opcode::COMPF, "F<-(F):(m..m+5)", "Compare float.");
        self.put34(true, "LDF", opcode::LDF, "F<-(m..m+5)", "Load F from memory.");
        self.put34(true, "STF", opcode::STF, "m..m+5<-(F)", "Store F to memory.");
        self.put("FLOAT", opcode::FLOAT, F1, "F<-(A)", "Convert to float.");
        self.put("FIX", opcode::FIX, F1, "A<-(F)", "Convert to fixed point.");
        self.put("NORM", opcode::NORM, F1, "F<-norm(F)", "Normalize float.");

        // XE registers
        self.put34(true, "LDB", opcode::LDB, "B<-(m..m+2)", "Load B from memory.");
        self.put34(true, "LDS", opcode::LDS, "S<-(m..m+2)", "Load S from memory.");
        self.put34(true, "LDT", opcode::LDT, "T<-(m..m+2)", "Load T from memory.");
        self.put34(true, "STB", opcode::STB, "m..m+2<-(B)", "Store B to memory.");
        self.put34(true, "STS", opcode::STS, "m..m+2<-(S)", "Store S to memory.");
        self.put34(true, "STT", opcode::STT, "m..m+2<-(T)", "Store T to memory.");

        // XE register-register
        self.put("ADDR", opcode::ADDR, F2rr, "r2<-(r2)+(r1)", "Add registers.");
        self.put("SUBR", opcode::SUBR, F2rr, "r2<-(r2)-(r1)", "Subtract registers.");
        self.put("MULR", opcode::MULR, F2rr, "r2<-(r2)*(r1)", "Multiply registers.");
        self.put("DIVR", opcode::DIVR, F2rr, "r2<-(r2)/(r1)", "Divide registers.");
        self.put("COMPR", opcode::COMPR, F2rr, "(r1):(r2)", "Compare registers.");
        self.put("SHIFTL", opcode::SHIFTL, F2rn, "r1<-(r1)<<n", "Shift left.");
        self.put("SHIFTR", opcode::SHIFTR, F2rn, "r1<-(r1)>>n", "Shift right.");
        self.put("RMO", opcode::RMO, F2rr, "r2<-(r1)", "Move register.");
        self.put("CLEAR", opcode::CLEAR, F2r, "r1<-0", "Clear register.");
        self.put("TIXR", opcode::TIXR, F2r, "X<-(X)+1;(X):(r1)", "Increment X and compare.");

        // XE system
        self.put("SVC", opcode::SVC, F2n, "interrupt n", "Supervisor call.");
        self.put34(true, "LPS", opcode::LPS, "load PS (m..m+2)", "Load processor status.");
        self.put34(true, "STI", opcode::STI, "timer<-(m..m+2)", "Set interval timer.");
        self.put34(true, "SSK", opcode::SSK, "key(m)<-(A)", "Set storage key.");
        self.put("SIO", opcode::SIO, F1, "start I/O", "Start I/O channel.");
        self.put("HIO", opcode::HIO, F1, "halt I/O", "Halt I/O channel.");
        self.put("TIO", opcode::TIO, F1, "test I/O", "Test I/O channel.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sic_set_has_no_xe_entries() {
        let m = Mnemonics::new(Features::sic());
        assert!(m.get("LDA").is_some());
        assert!(m.get("+LDA").is_none());
        assert!(m.get("CLEAR").is_none());
        assert!(m.get("BASE").is_none());
    }

    #[test]
    fn xe_set_has_extended_twins() {
        let m = Mnemonics::new(Features::xe());
        let plus_lda = m.get("+LDA").unwrap();
        assert_eq!(plus_lda.opcode, opcode::LDA);
        assert_eq!(plus_lda.format, Format::F4m);
        assert!(plus_lda.is_extended());
    }

    #[test]
    fn reference_listing_is_name_ordered() {
        let m = Mnemonics::new(Features::sic());
        let names: Vec<_> = m.sort_by_name().iter().map(|mn| mn.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"RSUB".to_string()));
    }
}
