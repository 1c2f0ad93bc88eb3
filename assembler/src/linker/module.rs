//! The parsed form of one object module, plus the fixed-width record
//! reader and writer, and loading into a raw memory image.

use std::io::{self, Write};

use crate::error::LinkError;

#[derive(Clone, Debug, PartialEq)]
pub struct TextRecord {
    /// Module-local address of the record's first byte.
    pub addr: i32,
    /// Uppercase hex nibbles of the record's code.
    pub text: String,
}

impl TextRecord {
    pub fn byte_len(&self) -> i32 {
        (self.text.len() / 2) as i32
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModRecord {
    /// Module-local address of the patched range's first byte.
    pub addr: i32,
    /// Length of the range in half-bytes.
    pub nibbles: u8,
    /// Sign and external symbol. `None` is a plain additive fix against
    /// the program load address.
    pub action: Option<(char, String)>,
}

/// One control section as serialized by the assembler.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectModule {
    pub name: String,
    pub start: i32,
    pub length: i32,
    /// Exported symbols with their values relative to `start`.
    pub defs: Vec<(String, i32)>,
    /// Imported symbol names.
    pub refs: Vec<String>,
    pub texts: Vec<TextRecord>,
    pub mods: Vec<ModRecord>,
    pub entry: i32,
}

impl ObjectModule {
    /// Parse every H..E group in `source`. An assembler output file holds
    /// one group per control section.
    pub fn parse(source: &str) -> Result<Vec<ObjectModule>, LinkError> {
        let mut modules = Vec::new();
        let mut cur: Option<ObjectModule> = None;
        let mut last_line = 0;

        for (index, raw) in source.lines().enumerate() {
            let line = raw.trim_end();
            if line.is_empty() {
                continue;
            }
            let lineno = index + 1;
            last_line = lineno;
            let mut r = Reader::new(line, lineno);

            let tag = r.tag()?;
            if tag != 'H' && cur.is_none() {
                return Err(LinkError::MalformedModule {
                    line: lineno,
                    reason: format!("record '{}' before any header", tag),
                });
            }
            match tag {
                'H' => {
                    if cur.is_some() {
                        return Err(LinkError::MalformedModule {
                            line: lineno,
                            reason: "header before previous module's end record".to_string(),
                        });
                    }
                    let name = r.name(6);
                    let start = r.hex(6)?;
                    let length = r.hex(6)?;
                    cur = Some(ObjectModule {
                        name,
                        start,
                        length,
                        defs: Vec::new(),
                        refs: Vec::new(),
                        texts: Vec::new(),
                        mods: Vec::new(),
                        entry: start,
                    });
                }
                'D' => {
                    let m = cur.as_mut().unwrap();
                    while r.has_more() {
                        let name = r.name(6);
                        let value = r.hex(6)?;
                        m.defs.push((name, value));
                    }
                }
                'R' => {
                    let m = cur.as_mut().unwrap();
                    while r.has_more() {
                        m.refs.push(r.name(6));
                    }
                }
                'T' => {
                    let m = cur.as_mut().unwrap();
                    let addr = r.hex(6)?;
                    let len = r.hex(2)?;
                    let text = r.hex_text(len as usize * 2)?;
                    m.texts.push(TextRecord { addr, text });
                }
                'M' => {
                    let m = cur.as_mut().unwrap();
                    let addr = r.hex(6)?;
                    let nibbles = r.hex(2)? as u8;
                    let action = match r.sign() {
                        Some(sign) => Some((sign, r.name(6))),
                        None => None,
                    };
                    m.mods.push(ModRecord { addr, nibbles, action });
                }
                'E' => {
                    let mut m = cur.take().unwrap();
                    m.entry = r.hex(6)?;
                    modules.push(m);
                }
                other => {
                    return Err(LinkError::MalformedModule {
                        line: lineno,
                        reason: format!("unknown record tag '{}'", other),
                    });
                }
            }
        }

        if cur.is_some() {
            return Err(LinkError::MalformedModule {
                line: last_line,
                reason: "module has no end record".to_string(),
            });
        }
        Ok(modules)
    }

    pub fn write<W: Write>(&self, w: &mut W, add_space: bool) -> io::Result<()> {
        let sp = if add_space { " " } else { "" };
        writeln!(
            w,
            "H{}{:<6}{}{:06X}{}{:06X}",
            sp, self.name, sp, self.start, sp, self.length
        )?;
        for chunk in self.defs.chunks(6) {
            write!(w, "D")?;
            for (name, value) in chunk {
                write!(w, "{}{:<6}{}{:06X}", sp, name, sp, value)?;
            }
            writeln!(w)?;
        }
        for chunk in self.refs.chunks(12) {
            write!(w, "R")?;
            for name in chunk {
                write!(w, "{}{:<6}", sp, name)?;
            }
            writeln!(w)?;
        }
        for t in &self.texts {
            writeln!(
                w,
                "T{}{:06X}{}{:02X}{}{}",
                sp,
                t.addr,
                sp,
                t.byte_len(),
                sp,
                t.text
            )?;
        }
        for m in &self.mods {
            match &m.action {
                None => writeln!(w, "M{}{:06X}{}{:02X}", sp, m.addr, sp, m.nibbles)?,
                Some((sign, symbol)) => writeln!(
                    w,
                    "M{}{:06X}{}{:02X}{}{}{:<6}",
                    sp, m.addr, sp, m.nibbles, sp, sign, symbol
                )?,
            }
        }
        writeln!(w, "E{}{:06X}", sp, self.entry)
    }

    pub fn render(&self, add_space: bool) -> String {
        let mut out = Vec::new();
        self.write(&mut out, add_space).expect("writing to a Vec cannot fail");
        String::from_utf8(out).expect("records are ASCII")
    }

    /// Place the module's text into a memory image, checking that every
    /// byte falls inside the declared section bounds. Returns the entry
    /// address from the end record.
    pub fn load_into(&self, mem: &mut [u8]) -> Result<i32, LinkError> {
        for t in &self.texts {
            let bytes = t.byte_len();
            for i in 0..bytes {
                let loc = t.addr + i;
                if loc < self.start || loc >= self.start + self.length || loc as usize >= mem.len() {
                    return Err(LinkError::MalformedModule {
                        line: 0,
                        reason: format!(
                            "text byte at {:06X} outside section {} bounds",
                            loc,
                            self.name.trim()
                        ),
                    });
                }
                let hex = &t.text[i as usize * 2..i as usize * 2 + 2];
                let value = u8::from_str_radix(hex, 16).map_err(|_| LinkError::MalformedModule {
                    line: 0,
                    reason: format!("bad hex in text record at {:06X}", t.addr),
                })?;
                mem[loc as usize] = value;
            }
        }
        Ok(self.entry)
    }
}

/// Cursor over one record line. Fields are fixed width; any run of
/// spaces between fields is skipped, which accepts both the packed and
/// the space-separated layouts.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Reader<'a> {
    fn new(line: &'a str, lineno: usize) -> Self {
        Reader {
            bytes: line.as_bytes(),
            pos: 0,
            line: lineno,
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos] == b' ' {
            self.pos += 1;
        }
    }

    fn tag(&mut self) -> Result<char, LinkError> {
        match self.bytes.first() {
            Some(&b) => {
                self.pos = 1;
                Ok(b as char)
            }
            None => Err(self.bad("empty record")),
        }
    }

    fn has_more(&mut self) -> bool {
        self.skip_ws();
        self.pos < self.bytes.len()
    }

    /// A left-aligned name field: up to `width` characters, padding
    /// trimmed.
    fn name(&mut self, width: usize) -> String {
        self.skip_ws();
        let end = (self.pos + width).min(self.bytes.len());
        let s = std::str::from_utf8(&self.bytes[self.pos..end])
            .unwrap_or("")
            .trim_end()
            .to_string();
        self.pos = end;
        s
    }

    fn hex(&mut self, width: usize) -> Result<i32, LinkError> {
        self.skip_ws();
        let end = self.pos + width;
        if end > self.bytes.len() {
            return Err(self.bad("truncated hex field"));
        }
        let s = std::str::from_utf8(&self.bytes[self.pos..end]).unwrap_or("");
        self.pos = end;
        i32::from_str_radix(s, 16).map_err(|_| self.bad("bad hex field"))
    }

    /// Exactly `nibbles` hex digits, spaces between bytes tolerated.
    fn hex_text(&mut self, nibbles: usize) -> Result<String, LinkError> {
        let mut text = String::with_capacity(nibbles);
        while text.len() < nibbles {
            self.skip_ws();
            if self.pos >= self.bytes.len() {
                return Err(self.bad("truncated text record"));
            }
            let c = self.bytes[self.pos] as char;
            if !c.is_ascii_hexdigit() {
                return Err(self.bad("bad hex in text record"));
            }
            text.push(c.to_ascii_uppercase());
            self.pos += 1;
        }
        Ok(text)
    }

    fn sign(&mut self) -> Option<char> {
        self.skip_ws();
        match self.bytes.get(self.pos) {
            Some(b'+') => {
                self.pos += 1;
                Some('+')
            }
            Some(b'-') => {
                self.pos += 1;
                Some('-')
            }
            _ => None,
        }
    }

    fn bad(&self, reason: &str) -> LinkError {
        LinkError::MalformedModule {
            line: self.line,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = "HCOPY  001000000015\n\
                          T00100009031009770100003F2FEC\n\
                          T00100906032FFA\n\
                          M00100A03\n\
                          E001000\n";

    #[test]
    fn parse_packed_module() {
        let modules = ObjectModule::parse(MODULE).unwrap();
        assert_eq!(modules.len(), 1);
        let m = &modules[0];
        assert_eq!(m.name, "COPY");
        assert_eq!(m.start, 0x1000);
        assert_eq!(m.length, 0x15);
        assert_eq!(m.texts.len(), 2);
        assert_eq!(m.texts[0].addr, 0x1000);
        assert_eq!(m.texts[0].byte_len(), 9);
        assert_eq!(m.mods, vec![ModRecord { addr: 0x100A, nibbles: 3, action: None }]);
        assert_eq!(m.entry, 0x1000);
    }

    #[test]
    fn parse_accepts_space_separated_fields() {
        let spaced = "H COPY   001000 000015\nT 001000 03 031009\nE 001000\n";
        let modules = ObjectModule::parse(spaced).unwrap();
        assert_eq!(modules[0].name, "COPY");
        assert_eq!(modules[0].texts[0].text, "031009");
    }

    #[test]
    fn round_trip_through_writer() {
        let modules = ObjectModule::parse(MODULE).unwrap();
        let rendered = modules[0].render(false);
        let again = ObjectModule::parse(&rendered).unwrap();
        assert_eq!(modules, again);
    }

    #[test]
    fn missing_end_record_is_malformed() {
        let err = ObjectModule::parse("HCOPY  001000000015\n").unwrap_err();
        match err {
            LinkError::MalformedModule { .. } => {}
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn load_checks_bounds() {
        let modules = ObjectModule::parse(MODULE).unwrap();
        let mut mem = vec![0u8; 0x2000];
        let entry = modules[0].load_into(&mut mem).unwrap();
        assert_eq!(entry, 0x1000);
        assert_eq!(mem[0x1000], 0x03);
        assert_eq!(mem[0x1001], 0x10);

        let out_of_bounds = "HBAD   001000000001\nT00200001FF\nE001000\n";
        let modules = ObjectModule::parse(out_of_bounds).unwrap();
        assert!(modules[0].load_into(&mut mem).is_err());
    }
}
