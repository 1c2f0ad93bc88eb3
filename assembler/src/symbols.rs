//! Symbols and the per-section symbol table.

use std::collections::HashMap;

use itertools::Itertools;

use crate::error::{AsmError, AsmErrorKind, Phase};
use crate::Span;

/// Kind of data a storage label describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    Byte,
    Word,
    Float,
}

impl DataType {
    pub fn element_size(&self) -> i32 {
        match self {
            DataType::Byte => 1,
            DataType::Word => 3,
            DataType::Float => 6,
        }
    }
}

/// Storage description of a label bound to a storage command: what the
/// reserved or initialized region holds. A convenience projection for
/// variable-watch consumers, not authoritative layout state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageInfo {
    pub data_type: DataType,
    pub element_size: i32,
    pub element_count: i32,
}

impl StorageInfo {
    pub fn new(data_type: DataType, total_size: i32) -> Self {
        let element_size = data_type.element_size();
        StorageInfo {
            data_type,
            element_size,
            element_count: total_size / element_size,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub span: Span,
    pub value: i32,
    pub defined: bool,
    pub exported: bool,
    pub imported: bool,
    /// Absolute symbols (EQU of a symbol-free or net-zero expression) need
    /// no relocation when addressed directly.
    pub absolute: bool,
    pub storage: Option<StorageInfo>,
}

impl Symbol {
    fn new(name: &str, span: Span) -> Self {
        Symbol {
            name: name.to_string(),
            span,
            value: 0,
            defined: false,
            exported: false,
            imported: false,
            absolute: false,
            storage: None,
        }
    }

    pub fn is_imported(&self) -> bool {
        self.imported
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }
}

/// One section's symbols. Names are unique per section; the same name in
/// another section is a different symbol.
#[derive(Debug, Default)]
pub struct SymbolTable {
    map: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.map.get(name)
    }

    /// Symbols in name order, for directory-record emission.
    pub fn as_sorted_list(&self) -> Vec<&Symbol> {
        self.map.values().sorted_by(|a, b| a.name.cmp(&b.name)).collect()
    }

    /// Define a label at its command's starting address.
    pub fn define_label(
        &mut self,
        name: &str,
        span: Span,
        value: i32,
        storage: Option<StorageInfo>,
    ) -> Result<(), AsmError> {
        self.define(name, span, value, false, storage)
    }

    /// Define a symbol from an EQU; `absolute` when its expression carries
    /// no net section-relative term.
    pub fn define_equ(&mut self, name: &str, span: Span, value: i32, absolute: bool) -> Result<(), AsmError> {
        self.define(name, span, value, absolute, None)
    }

    fn define(
        &mut self,
        name: &str,
        span: Span,
        value: i32,
        absolute: bool,
        storage: Option<StorageInfo>,
    ) -> Result<(), AsmError> {
        let sym = self.map.entry(name.to_string()).or_insert_with(|| Symbol::new(name, span));
        if sym.defined || sym.imported {
            return Err(AsmError::new(
                Phase::Layout,
                AsmErrorKind::DuplicateSymbol { name: name.to_string() },
                Some(span),
            ));
        }
        sym.span = span;
        sym.value = value;
        sym.defined = true;
        sym.absolute = absolute;
        sym.storage = storage;
        Ok(())
    }

    /// Register a name imported from another section. Imported names have
    /// no local value.
    pub fn import(&mut self, name: &str, span: Span) -> Result<(), AsmError> {
        let sym = self.map.entry(name.to_string()).or_insert_with(|| Symbol::new(name, span));
        if sym.defined {
            return Err(AsmError::new(
                Phase::Resolve,
                AsmErrorKind::DuplicateSymbol { name: name.to_string() },
                Some(span),
            ));
        }
        sym.imported = true;
        Ok(())
    }

    /// Register a name exported to other sections. Whether it is actually
    /// defined is checked later, once the whole section has been laid out.
    pub fn export(&mut self, name: &str, span: Span) {
        let sym = self.map.entry(name.to_string()).or_insert_with(|| Symbol::new(name, span));
        sym.exported = true;
    }

    /// Deferred validation: every exported name must be locally defined.
    pub fn validate_exports(&self) -> Vec<AsmError> {
        self.map
            .values()
            .filter(|sym| sym.exported && !sym.defined)
            .map(|sym| {
                AsmError::new(
                    Phase::Resolve,
                    AsmErrorKind::UndefinedExportedSymbol { name: sym.name.clone() },
                    Some(sym.span),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_definition_is_rejected() {
        let mut table = SymbolTable::new();
        table.define_label("LOOP", Span::default(), 0x10, None).unwrap();
        let err = table.define_label("LOOP", Span::default(), 0x20, None).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::DuplicateSymbol { name: "LOOP".to_string() });
        assert_eq!(table.get("LOOP").unwrap().value, 0x10);
    }

    #[test]
    fn export_then_define_binds_value() {
        let mut table = SymbolTable::new();
        table.export("COUNT", Span::default());
        assert_eq!(table.validate_exports().len(), 1);
        table.define_label("COUNT", Span::default(), 0x33, None).unwrap();
        assert!(table.validate_exports().is_empty());
        let sym = table.get("COUNT").unwrap();
        assert!(sym.is_exported());
        assert_eq!(sym.value, 0x33);
    }

    #[test]
    fn sorted_listing() {
        let mut table = SymbolTable::new();
        table.define_label("ZETA", Span::default(), 2, None).unwrap();
        table.define_label("ALPHA", Span::default(), 1, None).unwrap();
        let names: Vec<_> = table.as_sorted_list().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["ALPHA", "ZETA"]);
    }
}
