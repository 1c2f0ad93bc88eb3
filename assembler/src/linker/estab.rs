//! The linker's first pass: assign every section an absolute base address
//! and build the external-symbol table.

use std::collections::HashMap;

use crate::error::LinkError;
use crate::linker::module::ObjectModule;
use crate::linker::LinkOptions;

/// One entry of the external-symbol table: where a name ended up once its
/// section was placed.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtDef {
    pub name: String,
    /// Base address assigned to the owning control section.
    pub cs_address: i32,
    /// Absolute address of the symbol itself.
    pub address: i32,
    /// Section names are entered too; they are not directory symbols.
    pub section: bool,
}

/// External-symbol table built across all modules (ESTAB).
#[derive(Debug, Default)]
pub struct Estab {
    map: HashMap<String, ExtDef>,
    order: Vec<String>,
}

impl Estab {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, name: &str) -> Option<&ExtDef> {
        self.map.get(name)
    }

    /// Entries in insertion order: section bases first, then their
    /// exported symbols.
    pub fn iter(&self) -> impl Iterator<Item = &ExtDef> {
        self.order.iter().map(move |name| &self.map[name])
    }

    fn insert(
        &mut self,
        def: ExtDef,
        module: &str,
        force: bool,
        diagnostics: &mut Vec<String>,
    ) -> Result<(), LinkError> {
        if self.map.contains_key(&def.name) {
            if !force {
                return Err(LinkError::DuplicateExternalSymbol {
                    name: def.name,
                    module: module.to_string(),
                });
            }
            diagnostics.push(format!(
                "duplicate external symbol '{}' in module {}; keeping the first definition",
                def.name, module
            ));
            return Ok(());
        }
        self.order.push(def.name.clone());
        self.map.insert(def.name.clone(), def);
        Ok(())
    }
}

/// Place the sections and record every exported symbol's absolute
/// address. The first module honors an explicit load address when one is
/// given; every later section follows the accumulated lengths.
pub(crate) fn first_pass(
    modules: &[ObjectModule],
    options: &LinkOptions,
    diagnostics: &mut Vec<String>,
) -> Result<(Vec<i32>, Estab), LinkError> {
    let mut bases = Vec::with_capacity(modules.len());
    let mut estab = Estab::new();

    let mut next = options
        .load_address
        .unwrap_or_else(|| modules.first().map(|m| m.start).unwrap_or(0));

    for m in modules {
        let base = next;
        bases.push(base);
        estab.insert(
            ExtDef {
                name: m.name.clone(),
                cs_address: base,
                address: base,
                section: true,
            },
            &m.name,
            options.force,
            diagnostics,
        )?;
        for (name, value) in &m.defs {
            estab.insert(
                ExtDef {
                    name: name.clone(),
                    cs_address: base,
                    address: base + value,
                    section: false,
                },
                &m.name,
                options.force,
                diagnostics,
            )?;
        }
        next = base + m.length;
    }

    Ok((bases, estab))
}
