extern crate sicxe_tools;

#[macro_use]
extern crate pretty_assertions;

use sicxe_tools::command::{Command, CommandKind, Data, DirectiveOp, MemOperand, Operand};
use sicxe_tools::expr::Expr;
use sicxe_tools::flags::Flags;
use sicxe_tools::linker::{link, LinkError, LinkOptions, ObjectModule};
use sicxe_tools::mnemonics::Mnemonics;
use sicxe_tools::objwrite::ObjectWriter;
use sicxe_tools::symbols::DataType;
use sicxe_tools::{assemble, Features, Span};

fn start(m: &Mnemonics, name: &str, addr: i32) -> Command {
    Command::new(
        m.get("START").unwrap(),
        CommandKind::Directive(DirectiveOp::Start { expr: Expr::int(addr) }),
    )
    .with_label(name, Default::default())
}

fn end(m: &Mnemonics) -> Command {
    Command::new(m.get("END").unwrap(), CommandKind::Directive(DirectiveOp::End { expr: None }))
}

fn word(m: &Mnemonics, label: &str, value: i32) -> Command {
    let cmd = Command::new(
        m.get("WORD").unwrap(),
        CommandKind::StorageData {
            data: Data::Num { exprs: vec![Expr::int(value)], size: 3 },
            values: vec![],
        },
    );
    if label.is_empty() {
        cmd
    } else {
        cmd.with_label(label, Default::default())
    }
}

fn byte_hex(m: &Mnemonics, bytes: Vec<u8>) -> Command {
    Command::new(
        m.get("BYTE").unwrap(),
        CommandKind::StorageData { data: Data::Hex(bytes), values: vec![] },
    )
}

fn resw(m: &Mnemonics, label: &str, count: i32) -> Command {
    Command::new(
        m.get("RESW").unwrap(),
        CommandKind::StorageRes {
            kind: DataType::Word,
            expr: Expr::int(count),
            count: 0,
        },
    )
    .with_label(label, Default::default())
}

fn mem(m: &Mnemonics, name: &str, operand: Operand) -> Command {
    Command::new(
        m.get(name).unwrap(),
        CommandKind::InstructionF34(MemOperand::new(Flags::simple(), operand, None)),
    )
}

fn sym(name: &str) -> Operand {
    Operand::Symbol(name.to_string())
}

fn extref(m: &Mnemonics, names: &[&str]) -> Command {
    Command::new(
        m.get("EXTREF").unwrap(),
        CommandKind::Directive(DirectiveOp::Extref {
            names: names.iter().map(|n| (n.to_string(), Span::default())).collect(),
        }),
    )
}

fn extdef(m: &Mnemonics, names: &[&str]) -> Command {
    Command::new(
        m.get("EXTDEF").unwrap(),
        CommandKind::Directive(DirectiveOp::Extdef {
            names: names.iter().map(|n| (n.to_string(), Span::default())).collect(),
        }),
    )
}

fn assemble_to_modules(commands: Vec<Command>) -> Vec<ObjectModule> {
    let (program, errors) = assemble(commands, Features::xe());
    assert_eq!(errors, vec![]);
    ObjectModule::parse(&ObjectWriter::new(&program).render()).unwrap()
}

/// Module A: a format-4 reference to a symbol exported by module B.
fn module_a(m: &Mnemonics) -> Vec<ObjectModule> {
    assemble_to_modules(vec![
        start(m, "PROGA", 0),
        extref(m, &["COUNT"]),
        mem(m, "+LDA", sym("COUNT")),
        end(m),
    ])
}

/// Module B: exports COUNT at offset 15.
fn module_b(m: &Mnemonics) -> Vec<ObjectModule> {
    assemble_to_modules(vec![
        start(m, "PROGB", 0),
        extdef(m, &["COUNT"]),
        resw(m, "PAD", 5),
        word(m, "COUNT", 0),
        end(m),
    ])
}

#[test]
fn extref_resolves_to_the_other_sections_placement() {
    let m = Mnemonics::new(Features::xe());
    let mut modules = module_a(&m);
    modules.extend(module_b(&m));

    // A occupies [0, 4): COUNT lands at 4 + 15 = 0x13
    let out = link(modules, &LinkOptions::default()).unwrap();
    assert_eq!(out.module.name, "PROGA");
    assert_eq!(out.module.length, 4 + 18);
    assert_eq!(out.module.texts[0].text, "03100013");
    assert!(out.module.mods.is_empty());
    assert_eq!(out.module.defs, vec![("COUNT".to_string(), 0x13)]);

    // the audit names the driving symbol and the patched nibbles
    assert_eq!(out.audit.control_sections.len(), 2);
    assert_eq!(out.audit.external_symbols.len(), 1);
    assert_eq!(out.audit.external_symbols[0].address, 0x13);
    assert_eq!(out.audit.patches.len(), 1);
    assert_eq!(out.audit.patches[0].before_hex, "00000");
    assert_eq!(out.audit.patches[0].after_hex, "00013");
    assert_eq!(out.audit.patches[0].symbol_name.as_deref(), Some("COUNT"));
}

#[test]
fn undefined_external_symbol_fails_unless_forced() {
    let m = Mnemonics::new(Features::xe());
    let modules = module_a(&m);

    let err = link(modules.clone(), &LinkOptions::default()).unwrap_err();
    match err {
        LinkError::UndefinedExternalSymbol { name, .. } => assert_eq!(name, "COUNT"),
        other => panic!("unexpected error: {}", other),
    }

    let out = link(
        modules,
        &LinkOptions { force: true, ..Default::default() },
    )
    .unwrap();
    assert_eq!(out.diagnostics.len(), 1);
    // the record is kept for a later link, the text stays unpatched
    assert_eq!(out.module.mods.len(), 1);
    assert_eq!(out.module.texts[0].text, "03100000");
    assert_eq!(out.module.refs, vec!["COUNT".to_string()]);
}

#[test]
fn straddling_patch_is_spliced_across_two_text_records() {
    let m = Mnemonics::new(Features::xe());

    // 28 bytes of data push the +LDA into the text-record split: its
    // address field starts on the last byte of the first record
    let mut commands = vec![start(&m, "PROGA", 0), extref(&m, &["COUNT"])];
    for _ in 0..9 {
        commands.push(word(&m, "", 1));
    }
    commands.push(byte_hex(&m, vec![0xFF]));
    commands.push(mem(&m, "+LDA", sym("COUNT")));
    commands.push(end(&m));

    let mut modules = assemble_to_modules(commands);
    assert_eq!(modules[0].texts.len(), 2, "expected the record to split");
    assert_eq!(modules[0].texts[0].byte_len(), 30);

    modules.extend(assemble_to_modules(vec![
        start(&m, "PROGB", 0),
        extdef(&m, &["COUNT"]),
        resw(&m, "COUNT", 1),
        end(&m),
    ]));

    // A occupies [0, 0x20): COUNT lands at 0x20
    let out = link(modules, &LinkOptions::default()).unwrap();
    let mut mem_image = vec![0u8; 0x1000];
    out.module.load_into(&mut mem_image).unwrap();
    assert_eq!(&mem_image[0x1C..0x20], &[0x03, 0x10, 0x00, 0x20]);

    // one audit entry per touched record
    assert_eq!(out.audit.patches.len(), 2);
    assert_eq!(out.audit.patches[0].length_half_bytes, 1);
    assert_eq!(out.audit.patches[1].length_half_bytes, 4);
}

#[test]
fn explicit_load_address_shifts_plain_fixes() {
    let m = Mnemonics::new(Features::xe());
    // a direct 12-bit reference to a relocatable word carries a plain
    // M record; loading at 0x4000... is out of the field, so place lower
    let modules = assemble_to_modules(vec![
        start(&m, "PROG", 0),
        word(&m, "ZERO", 0),
        Command::new(
            m.get("ORG").unwrap(),
            CommandKind::Directive(DirectiveOp::Org { expr: Some(Expr::int(0x900)) }),
        ),
        mem(&m, "LDA", sym("ZERO")),
        end(&m),
    ]);
    assert_eq!(modules[0].mods.len(), 1);

    let out = link(
        modules,
        &LinkOptions { load_address: Some(0x40), ..Default::default() },
    )
    .unwrap();
    // the 12-bit field held 000; the section base was added in
    let patched = out
        .module
        .texts
        .iter()
        .find(|t| t.addr == 0x940)
        .expect("rebased instruction record");
    assert_eq!(patched.text, "030040");
    assert_eq!(out.module.start, 0x40);
    assert_eq!(out.module.entry, 0x40);
}

#[test]
fn duplicate_section_names_collide_in_the_symbol_table() {
    let m = Mnemonics::new(Features::xe());
    let mut modules = module_b(&m);
    modules.extend(module_b(&m));
    let err = link(modules, &LinkOptions::default()).unwrap_err();
    match err {
        LinkError::DuplicateExternalSymbol { name, .. } => assert_eq!(name, "PROGB"),
        other => panic!("unexpected error: {}", other),
    }
}
