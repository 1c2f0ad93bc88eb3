extern crate sicxe_tools;

#[macro_use]
extern crate pretty_assertions;

use sicxe_tools::command::{Command, CommandKind, Data, DirectiveOp, MemOperand, Operand};
use sicxe_tools::error::AsmErrorKind;
use sicxe_tools::expr::Expr;
use sicxe_tools::flags::Flags;
use sicxe_tools::mnemonics::Mnemonics;
use sicxe_tools::objwrite::ObjectWriter;
use sicxe_tools::symbols::DataType;
use sicxe_tools::{assemble, Features, Program};

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

fn resw(m: &Mnemonics, label: &str, count: i32) -> Command {
    let cmd = Command::new(
        m.get("RESW").unwrap(),
        CommandKind::StorageRes {
            kind: DataType::Word,
            expr: Expr::int(count),
            count: 0,
        },
    );
    if label.is_empty() {
        cmd
    } else {
        cmd.with_label(label, Default::default())
    }
}

fn mem(m: &Mnemonics, name: &str, flags: Flags, operand: Operand) -> Command {
    Command::new(
        m.get(name).unwrap(),
        CommandKind::InstructionF34(MemOperand::new(flags, operand, None)),
    )
}

fn sym(name: &str) -> Operand {
    Operand::Symbol(name.to_string())
}

fn org(m: &Mnemonics, target: i32) -> Command {
    Command::new(
        m.get("ORG").unwrap(),
        CommandKind::Directive(DirectiveOp::Org { expr: Some(Expr::int(target)) }),
    )
}

fn base(m: &Mnemonics, value: i32) -> Command {
    Command::new(
        m.get("BASE").unwrap(),
        CommandKind::Directive(DirectiveOp::Base { expr: Expr::int(value) }),
    )
}

fn csect(m: &Mnemonics, name: &str) -> Command {
    Command::new(m.get("CSECT").unwrap(), CommandKind::Directive(DirectiveOp::Csect))
        .with_label(name, Default::default())
}

fn assemble_ok(commands: Vec<Command>, features: Features) -> Program {
    let (program, errors) = assemble(commands, features);
    assert_eq!(errors, vec![]);
    program
}

fn raw_bytes(program: &Program, section: usize, index: usize) -> Vec<u8> {
    program.sections[section].commands[index].emit_raw_code()
}

#[test]
fn pc_relative_backward_reference() {
    // FIVE sits before the LDA, within signed 12-bit reach of the next
    // instruction: displacement FIVE - (LDA + 3) = -6
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0x1000),
            word(&m, "FIVE", 5),
            mem(&m, "LDA", Flags::simple(), sym("FIVE")),
            end(&m),
        ],
        Features::xe(),
    );
    assert_eq!(raw_bytes(&program, 0, 2), vec![0x03, 0x2F, 0xFA]);
    assert!(program.sections[0].relocations.is_empty());

    let text = ObjectWriter::new(&program).render();
    assert_eq!(text, "HPROG  001000000006\nT00100006000005032FFA\nE001000\n");
}

#[test]
fn pc_relative_wins_over_base_relative() {
    // both reaches fit; PC-relative is tried first and must win
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0),
            base(&m, 0),
            mem(&m, "LDA", Flags::simple(), sym("TARGET")),
            word(&m, "TARGET", 5),
            end(&m),
        ],
        Features::xe(),
    );
    let code = raw_bytes(&program, 0, 2);
    assert_eq!(code, vec![0x03, 0x20, 0x00]);
}

#[test]
fn base_relative_when_pc_reach_fails() {
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0),
            base(&m, 0x2000),
            mem(&m, "LDA", Flags::simple(), sym("TARGET")),
            org(&m, 0x2000),
            word(&m, "TARGET", 1),
            end(&m),
        ],
        Features::xe(),
    );
    assert_eq!(raw_bytes(&program, 0, 2), vec![0x03, 0x40, 0x00]);
}

#[test]
fn out_of_reach_with_no_base_cannot_be_addressed() {
    let m = Mnemonics::new(Features::xe());
    let (_, errors) = assemble(
        vec![
            start(&m, "PROG", 0),
            mem(&m, "LDA", Flags::simple(), sym("FAR")),
            org(&m, 0x5000),
            word(&m, "FAR", 1),
            end(&m),
        ],
        Features::xe(),
    );
    assert!(errors
        .iter()
        .any(|e| matches!(e.kind, AsmErrorKind::CannotAddressSymbol { .. })));
}

#[test]
fn immediate_literal_value() {
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0),
            mem(&m, "LDA", Flags::immediate(), Operand::Value(3)),
            end(&m),
        ],
        Features::xe(),
    );
    assert_eq!(raw_bytes(&program, 0, 1), vec![0x01, 0x00, 0x03]);
}

#[test]
fn relocatable_direct_operand_registers_a_fix() {
    // in reach of nothing relative (no base, target behind by too much)
    // but small enough for the 12-bit field: direct encoding plus an
    // M record three half-bytes wide at the second byte
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0),
            word(&m, "ZERO", 0),
            org(&m, 0x900),
            mem(&m, "LDA", Flags::simple(), sym("ZERO")),
            end(&m),
        ],
        Features::xe(),
    );
    // LDA at 0x900: pc displacement 0 - 0x903 is out of signed 12-bit reach
    let section = &program.sections[0];
    assert_eq!(section.commands[3].addr, 0x900);
    assert_eq!(raw_bytes(&program, 0, 3), vec![0x03, 0x00, 0x00]);
    assert_eq!(section.relocations.len(), 1);
    assert_eq!(section.relocations[0].address, 0x901);
    assert_eq!(section.relocations[0].nibbles, 3);

    let text = ObjectWriter::new(&program).render();
    assert!(text.contains("\nM00090103\n"));
}

#[test]
fn format_4_always_relocates_a_relocatable_symbol() {
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0),
            mem(&m, "+JSUB", Flags::simple(), sym("SUBR")),
            word(&m, "SUBR", 0),
            end(&m),
        ],
        Features::xe(),
    );
    let section = &program.sections[0];
    assert_eq!(raw_bytes(&program, 0, 1), vec![0x4B, 0x10, 0x00, 0x04]);
    assert_eq!(section.relocations.len(), 1);
    assert_eq!(section.relocations[0].address, 1);
    assert_eq!(section.relocations[0].nibbles, 5);
    assert_eq!(section.relocations[0].action, None);
}

#[test]
fn legacy_sic_fallback_for_wide_simple_operands() {
    // FAR lands at 3 + 2000*3 = 0x1773, past the 12-bit field but within
    // the legacy 15-bit address space
    let m = Mnemonics::new(Features::sic());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0),
            mem(&m, "LDA", Flags::sic(), sym("FAR")),
            resw(&m, "BUF", 2000),
            word(&m, "FAR", 1),
            end(&m),
        ],
        Features::sic(),
    );
    assert_eq!(raw_bytes(&program, 0, 1), vec![0x00, 0x17, 0x73]);
}

#[test]
fn indexed_immediate_is_rejected() {
    let m = Mnemonics::new(Features::xe());
    let mut flags = Flags::immediate();
    flags.set_indexed();
    let (_, errors) = assemble(
        vec![
            start(&m, "PROG", 0),
            mem(&m, "LDA", flags, Operand::Value(1)),
            end(&m),
        ],
        Features::xe(),
    );
    assert!(errors
        .iter()
        .any(|e| e.kind == AsmErrorKind::IndexedAddressingNotSupported));
}

#[test]
fn duplicate_label_in_one_section_only() {
    let m = Mnemonics::new(Features::xe());
    let (_, errors) = assemble(
        vec![
            start(&m, "PROG", 0),
            word(&m, "X", 1),
            word(&m, "X", 2),
            end(&m),
        ],
        Features::xe(),
    );
    assert!(errors
        .iter()
        .any(|e| e.kind == AsmErrorKind::DuplicateSymbol { name: "X".to_string() }));

    // the same name in different sections is two different symbols
    let (_, errors) = assemble(
        vec![
            start(&m, "PROG", 0),
            csect(&m, "SECA"),
            word(&m, "X", 1),
            csect(&m, "SECB"),
            word(&m, "X", 2),
            end(&m),
        ],
        Features::xe(),
    );
    assert_eq!(errors, vec![]);
}

#[test]
fn start_placement_is_validated() {
    let m = Mnemonics::new(Features::xe());
    let (_, errors) = assemble(
        vec![word(&m, "FIVE", 5), start(&m, "PROG", 0), end(&m)],
        Features::xe(),
    );
    assert!(errors
        .iter()
        .any(|e| e.kind == AsmErrorKind::StartMustPrecedeInstructions && e.breaking));

    let (_, errors) = assemble(
        vec![start(&m, "PROG", 0), start(&m, "PROG2", 0), end(&m)],
        Features::xe(),
    );
    assert!(errors.iter().any(|e| e.kind == AsmErrorKind::MultipleStarts));
}

#[test]
fn literal_operand_materializes_at_ltorg() {
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0),
            mem(
                &m,
                "LDCH",
                Flags::simple(),
                Operand::Literal(Data::Chr("EOF".to_string())),
            ),
            Command::new(m.get("LTORG").unwrap(), CommandKind::Directive(DirectiveOp::Ltorg)),
            end(&m),
        ],
        Features::xe(),
    );
    let text = ObjectWriter::new(&program).render();
    // instruction at 0, pooled bytes 454F46 at 3, pc displacement 0
    assert_eq!(text, "HPROG  000000000006\nT00000006532000454F46\nE000000\n");
}

#[test]
fn reservations_split_text_records() {
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0x1000),
            word(&m, "A", 1),
            resw(&m, "BUF", 2),
            word(&m, "B", 2),
            end(&m),
        ],
        Features::xe(),
    );
    let text = ObjectWriter::new(&program).render();
    assert_eq!(
        text,
        "HPROG  00100000000C\nT00100003000001\nT00100903000002\nE001000\n"
    );
}

#[test]
fn storage_map_projects_label_metadata() {
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0),
            word(&m, "FIVE", 5),
            resw(&m, "BUF", 20),
            end(&m),
        ],
        Features::xe(),
    );
    let map = program.storage_map();
    let five = &map["FIVE"];
    assert_eq!(five.data_type, DataType::Word);
    assert_eq!(five.element_count, 1);
    let buf = &map["BUF"];
    assert_eq!(buf.element_size, 3);
    assert_eq!(buf.element_count, 20);
}

#[test]
fn invalid_reservation_count_is_reported() {
    let m = Mnemonics::new(Features::xe());
    let (_, errors) = assemble(
        vec![
            start(&m, "PROG", 0),
            resw(&m, "BUF", -1),
            end(&m),
        ],
        Features::xe(),
    );
    assert!(errors
        .iter()
        .any(|e| matches!(e.kind, AsmErrorKind::InvalidReservationCount { .. })));
}

#[test]
fn round_trip_reproduces_the_emitted_image() {
    use sicxe_tools::linker::ObjectModule;

    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0x1000),
            word(&m, "FIVE", 5),
            mem(&m, "LDA", Flags::simple(), sym("FIVE")),
            resw(&m, "BUF", 1),
            word(&m, "SIX", 6),
            end(&m),
        ],
        Features::xe(),
    );
    let text = ObjectWriter::new(&program).render();
    let modules = ObjectModule::parse(&text).unwrap();
    assert_eq!(modules.len(), 1);

    let mut mem_image = vec![0u8; 0x8000];
    let entry = modules[0].load_into(&mut mem_image).unwrap();
    assert_eq!(entry, 0x1000);

    for cmd in &program.sections[0].commands {
        let bytes = cmd.emit_raw_code();
        for (i, b) in bytes.iter().enumerate() {
            assert_eq!(
                mem_image[cmd.addr as usize + i],
                *b,
                "byte at {:06X}",
                cmd.addr as usize + i
            );
        }
    }
}

#[test]
fn listing_shows_resolved_code_and_operands() {
    use sicxe_tools::objwrite::ListingWriter;

    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0x1000),
            word(&m, "FIVE", 5),
            mem(&m, "LDA", Flags::simple(), sym("FIVE")),
            end(&m),
        ],
        Features::xe(),
    );
    let listing = ListingWriter::new(&program).render();
    let lines: Vec<&str> = listing.lines().collect();
    assert!(lines[1].starts_with("001000  000005"));
    assert!(lines[1].contains("FIVE"));
    assert!(lines[2].starts_with("001003  032FFA"));
    assert!(lines[2].contains("LDA"));

    // the resolved operand points back at FIVE for debugger consumers
    let lda = &program.sections[0].commands[2];
    assert_eq!(lda.resolve_operand_address(lda.addr), Some(0x1000));
}

#[test]
fn entry_address_comes_from_end() {
    let m = Mnemonics::new(Features::xe());
    let program = assemble_ok(
        vec![
            start(&m, "PROG", 0x1000),
            word(&m, "FIVE", 5),
            mem(&m, "LDA", Flags::simple(), sym("FIVE")).with_label("MAIN", Default::default()),
            Command::new(
                m.get("END").unwrap(),
                CommandKind::Directive(DirectiveOp::End { expr: Some(Expr::sym("MAIN")) }),
            ),
        ],
        Features::xe(),
    );
    assert_eq!(program.first, 0x1003);
    assert_eq!(program.default_section().size, 6);
    let text = ObjectWriter::new(&program).render();
    assert!(text.ends_with("E001003\n"));
}
