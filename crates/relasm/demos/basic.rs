//! Basic example: build a program, edit it, serialize it.
//!
//! Run with: `RUST_LOG=relasm=debug cargo run --example basic`

use relasm::{
    AlignMode, Condition, Instruction, MachineMode, MemoryOperand, Mnemonic, Program, Register,
    SectionAttribs, Serializer,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relasm=info")),
        )
        .init();

    println!("=== relasm basic example ===\n");

    let mut p = Program::new(MachineMode::Long64);
    let text = p
        .create_section(".text", SectionAttribs::CODE | SectionAttribs::EXEC, 16)
        .unwrap();
    let data = p
        .create_section(".data", SectionAttribs::DATA | SectionAttribs::READ, 16)
        .unwrap();
    let entry = p.create_named_label("entry").unwrap();
    let top = p.create_named_label("top").unwrap();
    let done = p.create_named_label("done").unwrap();
    let table = p.create_named_label("table").unwrap();

    // --- Function body ---
    p.bind_section(text).unwrap();
    p.bind_label(entry).unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Push, Register::Rbp)).unwrap();
    p.emit_instruction(Instruction::with2(Mnemonic::Mov, Register::Rbp, Register::Rsp))
        .unwrap();
    p.emit_instruction(Instruction::with2(
        Mnemonic::Lea,
        Register::Rsi,
        MemoryOperand::rip_label(table),
    ))
    .unwrap();
    p.emit_instruction(Instruction::with2(Mnemonic::Xor, Register::Eax, Register::Eax))
        .unwrap();
    p.emit_align(16, AlignMode::Code).unwrap();
    p.bind_label(top).unwrap();
    let add = p
        .emit_instruction(Instruction::with2(Mnemonic::Add, Register::Eax, 1i64))
        .unwrap();
    p.emit_instruction(Instruction::with2(Mnemonic::Cmp, Register::Eax, 100i64))
        .unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Jcc(Condition::E), done))
        .unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Jmp, top)).unwrap();
    p.bind_label(done).unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Pop, Register::Rbp)).unwrap();
    p.emit_instruction(Instruction::new(Mnemonic::Ret)).unwrap();

    // --- Data ---
    p.bind_section(data).unwrap();
    p.bind_label(table).unwrap();
    p.emit_embed_label(entry).unwrap();
    p.emit_embed_label(done).unwrap();

    let mut s = Serializer::new();
    s.serialize(&p, 0x40_1000).unwrap();

    println!("1. Serialized {} bytes in {} passes:", s.code_size(), s.pass_count());
    print_hex("   ", s.code());

    println!("\n   Labels:");
    for label in [entry, top, done, table] {
        println!(
            "   {}: 0x{:X}",
            p.label_name(label).unwrap_or("?"),
            s.label_address(label).unwrap_or(0)
        );
    }

    println!("\n   Sections:");
    for section in s.sections() {
        println!(
            "   {:8} {:<12} addr=0x{:X} size={} padding={}",
            section.name,
            section.attribs.to_string(),
            section.address,
            section.size,
            section.padding
        );
    }

    // --- Editing ---
    println!("\n2. After inserting 200 bytes into the loop body:");
    p.insert_after(add, relasm::Node::Data(relasm::Data::filled(0x90, 200)))
        .unwrap();
    s.serialize(&p, 0x40_1000).unwrap();
    println!("   {} bytes in {} passes", s.code_size(), s.pass_count());
    for reloc in s.relocations() {
        println!(
            "   reloc @+{:#06x} {:?} {} bytes -> {}",
            reloc.offset, reloc.kind, reloc.size, reloc.label
        );
    }
}

fn print_hex(prefix: &str, bytes: &[u8]) {
    for chunk in bytes.chunks(16) {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
        println!("{prefix}{}", hex.join(" "));
    }
}
