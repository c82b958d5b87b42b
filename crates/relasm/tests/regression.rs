//! Regression tests for bug fixes.
//!
//! Each test documents a specific layout or encoding bug that was found and
//! fixed, ensuring the fix is never accidentally reverted.

use relasm::{
    serialize, AlignMode, AsmError, Data, Instruction, MachineMode, MemoryOperand, Mnemonic,
    Program, Register, SectionAttribs, Serializer,
};

fn op(m: Mnemonic) -> Instruction {
    Instruction::new(m)
}

/// Regression: a backward displacement of exactly -128 must take the near
/// form; the short window is -127..=127 in both directions.
#[test]
fn backward_minus_128_is_near() {
    let mut p = Program::new(MachineMode::Long64);
    let l = p.create_label().unwrap();
    p.bind_label(l).unwrap();
    p.emit_data(Data::filled(0x90, 126)).unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Jmp, l)).unwrap();
    let code = serialize(&p, 0).unwrap();
    // short form would be -128; near form is -131.
    assert_eq!(&code[126..], &[0xE9, 0x7D, 0xFF, 0xFF, 0xFF]);
}

/// Regression: forward distances are measured in the previous pass's layout.
/// Shrinking branches in front of a far jump must not make it grow, and the
/// far jump keeps the near form it was first given.
#[test]
fn shrinking_prefix_does_not_grow_later_branches() {
    let mut p = Program::new(MachineMode::Long64);
    let near = p.create_label().unwrap();
    let far = p.create_label().unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Jmp, near)).unwrap();
    p.bind_label(near).unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Jmp, near)).unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Jmp, far)).unwrap();
    p.emit_data(Data::filled(0x90, 127)).unwrap();
    p.bind_label(far).unwrap();

    let mut s = Serializer::new();
    s.serialize(&p, 0x1000).unwrap();
    let code = s.code();
    assert_eq!(&code[..4], &[0xEB, 0x00, 0xEB, 0xFE]);
    assert_eq!(&code[4..9], &[0xE9, 0x7F, 0x00, 0x00, 0x00]);
    assert_eq!(code.len(), 9 + 127);
    assert_eq!(s.label_address(far), Some(0x1000 + 9 + 127));
}

/// Regression: alignment padding must be recomputed every pass, not frozen
/// at its first-pass size.
#[test]
fn padding_follows_shrinking_code() {
    let mut p = Program::new(MachineMode::Legacy32);
    let l = p.create_label().unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Jmp, l)).unwrap();
    p.emit_align(4, AlignMode::Code).unwrap();
    p.bind_label(l).unwrap();
    p.emit_instruction(op(Mnemonic::Ret)).unwrap();
    // jmp 2 bytes, then a 2-byte NOP to reach offset 4.
    assert_eq!(serialize(&p, 0).unwrap(), [0xEB, 0x02, 0x66, 0x90, 0xC3]);
}

/// Regression: multi-byte NOPs use 32-bit ModR/M forms and decode
/// differently in real mode, so 16-bit padding must be plain 0x90.
#[test]
fn real_mode_code_padding() {
    let mut p = Program::new(MachineMode::Real16);
    p.emit_instruction(op(Mnemonic::Ret)).unwrap();
    p.emit_align(8, AlignMode::Code).unwrap();
    assert_eq!(
        serialize(&p, 0x7C00).unwrap(),
        [0xC3, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90]
    );
}

/// Regression: an unbound label reported only its id even when it had a
/// name.
#[test]
fn unresolved_label_reports_name() {
    let mut p = Program::new(MachineMode::Compat32);
    let l = p.create_named_label("handler").unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Call, l)).unwrap();
    let err = serialize(&p, 0).unwrap_err();
    assert_eq!(err.to_string(), "unresolved label 'handler'");
}

/// Regression: 32-bit absolute label addresses above 4 GiB were silently
/// truncated.
#[test]
fn absolute_label_above_4gib_rejected_in_32bit() {
    let mut p = Program::new(MachineMode::Compat32);
    let l = p.create_label().unwrap();
    p.emit_instruction(Instruction::with2(
        Mnemonic::Mov,
        Register::Eax,
        MemoryOperand::label(l),
    ))
    .unwrap();
    p.bind_label(l).unwrap();
    assert!(matches!(
        serialize(&p, 0x1_0000_0000),
        Err(AsmError::DisplacementOutOfRange { .. })
    ));
}

/// Regression: AH-BH cannot be encoded together with a REX prefix.
#[test]
fn high_byte_with_extended_base_rejected() {
    let mut p = Program::new(MachineMode::Long64);
    p.emit_instruction(Instruction::with2(
        Mnemonic::Mov,
        MemoryOperand::base(Register::R8),
        Register::Ah,
    ))
    .unwrap();
    assert!(matches!(
        serialize(&p, 0),
        Err(AsmError::InvalidOperands { .. })
    ));
}

/// Regression: a failed serialization left the previous program's bytes in
/// the serializer.
#[test]
fn failed_serialization_clears_state() {
    let mut ok = Program::new(MachineMode::Long64);
    ok.emit_instruction(op(Mnemonic::Nop)).unwrap();
    let mut bad = Program::new(MachineMode::Long64);
    bad.emit_instruction(Instruction::with1(Mnemonic::Push, Register::Rip))
        .unwrap();

    let mut s = Serializer::new();
    s.serialize(&ok, 0).unwrap();
    assert!(s.serialize(&bad, 0).is_err());
    assert_eq!(s.code_size(), 0);
    assert!(s.relocations().is_empty());
}

/// Regression: forward distances ignored the padding an alignment directive
/// adds back when code in front of it shrinks.  A branch picked rel8 from
/// the shifted previous layout, needed rel32 again one pass later and
/// aborted with `RelaxationDiverged`.
#[test]
fn padding_between_branch_and_target_does_not_regrow() {
    let mut p = Program::new(MachineMode::Long64);
    let l0 = p.create_label().unwrap();
    let far = p.create_label().unwrap();
    for _ in 0..3 {
        p.emit_instruction(Instruction::with1(Mnemonic::Jmp, l0)).unwrap();
    }
    p.bind_label(l0).unwrap();
    p.emit_instruction(Instruction::with1(Mnemonic::Jmp, far)).unwrap();
    p.emit_data(Data::filled(0x90, 122)).unwrap();
    p.emit_align(16, AlignMode::Code).unwrap();
    p.bind_label(far).unwrap();
    p.emit_instruction(op(Mnemonic::Ret)).unwrap();

    let mut s = Serializer::new();
    s.serialize(&p, 0).unwrap();
    let code = s.code();
    assert_eq!(&code[..6], &[0xEB, 0x04, 0xEB, 0x02, 0xEB, 0x00]);
    // 144 - (6 + 5): the short form could not reach `far` either.
    assert_eq!(&code[6..11], &[0xE9, 0x85, 0x00, 0x00, 0x00]);
    assert_eq!(code.len(), 145);
    assert_eq!(code[144], 0xC3);
    assert_eq!(s.label_address(far), Some(144));
}

/// Regression: `clear` restarted label ids at zero, so handles from before
/// the clear silently aliased new labels.
#[test]
fn labels_from_before_clear_are_rejected() {
    let mut p = Program::new(MachineMode::Long64);
    let old = p.create_label().unwrap();
    let text = p.create_section(".text", SectionAttribs::CODE, 1).unwrap();
    p.clear();

    let fresh = p.create_label().unwrap();
    assert_ne!(fresh, old);
    assert_eq!(p.bind_label(old), Err(AsmError::InvalidLabel { id: old.id() }));
    assert_eq!(
        p.emit_instruction(Instruction::with1(Mnemonic::Jmp, old)),
        Err(AsmError::InvalidLabel { id: old.id() })
    );
    assert!(matches!(
        p.bind_section(text),
        Err(AsmError::InvalidSection { .. })
    ));

    p.emit_instruction(Instruction::with1(Mnemonic::Jmp, fresh)).unwrap();
    p.bind_label(fresh).unwrap();
    let mut s = Serializer::new();
    s.serialize(&p, 0x1000).unwrap();
    assert_eq!(s.code(), &[0xEB, 0x00]);
    assert_eq!(s.label_address(fresh), Some(0x1002));
    assert_eq!(s.label_address(old), None);
}

/// Regression: removing the head under the cursor sent later emits to the
/// tail instead of the front of the list.
#[test]
fn removing_head_under_cursor_keeps_position() {
    let mut p = Program::new(MachineMode::Long64);
    let head = p.emit_instruction(op(Mnemonic::Int3)).unwrap();
    p.emit_instruction(op(Mnemonic::Ret)).unwrap();
    p.set_cursor(Some(head)).unwrap();
    p.remove(head).unwrap();
    assert_eq!(p.cursor(), None);

    let nop = p.emit_instruction(op(Mnemonic::Nop)).unwrap();
    p.emit_instruction(op(Mnemonic::Hlt)).unwrap();
    assert_eq!(p.head(), Some(nop));
    assert_eq!(serialize(&p, 0).unwrap(), [0x90, 0xF4, 0xC3]);
}

/// Regression: physical section indices followed bind order while layout
/// followed the node list, so a section bound in front of an existing one
/// reported the wrong index.
#[test]
fn section_index_follows_layout_order() {
    let mut p = Program::new(MachineMode::Long64);
    let text = p
        .create_section(".text", SectionAttribs::CODE | SectionAttribs::EXEC, 1)
        .unwrap();
    let data = p.create_section(".data", SectionAttribs::DATA, 1).unwrap();
    let first = p.emit_instruction(op(Mnemonic::Nop)).unwrap();
    p.bind_section(data).unwrap();
    p.emit_data(7u8).unwrap();
    p.insert_before(first, relasm::Node::Section(text)).unwrap();

    assert_eq!(p.section_physical_index(text), Some(0));
    assert_eq!(p.section_physical_index(data), Some(1));

    let mut s = Serializer::new();
    s.serialize(&p, 0).unwrap();
    let order: Vec<_> = s.sections().iter().map(|info| info.section).collect();
    assert_eq!(order, [text, data]);
}
