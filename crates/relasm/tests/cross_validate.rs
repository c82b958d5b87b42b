//! Cross-validation tests: serialize with relasm, decode with iced-x86.
//!
//! Every program is decoded back instruction by instruction; mnemonics,
//! lengths and branch targets must agree with what was built.

use iced_x86::{Decoder, DecoderOptions, Formatter, IntelFormatter, Mnemonic as IcedMnemonic};
use relasm::{
    Condition, Instruction, MachineMode, MemoryOperand, Mnemonic, Program, Register, Serializer,
};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn bitness(mode: MachineMode) -> u32 {
    match mode {
        MachineMode::Real16 => 16,
        MachineMode::Legacy32 | MachineMode::Compat32 => 32,
        MachineMode::Long64 => 64,
    }
}

/// Serialize a single instruction and decode it.
fn encode_and_decode(mode: MachineMode, instr: Instruction) -> (IcedMnemonic, String) {
    let mut p = Program::new(mode);
    p.emit_instruction(instr.clone()).unwrap();
    let mut s = Serializer::new();
    s.serialize(&p, 0x1000)
        .unwrap_or_else(|e| panic!("relasm failed on `{instr}`: {e}"));
    let bytes = s.code();

    let mut decoder = Decoder::with_ip(bitness(mode), bytes, 0x1000, DecoderOptions::NONE);
    let decoded = decoder.decode();
    assert_ne!(
        decoded.mnemonic(),
        IcedMnemonic::INVALID,
        "iced-x86 decoded INVALID for `{instr}` → {:02X?}",
        bytes
    );
    assert_eq!(
        decoded.len(),
        bytes.len(),
        "iced-x86 decoded {} bytes but relasm emitted {} for `{instr}` → {:02X?}",
        decoded.len(),
        bytes.len(),
        bytes
    );
    let mut formatter = IntelFormatter::new();
    let mut output = String::new();
    formatter.format(&decoded, &mut output);
    (decoded.mnemonic(), output)
}

fn verify(mode: MachineMode, instr: Instruction, expected: &str) {
    let (_, formatted) = encode_and_decode(mode, instr.clone());
    assert_eq!(formatted, expected, "`{instr}` decoded as `{formatted}`");
}

// ─── Single instructions ─────────────────────────────────────────────────────

#[test]
fn long_mode_instructions() {
    use Register::*;
    let m = MachineMode::Long64;
    verify(m, Instruction::new(Mnemonic::Nop), "nop");
    verify(m, Instruction::with1(Mnemonic::Push, R12), "push r12");
    verify(m, Instruction::with1(Mnemonic::Pop, Rbp), "pop rbp");
    verify(m, Instruction::with2(Mnemonic::Mov, Rax, R9), "mov rax,r9");
    verify(m, Instruction::with2(Mnemonic::Mov, Ecx, 42i64), "mov ecx,2Ah");
    verify(
        m,
        Instruction::with2(Mnemonic::Mov, Rax, 0x1122_3344_5566_7788i64),
        "mov rax,1122334455667788h",
    );
    verify(
        m,
        Instruction::with2(Mnemonic::Lea, Rdx, MemoryOperand::sib(Some(Rbx), Rsi, 8, 16)),
        "lea rdx,[rbx+rsi*8+10h]",
    );
    verify(m, Instruction::with2(Mnemonic::Sub, Rsp, 0x28i64), "sub rsp,28h");
    verify(m, Instruction::with2(Mnemonic::Xor, R8d, R8d), "xor r8d,r8d");
    verify(m, Instruction::with2(Mnemonic::And, Al, 0x7Fi64), "and al,7Fh");
    verify(m, Instruction::with1(Mnemonic::Call, Rax), "call rax");
    verify(m, Instruction::with1(Mnemonic::Ret, 16i64), "ret 10h");
}

#[test]
fn legacy_mode_instructions() {
    use Register::*;
    let m = MachineMode::Legacy32;
    verify(m, Instruction::with1(Mnemonic::Push, Ebp), "push ebp");
    verify(
        m,
        Instruction::with2(Mnemonic::Mov, Eax, MemoryOperand::base_disp(Ebp, -8)),
        "mov eax,[ebp-8]",
    );
    verify(m, Instruction::with2(Mnemonic::Cmp, Ax, 0x1234i64), "cmp ax,1234h");
    verify(m, Instruction::with2(Mnemonic::Add, Bh, Cl), "add bh,cl");
}

#[test]
fn real_mode_instructions() {
    use Register::*;
    let m = MachineMode::Real16;
    verify(m, Instruction::with1(Mnemonic::Push, Ax), "push ax");
    verify(m, Instruction::with2(Mnemonic::Mov, Bx, 0x7C00i64), "mov bx,7C00h");
    verify(m, Instruction::with2(Mnemonic::Mov, Eax, Ebx), "mov eax,ebx");
}

// ─── Branch targets ──────────────────────────────────────────────────────────

/// Decode a serialized program and return `(ip, mnemonic, near_branch_target)`.
fn decode_all(mode: MachineMode, code: &[u8], base: u64) -> Vec<(u64, IcedMnemonic, u64)> {
    let mut decoder = Decoder::with_ip(bitness(mode), code, base, DecoderOptions::NONE);
    let mut out = Vec::new();
    while decoder.can_decode() {
        let instr = decoder.decode();
        assert_ne!(instr.mnemonic(), IcedMnemonic::INVALID, "invalid at {:#x}", instr.ip());
        out.push((instr.ip(), instr.mnemonic(), instr.near_branch_target()));
    }
    out
}

#[test]
fn relaxed_branches_decode_to_label_addresses() {
    for mode in [MachineMode::Legacy32, MachineMode::Long64] {
        let mut p = Program::new(mode);
        let head = p.create_label().unwrap();
        let mid = p.create_label().unwrap();
        let tail = p.create_label().unwrap();

        p.bind_label(head).unwrap();
        p.emit_instruction(Instruction::with1(Mnemonic::Jcc(Condition::Le), tail))
            .unwrap();
        for _ in 0..40 {
            p.emit_instruction(Instruction::new(Mnemonic::Nop)).unwrap();
        }
        p.bind_label(mid).unwrap();
        p.emit_instruction(Instruction::with1(Mnemonic::Call, head)).unwrap();
        for _ in 0..200 {
            p.emit_instruction(Instruction::new(Mnemonic::Nop)).unwrap();
        }
        p.emit_instruction(Instruction::with1(Mnemonic::Jmp, mid)).unwrap();
        p.emit_instruction(Instruction::with1(Mnemonic::Jmp, head)).unwrap();
        p.bind_label(tail).unwrap();
        p.emit_instruction(Instruction::new(Mnemonic::Ret)).unwrap();

        let base = 0x40_0000;
        let mut s = Serializer::new();
        s.serialize(&p, base).unwrap();
        let decoded = decode_all(mode, s.code(), base);
        let branches: Vec<_> = decoded
            .iter()
            .filter(|(_, m, _)| !matches!(m, IcedMnemonic::Nop | IcedMnemonic::Ret))
            .collect();

        assert_eq!(branches.len(), 4, "{mode}");
        assert_eq!(branches[0].1, IcedMnemonic::Jle);
        assert_eq!(Some(branches[0].2), s.label_address(tail));
        assert_eq!(branches[1].1, IcedMnemonic::Call);
        assert_eq!(Some(branches[1].2), s.label_address(head));
        assert_eq!(branches[2].1, IcedMnemonic::Jmp);
        assert_eq!(Some(branches[2].2), s.label_address(mid));
        assert_eq!(branches[3].1, IcedMnemonic::Jmp);
        assert_eq!(Some(branches[3].2), s.label_address(head));
    }
}

#[test]
fn every_condition_code_decodes() {
    let iced = [
        IcedMnemonic::Jo,
        IcedMnemonic::Jno,
        IcedMnemonic::Jb,
        IcedMnemonic::Jae,
        IcedMnemonic::Je,
        IcedMnemonic::Jne,
        IcedMnemonic::Jbe,
        IcedMnemonic::Ja,
        IcedMnemonic::Js,
        IcedMnemonic::Jns,
        IcedMnemonic::Jp,
        IcedMnemonic::Jnp,
        IcedMnemonic::Jl,
        IcedMnemonic::Jge,
        IcedMnemonic::Jle,
        IcedMnemonic::Jg,
    ];
    for (cond, expected) in Condition::ALL.into_iter().zip(iced) {
        let mut p = Program::new(MachineMode::Long64);
        let l = p.create_label().unwrap();
        p.bind_label(l).unwrap();
        p.emit_instruction(Instruction::with1(Mnemonic::Jcc(cond), l)).unwrap();
        let mut s = Serializer::new();
        s.serialize(&p, 0x1000).unwrap();
        let decoded = decode_all(MachineMode::Long64, s.code(), 0x1000);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].1, expected, "{cond:?}");
        assert_eq!(decoded[0].2, 0x1000);
    }
}
