#![no_main]
use libfuzzer_sys::fuzz_target;
use relasm::{
    AlignMode, BitSize, Condition, Data, Instruction, Label, MachineMode, MemoryOperand, Mnemonic,
    Program, Register, Serializer,
};

const LABELS: u8 = 8;

fuzz_target!(|data: &[u8]| {
    // Interpret the input as a little program; serialization must never
    // panic, only return Ok/Err.
    let Some((&mode, rest)) = data.split_first() else {
        return;
    };
    let mode = match mode % 4 {
        0 => MachineMode::Real16,
        1 => MachineMode::Legacy32,
        2 => MachineMode::Compat32,
        _ => MachineMode::Long64,
    };
    let mut p = Program::new(mode);
    let labels: Vec<Label> = (0..LABELS).map(|_| p.create_label().unwrap()).collect();

    let mut chunks = rest.chunks_exact(3);
    for chunk in &mut chunks {
        let (kind, a, b) = (chunk[0], chunk[1], chunk[2]);
        let label = labels[(a % LABELS) as usize];
        let _ = match kind % 10 {
            0 => p.emit_instruction(Instruction::new(Mnemonic::Nop)),
            1 => p.bind_label(label),
            2 => p.emit_instruction(Instruction::with1(Mnemonic::Jmp, label)),
            3 => p.emit_instruction(Instruction::with1(
                Mnemonic::Jcc(Condition::ALL[(b % 16) as usize]),
                label,
            )),
            4 => p.emit_instruction(Instruction::with1(Mnemonic::Call, label)),
            5 => p.emit_data(Data::filled(b, a as usize)),
            6 => p.emit_align(1 << (b % 6), AlignMode::Code),
            7 => p.emit_embed_label_rel(label, labels[(b % LABELS) as usize], BitSize::B16),
            8 => p.emit_instruction(Instruction::with2(
                Mnemonic::Lea,
                Register::Eax,
                MemoryOperand::label(label),
            )),
            _ => p.emit_embed_label(label),
        };
    }

    let base = 0x40_0000;
    let mut s = Serializer::new();
    match s.serialize(&p, base) {
        Ok(()) => {
            let end = base + s.code_size() as u64;
            for &label in &labels {
                if let Some(addr) = s.label_address(label) {
                    assert!((base..=end).contains(&addr));
                }
            }
        }
        Err(_) => assert_eq!(s.code_size(), 0),
    }
});
