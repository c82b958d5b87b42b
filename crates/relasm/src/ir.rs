//! Instruction-level types consumed by the program builder and the encoder.
//!
//! Nothing here knows about addresses: label references are carried as
//! [`Label`] handles and resolved later by the serializer.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Processor mode the program is assembled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MachineMode {
    /// 16-bit real mode.
    Real16,
    /// 32-bit protected mode.
    Legacy32,
    /// 32-bit compatibility sub-mode of long mode.
    Compat32,
    /// 64-bit long mode.
    Long64,
}

impl MachineMode {
    /// Width of an address in bytes (the size of an absolute address embed).
    #[must_use]
    pub fn pointer_size(self) -> u8 {
        match self {
            MachineMode::Real16 => 2,
            MachineMode::Legacy32 | MachineMode::Compat32 => 4,
            MachineMode::Long64 => 8,
        }
    }

    /// Whether this is 64-bit long mode.
    #[must_use]
    pub fn is_64bit(self) -> bool {
        self == MachineMode::Long64
    }

    /// Whether this is 16-bit real mode.
    #[must_use]
    pub fn is_16bit(self) -> bool {
        self == MachineMode::Real16
    }

    /// Default operand size in bits (16 in real mode, 32 otherwise).
    #[must_use]
    pub fn default_operand_bits(self) -> u16 {
        if self.is_16bit() {
            16
        } else {
            32
        }
    }
}

impl fmt::Display for MachineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineMode::Real16 => write!(f, "16-bit"),
            MachineMode::Legacy32 => write!(f, "32-bit"),
            MachineMode::Compat32 => write!(f, "32-bit compat"),
            MachineMode::Long64 => write!(f, "64-bit"),
        }
    }
}

// ─── Handles ──────────────────────────────────────────────────

/// Handle to a label created by [`Program::create_label`](crate::Program::create_label).
///
/// Ids are dense, assigned in creation order and never reused within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(pub(crate) u32);

impl Label {
    /// Numeric id of the label.
    #[must_use]
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Handle to a section created by [`Program::create_section`](crate::Program::create_section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Section(pub(crate) u32);

impl Section {
    /// Numeric id of the section.
    #[must_use]
    pub fn id(self) -> u32 {
        self.0
    }
}

// ─── Registers ────────────────────────────────────────────────

/// x86/x64 general-purpose register.
///
/// Each variant encodes its own size (see [`Register::size_bits`]) and
/// register number (see [`Register::base_code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Register {
    // 64-bit
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    // 32-bit
    Eax,
    Ecx,
    Edx,
    Ebx,
    Esp,
    Ebp,
    Esi,
    Edi,
    R8d,
    R9d,
    R10d,
    R11d,
    R12d,
    R13d,
    R14d,
    R15d,
    // 16-bit
    Ax,
    Cx,
    Dx,
    Bx,
    Sp,
    Bp,
    Si,
    Di,
    // 8-bit
    Al,
    Cl,
    Dl,
    Bl,
    Ah,
    Ch,
    Dh,
    Bh,
    /// Instruction pointer; valid only as the base of a memory operand.
    Rip,
}

impl Register {
    /// The 3-bit register encoding (bits 0-2 of the register number).
    #[must_use]
    pub fn base_code(self) -> u8 {
        use Register::*;
        match self {
            Rax | Eax | Ax | Al | R8 | R8d => 0,
            Rcx | Ecx | Cx | Cl | R9 | R9d => 1,
            Rdx | Edx | Dx | Dl | R10 | R10d => 2,
            Rbx | Ebx | Bx | Bl | R11 | R11d => 3,
            Rsp | Esp | Sp | Ah | R12 | R12d => 4,
            Rbp | Ebp | Bp | Ch | R13 | R13d => 5,
            Rsi | Esi | Si | Dh | R14 | R14d => 6,
            Rdi | Edi | Di | Bh | R15 | R15d => 7,
            Rip => 5, // mod=00 rm=101
        }
    }

    /// Whether bit 3 of the register number is set (R8–R15 family).
    #[must_use]
    pub fn is_extended(self) -> bool {
        use Register::*;
        matches!(
            self,
            R8 | R9 | R10 | R11 | R12 | R13 | R14 | R15 | R8d | R9d | R10d | R11d | R12d | R13d
                | R14d | R15d
        )
    }

    /// Operand width in bits.
    #[must_use]
    pub fn size_bits(self) -> u16 {
        use Register::*;
        match self {
            Rax | Rcx | Rdx | Rbx | Rsp | Rbp | Rsi | Rdi | R8 | R9 | R10 | R11 | R12 | R13
            | R14 | R15 | Rip => 64,
            Eax | Ecx | Edx | Ebx | Esp | Ebp | Esi | Edi | R8d | R9d | R10d | R11d | R12d
            | R13d | R14d | R15d => 32,
            Ax | Cx | Dx | Bx | Sp | Bp | Si | Di => 16,
            Al | Cl | Dl | Bl | Ah | Ch | Dh | Bh => 8,
        }
    }

    /// Whether this is AH, CH, DH or BH.
    #[must_use]
    pub fn is_high_byte(self) -> bool {
        matches!(self, Register::Ah | Register::Ch | Register::Dh | Register::Bh)
    }

    /// Whether the register only exists in 64-bit long mode.
    #[must_use]
    pub fn requires_long_mode(self) -> bool {
        self.size_bits() == 64 || self.is_extended()
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Zero-allocation: write Debug chars lowercased directly to the formatter.
        use fmt::Write as _;
        struct LowerWriter<'a, 'b>(&'a mut fmt::Formatter<'b>);
        impl fmt::Write for LowerWriter<'_, '_> {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                for c in s.chars() {
                    self.0.write_char(c.to_ascii_lowercase())?;
                }
                Ok(())
            }
        }
        write!(LowerWriter(f), "{:?}", self)
    }
}

// ─── Operands ─────────────────────────────────────────────────

/// A memory (indirect) operand.
///
/// When `label` is set, the label's address takes the place of the
/// displacement: with `base == Some(Rip)` the operand is RIP-relative,
/// with no base and no index it is an absolute `[label + disp]`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryOperand {
    /// Base register (e.g., `rbp` in `[rbp+8]`).
    pub base: Option<Register>,
    /// Index register for SIB addressing (e.g., `rsi` in `[rbx+rsi*4]`).
    pub index: Option<Register>,
    /// SIB scale factor: 1, 2, 4, or 8.
    pub scale: u8,
    /// Constant displacement in bytes (added to the label address if any).
    pub disp: i64,
    /// Label whose address is the displacement.
    pub label: Option<Label>,
}

impl MemoryOperand {
    /// `[base]`
    #[must_use]
    pub fn base(base: Register) -> Self {
        Self {
            base: Some(base),
            ..Self::default()
        }
    }

    /// `[base + disp]`
    #[must_use]
    pub fn base_disp(base: Register, disp: i64) -> Self {
        Self {
            base: Some(base),
            disp,
            ..Self::default()
        }
    }

    /// `[base + index*scale + disp]`
    #[must_use]
    pub fn sib(base: Option<Register>, index: Register, scale: u8, disp: i64) -> Self {
        Self {
            base,
            index: Some(index),
            scale,
            disp,
            label: None,
        }
    }

    /// `[disp]` with a constant absolute address.
    #[must_use]
    pub fn absolute(disp: i64) -> Self {
        Self {
            disp,
            ..Self::default()
        }
    }

    /// `[label]` absolute label address.
    #[must_use]
    pub fn label(label: Label) -> Self {
        Self {
            label: Some(label),
            ..Self::default()
        }
    }

    /// `[rip + label]` (64-bit mode only).
    #[must_use]
    pub fn rip_label(label: Label) -> Self {
        Self {
            base: Some(Register::Rip),
            label: Some(label),
            ..Self::default()
        }
    }

    /// Whether the operand is `[rip + ...]`.
    #[must_use]
    pub fn is_rip_relative(&self) -> bool {
        self.base == Some(Register::Rip)
    }
}

impl Default for MemoryOperand {
    fn default() -> Self {
        Self {
            base: None,
            index: None,
            scale: 1,
            disp: 0,
            label: None,
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// A register operand.
    Register(Register),
    /// An immediate value.
    Immediate(i64),
    /// A memory (indirect) operand.
    Memory(Box<MemoryOperand>),
    /// A branch target.
    Label(Label),
}

impl Operand {
    /// Label referenced by this operand, directly or through memory.
    #[must_use]
    pub fn label(&self) -> Option<Label> {
        match self {
            Operand::Label(l) => Some(*l),
            Operand::Memory(m) => m.label,
            _ => None,
        }
    }
}

impl From<Register> for Operand {
    fn from(r: Register) -> Self {
        Operand::Register(r)
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Immediate(v)
    }
}

impl From<MemoryOperand> for Operand {
    fn from(m: MemoryOperand) -> Self {
        Operand::Memory(Box::new(m))
    }
}

impl From<Label> for Operand {
    fn from(l: Label) -> Self {
        Operand::Label(l)
    }
}

// ─── Mnemonics ────────────────────────────────────────────────

/// Condition code for `jcc`, in hardware encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Condition {
    O,
    No,
    B,
    Ae,
    E,
    Ne,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

impl Condition {
    /// All sixteen conditions in encoding order.
    pub const ALL: [Condition; 16] = [
        Condition::O,
        Condition::No,
        Condition::B,
        Condition::Ae,
        Condition::E,
        Condition::Ne,
        Condition::Be,
        Condition::A,
        Condition::S,
        Condition::Ns,
        Condition::P,
        Condition::Np,
        Condition::L,
        Condition::Ge,
        Condition::Le,
        Condition::G,
    ];

    /// The 4-bit `cc` field (`7x` / `0F 8x`).
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    fn suffix(self) -> &'static str {
        match self {
            Condition::O => "o",
            Condition::No => "no",
            Condition::B => "b",
            Condition::Ae => "ae",
            Condition::E => "e",
            Condition::Ne => "ne",
            Condition::Be => "be",
            Condition::A => "a",
            Condition::S => "s",
            Condition::Ns => "ns",
            Condition::P => "p",
            Condition::Np => "np",
            Condition::L => "l",
            Condition::Ge => "ge",
            Condition::Le => "le",
            Condition::G => "g",
        }
    }
}

/// Instruction mnemonic supported by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Mnemonic {
    Nop,
    Int3,
    Hlt,
    Ret,
    Push,
    Pop,
    Mov,
    Lea,
    Add,
    Or,
    And,
    Sub,
    Xor,
    Cmp,
    Jmp,
    Call,
    Jcc(Condition),
}

impl Mnemonic {
    /// ALU `/digit` for the `81`/`83` group, `None` for non-ALU mnemonics.
    #[must_use]
    pub fn alu_digit(self) -> Option<u8> {
        match self {
            Mnemonic::Add => Some(0),
            Mnemonic::Or => Some(1),
            Mnemonic::And => Some(4),
            Mnemonic::Sub => Some(5),
            Mnemonic::Xor => Some(6),
            Mnemonic::Cmp => Some(7),
            _ => None,
        }
    }

    /// Whether this is a relaxable branch (`jmp` or `jcc`).
    #[must_use]
    pub fn is_relaxable_branch(self) -> bool {
        matches!(self, Mnemonic::Jmp | Mnemonic::Jcc(_))
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mnemonic::Nop => "nop",
            Mnemonic::Int3 => "int3",
            Mnemonic::Hlt => "hlt",
            Mnemonic::Ret => "ret",
            Mnemonic::Push => "push",
            Mnemonic::Pop => "pop",
            Mnemonic::Mov => "mov",
            Mnemonic::Lea => "lea",
            Mnemonic::Add => "add",
            Mnemonic::Or => "or",
            Mnemonic::And => "and",
            Mnemonic::Sub => "sub",
            Mnemonic::Xor => "xor",
            Mnemonic::Cmp => "cmp",
            Mnemonic::Jmp => "jmp",
            Mnemonic::Call => "call",
            Mnemonic::Jcc(cc) => return write!(f, "j{}", cc.suffix()),
        };
        f.write_str(s)
    }
}

// ─── Instruction ──────────────────────────────────────────────

/// A single instruction: mnemonic plus up to two operands.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// The mnemonic.
    pub mnemonic: Mnemonic,
    /// Operands in Intel order (destination first).
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Instruction without operands.
    #[must_use]
    pub fn new(mnemonic: Mnemonic) -> Self {
        Self {
            mnemonic,
            operands: Vec::new(),
        }
    }

    /// Instruction with one operand.
    #[must_use]
    pub fn with1(mnemonic: Mnemonic, a: impl Into<Operand>) -> Self {
        Self {
            mnemonic,
            operands: alloc::vec![a.into()],
        }
    }

    /// Instruction with two operands.
    #[must_use]
    pub fn with2(mnemonic: Mnemonic, a: impl Into<Operand>, b: impl Into<Operand>) -> Self {
        Self {
            mnemonic,
            operands: alloc::vec![a.into(), b.into()],
        }
    }

    /// The label this instruction depends on, if any.
    #[must_use]
    pub fn label(&self) -> Option<Label> {
        self.operands.iter().find_map(Operand::label)
    }

    /// Whether the encoding depends on label addresses.
    #[must_use]
    pub fn is_address_dependent(&self) -> bool {
        self.label().is_some()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match op {
                Operand::Register(r) => write!(f, "{}", r)?,
                Operand::Immediate(v) => write!(f, "{}", v)?,
                Operand::Label(l) => write!(f, "{}", l)?,
                Operand::Memory(m) => {
                    f.write_str("[")?;
                    let mut first = true;
                    if let Some(b) = m.base {
                        write!(f, "{}", b)?;
                        first = false;
                    }
                    if let Some(ix) = m.index {
                        if !first {
                            f.write_str("+")?;
                        }
                        write!(f, "{}*{}", ix, m.scale)?;
                        first = false;
                    }
                    if let Some(l) = m.label {
                        if !first {
                            f.write_str("+")?;
                        }
                        write!(f, "{}", l)?;
                        first = false;
                    }
                    if m.disp != 0 || first {
                        if !first && m.disp >= 0 {
                            f.write_str("+")?;
                        }
                        write!(f, "{}", m.disp)?;
                    }
                    f.write_str("]")?;
                }
            }
        }
        Ok(())
    }
}

// ─── Widths and section attributes ───────────────────────────

/// Width of a relative-difference embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BitSize {
    /// 8 bits.
    B8,
    /// 16 bits.
    B16,
    /// 32 bits.
    B32,
    /// 64 bits.
    B64,
}

impl BitSize {
    /// Width in bytes.
    #[must_use]
    pub fn bytes(self) -> u8 {
        match self {
            BitSize::B8 => 1,
            BitSize::B16 => 2,
            BitSize::B32 => 4,
            BitSize::B64 => 8,
        }
    }

    /// Map a bit count to a width; only 8, 16, 32 and 64 are accepted.
    #[must_use]
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(BitSize::B8),
            16 => Some(BitSize::B16),
            32 => Some(BitSize::B32),
            64 => Some(BitSize::B64),
            _ => None,
        }
    }
}

/// Section attribute flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectionAttribs(u32);

impl SectionAttribs {
    /// No attributes.
    pub const NONE: Self = Self(0);
    /// Contains code.
    pub const CODE: Self = Self(1 << 0);
    /// Contains initialized data.
    pub const DATA: Self = Self(1 << 1);
    /// Readable.
    pub const READ: Self = Self(1 << 2);
    /// Writable.
    pub const WRITE: Self = Self(1 << 3);
    /// Executable.
    pub const EXEC: Self = Self(1 << 4);

    /// Raw flag bits.
    #[must_use]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the section holds executable bytes (`CODE` or `EXEC`).
    #[must_use]
    pub fn is_executable(self) -> bool {
        self.0 & (Self::CODE.0 | Self::EXEC.0) != 0
    }

    /// Byte used for implicit padding in front of this section.
    #[must_use]
    pub fn padding_byte(self) -> u8 {
        if self.is_executable() {
            0xCC
        } else {
            0x00
        }
    }
}

impl core::ops::BitOr for SectionAttribs {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for SectionAttribs {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for SectionAttribs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(SectionAttribs, &str); 5] = [
            (SectionAttribs::CODE, "code"),
            (SectionAttribs::DATA, "data"),
            (SectionAttribs::READ, "read"),
            (SectionAttribs::WRITE, "write"),
            (SectionAttribs::EXEC, "exec"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn mode_pointer_sizes() {
        assert_eq!(MachineMode::Real16.pointer_size(), 2);
        assert_eq!(MachineMode::Legacy32.pointer_size(), 4);
        assert_eq!(MachineMode::Compat32.pointer_size(), 4);
        assert_eq!(MachineMode::Long64.pointer_size(), 8);
        assert!(MachineMode::Long64.is_64bit());
        assert!(!MachineMode::Compat32.is_64bit());
        assert_eq!(MachineMode::Real16.default_operand_bits(), 16);
        assert_eq!(MachineMode::Long64.default_operand_bits(), 32);
    }

    #[test]
    fn register_codes() {
        assert_eq!(Register::Rax.base_code(), 0);
        assert_eq!(Register::R12.base_code(), 4);
        assert!(Register::R12.is_extended());
        assert!(!Register::Rsp.is_extended());
        assert_eq!(Register::Bh.base_code(), 7);
        assert!(Register::Bh.is_high_byte());
        assert_eq!(Register::R9d.size_bits(), 32);
        assert!(Register::R9d.requires_long_mode());
        assert!(!Register::Eax.requires_long_mode());
    }

    #[test]
    fn register_display_lowercase() {
        assert_eq!(format!("{}", Register::R10d), "r10d");
        assert_eq!(format!("{}", Register::Rip), "rip");
    }

    #[test]
    fn condition_codes_in_order() {
        for (i, cc) in Condition::ALL.iter().enumerate() {
            assert_eq!(cc.code() as usize, i);
        }
        assert_eq!(format!("{}", Mnemonic::Jcc(Condition::Ne)), "jne");
    }

    #[test]
    fn instruction_label_lookup() {
        let l = Label(3);
        let jmp = Instruction::with1(Mnemonic::Jmp, l);
        assert_eq!(jmp.label(), Some(l));
        let lea = Instruction::with2(Mnemonic::Lea, Register::Rax, MemoryOperand::rip_label(l));
        assert_eq!(lea.label(), Some(l));
        assert!(lea.is_address_dependent());
        let mov = Instruction::with2(Mnemonic::Mov, Register::Eax, 1i64);
        assert!(!mov.is_address_dependent());
    }

    #[test]
    fn instruction_display() {
        let i = Instruction::with2(
            Mnemonic::Mov,
            Register::Eax,
            MemoryOperand::base_disp(Register::Ebx, -8),
        );
        assert_eq!(format!("{}", i), "mov eax, [ebx-8]");
        let i = Instruction::with2(Mnemonic::Lea, Register::Rax, MemoryOperand::rip_label(Label(0)));
        assert_eq!(format!("{}", i), "lea rax, [rip+L0]");
    }

    #[test]
    fn bit_size_from_bits() {
        assert_eq!(BitSize::from_bits(16), Some(BitSize::B16));
        assert_eq!(BitSize::from_bits(24), None);
        assert_eq!(BitSize::B64.bytes(), 8);
    }

    #[test]
    fn section_attribs_flags() {
        let a = SectionAttribs::CODE | SectionAttribs::READ;
        assert!(a.contains(SectionAttribs::CODE));
        assert!(!a.contains(SectionAttribs::WRITE));
        assert!(a.is_executable());
        assert_eq!(a.padding_byte(), 0xCC);
        let d = SectionAttribs::DATA | SectionAttribs::WRITE;
        assert_eq!(d.padding_byte(), 0x00);
        assert_eq!(format!("{}", a), "code|read");
        assert_eq!(format!("{}", SectionAttribs::NONE), "none");
    }
}
