//! x86 instruction encoder.
//!
//! Encodes [`Instruction`]s into machine-code bytes for a given
//! [`MachineMode`], with manual ModR/M, SIB and REX prefix construction.
//!
//! Label operands are resolved through the [`EncodeContext`]: the encoder is
//! told where the instruction will live and asked to look up label
//! addresses.  When a label's address is not known yet the widest encoding
//! is produced and the label-dependent field is left zeroed; the returned
//! [`Fixup`] describes that field either way.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::AsmError;
use crate::ir::*;

// ─── InstrBytes: stack-allocated instruction buffer ────────────────────

/// Capacity of [`InstrBytes`]; x86 instructions are at most 15 bytes.
const INSTR_CAPACITY: usize = 16;

/// Stack-allocated instruction byte buffer, so encoding an instruction never
/// touches the heap.
#[derive(Clone)]
pub struct InstrBytes {
    data: [u8; INSTR_CAPACITY],
    len: u8,
}

impl InstrBytes {
    /// Create an empty buffer.
    #[inline]
    pub const fn new() -> Self {
        Self {
            data: [0; INSTR_CAPACITY],
            len: 0,
        }
    }

    /// Create a buffer pre-filled from a byte slice.
    #[inline]
    pub fn from_slice(src: &[u8]) -> Self {
        let mut buf = Self::new();
        buf.extend_from_slice(src);
        buf
    }

    /// Append a single byte.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is already full.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        assert!(
            (self.len as usize) < INSTR_CAPACITY,
            "InstrBytes overflow: cannot push beyond {} bytes",
            INSTR_CAPACITY
        );
        self.data[self.len as usize] = byte;
        self.len += 1;
    }

    /// Append a slice of bytes.
    ///
    /// # Panics
    ///
    /// Panics if appending would exceed the capacity.
    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let start = self.len as usize;
        let end = start + bytes.len();
        assert!(
            end <= INSTR_CAPACITY,
            "InstrBytes overflow: {} + {} exceeds {}-byte capacity",
            start,
            bytes.len(),
            INSTR_CAPACITY
        );
        self.data[start..end].copy_from_slice(bytes);
        self.len = end as u8;
    }

    /// Number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert to a heap-allocated `Vec<u8>`.
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl Default for InstrBytes {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for InstrBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl core::ops::DerefMut for InstrBytes {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len as usize]
    }
}

impl AsRef<[u8]> for InstrBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl core::fmt::Debug for InstrBytes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02X?}", &**self)
    }
}

impl PartialEq for InstrBytes {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for InstrBytes {}

impl PartialEq<[u8]> for InstrBytes {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

impl PartialEq<Vec<u8>> for InstrBytes {
    fn eq(&self, other: &Vec<u8>) -> bool {
        **self == **other
    }
}

// ─── Context and results ─────────────────────────────────────

/// Where an instruction is placed and how to find label addresses.
#[derive(Clone, Copy)]
pub struct EncodeContext<'a> {
    /// Virtual address of the instruction's first byte.
    pub address: u64,
    /// Best known address of a label, `None` if unknown.
    pub lookup: &'a dyn Fn(Label) -> Option<u64>,
    /// Final emission: unknown labels and out-of-range values are errors
    /// instead of placeholders.
    pub strict: bool,
    /// Skip the short form of relaxable branches.
    pub near: bool,
}

impl<'a> EncodeContext<'a> {
    /// Context for a relaxation pass.
    pub fn new(address: u64, lookup: &'a dyn Fn(Label) -> Option<u64>) -> Self {
        Self {
            address,
            lookup,
            strict: false,
            near: false,
        }
    }

    /// Context for final emission.
    pub fn strict(address: u64, lookup: &'a dyn Fn(Label) -> Option<u64>) -> Self {
        Self {
            address,
            lookup,
            strict: true,
            near: false,
        }
    }

    /// The same context with relaxable branches pinned to the near form.
    #[must_use]
    pub fn with_near(self) -> Self {
        Self { near: true, ..self }
    }
}

impl core::fmt::Debug for EncodeContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EncodeContext")
            .field("address", &self.address)
            .field("strict", &self.strict)
            .field("near", &self.near)
            .finish_non_exhaustive()
    }
}

/// How a label-dependent field is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixupKind {
    /// `label + addend`.
    Absolute,
    /// `label + addend - end_of_instruction`.
    Relative,
}

/// A label-dependent field inside an encoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup {
    /// Byte offset of the field from the start of the instruction.
    pub offset: usize,
    /// Field width in bytes.
    pub size: u8,
    /// Referenced label.
    pub label: Label,
    /// How the value is computed.
    pub kind: FixupKind,
    /// Bytes between the end of the field and the end of the instruction.
    pub trailing_bytes: u8,
    /// Whether the field holds the label's value (`false`: zero placeholder).
    pub resolved: bool,
}

/// Result of encoding a single instruction.
#[derive(Debug, Clone)]
pub struct EncodedInstr {
    /// The machine code bytes.
    pub bytes: InstrBytes,
    /// The label-dependent field, if the instruction references a label.
    pub fixup: Option<Fixup>,
}

/// Field reserved during encoding, patched once the length is final.
#[derive(Debug, Clone, Copy)]
struct PendingFixup {
    offset: usize,
    size: u8,
    label: Label,
    kind: FixupKind,
    addend: i64,
}

// ─── Entry point ──────────────────────────────────────────────

/// Encode `instr` for `mode` at the address given by `ctx`.
///
/// # Errors
///
/// - [`AsmError::InvalidMode`] when a register or addressing form does not
///   exist in `mode`.
/// - [`AsmError::InvalidOperands`] for an unsupported operand combination.
/// - [`AsmError::ImmediateOverflow`] when an immediate does not fit.
/// - In strict mode, [`AsmError::UnresolvedLabel`] and
///   [`AsmError::DisplacementOutOfRange`] for label fields.
pub fn encode(
    mode: MachineMode,
    instr: &Instruction,
    ctx: &EncodeContext<'_>,
) -> Result<EncodedInstr, AsmError> {
    validate_operands(mode, instr)?;

    let mut buf = InstrBytes::new();
    let mut pending: Option<PendingFixup> = None;
    let ops = instr.operands.as_slice();

    match instr.mnemonic {
        Mnemonic::Nop => encode_fixed(&mut buf, ops, instr, 0x90)?,
        Mnemonic::Int3 => encode_fixed(&mut buf, ops, instr, 0xCC)?,
        Mnemonic::Hlt => encode_fixed(&mut buf, ops, instr, 0xF4)?,
        Mnemonic::Ret => encode_ret(&mut buf, ops, instr)?,
        Mnemonic::Push => encode_push_pop(&mut buf, mode, ops, instr, 0x50)?,
        Mnemonic::Pop => encode_push_pop(&mut buf, mode, ops, instr, 0x58)?,
        Mnemonic::Mov => encode_mov(&mut buf, mode, ops, instr, &mut pending)?,
        Mnemonic::Lea => encode_lea(&mut buf, mode, ops, instr, &mut pending)?,
        Mnemonic::Add
        | Mnemonic::Or
        | Mnemonic::And
        | Mnemonic::Sub
        | Mnemonic::Xor
        | Mnemonic::Cmp => encode_alu(&mut buf, mode, ops, instr)?,
        Mnemonic::Jmp | Mnemonic::Call | Mnemonic::Jcc(_) => {
            encode_branch(&mut buf, mode, ops, instr, ctx, &mut pending)?
        }
    }

    let fixup = match pending {
        Some(p) => Some(apply_fixup(&mut buf, mode, p, ctx)?),
        None => None,
    };
    Ok(EncodedInstr { bytes: buf, fixup })
}

/// Resolve a reserved label field and write its value into `buf`.
fn apply_fixup(
    buf: &mut InstrBytes,
    mode: MachineMode,
    p: PendingFixup,
    ctx: &EncodeContext<'_>,
) -> Result<Fixup, AsmError> {
    let len = buf.len();
    let trailing_bytes = (len - p.offset - p.size as usize) as u8;
    let mut fixup = Fixup {
        offset: p.offset,
        size: p.size,
        label: p.label,
        kind: p.kind,
        trailing_bytes,
        resolved: false,
    };

    let Some(target) = (ctx.lookup)(p.label) else {
        if ctx.strict {
            return Err(AsmError::UnresolvedLabel {
                id: p.label.id(),
                name: None,
            });
        }
        return Ok(fixup);
    };

    let value = match p.kind {
        FixupKind::Absolute => target as i128 + p.addend as i128,
        FixupKind::Relative => {
            target as i128 + p.addend as i128 - (ctx.address as i128 + len as i128)
        }
    };

    if let Some((min, max)) = field_range(mode, p.kind, p.size) {
        if !(min..=max).contains(&value) && ctx.strict {
            return Err(AsmError::DisplacementOutOfRange {
                label: p.label.id(),
                value: value as i64,
                size: p.size,
            });
        }
    }

    let bytes = (value as u64).to_le_bytes();
    buf[p.offset..p.offset + p.size as usize].copy_from_slice(&bytes[..p.size as usize]);
    fixup.resolved = true;
    Ok(fixup)
}

/// Accepted value range of a label field, `None` when the field wraps.
fn field_range(mode: MachineMode, kind: FixupKind, size: u8) -> Option<(i128, i128)> {
    match (kind, size) {
        (_, 1) => Some((i8::MIN as i128, i8::MAX as i128)),
        // rel32 / rip disp32 / SIB [disp32] are sign-extended to 64 bits.
        (_, 4) if mode.is_64bit() => Some((i32::MIN as i128, i32::MAX as i128)),
        (FixupKind::Absolute, 4) => Some((i32::MIN as i128, u32::MAX as i128)),
        (FixupKind::Absolute, 2) => Some((i16::MIN as i128, u16::MAX as i128)),
        // rel16 / rel32 outside long mode wrap around the segment.
        _ => None,
    }
}

// ─── Validation ───────────────────────────────────────────────

fn validate_operands(mode: MachineMode, instr: &Instruction) -> Result<(), AsmError> {
    for op in &instr.operands {
        match op {
            Operand::Register(Register::Rip) => {
                return Err(invalid_operands(
                    instr,
                    "rip is only valid as a memory base",
                ))
            }
            Operand::Register(reg) => check_register(mode, *reg)?,
            Operand::Memory(mem) => check_memory(mode, instr, mem)?,
            _ => {}
        }
    }
    Ok(())
}

fn check_register(mode: MachineMode, reg: Register) -> Result<(), AsmError> {
    if reg.requires_long_mode() && !mode.is_64bit() {
        return Err(AsmError::InvalidMode {
            mode,
            detail: format!("register {}", reg),
        });
    }
    Ok(())
}

fn check_memory(
    mode: MachineMode,
    instr: &Instruction,
    mem: &MemoryOperand,
) -> Result<(), AsmError> {
    if mode.is_16bit() && (mem.base.is_some() || mem.index.is_some()) {
        return Err(AsmError::InvalidMode {
            mode,
            detail: String::from("base or index register in a memory operand"),
        });
    }
    if mem.is_rip_relative() {
        if !mode.is_64bit() {
            return Err(AsmError::InvalidMode {
                mode,
                detail: String::from("rip-relative addressing"),
            });
        }
        if mem.index.is_some() {
            return Err(invalid_operands(instr, "rip-relative operand cannot have an index"));
        }
    }
    let addr_bits = if mode.is_64bit() { 64 } else { 32 };
    for reg in mem.base.iter().chain(mem.index.iter()) {
        if *reg == Register::Rip {
            continue;
        }
        check_register(mode, *reg)?;
        if reg.size_bits() != addr_bits {
            return Err(invalid_operands(
                instr,
                &format!("address register {} must be {}-bit", reg, addr_bits),
            ));
        }
    }
    if matches!(mem.index, Some(Register::Rsp | Register::Esp | Register::Rip)) {
        return Err(invalid_operands(instr, "stack pointer cannot be an index register"));
    }
    if !matches!(mem.scale, 1 | 2 | 4 | 8) {
        return Err(invalid_operands(instr, "scale must be 1, 2, 4 or 8"));
    }
    if mem.label.is_some() && (mem.index.is_some() || (mem.base.is_some() && !mem.is_rip_relative())) {
        return Err(invalid_operands(
            instr,
            "label address cannot be combined with base or index registers",
        ));
    }
    let disp_fits = if mode.is_16bit() {
        (i16::MIN as i64..=u16::MAX as i64).contains(&mem.disp)
    } else {
        i32::try_from(mem.disp).is_ok()
    };
    if !disp_fits && mem.label.is_none() {
        return Err(invalid_operands(instr, "displacement does not fit the address size"));
    }
    Ok(())
}

// ─── REX / ModR/M / SIB helpers ──────────────────────────────

/// Build a REX prefix byte.
#[inline]
pub(crate) fn rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    let mut val: u8 = 0x40;
    if w {
        val |= 0x08;
    }
    if r {
        val |= 0x04;
    }
    if x {
        val |= 0x02;
    }
    if b {
        val |= 0x01;
    }
    val
}

/// Whether a REX prefix with at least one flag is needed.
#[inline]
pub(crate) fn needs_rex(w: bool, r: bool, x: bool, b: bool) -> bool {
    w || r || x || b
}

/// Build ModR/M byte.
#[inline]
pub(crate) fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// Build SIB byte.
#[inline]
fn sib(scale: u8, index: u8, base: u8) -> u8 {
    let ss = match scale {
        2 => 1,
        4 => 2,
        8 => 3,
        _ => 0,
    };
    (ss << 6) | ((index & 7) << 3) | (base & 7)
}

/// Emit `66` when `bits` differs from the mode's default operand size.
#[inline]
fn emit_operand_size(buf: &mut InstrBytes, mode: MachineMode, bits: u16) {
    if matches!(bits, 16 | 32) && bits != mode.default_operand_bits() {
        buf.push(0x66);
    }
}

/// Emit operand-size prefix and REX (if needed) for a reg,reg form.
fn emit_prefixes_rr(buf: &mut InstrBytes, mode: MachineMode, reg: Register, rm: Register) {
    let size = reg.size_bits();
    emit_operand_size(buf, mode, size);
    let w = size == 64;
    let r = reg.is_extended();
    let b = rm.is_extended();
    if needs_rex(w, r, false, b) {
        buf.push(rex(w, r, false, b));
    }
}

/// Emit operand-size prefix and REX (if needed) for a reg+mem operation.
fn emit_prefixes_rm(
    buf: &mut InstrBytes,
    mode: MachineMode,
    instr: &Instruction,
    reg: Register,
    mem: &MemoryOperand,
) -> Result<(), AsmError> {
    let size = reg.size_bits();
    let w = size == 64;
    let r = reg.is_extended();
    let x = mem.index.is_some_and(Register::is_extended);
    let b = mem.base.is_some_and(Register::is_extended);

    // A REX byte turns AH/CH/DH/BH into SPL/BPL/SIL/DIL.
    if reg.is_high_byte() && (x || b) {
        return Err(invalid_operands(
            instr,
            "high-byte registers (AH, BH, CH, DH) cannot be used with R8-R15 addressing",
        ));
    }

    emit_operand_size(buf, mode, size);
    if needs_rex(w, r, x, b) {
        buf.push(rex(w, r, x, b));
    }
    Ok(())
}

/// Emit ModR/M + SIB + displacement for a memory operand.
///
/// A label in the operand reserves a zeroed displacement and records it in
/// `pending`.
fn emit_mem_modrm(
    buf: &mut InstrBytes,
    mode: MachineMode,
    reg_field: u8,
    mem: &MemoryOperand,
    pending: &mut Option<PendingFixup>,
) {
    let disp = mem.disp;
    let placeholder = if mem.label.is_some() { 0 } else { disp };

    let mut reserve = |buf: &mut InstrBytes, size: u8, kind: FixupKind| {
        if let Some(label) = mem.label {
            *pending = Some(PendingFixup {
                offset: buf.len(),
                size,
                label,
                kind,
                addend: disp,
            });
        }
    };

    // 16-bit real mode only has the [disp16] form here.
    if mode.is_16bit() {
        buf.push(modrm(0b00, reg_field, 0b110));
        reserve(buf, 2, FixupKind::Absolute);
        buf.extend_from_slice(&(placeholder as u16).to_le_bytes());
        return;
    }

    // RIP-relative addressing: [rip + disp32]
    if mem.is_rip_relative() {
        buf.push(modrm(0b00, reg_field, 0b101));
        reserve(buf, 4, FixupKind::Relative);
        buf.extend_from_slice(&(placeholder as i32).to_le_bytes());
        return;
    }

    let base = mem.base;
    let index = mem.index;

    // Absolute address: [disp32]
    if base.is_none() && index.is_none() {
        if mode.is_64bit() {
            // mod=00 rm=101 means RIP-relative in long mode; use SIB no-base.
            buf.push(modrm(0b00, reg_field, 0b100));
            buf.push(sib(1, 0b100, 0b101));
        } else {
            buf.push(modrm(0b00, reg_field, 0b101));
        }
        reserve(buf, 4, FixupKind::Absolute);
        buf.extend_from_slice(&(placeholder as i32).to_le_bytes());
        return;
    }

    // SIB index-only: [index*scale + disp32], mod=00 base=101.
    let Some(base) = base else {
        let idx = index.map_or(0b100, Register::base_code);
        buf.push(modrm(0b00, reg_field, 0b100));
        buf.push(sib(mem.scale, idx, 0b101));
        buf.extend_from_slice(&(disp as i32).to_le_bytes());
        return;
    };

    let need_sib = index.is_some() || base.base_code() == 4; // RSP/R12 need SIB

    let (mod_bits, disp_size) = if disp == 0 && base.base_code() != 5 {
        // mod=00, no displacement (unless base is RBP/R13)
        (0b00, 0)
    } else if (-128..=127).contains(&disp) {
        (0b01, 1)
    } else {
        (0b10, 4)
    };

    if need_sib {
        let idx = index.map_or(0b100, Register::base_code); // 0b100 = no index
        buf.push(modrm(mod_bits, reg_field, 0b100));
        buf.push(sib(mem.scale, idx, base.base_code()));
    } else {
        buf.push(modrm(mod_bits, reg_field, base.base_code()));
    }

    match disp_size {
        1 => buf.push(disp as i8 as u8),
        4 => buf.extend_from_slice(&(disp as i32).to_le_bytes()),
        _ => {}
    }
}

/// Emit an immediate of `size` bits, little-endian.
pub(crate) fn emit_imm(buf: &mut InstrBytes, imm: i64, size: u16) {
    match size {
        8 => buf.push(imm as u8),
        16 => buf.extend_from_slice(&(imm as u16).to_le_bytes()),
        32 => buf.extend_from_slice(&(imm as u32).to_le_bytes()),
        _ => buf.extend_from_slice(&(imm as u64).to_le_bytes()),
    }
}

/// Check that `imm` fits an operand of `bits` (signed or unsigned view).
fn check_imm(imm: i64, bits: u16) -> Result<(), AsmError> {
    let (min, max): (i128, i128) = match bits {
        8 => (i8::MIN as i128, u8::MAX as i128),
        16 => (i16::MIN as i128, u16::MAX as i128),
        32 => (i32::MIN as i128, u32::MAX as i128),
        _ => (i64::MIN as i128, i64::MAX as i128),
    };
    if (min..=max).contains(&(imm as i128)) {
        Ok(())
    } else {
        Err(AsmError::ImmediateOverflow {
            value: imm as i128,
            min,
            max,
        })
    }
}

/// `imm` reinterpreted as a signed value of `bits` width.
fn sign_view(imm: i64, bits: u16) -> i64 {
    match bits {
        8 => imm as u8 as i8 as i64,
        16 => imm as u16 as i16 as i64,
        32 => imm as u32 as i32 as i64,
        _ => imm,
    }
}

#[inline]
fn invalid_operands(instr: &Instruction, detail: &str) -> AsmError {
    AsmError::InvalidOperands {
        mnemonic: format!("{}", instr.mnemonic),
        detail: String::from(detail),
    }
}

fn size_mismatch(instr: &Instruction) -> AsmError {
    invalid_operands(instr, "operand size mismatch")
}

// ─── Instruction encoders ─────────────────────────────────────

fn encode_fixed(
    buf: &mut InstrBytes,
    ops: &[Operand],
    instr: &Instruction,
    opcode: u8,
) -> Result<(), AsmError> {
    if !ops.is_empty() {
        return Err(invalid_operands(instr, "expected no operands"));
    }
    buf.push(opcode);
    Ok(())
}

fn encode_ret(buf: &mut InstrBytes, ops: &[Operand], instr: &Instruction) -> Result<(), AsmError> {
    match ops {
        [] => buf.push(0xC3),
        [Operand::Immediate(imm)] => {
            if !(0..=0xFFFF).contains(imm) {
                return Err(AsmError::ImmediateOverflow {
                    value: *imm as i128,
                    min: 0,
                    max: 0xFFFF,
                });
            }
            buf.push(0xC2);
            emit_imm(buf, *imm, 16);
        }
        _ => return Err(invalid_operands(instr, "expected no operand or imm16")),
    }
    Ok(())
}

fn encode_push_pop(
    buf: &mut InstrBytes,
    mode: MachineMode,
    ops: &[Operand],
    instr: &Instruction,
    base_opcode: u8,
) -> Result<(), AsmError> {
    let [Operand::Register(reg)] = ops else {
        return Err(invalid_operands(instr, "expected a register operand"));
    };
    let size = reg.size_bits();
    let valid = match mode {
        MachineMode::Long64 => size == 64 || size == 16,
        _ => size == 32 || size == 16,
    };
    if !valid {
        return Err(invalid_operands(
            instr,
            &format!("{}-bit register not allowed in {} mode", size, mode),
        ));
    }
    if mode.is_64bit() {
        // push/pop default to 64-bit operand size; no REX.W.
        if size == 16 {
            buf.push(0x66);
        }
    } else {
        emit_operand_size(buf, mode, size);
    }
    if reg.is_extended() {
        buf.push(rex(false, false, false, true));
    }
    buf.push(base_opcode + reg.base_code());
    Ok(())
}

fn encode_mov(
    buf: &mut InstrBytes,
    mode: MachineMode,
    ops: &[Operand],
    instr: &Instruction,
    pending: &mut Option<PendingFixup>,
) -> Result<(), AsmError> {
    match ops {
        [Operand::Register(dst), Operand::Register(src)] => {
            if dst.size_bits() != src.size_bits() {
                return Err(size_mismatch(instr));
            }
            emit_prefixes_rr(buf, mode, *src, *dst);
            buf.push(if dst.size_bits() == 8 { 0x88 } else { 0x89 });
            buf.push(modrm(0b11, src.base_code(), dst.base_code()));
        }
        [Operand::Register(dst), Operand::Immediate(imm)] => {
            encode_mov_reg_imm(buf, mode, *dst, *imm)?;
        }
        [Operand::Register(dst), Operand::Memory(mem)] => {
            emit_prefixes_rm(buf, mode, instr, *dst, mem)?;
            buf.push(if dst.size_bits() == 8 { 0x8A } else { 0x8B });
            emit_mem_modrm(buf, mode, dst.base_code(), mem, pending);
        }
        [Operand::Memory(mem), Operand::Register(src)] => {
            emit_prefixes_rm(buf, mode, instr, *src, mem)?;
            buf.push(if src.size_bits() == 8 { 0x88 } else { 0x89 });
            emit_mem_modrm(buf, mode, src.base_code(), mem, pending);
        }
        _ => return Err(invalid_operands(instr, "unsupported operand combination")),
    }
    Ok(())
}

fn encode_mov_reg_imm(
    buf: &mut InstrBytes,
    mode: MachineMode,
    dst: Register,
    imm: i64,
) -> Result<(), AsmError> {
    let size = dst.size_bits();
    check_imm(imm, size)?;
    let b = dst.is_extended();
    match size {
        8 => {
            buf.push(0xB0 + dst.base_code());
            emit_imm(buf, imm, 8);
        }
        64 if i32::try_from(imm).is_ok() => {
            // REX.W C7 /0 id: sign-extended imm32 is shorter than imm64.
            buf.push(rex(true, false, false, b));
            buf.push(0xC7);
            buf.push(modrm(0b11, 0, dst.base_code()));
            emit_imm(buf, imm, 32);
        }
        _ => {
            emit_operand_size(buf, mode, size);
            if needs_rex(size == 64, false, false, b) {
                buf.push(rex(size == 64, false, false, b));
            }
            buf.push(0xB8 + dst.base_code());
            emit_imm(buf, imm, size);
        }
    }
    Ok(())
}

fn encode_lea(
    buf: &mut InstrBytes,
    mode: MachineMode,
    ops: &[Operand],
    instr: &Instruction,
    pending: &mut Option<PendingFixup>,
) -> Result<(), AsmError> {
    let [Operand::Register(dst), Operand::Memory(mem)] = ops else {
        return Err(invalid_operands(instr, "expected register, memory"));
    };
    if dst.size_bits() == 8 {
        return Err(invalid_operands(instr, "destination cannot be an 8-bit register"));
    }
    emit_prefixes_rm(buf, mode, instr, *dst, mem)?;
    buf.push(0x8D);
    emit_mem_modrm(buf, mode, dst.base_code(), mem, pending);
    Ok(())
}

fn encode_alu(
    buf: &mut InstrBytes,
    mode: MachineMode,
    ops: &[Operand],
    instr: &Instruction,
) -> Result<(), AsmError> {
    let digit = instr
        .mnemonic
        .alu_digit()
        .ok_or_else(|| invalid_operands(instr, "not an ALU instruction"))?;
    match ops {
        [Operand::Register(dst), Operand::Register(src)] => {
            if dst.size_bits() != src.size_bits() {
                return Err(size_mismatch(instr));
            }
            emit_prefixes_rr(buf, mode, *src, *dst);
            let opcode = (digit << 3) | u8::from(dst.size_bits() != 8);
            buf.push(opcode);
            buf.push(modrm(0b11, src.base_code(), dst.base_code()));
        }
        [Operand::Register(dst), Operand::Immediate(imm)] => {
            encode_alu_reg_imm(buf, mode, *dst, *imm, digit)?;
        }
        _ => return Err(invalid_operands(instr, "unsupported operand combination")),
    }
    Ok(())
}

fn encode_alu_reg_imm(
    buf: &mut InstrBytes,
    mode: MachineMode,
    dst: Register,
    imm: i64,
    digit: u8,
) -> Result<(), AsmError> {
    let size = dst.size_bits();
    // 64-bit ALU immediates are sign-extended imm32.
    if size == 64 {
        if i32::try_from(imm).is_err() {
            return Err(AsmError::ImmediateOverflow {
                value: imm as i128,
                min: i32::MIN as i128,
                max: i32::MAX as i128,
            });
        }
    } else {
        check_imm(imm, size)?;
    }

    emit_operand_size(buf, mode, size);
    let w = size == 64;
    let b = dst.is_extended();
    if needs_rex(w, false, false, b) {
        buf.push(rex(w, false, false, b));
    }

    if size == 8 {
        buf.push(0x80);
        buf.push(modrm(0b11, digit, dst.base_code()));
        emit_imm(buf, imm, 8);
        return Ok(());
    }

    let signed = sign_view(imm, size);
    if (-128..=127).contains(&signed) {
        buf.push(0x83);
        buf.push(modrm(0b11, digit, dst.base_code()));
        buf.push(signed as i8 as u8);
    } else {
        buf.push(0x81);
        buf.push(modrm(0b11, digit, dst.base_code()));
        emit_imm(buf, imm, if size == 16 { 16 } else { 32 });
    }
    Ok(())
}

fn encode_branch(
    buf: &mut InstrBytes,
    mode: MachineMode,
    ops: &[Operand],
    instr: &Instruction,
    ctx: &EncodeContext<'_>,
    pending: &mut Option<PendingFixup>,
) -> Result<(), AsmError> {
    match (instr.mnemonic, ops) {
        (_, [Operand::Label(label)]) => {
            encode_branch_label(buf, mode, instr.mnemonic, *label, ctx, pending);
            Ok(())
        }
        (Mnemonic::Jmp | Mnemonic::Call, [Operand::Register(reg)]) => {
            let expected = match mode {
                MachineMode::Long64 => 64,
                MachineMode::Real16 => 16,
                _ => 32,
            };
            if reg.size_bits() != expected {
                return Err(invalid_operands(
                    instr,
                    &format!("target register must be {}-bit", expected),
                ));
            }
            // jmp/call default to 64-bit operand size in long mode; no REX.W.
            if reg.is_extended() {
                buf.push(rex(false, false, false, true));
            }
            let digit = if instr.mnemonic == Mnemonic::Jmp { 4 } else { 2 };
            buf.push(0xFF);
            buf.push(modrm(0b11, digit, reg.base_code()));
            Ok(())
        }
        (Mnemonic::Jcc(_), _) => Err(invalid_operands(instr, "expected a label")),
        _ => Err(invalid_operands(instr, "expected a label or register")),
    }
}

/// Emit a branch to `label`, choosing the 2-byte short form when the target
/// is known and within reach.
fn encode_branch_label(
    buf: &mut InstrBytes,
    mode: MachineMode,
    mnemonic: Mnemonic,
    label: Label,
    ctx: &EncodeContext<'_>,
    pending: &mut Option<PendingFixup>,
) {
    let short_ok = mnemonic.is_relaxable_branch()
        && !ctx.near
        && (ctx.lookup)(label).is_some_and(|target| {
            let disp = target as i128 - (ctx.address as i128 + 2);
            // The short window is kept symmetric: -128 takes the near form.
            (-127..=127).contains(&disp)
        });

    if short_ok {
        buf.push(match mnemonic {
            Mnemonic::Jcc(cc) => 0x70 + cc.code(),
            _ => 0xEB,
        });
        *pending = Some(PendingFixup {
            offset: buf.len(),
            size: 1,
            label,
            kind: FixupKind::Relative,
            addend: 0,
        });
        buf.push(0);
        return;
    }

    match mnemonic {
        Mnemonic::Jcc(cc) => {
            buf.push(0x0F);
            buf.push(0x80 + cc.code());
        }
        Mnemonic::Call => buf.push(0xE8),
        _ => buf.push(0xE9),
    }
    let size = if mode.is_16bit() { 2 } else { 4 };
    *pending = Some(PendingFixup {
        offset: buf.len(),
        size,
        label,
        kind: FixupKind::Relative,
        addend: 0,
    });
    buf.extend_from_slice(&[0; 4][..size as usize]);
}

// ─── Tests ─────────────────────────────────────────────────
