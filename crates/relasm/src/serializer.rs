//! Address relaxation and final emission.
//!
//! The serializer walks the program in node order, repeatedly, until every
//! node's encoded length is stable.  Each pass keeps an explicit record per
//! node (address, chosen length) and a label-address table:
//!
//! - labels bound earlier in the current pass resolve to their exact address;
//! - labels further ahead resolve through the previous layout, keeping the
//!   distance they had from the current node in that pass;
//! - labels not seen yet are unknown and force the widest encoding.
//!
//! Padding does not shrink along with the code around it, so every alignment
//! or section marker between a branch and its target is counted at its
//! largest possible padding.  That bounds the distance the branch can ever
//! see, and lengths only shrink from pass to pass.  Once a pass changes
//! nothing, every node is encoded one final time against the converged
//! addresses, keeping the form relaxation settled on.

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::encoder::{self, EncodeContext, FixupKind, InstrBytes};
use crate::error::AsmError;
use crate::ir::{Label, MachineMode, Section, SectionAttribs};
use crate::node::{AlignMode, Node};
use crate::program::Program;

/// Default cap on relaxation passes.
pub const DEFAULT_MAX_PASSES: usize = 64;

/// Configurable limits for one serialization.
///
/// # Examples
///
/// ```rust
/// use relasm::{Serializer, SerializerLimits};
///
/// let serializer = Serializer::with_limits(SerializerLimits {
///     max_passes: 16,
///     max_output_bytes: 4096,
/// });
/// assert_eq!(serializer.code_size(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerializerLimits {
    /// Maximum relaxation passes before giving up. Default: 64.
    pub max_passes: usize,
    /// Maximum output size in bytes. Default: 16 MiB.
    pub max_output_bytes: usize,
}

impl Default for SerializerLimits {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            max_output_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Placement of one section in the serialized output.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectionInfo {
    /// Section handle.
    pub section: Section,
    /// Section name.
    pub name: String,
    /// Attribute flags.
    pub attribs: SectionAttribs,
    /// Virtual address of the first byte (after alignment padding).
    pub address: u64,
    /// Offset of the first byte in the output buffer.
    pub offset: usize,
    /// Bytes up to the next section start or the end of the output.
    pub size: usize,
    /// Padding inserted in front of the section.
    pub padding: usize,
}

/// A label-dependent field in the serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RelocationInfo {
    /// Offset of the field in the output buffer.
    pub offset: usize,
    /// Field width in bytes.
    pub size: u8,
    /// Label the field refers to.
    pub label: Label,
    /// Absolute address or relative displacement.
    pub kind: FixupKind,
}

/// Per-node state carried across relaxation passes.
#[derive(Debug, Clone, Default)]
struct NodeRecord {
    address: u64,
    /// `None` until the node has been encoded once.
    length: Option<usize>,
    /// Alignment or section padding in front of / inside the node.
    padding: usize,
    /// Unused padding capacity of all markers before the node.
    slack: u64,
    /// Bytes of an address-independent instruction, encoded once.
    cached: Option<InstrBytes>,
}

/// Where a label was bound during one pass.
#[derive(Debug, Clone, Copy)]
struct LabelMark {
    address: u64,
    /// Slack in front of the label marker.
    slack: u64,
}

/// Turns a [`Program`] into machine code loaded at a base address.
///
/// # Examples
///
/// ```rust
/// use relasm::{Instruction, MachineMode, Mnemonic, Program, Serializer};
///
/// let mut program = Program::new(MachineMode::Long64);
/// let top = program.create_label().unwrap();
/// program.bind_label(top).unwrap();
/// program.emit_instruction(Instruction::new(Mnemonic::Nop)).unwrap();
/// program.emit_instruction(Instruction::with1(Mnemonic::Jmp, top)).unwrap();
///
/// let mut serializer = Serializer::new();
/// serializer.serialize(&program, 0x1000).unwrap();
/// assert_eq!(serializer.code(), &[0x90, 0xEB, 0xFD]);
/// assert_eq!(serializer.label_address(top), Some(0x1000));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    limits: SerializerLimits,
    code: Vec<u8>,
    base: u64,
    labels: Vec<Option<u64>>,
    label_base: u32,
    sections: Vec<SectionInfo>,
    relocations: Vec<RelocationInfo>,
    passes: usize,
}

impl Serializer {
    /// Serializer with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer with custom limits.
    #[must_use]
    pub fn with_limits(limits: SerializerLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// The limits in effect.
    #[must_use]
    pub fn limits(&self) -> SerializerLimits {
        self.limits
    }

    /// Encode `program` as if loaded at `base`.
    ///
    /// On failure all outputs are cleared.
    ///
    /// # Errors
    ///
    /// [`AsmError::UnresolvedLabel`] for a referenced label without a bind
    /// marker, encoder errors for invalid instructions,
    /// [`AsmError::DisplacementOutOfRange`] for fields that cannot hold
    /// their value, [`AsmError::LimitExceeded`] when the output grows past
    /// [`SerializerLimits::max_output_bytes`],
    /// [`AsmError::RelaxationLimit`] / [`AsmError::RelaxationDiverged`] when
    /// layout does not settle.
    pub fn serialize(&mut self, program: &Program, base: u64) -> Result<(), AsmError> {
        self.reset();
        self.base = base;
        tracing::debug!(
            nodes = program.node_count(),
            base,
            mode = ?program.mode(),
            "serialize"
        );
        match self.run(program, base) {
            Ok(()) => {
                tracing::debug!(
                    bytes = self.code.len(),
                    passes = self.passes,
                    "serialize done"
                );
                Ok(())
            }
            Err(err) => {
                if err.is_internal() {
                    tracing::warn!(error = %err, passes = self.passes, "serialization failed");
                } else {
                    tracing::debug!(error = %err, "serialization failed");
                }
                let passes = self.passes;
                self.reset();
                self.passes = passes;
                Err(err)
            }
        }
    }

    /// The serialized bytes (empty after a failure).
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Length of [`code`](Self::code).
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    /// Base address of the last serialization.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base
    }

    /// Address of `label` after a successful serialization.
    #[must_use]
    pub fn label_address(&self, label: Label) -> Option<u64> {
        let index = label.id().checked_sub(self.label_base)?;
        self.labels.get(index as usize).copied().flatten()
    }

    /// Bound sections in program order.
    #[must_use]
    pub fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    /// Every label-dependent field written to the output.
    #[must_use]
    pub fn relocations(&self) -> &[RelocationInfo] {
        &self.relocations
    }

    /// Number of relaxation passes of the last serialization.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes
    }

    /// Take ownership of the serialized bytes, leaving the buffer empty.
    pub fn take_code(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.code)
    }

    fn reset(&mut self) {
        self.code.clear();
        self.base = 0;
        self.labels.clear();
        self.label_base = 0;
        self.sections.clear();
        self.relocations.clear();
        self.passes = 0;
    }

    fn run(&mut self, program: &Program, base: u64) -> Result<(), AsmError> {
        let nodes: Vec<&Node> = program.iter().map(|(_, node)| node).collect();
        check_labels_bound(program, &nodes)?;

        let mut records = vec![NodeRecord::default(); nodes.len()];
        let labels = self.relax(program, &nodes, &mut records, base)?;
        self.labels = labels;
        self.label_base = program.label_base();
        self.emit(program, &nodes, &records)
    }

    // ── relaxation ─────────────────────────────────────────

    /// Run passes until no node length or padding changes; returns the
    /// converged label table.
    fn relax(
        &mut self,
        program: &Program,
        nodes: &[&Node],
        records: &mut [NodeRecord],
        base: u64,
    ) -> Result<Vec<Option<u64>>, AsmError> {
        let mode = program.mode();
        let label_count = program.label_count();
        let mut prev_labels: Vec<Option<LabelMark>> = vec![None; label_count];
        let needs_second_pass = nodes.iter().any(|n| n.is_address_dependent());

        for pass in 1..=self.limits.max_passes {
            self.passes = pass;
            let mut labels: Vec<Option<LabelMark>> = vec![None; label_count];
            let mut changed = false;
            let mut addr = base;
            let mut slack = 0u64;

            for (index, node) in nodes.iter().enumerate() {
                let record = &mut records[index];
                let last_pass = record.length.map(|_| (record.address, record.slack));
                let mut padding = 0;
                let mut capacity = 0;

                let length = match node {
                    Node::Section(section) => {
                        let align = program.section_align(*section).unwrap_or(1);
                        let aligned = align_up(addr, align)?;
                        padding = (aligned - addr) as usize;
                        capacity = u64::from(align) - 1;
                        padding
                    }
                    Node::Align { alignment, .. } => {
                        let aligned = align_up(addr, *alignment)?;
                        padding = (aligned - addr) as usize;
                        capacity = u64::from(*alignment) - 1;
                        padding
                    }
                    Node::Label(label) => {
                        if let Some(i) = program.label_index(*label) {
                            labels[i] = Some(LabelMark {
                                address: addr,
                                slack,
                            });
                        }
                        0
                    }
                    Node::Data(data) => data.len(),
                    Node::EmbedLabel { size, .. } => *size as usize,
                    Node::EmbedLabelRel { size, .. } => size.bytes() as usize,
                    Node::Instruction(instr) if !instr.is_address_dependent() => {
                        if record.cached.is_none() {
                            let lookup = |_: Label| -> Option<u64> { None };
                            let ctx = EncodeContext::new(addr, &lookup);
                            record.cached = Some(encoder::encode(mode, instr, &ctx)?.bytes);
                        }
                        record.cached.as_ref().map_or(0, |b| b.len())
                    }
                    Node::Instruction(instr) => {
                        let lookup = |label: Label| -> Option<u64> {
                            let i = program.label_index(label)?;
                            match labels[i] {
                                // Behind: move the target away by the padding
                                // that may still appear in between.
                                Some(mark) => mark.address.checked_sub(slack - mark.slack),
                                // Ahead: previous distance plus the padding
                                // that may still appear in between.
                                None => {
                                    let (prev_addr, prev_slack) = last_pass?;
                                    let mark = prev_labels[i]?;
                                    let distance = mark.address.checked_sub(prev_addr)?;
                                    let grow = mark.slack.checked_sub(prev_slack)?;
                                    addr.checked_add(distance)?.checked_add(grow)
                                }
                            }
                        };
                        let ctx = EncodeContext::new(addr, &lookup);
                        encoder::encode(mode, instr, &ctx)?.bytes.len()
                    }
                };

                match record.length {
                    None => changed = true,
                    Some(previous) if length != previous => {
                        if length > previous && matches!(node, Node::Instruction(_)) {
                            tracing::warn!(index, previous, current = length, "instruction grew");
                            return Err(AsmError::RelaxationDiverged {
                                index,
                                previous,
                                current: length,
                            });
                        }
                        tracing::trace!(index, previous, current = length, "node resized");
                        changed = true;
                    }
                    Some(_) => {}
                }
                if record.padding != padding {
                    changed = true;
                }

                record.address = addr;
                record.length = Some(length);
                record.padding = padding;
                record.slack = slack;
                slack += capacity - padding as u64;
                addr = addr.checked_add(length as u64).ok_or_else(|| {
                    AsmError::InvalidParameter {
                        detail: format!("layout overflows the address space at node {}", index),
                    }
                })?;
                if (addr - base) as usize > self.limits.max_output_bytes {
                    return Err(AsmError::LimitExceeded {
                        resource: String::from("output bytes"),
                        limit: self.limits.max_output_bytes,
                    });
                }
            }

            tracing::debug!(pass, size = addr - base, changed, "relaxation pass");
            let converged = !changed || (pass == 1 && !needs_second_pass);
            prev_labels = labels;
            if converged {
                return Ok(prev_labels
                    .into_iter()
                    .map(|mark| mark.map(|m| m.address))
                    .collect());
            }
        }

        tracing::warn!(max = self.limits.max_passes, "relaxation did not converge");
        Err(AsmError::RelaxationLimit {
            max: self.limits.max_passes,
        })
    }

    // ── emission ───────────────────────────────────────────

    fn emit(
        &mut self,
        program: &Program,
        nodes: &[&Node],
        records: &[NodeRecord],
    ) -> Result<(), AsmError> {
        let mode = program.mode();
        let total = records
            .last()
            .map_or(0, |r| (r.address - self.base) as usize + r.length.unwrap_or(0));
        let mut code = Vec::with_capacity(total);
        let labels = &self.labels;
        let lookup = |label: Label| -> Option<u64> { labels[program.label_index(label)?] };

        for (index, (node, record)) in nodes.iter().zip(records).enumerate() {
            let start = code.len();
            match node {
                Node::Section(section) => {
                    let attribs = program.section_attribs(*section).unwrap_or_default();
                    code.resize(start + record.padding, attribs.padding_byte());
                    if let Some(last) = self.sections.last_mut() {
                        last.size = start - last.offset;
                    }
                    self.sections.push(SectionInfo {
                        section: *section,
                        name: String::from(program.section_name(*section).unwrap_or_default()),
                        attribs,
                        address: record.address + record.padding as u64,
                        offset: code.len(),
                        size: 0,
                        padding: record.padding,
                    });
                }
                Node::Label(_) => {}
                Node::Align { mode: align_mode, .. } => match align_mode {
                    AlignMode::Code => emit_code_padding(&mut code, mode, record.padding),
                    AlignMode::Fill(byte) => code.resize(start + record.padding, *byte),
                },
                Node::Data(data) => code.extend_from_slice(data.as_bytes()),
                Node::Instruction(instr) => {
                    if let Some(bytes) = &record.cached {
                        code.extend_from_slice(bytes);
                    } else {
                        let ctx = EncodeContext::strict(record.address, &lookup);
                        let mut encoded = encoder::encode(mode, instr, &ctx)
                            .map_err(|e| with_label_name(program, e))?;
                        // Relaxation sized the branch with padding slack in
                        // mind; keep the near form it settled on.
                        if record.length.is_some_and(|len| encoded.bytes.len() < len) {
                            encoded = encoder::encode(mode, instr, &ctx.with_near())
                                .map_err(|e| with_label_name(program, e))?;
                        }
                        code.extend_from_slice(&encoded.bytes);
                        if let Some(fixup) = encoded.fixup {
                            self.relocations.push(RelocationInfo {
                                offset: start + fixup.offset,
                                size: fixup.size,
                                label: fixup.label,
                                kind: fixup.kind,
                            });
                        }
                    }
                }
                Node::EmbedLabel { label, size } => {
                    let target = resolved(program, &lookup, *label)?;
                    write_absolute(&mut code, mode, *label, target, *size)?;
                    self.relocations.push(RelocationInfo {
                        offset: start,
                        size: *size,
                        label: *label,
                        kind: FixupKind::Absolute,
                    });
                }
                Node::EmbedLabelRel {
                    label,
                    relative_to,
                    size,
                } => {
                    let a = resolved(program, &lookup, *label)?;
                    let b = resolved(program, &lookup, *relative_to)?;
                    let diff = a.wrapping_sub(b).to_le_bytes();
                    code.extend_from_slice(&diff[..size.bytes() as usize]);
                    self.relocations.push(RelocationInfo {
                        offset: start,
                        size: size.bytes(),
                        label: *label,
                        kind: FixupKind::Relative,
                    });
                }
            }

            let expected = record.length.unwrap_or(0);
            let emitted = code.len() - start;
            if emitted != expected {
                tracing::warn!(index, expected, emitted, "emission length mismatch");
                return Err(AsmError::RelaxationDiverged {
                    index,
                    previous: expected,
                    current: emitted,
                });
            }
        }

        if let Some(last) = self.sections.last_mut() {
            last.size = code.len() - last.offset;
        }
        self.code = code;
        Ok(())
    }
}

/// Fail with [`AsmError::UnresolvedLabel`] for the first referenced label
/// that has no bind marker.
fn check_labels_bound(program: &Program, nodes: &[&Node]) -> Result<(), AsmError> {
    for node in nodes {
        for label in node.referenced_labels().into_iter().flatten() {
            if !program.is_bound(label) {
                return Err(unresolved(program, label));
            }
        }
    }
    Ok(())
}

fn unresolved(program: &Program, label: Label) -> AsmError {
    AsmError::UnresolvedLabel {
        id: label.id(),
        name: program.label_name(label).map(String::from),
    }
}

/// Attach the label name to an encoder-side unresolved-label error.
fn with_label_name(program: &Program, err: AsmError) -> AsmError {
    match err {
        AsmError::UnresolvedLabel { id, name: None } => unresolved(program, Label(id)),
        other => other,
    }
}

fn resolved(
    program: &Program,
    lookup: &dyn Fn(Label) -> Option<u64>,
    label: Label,
) -> Result<u64, AsmError> {
    lookup(label).ok_or_else(|| unresolved(program, label))
}

/// Write `target` as a `size`-byte absolute address.
fn write_absolute(
    code: &mut Vec<u8>,
    mode: MachineMode,
    label: Label,
    target: u64,
    size: u8,
) -> Result<(), AsmError> {
    let fits = match size {
        8 => true,
        // Sign-extended 32-bit addresses are fine in long mode.
        4 if mode.is_64bit() => target <= u32::MAX as u64 || target >= 0xFFFF_FFFF_8000_0000,
        4 => target <= u32::MAX as u64,
        _ => target <= u16::MAX as u64,
    };
    if !fits {
        return Err(AsmError::DisplacementOutOfRange {
            label: label.id(),
            value: target as i64,
            size,
        });
    }
    code.extend_from_slice(&target.to_le_bytes()[..size as usize]);
    Ok(())
}

fn align_up(addr: u64, align: u32) -> Result<u64, AsmError> {
    let mask = u64::from(align.max(1)) - 1;
    addr.checked_add(mask)
        .map(|a| a & !mask)
        .ok_or_else(|| AsmError::InvalidParameter {
            detail: format!("aligning {:#x} to {} overflows the address space", addr, align),
        })
}

// ─── Padding ────────────────────────────────────────────────

/// Intel-recommended multi-byte NOP sequences (SDM Vol. 2B, NOP).
/// `NOP_SEQUENCES[n]` is an `n`-byte NOP for n = 1..=9.
const NOP_SEQUENCES: [&[u8]; 10] = [
    &[],                                                     // 0 bytes (unused)
    &[0x90],                                                 // 1 byte : NOP
    &[0x66, 0x90],                                           // 2 bytes: 66 NOP
    &[0x0F, 0x1F, 0x00],                                     // 3 bytes: NOP DWORD ptr [EAX]
    &[0x0F, 0x1F, 0x40, 0x00],                               // 4 bytes: NOP DWORD ptr [EAX + 00H]
    &[0x0F, 0x1F, 0x44, 0x00, 0x00], // 5 bytes: NOP DWORD ptr [EAX + EAX*1 + 00H]
    &[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00], // 6 bytes: 66 NOP DWORD ptr [EAX + EAX*1 + 00H]
    &[0x0F, 0x1F, 0x80, 0x00, 0x00, 0x00, 0x00], // 7 bytes: NOP DWORD ptr [EAX + 00000000H]
    &[0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00], // 8 bytes: NOP DWORD ptr [EAX + EAX*1 + 00000000H]
    &[0x66, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00], // 9 bytes: 66 NOP DWORD ptr [EAX + EAX*1 + 00000000H]
];

/// Emit NOP padding of exactly `n` bytes.
///
/// The multi-byte forms use 32-bit ModR/M addressing, so 16-bit code is
/// padded with single-byte NOPs.
fn emit_code_padding(output: &mut Vec<u8>, mode: MachineMode, mut n: usize) {
    if mode.is_16bit() {
        output.resize(output.len() + n, 0x90);
        return;
    }
    while n > 0 {
        let chunk = core::cmp::min(n, 9);
        output.extend_from_slice(NOP_SEQUENCES[chunk]);
        n -= chunk;
    }
}

// ─── Tests ─────────────────────────────────────────────────
