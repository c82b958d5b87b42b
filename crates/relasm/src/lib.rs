//! # relasm: in-memory x86 / x86-64 assembler backend
//!
//! `relasm` holds a program as an editable list of nodes (instructions,
//! labels, section starts, raw data, alignment and label-address
//! directives) and serializes it to machine code at a chosen base address,
//! picking the shortest branch encodings that fit.
//!
//! ## Quick Start
//!
//! ```rust
//! use relasm::{serialize, Instruction, MachineMode, Mnemonic, Program};
//!
//! let mut program = Program::new(MachineMode::Long64);
//! let done = program.create_label().unwrap();
//! program.emit_instruction(Instruction::with1(Mnemonic::Jmp, done)).unwrap();
//! program.emit_instruction(Instruction::new(Mnemonic::Int3)).unwrap();
//! program.bind_label(done).unwrap();
//! program.emit_instruction(Instruction::new(Mnemonic::Ret)).unwrap();
//!
//! let code = serialize(&program, 0x40_1000).unwrap();
//! assert_eq!(code, vec![0xEB, 0x01, 0xCC, 0xC3]);
//! ```
//!
//! ## Features
//!
//! - **Four machine modes**: 16-bit real, 32-bit legacy, 32-bit compat, 64-bit long.
//! - **Branch relaxation**: multi-pass layout picks short jumps where they reach.
//! - **Editable program**: insert and remove nodes anywhere via a cursor.
//! - **`no_std` + `alloc`**: disable the default `std` feature to embed.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// Encoding narrows integers between widths all the time (i64→i32, u64→u8)
// and uses dense hex literals without separators (0x0F1F84).
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::redundant_closure_for_method_calls,
    clippy::bool_to_int_with_if,
    clippy::wildcard_imports,
    clippy::enum_glob_use,
    clippy::semicolon_if_nothing_returned,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::manual_let_else,
    clippy::map_unwrap_or,
    clippy::many_single_char_names,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

extern crate alloc;

/// Generational slot arena backing the node list.
pub mod arena;
/// Small-buffer byte payload for data nodes.
pub mod data;
/// x86 instruction encoder (REX, ModR/M, SIB, immediates, label fixups).
pub mod encoder;
/// Error type shared by every layer.
pub mod error;
/// Machine modes, registers, operands, instructions, section attributes.
pub mod ir;
/// Program nodes.
pub mod node;
/// Program container: node list, label and section registries.
pub mod program;
/// Multi-pass relaxation and final emission.
pub mod serializer;
/// Interned names.
pub mod strings;

pub use arena::NodeId;
pub use data::Data;
pub use encoder::{encode, EncodeContext, EncodedInstr, Fixup, FixupKind};
pub use error::AsmError;
pub use ir::{
    BitSize, Condition, Instruction, Label, MachineMode, MemoryOperand, Mnemonic, Operand,
    Register, Section, SectionAttribs,
};
pub use node::{AlignMode, Node};
pub use program::Program;
pub use serializer::{RelocationInfo, SectionInfo, Serializer, SerializerLimits};

use alloc::vec::Vec;

/// Serialize `program` at `base` with default limits and return the bytes.
///
/// # Errors
///
/// Returns [`AsmError`] for unbound labels, invalid instructions, values that
/// do not fit their fields, or layouts that do not settle (see
/// [`Serializer::serialize`]).
///
/// # Examples
///
/// ```rust
/// use relasm::{serialize, Instruction, MachineMode, Mnemonic, Program};
///
/// let mut program = Program::new(MachineMode::Legacy32);
/// program.emit_instruction(Instruction::new(Mnemonic::Nop)).unwrap();
/// assert_eq!(serialize(&program, 0x1000).unwrap(), vec![0x90]);
/// ```
pub fn serialize(program: &Program, base: u64) -> Result<Vec<u8>, AsmError> {
    let mut serializer = Serializer::new();
    serializer.serialize(program, base)?;
    Ok(serializer.take_code())
}
