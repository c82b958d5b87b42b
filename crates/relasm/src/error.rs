//! Error types for program construction, encoding, and serialization.

#[allow(unused_imports)]
use alloc::format;
use alloc::string::String;
use core::fmt;

use crate::ir::MachineMode;

/// Fallible-operation error for `relasm`.
///
/// Every variant is a leaf error at this layer: the caller decides whether to
/// fix the [`Program`](crate::Program) (for example by binding a missing
/// label) and serialize again.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsmError {
    /// A label was referenced but never bound by the time of final emission.
    UnresolvedLabel {
        /// Numeric id of the label.
        id: u32,
        /// Name of the label, if it was created with one.
        name: Option<String>,
    },

    /// A label or section was bound a second time.
    AlreadyBound {
        /// `"label"` or `"section"`.
        what: String,
        /// Numeric id of the identity.
        id: u32,
    },

    /// Operand or register is not encodable in the program's machine mode.
    InvalidMode {
        /// The machine mode the program targets.
        mode: MachineMode,
        /// Description of the offending operand.
        detail: String,
    },

    /// Invalid operand combination for the instruction.
    InvalidOperands {
        /// Mnemonic of the instruction.
        mnemonic: String,
        /// Description of why the operands are invalid.
        detail: String,
    },

    /// Immediate value exceeds the range of the chosen encoding.
    ImmediateOverflow {
        /// The immediate value that overflowed.
        value: i128,
        /// Minimum allowed value.
        min: i128,
        /// Maximum allowed value.
        max: i128,
    },

    /// A resolved displacement or address does not fit its field.
    DisplacementOutOfRange {
        /// Numeric id of the referenced label.
        label: u32,
        /// The value that had to be encoded.
        value: i64,
        /// Field width in bytes.
        size: u8,
    },

    /// A node's encoded length grew after relaxation had chosen a smaller one.
    ///
    /// This is an internal-consistency failure of the encoding step, not a
    /// caller error.
    RelaxationDiverged {
        /// Position of the node in program order.
        index: usize,
        /// Length chosen by an earlier pass.
        previous: usize,
        /// Larger length requested now.
        current: usize,
    },

    /// Relaxation did not converge within the configured number of passes.
    RelaxationLimit {
        /// Maximum number of passes allowed.
        max: usize,
    },

    /// A configurable resource limit was exceeded.
    LimitExceeded {
        /// Human-readable name of the resource (e.g. "output bytes", "labels").
        resource: String,
        /// The limit that was exceeded.
        limit: usize,
    },

    /// The label handle does not belong to this program.
    InvalidLabel {
        /// Numeric id carried by the handle.
        id: u32,
    },

    /// The section handle does not belong to this program.
    InvalidSection {
        /// Numeric id carried by the handle.
        id: u32,
    },

    /// The node handle is stale (removed) or from another program.
    InvalidNode,

    /// A parameter is outside its allowed domain.
    InvalidParameter {
        /// Description of the invalid parameter.
        detail: String,
    },
}

impl AsmError {
    /// Whether this error signals an internal bug rather than a caller mistake.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AsmError::RelaxationDiverged { .. } | AsmError::RelaxationLimit { .. }
        )
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::UnresolvedLabel { id, name } => match name {
                Some(name) => write!(f, "unresolved label '{}'", name),
                None => write!(f, "unresolved label #{}", id),
            },
            AsmError::AlreadyBound { what, id } => {
                write!(f, "{} #{} is already bound", what, id)
            }
            AsmError::InvalidMode { mode, detail } => {
                write!(f, "not encodable in {}: {}", mode, detail)
            }
            AsmError::InvalidOperands { mnemonic, detail } => {
                write!(f, "invalid operand combination for '{}': {}", mnemonic, detail)
            }
            AsmError::ImmediateOverflow { value, min, max } => {
                write!(f, "immediate value {} out of range [{}..{}]", value, min, max)
            }
            AsmError::DisplacementOutOfRange { label, value, size } => {
                write!(
                    f,
                    "value {} for label #{} does not fit in {} byte(s)",
                    value, label, size
                )
            }
            AsmError::RelaxationDiverged {
                index,
                previous,
                current,
            } => {
                write!(
                    f,
                    "internal error: node {} grew from {} to {} bytes during relaxation",
                    index, previous, current
                )
            }
            AsmError::RelaxationLimit { max } => {
                write!(
                    f,
                    "serialization exceeded maximum of {} relaxation passes (possible oscillation)",
                    max
                )
            }
            AsmError::LimitExceeded { resource, limit } => {
                write!(
                    f,
                    "resource limit exceeded: {} (limit: {})",
                    resource, limit
                )
            }
            AsmError::InvalidLabel { id } => {
                write!(f, "label #{} does not belong to this program", id)
            }
            AsmError::InvalidSection { id } => {
                write!(f, "section #{} does not belong to this program", id)
            }
            AsmError::InvalidNode => write!(f, "stale or foreign node handle"),
            AsmError::InvalidParameter { detail } => {
                write!(f, "invalid parameter: {}", detail)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AsmError {}
