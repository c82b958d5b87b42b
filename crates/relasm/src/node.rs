//! Program elements and their list links.

use crate::arena::NodeId;
use crate::data::Data;
use crate::ir::{BitSize, Instruction, Label, Section};

/// Padding style for an [`Node::Align`] directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlignMode {
    /// Pad with multi-byte NOPs.
    Code,
    /// Pad with the given fill byte.
    Fill(u8),
}

/// One element of a [`Program`](crate::Program).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Node {
    /// A machine instruction.
    Instruction(Instruction),
    /// Binds a label to the address of the next byte.
    Label(Label),
    /// Starts a section; the address is rounded up to the section alignment.
    Section(Section),
    /// Raw bytes copied to the output verbatim.
    Data(Data),
    /// Pads the running address up to a multiple of `alignment`.
    Align {
        /// Power-of-two alignment in bytes.
        alignment: u32,
        /// How padding is produced.
        mode: AlignMode,
    },
    /// The absolute address of `label`, `size` bytes little-endian.
    EmbedLabel {
        /// Label whose address is stored.
        label: Label,
        /// Field width in bytes (2, 4 or 8).
        size: u8,
    },
    /// `label - relative_to`, truncated to `size`.
    EmbedLabelRel {
        /// Minuend label.
        label: Label,
        /// Subtrahend label.
        relative_to: Label,
        /// Field width.
        size: BitSize,
    },
}

impl Node {
    /// Label referenced (not bound) by this node, if any.
    #[must_use]
    pub fn referenced_labels(&self) -> [Option<Label>; 2] {
        match self {
            Node::Instruction(instr) => [instr.label(), None],
            Node::EmbedLabel { label, .. } => [Some(*label), None],
            Node::EmbedLabelRel {
                label, relative_to, ..
            } => [Some(*label), Some(*relative_to)],
            _ => [None, None],
        }
    }

    /// Whether the encoded form depends on label addresses.
    #[must_use]
    pub fn is_address_dependent(&self) -> bool {
        match self {
            Node::Instruction(instr) => instr.is_address_dependent(),
            Node::EmbedLabel { .. } | Node::EmbedLabelRel { .. } => true,
            _ => false,
        }
    }

    /// Whether this is a label or section bind marker.
    #[must_use]
    pub fn is_marker(&self) -> bool {
        matches!(self, Node::Label(_) | Node::Section(_))
    }
}

/// A [`Node`] plus its position in the program's doubly-linked list.
#[derive(Debug, Clone)]
pub(crate) struct NodeEntry {
    pub(crate) node: Node,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl NodeEntry {
    pub(crate) fn detached(node: Node) -> Self {
        Self {
            node,
            prev: None,
            next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Mnemonic, Register};

    #[test]
    fn address_dependence() {
        assert!(!Node::Data(Data::from(1u8)).is_address_dependent());
        assert!(!Node::Instruction(Instruction::new(Mnemonic::Nop)).is_address_dependent());
        assert!(Node::Instruction(Instruction::with1(Mnemonic::Jmp, Label(0))).is_address_dependent());
        assert!(Node::EmbedLabel {
            label: Label(0),
            size: 8
        }
        .is_address_dependent());
        assert!(!Node::Instruction(Instruction::with1(Mnemonic::Jmp, Register::Rax))
            .is_address_dependent());
    }

    #[test]
    fn referenced_labels_of_rel_embed() {
        let n = Node::EmbedLabelRel {
            label: Label(2),
            relative_to: Label(1),
            size: BitSize::B16,
        };
        assert_eq!(n.referenced_labels(), [Some(Label(2)), Some(Label(1))]);
        assert_eq!(Node::Label(Label(2)).referenced_labels(), [None, None]);
        assert!(Node::Label(Label(2)).is_marker());
    }
}
