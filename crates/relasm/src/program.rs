//! The in-memory program: an ordered node list plus label and section tables.
//!
//! # Example
//!
//! ```rust
//! use relasm::{Instruction, MachineMode, Mnemonic, Program};
//!
//! let mut program = Program::new(MachineMode::Long64);
//! let exit = program.create_named_label("exit").unwrap();
//! program.emit_instruction(Instruction::with1(Mnemonic::Jmp, exit)).unwrap();
//! program.bind_label(exit).unwrap();
//! program.emit_instruction(Instruction::new(Mnemonic::Ret)).unwrap();
//!
//! assert_eq!(program.node_count(), 3);
//! assert!(program.is_bound(exit));
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use crate::arena::{Arena, NodeId};
use crate::data::Data;
use crate::error::AsmError;
use crate::ir::{BitSize, Instruction, Label, MachineMode, Section, SectionAttribs};
use crate::node::{AlignMode, Node, NodeEntry};
use crate::strings::{NameId, NamePool};

#[derive(Debug, Clone)]
struct LabelData {
    name: Option<NameId>,
    node: Option<NodeId>,
}

#[derive(Debug, Clone)]
struct SectionData {
    name: NameId,
    attribs: SectionAttribs,
    align: u32,
    node: Option<NodeId>,
}

/// Where the next emitted node goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertPoint {
    Tail,
    /// In front of the current head; left behind when the node under the
    /// cursor was the head and got removed.
    Front,
    After(NodeId),
}

/// An ordered sequence of instructions, data and directives.
///
/// The program owns every node; callers hold [`NodeId`], [`Label`] and
/// [`Section`] handles.  New nodes go after the cursor when one is set,
/// otherwise at the tail.
///
/// Label and section ids are never reissued, not even after
/// [`clear`](Self::clear): handles from before a clear are rejected.
#[derive(Debug, Clone)]
pub struct Program {
    mode: MachineMode,
    nodes: Arena<NodeEntry>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    cursor: InsertPoint,
    labels: Vec<LabelData>,
    sections: Vec<SectionData>,
    names: NamePool,
    /// Id of `labels[0]`.
    label_base: u32,
    /// Id of `sections[0]`.
    section_base: u32,
}

impl Program {
    /// Create an empty program for `mode`.
    #[must_use]
    pub fn new(mode: MachineMode) -> Self {
        Self {
            mode,
            nodes: Arena::new(),
            head: None,
            tail: None,
            cursor: InsertPoint::Tail,
            labels: Vec::new(),
            sections: Vec::new(),
            names: NamePool::new(),
            label_base: 0,
            section_base: 0,
        }
    }

    /// Target machine mode.
    #[must_use]
    pub fn mode(&self) -> MachineMode {
        self.mode
    }

    // ── Labels ──────────────────────────────────────────────

    /// Create a new anonymous, unbound label.
    pub fn create_label(&mut self) -> Result<Label, AsmError> {
        self.push_label(None)
    }

    /// Create a new unbound label carrying `name` for diagnostics.
    pub fn create_named_label(&mut self, name: &str) -> Result<Label, AsmError> {
        let id = self.names.intern(name);
        self.push_label(Some(id))
    }

    fn push_label(&mut self, name: Option<NameId>) -> Result<Label, AsmError> {
        let id = next_id(self.label_base, self.labels.len(), "labels")?;
        self.labels.push(LabelData { name, node: None });
        Ok(Label(id))
    }

    fn label_data(&self, label: Label) -> Option<&LabelData> {
        self.labels.get(self.label_index(label)?)
    }

    /// Dense index of `label` among the labels of this program.
    pub(crate) fn label_index(&self, label: Label) -> Option<usize> {
        let index = label.0.checked_sub(self.label_base)? as usize;
        (index < self.labels.len()).then_some(index)
    }

    /// Id of the first label still owned by this program.
    pub(crate) fn label_base(&self) -> u32 {
        self.label_base
    }

    /// Insert a bind marker for `label` at the insertion point.
    pub fn bind_label(&mut self, label: Label) -> Result<NodeId, AsmError> {
        self.insert_at_cursor(Node::Label(label))
    }

    /// Name the label was created with.
    #[must_use]
    pub fn label_name(&self, label: Label) -> Option<&str> {
        let data = self.label_data(label)?;
        self.names.get(data.name?)
    }

    /// The node that binds `label`, `None` while unbound.
    #[must_use]
    pub fn label_node(&self, label: Label) -> Option<NodeId> {
        self.label_data(label)?.node
    }

    /// Whether `label` has a bind marker in the node list.
    #[must_use]
    pub fn is_bound(&self, label: Label) -> bool {
        self.label_node(label).is_some()
    }

    /// Number of labels created since the program was made or last cleared.
    #[must_use]
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// First label created with `name`.
    #[must_use]
    pub fn find_label(&self, name: &str) -> Option<Label> {
        let id = self.names.find(name)?;
        self.labels
            .iter()
            .position(|l| l.name == Some(id))
            .map(|i| Label(self.label_base + i as u32))
    }

    /// Whether `label` was issued by this program.
    #[must_use]
    pub fn is_valid_label(&self, label: Label) -> bool {
        self.label_index(label).is_some()
    }

    // ── Sections ────────────────────────────────────────────

    /// Create a section; `align` must be a non-zero power of two.
    pub fn create_section(
        &mut self,
        name: &str,
        attribs: SectionAttribs,
        align: u32,
    ) -> Result<Section, AsmError> {
        if !align.is_power_of_two() {
            return Err(AsmError::InvalidParameter {
                detail: alloc::format!("section alignment {} is not a power of two", align),
            });
        }
        let id = next_id(self.section_base, self.sections.len(), "sections")?;
        let name = self.names.intern(name);
        self.sections.push(SectionData {
            name,
            attribs,
            align,
            node: None,
        });
        Ok(Section(id))
    }

    fn section_data(&self, section: Section) -> Option<&SectionData> {
        let index = section.0.checked_sub(self.section_base)?;
        self.sections.get(index as usize)
    }

    fn section_data_mut(&mut self, section: Section) -> Option<&mut SectionData> {
        let index = section.0.checked_sub(self.section_base)?;
        self.sections.get_mut(index as usize)
    }

    /// Insert a section start marker at the insertion point.
    pub fn bind_section(&mut self, section: Section) -> Result<NodeId, AsmError> {
        self.insert_at_cursor(Node::Section(section))
    }

    /// Name of `section`.
    #[must_use]
    pub fn section_name(&self, section: Section) -> Option<&str> {
        let data = self.section_data(section)?;
        self.names.get(data.name)
    }

    /// Attribute flags of `section`.
    #[must_use]
    pub fn section_attribs(&self, section: Section) -> Option<SectionAttribs> {
        self.section_data(section).map(|s| s.attribs)
    }

    /// Alignment of `section` in bytes.
    #[must_use]
    pub fn section_align(&self, section: Section) -> Option<u32> {
        self.section_data(section).map(|s| s.align)
    }

    /// The node that starts `section`, `None` while unbound.
    #[must_use]
    pub fn section_node(&self, section: Section) -> Option<NodeId> {
        self.section_data(section)?.node
    }

    /// Position of `section` among the bound sections in program order,
    /// which is the order sections are laid out in; `None` while unbound.
    #[must_use]
    pub fn section_physical_index(&self, section: Section) -> Option<u32> {
        self.section_node(section)?;
        let mut index = 0;
        for (_, node) in self.iter() {
            match node {
                Node::Section(s) if *s == section => return Some(index),
                Node::Section(_) => index += 1,
                _ => {}
            }
        }
        None
    }

    /// Number of sections created since the program was made or last cleared.
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    // ── Emission ────────────────────────────────────────────

    /// Insert an instruction at the insertion point.
    pub fn emit_instruction(&mut self, instr: Instruction) -> Result<NodeId, AsmError> {
        self.insert_at_cursor(Node::Instruction(instr))
    }

    /// Insert raw bytes at the insertion point.
    pub fn emit_data(&mut self, data: impl Into<Data>) -> Result<NodeId, AsmError> {
        self.insert_at_cursor(Node::Data(data.into()))
    }

    /// Insert an alignment directive; `alignment` must be a non-zero power of two.
    pub fn emit_align(&mut self, alignment: u32, mode: AlignMode) -> Result<NodeId, AsmError> {
        self.insert_at_cursor(Node::Align { alignment, mode })
    }

    /// Embed the absolute address of `label` at pointer width.
    pub fn emit_embed_label(&mut self, label: Label) -> Result<NodeId, AsmError> {
        let size = self.mode.pointer_size();
        self.insert_at_cursor(Node::EmbedLabel { label, size })
    }

    /// Embed the absolute address of `label` in `size` bytes (2, 4 or 8).
    pub fn emit_embed_label_sized(&mut self, label: Label, size: u8) -> Result<NodeId, AsmError> {
        self.insert_at_cursor(Node::EmbedLabel { label, size })
    }

    /// Embed `label - relative_to` truncated to `size`.
    pub fn emit_embed_label_rel(
        &mut self,
        label: Label,
        relative_to: Label,
        size: BitSize,
    ) -> Result<NodeId, AsmError> {
        self.insert_at_cursor(Node::EmbedLabelRel {
            label,
            relative_to,
            size,
        })
    }

    // ── Cursor and list editing ─────────────────────────────

    /// Set the insertion point; `None` appends at the tail.
    pub fn set_cursor(&mut self, cursor: Option<NodeId>) -> Result<(), AsmError> {
        self.cursor = match cursor {
            Some(id) if !self.nodes.contains(id) => return Err(AsmError::InvalidNode),
            Some(id) => InsertPoint::After(id),
            None => InsertPoint::Tail,
        };
        Ok(())
    }

    /// Node the next emitted node will follow; `None` when appending at the
    /// tail or inserting in front of the head.
    #[must_use]
    pub fn cursor(&self) -> Option<NodeId> {
        match self.cursor {
            InsertPoint::After(id) => Some(id),
            InsertPoint::Tail | InsertPoint::Front => None,
        }
    }

    fn insert_at_cursor(&mut self, node: Node) -> Result<NodeId, AsmError> {
        let id = match self.cursor {
            InsertPoint::After(pos) => self.insert_after(pos, node)?,
            InsertPoint::Front => self.link_new(None, node)?,
            InsertPoint::Tail => return self.link_new(self.tail, node),
        };
        self.cursor = InsertPoint::After(id);
        Ok(id)
    }

    fn link_new(&mut self, prev: Option<NodeId>, node: Node) -> Result<NodeId, AsmError> {
        self.validate(&node)?;
        let id = self.nodes.insert(NodeEntry::detached(node))?;
        self.link_after(prev, id);
        self.register(id);
        Ok(id)
    }

    /// Insert `node` directly after `pos`.
    pub fn insert_after(&mut self, pos: NodeId, node: Node) -> Result<NodeId, AsmError> {
        if !self.nodes.contains(pos) {
            return Err(AsmError::InvalidNode);
        }
        self.link_new(Some(pos), node)
    }

    /// Insert `node` directly before `pos`.
    pub fn insert_before(&mut self, pos: NodeId, node: Node) -> Result<NodeId, AsmError> {
        let prev = self.nodes.get(pos).ok_or(AsmError::InvalidNode)?.prev;
        self.link_new(prev, node)
    }

    /// Unlink and return a node; removing a bind marker unbinds its label or section.
    ///
    /// When the cursor is on the removed node it moves to the previous node,
    /// or in front of the new head when the removed node was the head, so
    /// emission continues at the same position.
    pub fn remove(&mut self, id: NodeId) -> Result<Node, AsmError> {
        let (prev, next) = {
            let entry = self.nodes.get(id).ok_or(AsmError::InvalidNode)?;
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.set_next(p, next),
            None => self.head = next,
        }
        match next {
            Some(n) => self.set_prev(n, prev),
            None => self.tail = prev,
        }
        if self.cursor == InsertPoint::After(id) {
            self.cursor = prev.map_or(InsertPoint::Front, InsertPoint::After);
        }
        let entry = self.nodes.remove(id).ok_or(AsmError::InvalidNode)?;
        match entry.node {
            Node::Label(label) => {
                if let Some(index) = self.label_index(label) {
                    self.labels[index].node = None;
                }
            }
            Node::Section(section) => {
                if let Some(data) = self.section_data_mut(section) {
                    data.node = None;
                }
            }
            _ => {}
        }
        Ok(entry.node)
    }

    /// Check handles and parameters carried by `node` before it is linked in.
    fn validate(&self, node: &Node) -> Result<(), AsmError> {
        for label in node.referenced_labels().into_iter().flatten() {
            if !self.is_valid_label(label) {
                return Err(AsmError::InvalidLabel { id: label.0 });
            }
        }
        match node {
            Node::Label(label) => {
                let data = self
                    .label_data(*label)
                    .ok_or(AsmError::InvalidLabel { id: label.0 })?;
                if data.node.is_some() {
                    return Err(AsmError::AlreadyBound {
                        what: String::from("label"),
                        id: label.0,
                    });
                }
            }
            Node::Section(section) => {
                let data = self
                    .section_data(*section)
                    .ok_or(AsmError::InvalidSection { id: section.0 })?;
                if data.node.is_some() {
                    return Err(AsmError::AlreadyBound {
                        what: String::from("section"),
                        id: section.0,
                    });
                }
            }
            Node::Align { alignment, .. } if !alignment.is_power_of_two() => {
                return Err(AsmError::InvalidParameter {
                    detail: alloc::format!("alignment {} is not a power of two", alignment),
                });
            }
            Node::EmbedLabel { size, .. } if !matches!(size, 2 | 4 | 8) => {
                return Err(AsmError::InvalidParameter {
                    detail: alloc::format!("embedded address width {} is not 2, 4 or 8", size),
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Record the bind marker behind `id` in the label or section table.
    fn register(&mut self, id: NodeId) {
        match self.nodes.get(id).map(|e| &e.node) {
            Some(&Node::Label(label)) => {
                if let Some(index) = self.label_index(label) {
                    self.labels[index].node = Some(id);
                    tracing::trace!(label = label.0, "label bound");
                }
            }
            Some(&Node::Section(section)) => {
                if let Some(data) = self.section_data_mut(section) {
                    data.node = Some(id);
                    tracing::trace!(section = section.0, "section bound");
                }
            }
            _ => {}
        }
    }

    /// Link the detached node `id` after `prev` (`None` = at the head).
    fn link_after(&mut self, prev: Option<NodeId>, id: NodeId) {
        let next = match prev {
            Some(p) => self.nodes.get(p).and_then(|e| e.next),
            None => self.head,
        };
        if let Some(entry) = self.nodes.get_mut(id) {
            entry.prev = prev;
            entry.next = next;
        }
        match prev {
            Some(p) => self.set_next(p, Some(id)),
            None => self.head = Some(id),
        }
        match next {
            Some(n) => self.set_prev(n, Some(id)),
            None => self.tail = Some(id),
        }
    }

    fn set_next(&mut self, id: NodeId, next: Option<NodeId>) {
        if let Some(entry) = self.nodes.get_mut(id) {
            entry.next = next;
        }
    }

    fn set_prev(&mut self, id: NodeId, prev: Option<NodeId>) {
        if let Some(entry) = self.nodes.get_mut(id) {
            entry.prev = prev;
        }
    }

    // ── Traversal ───────────────────────────────────────────

    /// First node in program order.
    #[must_use]
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    /// Last node in program order.
    #[must_use]
    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    /// Node after `id`.
    #[must_use]
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.next
    }

    /// Node before `id`.
    #[must_use]
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.prev
    }

    /// The node behind `id`; `None` for a stale handle.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).map(|e| &e.node)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes from head to tail.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            program: self,
            next: self.head,
        }
    }

    /// Node handles from head to tail.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Drop every node, label, section and name.
    ///
    /// Ids keep counting from where they were, so labels and sections
    /// created before the clear stay invalid.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
        self.cursor = InsertPoint::Tail;
        self.label_base = self.label_base.saturating_add(self.labels.len() as u32);
        self.section_base = self.section_base.saturating_add(self.sections.len() as u32);
        self.labels.clear();
        self.sections.clear();
        self.names.clear();
    }
}

/// Next id after `len` ids issued from `base`; `u32::MAX` stays unused.
fn next_id(base: u32, len: usize, resource: &str) -> Result<u32, AsmError> {
    u32::try_from(len)
        .ok()
        .and_then(|len| base.checked_add(len))
        .filter(|&id| id != u32::MAX)
        .ok_or_else(|| AsmError::LimitExceeded {
            resource: String::from(resource),
            limit: u32::MAX as usize,
        })
}

/// Head-to-tail iterator over `(NodeId, &Node)`.
pub struct Iter<'a> {
    program: &'a Program,
    next: Option<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let entry = self.program.nodes.get(id)?;
        self.next = entry.next;
        Some((id, &entry.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Mnemonic;

    fn nop() -> Instruction {
        Instruction::new(Mnemonic::Nop)
    }

    fn order(p: &Program) -> Vec<Node> {
        p.iter().map(|(_, n)| n.clone()).collect()
    }

    #[test]
    fn labels_are_dense_and_named() {
        let mut p = Program::new(MachineMode::Long64);
        let a = p.create_label().unwrap();
        let b = p.create_named_label("loop").unwrap();
        assert_eq!(a.id(), 0);
        assert_eq!(b.id(), 1);
        assert_eq!(p.label_name(a), None);
        assert_eq!(p.label_name(b), Some("loop"));
        assert_eq!(p.find_label("loop"), Some(b));
        assert_eq!(p.label_count(), 2);
    }

    #[test]
    fn double_bind_is_rejected() {
        let mut p = Program::new(MachineMode::Long64);
        let l = p.create_label().unwrap();
        p.bind_label(l).unwrap();
        assert_eq!(
            p.bind_label(l),
            Err(AsmError::AlreadyBound {
                what: "label".into(),
                id: 0
            })
        );
        assert_eq!(p.node_count(), 1);
    }

    #[test]
    fn foreign_label_is_rejected() {
        let mut p = Program::new(MachineMode::Long64);
        assert_eq!(
            p.bind_label(Label(5)),
            Err(AsmError::InvalidLabel { id: 5 })
        );
        assert_eq!(
            p.emit_instruction(Instruction::with1(Mnemonic::Jmp, Label(9))),
            Err(AsmError::InvalidLabel { id: 9 })
        );
        assert_eq!(p.node_count(), 0);
    }

    #[test]
    fn section_alignment_must_be_power_of_two() {
        let mut p = Program::new(MachineMode::Long64);
        assert!(matches!(
            p.create_section(".text", SectionAttribs::CODE, 0),
            Err(AsmError::InvalidParameter { .. })
        ));
        assert!(matches!(
            p.create_section(".text", SectionAttribs::CODE, 24),
            Err(AsmError::InvalidParameter { .. })
        ));
        let s = p.create_section(".text", SectionAttribs::CODE, 16).unwrap();
        assert_eq!(p.section_name(s), Some(".text"));
        assert_eq!(p.section_align(s), Some(16));
        assert_eq!(p.section_attribs(s), Some(SectionAttribs::CODE));
    }

    #[test]
    fn sections_get_sequential_physical_index() {
        let mut p = Program::new(MachineMode::Long64);
        let text = p.create_section(".text", SectionAttribs::CODE, 1).unwrap();
        let data = p.create_section(".data", SectionAttribs::DATA, 1).unwrap();
        p.bind_section(data).unwrap();
        p.bind_section(text).unwrap();
        assert_eq!(p.section_physical_index(data), Some(0));
        assert_eq!(p.section_physical_index(text), Some(1));
        assert!(matches!(
            p.bind_section(text),
            Err(AsmError::AlreadyBound { .. })
        ));
    }

    #[test]
    fn cursor_inserts_after_and_advances() {
        let mut p = Program::new(MachineMode::Long64);
        let first = p.emit_instruction(nop()).unwrap();
        p.emit_instruction(Instruction::new(Mnemonic::Ret)).unwrap();
        p.set_cursor(Some(first)).unwrap();
        let a = p.emit_data(1u8).unwrap();
        let b = p.emit_data(2u8).unwrap();
        assert_eq!(p.cursor(), Some(b));
        assert_eq!(p.next(first), Some(a));
        assert_eq!(p.next(a), Some(b));
        let kinds = order(&p);
        assert_eq!(kinds[0], Node::Instruction(nop()));
        assert_eq!(kinds[1], Node::Data(Data::from(1u8)));
        assert_eq!(kinds[2], Node::Data(Data::from(2u8)));
        assert_eq!(kinds[3], Node::Instruction(Instruction::new(Mnemonic::Ret)));
    }

    #[test]
    fn insert_before_head() {
        let mut p = Program::new(MachineMode::Long64);
        let first = p.emit_instruction(nop()).unwrap();
        let new = p.insert_before(first, Node::Data(Data::from(7u8))).unwrap();
        assert_eq!(p.head(), Some(new));
        assert_eq!(p.prev(first), Some(new));
        assert_eq!(p.tail(), Some(first));
    }

    #[test]
    fn remove_unbinds_and_invalidates_handle() {
        let mut p = Program::new(MachineMode::Long64);
        let l = p.create_label().unwrap();
        p.emit_instruction(nop()).unwrap();
        let marker = p.bind_label(l).unwrap();
        let tail = p.emit_instruction(nop()).unwrap();
        assert_eq!(p.remove(marker), Ok(Node::Label(l)));
        assert!(!p.is_bound(l));
        assert_eq!(p.remove(marker), Err(AsmError::InvalidNode));
        assert!(p.node(marker).is_none());
        assert_eq!(p.node_count(), 2);
        // Rebinding is allowed after the marker is gone; the freed slot is reused.
        let again = p.bind_label(l).unwrap();
        assert_eq!(again.index(), marker.index());
        assert_ne!(again, marker);
        assert_eq!(p.prev(again), Some(tail));
    }

    #[test]
    fn remove_cursor_moves_back() {
        let mut p = Program::new(MachineMode::Long64);
        let a = p.emit_instruction(nop()).unwrap();
        let b = p.emit_instruction(nop()).unwrap();
        p.set_cursor(Some(b)).unwrap();
        p.remove(b).unwrap();
        assert_eq!(p.cursor(), Some(a));
        assert_eq!(p.tail(), Some(a));
        assert_eq!(p.set_cursor(Some(b)), Err(AsmError::InvalidNode));
    }

    #[test]
    fn align_and_embed_parameters_checked() {
        let mut p = Program::new(MachineMode::Legacy32);
        let l = p.create_label().unwrap();
        assert!(matches!(
            p.emit_align(3, AlignMode::Code),
            Err(AsmError::InvalidParameter { .. })
        ));
        assert!(matches!(
            p.emit_embed_label_sized(l, 3),
            Err(AsmError::InvalidParameter { .. })
        ));
        let id = p.emit_embed_label(l).unwrap();
        assert_eq!(p.node(id), Some(&Node::EmbedLabel { label: l, size: 4 }));
    }

    #[test]
    fn clear_resets_everything() {
        let mut p = Program::new(MachineMode::Long64);
        let l = p.create_named_label("x").unwrap();
        p.bind_label(l).unwrap();
        p.create_section(".text", SectionAttribs::CODE, 1).unwrap();
        p.clear();
        assert_eq!(p.node_count(), 0);
        assert_eq!(p.label_count(), 0);
        assert_eq!(p.section_count(), 0);
        assert!(p.head().is_none());
        assert_eq!(p.iter().count(), 0);
    }
}
