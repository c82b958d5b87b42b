//! Generation-checked slot arena.
//!
//! Slots freed by [`Arena::remove`] are reused by later inserts; each reuse
//! bumps the slot's generation so that an old [`NodeId`] pointing at the slot
//! is rejected instead of silently aliasing the new occupant.

use alloc::vec::Vec;

use crate::error::AsmError;

/// Handle to a value stored in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId {
    index: u32,
    gen: u32,
}

impl NodeId {
    /// Slot index inside the arena.
    #[must_use]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot at the time the handle was issued.
    #[must_use]
    pub fn generation(self) -> u32 {
        self.gen
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    gen: u32,
    value: Option<T>,
}

/// Owning pool of values addressed by [`NodeId`].
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store `value`, reusing a freed slot when one is available.
    pub fn insert(&mut self, value: T) -> Result<NodeId, AsmError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.len += 1;
            return Ok(NodeId {
                index,
                gen: slot.gen,
            });
        }
        let index = u32::try_from(self.slots.len()).map_err(|_| AsmError::LimitExceeded {
            resource: "nodes".into(),
            limit: u32::MAX as usize,
        })?;
        self.slots.push(Slot {
            gen: 0,
            value: Some(value),
        });
        self.len += 1;
        Ok(NodeId { index, gen: 0 })
    }

    /// Remove and return the value behind `id`; `None` for a stale handle.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        let value = slot.value.take()?;
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Shared access; `None` for a stale or foreign handle.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable access; `None` for a stale or foreign handle.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.value.as_mut()
    }

    /// Whether `id` refers to a live value.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no value is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated (live plus free).
    #[must_use]
    pub fn capacity_used(&self) -> usize {
        self.slots.len()
    }

    /// Drop every value and forget all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
