//! Interned name pool for labels and sections.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Handle to an interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NameId(u32);

/// Deduplicating string storage; equal names share one id.
#[derive(Debug, Clone, Default)]
pub struct NamePool {
    names: Vec<String>,
    lookup: BTreeMap<String, NameId>,
}

impl NamePool {
    /// Empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the existing id if it was seen before.
    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = NameId(self.names.len() as u32);
        self.names.push(String::from(name));
        self.lookup.insert(String::from(name), id);
        id
    }

    /// Id of `name` if it has been interned.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<NameId> {
        self.lookup.get(name).copied()
    }

    /// Resolve an id back to its string.
    #[must_use]
    pub fn get(&self, id: NameId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Forget every name.
    pub fn clear(&mut self) {
        self.names.clear();
        self.lookup.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_dedups() {
        let mut pool = NamePool::new();
        let a = pool.intern(".text");
        let b = pool.intern(".data");
        let c = pool.intern(".text");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(b), Some(".data"));
        assert_eq!(pool.find(".text"), Some(a));
        assert_eq!(pool.find(".bss"), None);
    }

    #[test]
    fn clear_empties() {
        let mut pool = NamePool::new();
        pool.intern("x");
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.find("x"), None);
    }
}
