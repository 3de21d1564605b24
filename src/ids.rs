//! Dense identifiers and the name interner shared by storage and query layers.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Stable identifier of a logical vertex or edge record.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Gid(pub u64);

/// Transaction identifier, monotonically increasing across the process.
pub type TxId = u64;

/// Per-transaction command counter.
pub type CommandId = u32;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct LabelId(pub u32);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct EdgeTypeId(pub u32);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PropertyId(pub u32);

/// Where a property value lives: the in-memory vector or the ordered KV
/// overflow layer.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Location {
    Memory,
    Disk,
}

/// Property key: dense id plus the storage location hint.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PropertyKey {
    pub id: PropertyId,
    pub location: Location,
}

impl PropertyKey {
    pub fn new(id: PropertyId, location: Location) -> Self {
        Self { id, location }
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bidirectional mapping from names to dense ids of one identifier family.
#[derive(Debug, Default)]
pub struct NameIdMapper {
    inner: RwLock<MapperInner>,
}

#[derive(Debug, Default)]
struct MapperInner {
    forward: HashMap<String, u32>,
    reverse: Vec<String>,
}

impl NameIdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, interning it on first use.
    pub fn intern(&self, name: &str) -> u32 {
        if let Some(&id) = self.inner.read().forward.get(name) {
            return id;
        }
        let mut inner = self.inner.write();
        if let Some(&id) = inner.forward.get(name) {
            return id;
        }
        let id = inner.reverse.len() as u32;
        inner.forward.insert(name.to_owned(), id);
        inner.reverse.push(name.to_owned());
        id
    }

    /// Returns the name interned under `id`, if any.
    pub fn name(&self, id: u32) -> Option<String> {
        self.inner.read().reverse.get(id as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mapper = NameIdMapper::new();
        let a = mapper.intern("Person");
        let b = mapper.intern("City");
        assert_eq!(a, mapper.intern("Person"));
        assert_ne!(a, b);
        assert_eq!(mapper.name(a).as_deref(), Some("Person"));
        assert_eq!(mapper.name(b).as_deref(), Some("City"));
        assert_eq!(mapper.name(99), None);
    }
}
