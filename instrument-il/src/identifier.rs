//! Monotonic identifier allocation, mirroring the original `IdentifierMap`
//! (`AllocID`/`SetBound`/`Get`): a dense, index-addressable map from
//! `ValueId` to what defines it. IDs are never reused within a `Program`.

use crate::ids::{ValueDef, ValueId};

#[derive(Debug, Default, Clone)]
pub struct IdentifierMap {
    defs: Vec<ValueDef>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new identifier, initially unresolved.
    pub fn alloc(&mut self) -> ValueId {
        let id = ValueId(self.defs.len() as u32);
        self.defs.push(ValueDef::Unresolved);
        id
    }

    /// Ensure the map can address at least `bound` identifiers, as bitcode
    /// and SPIR-V headers both declare an upper bound on value IDs up
    /// front.
    pub fn set_bound(&mut self, bound: u32) {
        if (self.defs.len() as u32) >= bound {
            return;
        }
        self.defs.resize(bound as usize, ValueDef::Unresolved);
    }

    pub fn max_id(&self) -> u32 {
        self.defs.len() as u32
    }

    /// Record what a previously allocated (or bound-reserved) id resolves
    /// to.
    pub fn define(&mut self, id: ValueId, def: ValueDef) {
        if id.index() >= self.defs.len() {
            self.defs.resize(id.index() + 1, ValueDef::Unresolved);
        }
        self.defs[id.index()] = def;
    }

    pub fn get(&self, id: ValueId) -> ValueDef {
        self.defs
            .get(id.index())
            .copied()
            .unwrap_or(ValueDef::Unresolved)
    }
}
