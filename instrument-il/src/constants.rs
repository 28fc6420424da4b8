//! Constant representation and interning (§3 "Constant"), keyed by
//! (canonical type, scalar-key) the same way `TypeMap` interns by
//! kind+subfields. `Undef` is per-type distinct, matching §4.1
//! "Constant interning".

use fxhash::FxHashMap;

use crate::ids::{ConstId, TypeId};

#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Bool(bool),
    /// Stored as raw bits so signed/unsigned ints of the same width+value
    /// share a key.
    Int(u64),
    /// Stored as bit pattern so constants hash/compare exactly rather than
    /// through float equality.
    FP(u64),
    Undef,
    Unexposed(u32),
}

/// Hashable sort key for a constant at a given type; mirrors the
/// original's `ConstantSortKey<T>`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
struct ConstKey(TypeId, ConstScalarKey);

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
enum ConstScalarKey {
    Bool(bool),
    Int(u64),
    FP(u64),
    Undef,
    Unexposed(u32),
}

impl Constant {
    fn scalar_key(&self) -> ConstScalarKey {
        match *self {
            Constant::Bool(b) => ConstScalarKey::Bool(b),
            Constant::Int(v) => ConstScalarKey::Int(v),
            Constant::FP(bits) => ConstScalarKey::FP(bits),
            Constant::Undef => ConstScalarKey::Undef,
            Constant::Unexposed(tag) => ConstScalarKey::Unexposed(tag),
        }
    }
}

/// Interning table for `Constant`, owned by a `Program`. Constants are
/// pushed into a single growing `Vec` and never individually removed —
/// the Rust translation of the original's bump-region block allocator
/// (Design Note 1: handles/indices stand in for the original's raw
/// pointers into that region).
#[derive(Debug, Default, Clone)]
pub struct ConstantMap {
    constants: Vec<(TypeId, Constant)>,
    lookup: FxHashMap<ConstKey, ConstId>,
}

impl ConstantMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, ty: TypeId, value: Constant) -> ConstId {
        let key = ConstKey(ty, value.scalar_key());
        if let Some(&id) = self.lookup.get(&key) {
            return id;
        }
        let id = ConstId(self.constants.len() as u32);
        self.lookup.insert(key, id);
        self.constants.push((ty, value));
        id
    }

    /// `Undef` is per-type distinct: interning it twice at the same type
    /// returns the same id, but interning it at two different types
    /// returns two different ids (the scalar key includes the type).
    pub fn undef(&mut self, ty: TypeId) -> ConstId {
        self.intern(ty, Constant::Undef)
    }

    pub fn get(&self, id: ConstId) -> (TypeId, &Constant) {
        let (ty, c) = &self.constants[id.index()];
        (*ty, c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstId, TypeId, &Constant)> {
        self.constants
            .iter()
            .enumerate()
            .map(|(i, (ty, c))| (ConstId(i as u32), *ty, c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Type, TypeMap};

    #[test]
    fn undef_is_per_type_distinct() {
        let mut types = TypeMap::new();
        let mut consts = ConstantMap::new();
        let i32_ty = types.intern(Type::Int { bit_width: 32, signed: true });
        let f32_ty = types.intern(Type::FP { bit_width: 32 });
        let u1 = consts.undef(i32_ty);
        let u2 = consts.undef(i32_ty);
        let u3 = consts.undef(f32_ty);
        assert_eq!(u1, u2);
        assert_ne!(u1, u3);
    }

    #[test]
    fn equal_scalar_values_share_one_id() {
        let mut types = TypeMap::new();
        let mut consts = ConstantMap::new();
        let i32_ty = types.intern(Type::Int { bit_width: 32, signed: true });
        let a = consts.intern(i32_ty, Constant::Int(42));
        let b = consts.intern(i32_ty, Constant::Int(42));
        assert_eq!(a, b);
    }
}
