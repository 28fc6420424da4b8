//! Type representation and interning (§3 "Type"). Interning hashes by
//! kind + subfields and returns a canonical `TypeId`; two syntactically
//! equal types always share one id. Grounded on `spirv::ast::parse_types`'s
//! bottom-up arena interning walk, generalized
//! from a read-only arena of `TypeDesc` to a mutable, program-owned map
//! keyed by `TypeId` rather than borrowed references.

use fxhash::FxHashMap;

use crate::ids::TypeId;

/// Sampler behaviour recorded on buffer/texture resource types, per §3.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SamplerMode {
    None,
    Comparison,
    Default,
}

/// Texel format tag carried by typed buffer/texture resources.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TexelFormat {
    Unknown,
    R32Uint,
    R32Int,
    R32Float,
    Rgba32Float,
    Rgba8Unorm,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TextureDim {
    Dim1D,
    Dim2D,
    Dim3D,
    Cube,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Type {
    Void,
    Bool,
    Int { bit_width: u32, signed: bool },
    FP { bit_width: u32 },
    Vector { elem: TypeId, dim: u32 },
    Matrix { elem: TypeId, rows: u32, cols: u32 },
    Pointer { space: u32, pointee: TypeId },
    Array { elem: TypeId, count: u32 },
    Struct { members: Vec<TypeId> },
    Buffer { elem: TypeId, texel_format: TexelFormat, sampler_mode: SamplerMode },
    Texture {
        dim: TextureDim,
        sampled: bool,
        ms: bool,
        sampler_mode: SamplerMode,
        format: TexelFormat,
    },
    Function { ret: TypeId, params: Vec<TypeId> },
    /// Preserves an opcode/operand shape we don't need to interpret
    /// semantically, so round-trip copy-through still works (§3).
    Unexposed { tag: u32 },
}

/// Interning table for `Type`. Owned by a `Program`; `TypeId`s never
/// cross `Program` boundaries (Design Note 1) — copying a program into
/// another re-interns every type by walking `types` in id order and
/// calling `intern` against the destination map (see
/// `Program::import_type`).
#[derive(Debug, Default, Clone)]
pub struct TypeMap {
    types: Vec<Type>,
    lookup: FxHashMap<Type, TypeId>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.lookup.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.lookup.insert(ty.clone(), id);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Int { .. })
    }

    pub fn is_signed(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Int { signed: true, .. })
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::FP { .. })
    }

    pub fn is_vector(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Vector { .. })
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Struct { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_types_share_one_id() {
        let mut map = TypeMap::new();
        let a = map.intern(Type::Int { bit_width: 32, signed: true });
        let b = map.intern(Type::Int { bit_width: 32, signed: true });
        let c = map.intern(Type::Int { bit_width: 32, signed: false });
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nested_types_intern_by_structure() {
        let mut map = TypeMap::new();
        let i32_ty = map.intern(Type::Int { bit_width: 32, signed: true });
        let v1 = map.intern(Type::Vector { elem: i32_ty, dim: 4 });
        let v2 = map.intern(Type::Vector { elem: i32_ty, dim: 4 });
        assert_eq!(v1, v2);
    }
}
