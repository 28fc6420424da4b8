//! `Program`: the top-level container (§3) — an identifier allocator, a
//! type map, a constant map, a list of functions, globals, and a shader
//! GUID.

use crate::constants::{Constant, ConstantMap};
use crate::function::Function;
use crate::ids::{ConstId, FuncId, GlobalId, TypeId};
use crate::identifier::IdentifierMap;
use crate::instruction::InstructionKind;
use crate::types::{Type, TypeMap};

#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Default)]
pub struct Program {
    pub shader_guid: u64,
    pub ids: IdentifierMap,
    pub types: TypeMap,
    pub consts: ConstantMap,
    pub globals: Vec<GlobalVar>,
    functions: Vec<Function>,
}

impl Program {
    pub fn new(shader_guid: u64) -> Self {
        Program { shader_guid, ..Default::default() }
    }

    pub fn add_function(&mut self, f: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(f);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    /// Split borrow of a function and the identifier map at once: an
    /// `Emitter` needs both live simultaneously, which `function_mut`
    /// alone can't give since it borrows all of `self`.
    pub fn function_and_ids_mut(&mut self, id: FuncId) -> (&mut Function, &mut IdentifierMap) {
        (&mut self.functions[id.index()], &mut self.ids)
    }

    /// Split borrow of a function (mutable, for the in-place reorder pass)
    /// alongside the type and constant tables it needs to read while
    /// recompiling: `function_mut` alone borrows all of `self`, which
    /// would block the simultaneous `&self.types`/`&self.consts` reads
    /// `compile::compile_function` needs.
    pub fn function_and_tables_mut(&mut self, id: FuncId) -> (&mut Function, &TypeMap, &ConstantMap) {
        (&mut self.functions[id.index()], &self.types, &self.consts)
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn add_global(&mut self, name: impl Into<String>, ty: TypeId) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalVar { name: name.into(), ty });
        id
    }

    /// Re-intern a type owned by a different `Program`'s `TypeMap` into
    /// this program's, returning the new, locally-canonical `TypeId`.
    /// This is the "type-kind serialization" walk Design Note 1 calls
    /// for: `TypeId`s never cross `Program` boundaries, so a cross-
    /// program copy must walk the source type structurally and re-intern
    /// each piece bottom-up.
    pub fn import_type(&mut self, src: &TypeMap, ty: TypeId) -> TypeId {
        let resolved = match src.get(ty).clone() {
            Type::Void => Type::Void,
            Type::Bool => Type::Bool,
            Type::Int { bit_width, signed } => Type::Int { bit_width, signed },
            Type::FP { bit_width } => Type::FP { bit_width },
            Type::Vector { elem, dim } => Type::Vector { elem: self.import_type(src, elem), dim },
            Type::Matrix { elem, rows, cols } => {
                Type::Matrix { elem: self.import_type(src, elem), rows, cols }
            }
            Type::Pointer { space, pointee } => {
                Type::Pointer { space, pointee: self.import_type(src, pointee) }
            }
            Type::Array { elem, count } => Type::Array { elem: self.import_type(src, elem), count },
            Type::Struct { members } => {
                Type::Struct { members: members.iter().map(|&m| self.import_type(src, m)).collect() }
            }
            Type::Buffer { elem, texel_format, sampler_mode } => {
                Type::Buffer { elem: self.import_type(src, elem), texel_format, sampler_mode }
            }
            Type::Texture { dim, sampled, ms, sampler_mode, format } => {
                Type::Texture { dim, sampled, ms, sampler_mode, format }
            }
            Type::Function { ret, params } => Type::Function {
                ret: self.import_type(src, ret),
                params: params.iter().map(|&p| self.import_type(src, p)).collect(),
            },
            Type::Unexposed { tag } => Type::Unexposed { tag },
        };
        self.types.intern(resolved)
    }

    pub fn import_const(&mut self, src_types: &TypeMap, src_consts: &ConstantMap, id: ConstId) -> ConstId {
        let (ty, value) = src_consts.get(id);
        let local_ty = self.import_type(src_types, ty);
        let local_value = match value {
            Constant::Bool(b) => Constant::Bool(*b),
            Constant::Int(v) => Constant::Int(*v),
            Constant::FP(bits) => Constant::FP(*bits),
            Constant::Undef => Constant::Undef,
            Constant::Unexposed(tag) => Constant::Unexposed(*tag),
        };
        self.consts.intern(local_ty, local_value)
    }

    /// Clone this program into a private copy for a single compile job
    /// (§5 "Shared-resource policy": "a compile job clones the program to
    /// a private copy before injection, so features never race").
    /// Re-interns every type and constant through `import_type`/
    /// `import_const` (rather than a raw field-for-field clone) so the
    /// copy's ids are valid standalone, per Design Note 1; function
    /// bodies are then rewritten to point at the new ids. The value-id
    /// space itself (`ids`) is shared unchanged between fork and
    /// original — only `TypeId`/`ConstId` are re-interned.
    pub fn fork(&self) -> Program {
        let mut out = Program::new(self.shader_guid);
        out.ids = self.ids.clone();

        let type_remap: Vec<TypeId> = self
            .types
            .iter()
            .map(|(old_id, _)| out.import_type(&self.types, old_id))
            .collect();
        let const_remap: Vec<ConstId> = self
            .consts
            .iter()
            .map(|(old_id, _, _)| out.import_const(&self.types, &self.consts, old_id))
            .collect();

        for g in &self.globals {
            let ty = type_remap[g.ty.index()];
            out.add_global(g.name.clone(), ty);
        }

        for (_, f) in self.functions() {
            let mut f = f.clone();
            remap_function(&mut f, &type_remap, &const_remap);
            out.add_function(f);
        }
        out
    }
}

/// Rewrite every `TypeId`/`ConstId` a cloned `Function` refers to through
/// the id tables `Program::fork` built while re-interning into the
/// destination program. `ValueId`s are untouched: the identifier space is
/// shared verbatim between fork and original.
fn remap_function(f: &mut Function, type_remap: &[TypeId], const_remap: &[ConstId]) {
    for p in &mut f.params {
        *p = type_remap[p.index()];
    }
    f.ret_type = type_remap[f.ret_type.index()];
    for block in f.blocks_mut() {
        for inst in block.instructions_mut() {
            match &mut inst.kind {
                InstructionKind::Alloca { ty } => *ty = type_remap[ty.index()],
                InstructionKind::Cast { dest_type, .. } => {
                    *dest_type = type_remap[dest_type.index()]
                }
                InstructionKind::Literal { ty, value } => {
                    *ty = type_remap[ty.index()];
                    *value = const_remap[value.index()];
                }
                _ => {}
            }
        }
    }
}
