//! Instrumentation prelude (§4.3 "Instrumentation prelude"): reserve the
//! counter image and per-feature streams array ahead of recompiling, so
//! every `Export` instruction `compile::recompile_function` lowers has
//! somewhere to write. Also reserves a real constant declaration for
//! every `Literal` instruction the function body contains, for the same
//! reason: SPIR-V constants are module-scope, not something a `Function`
//! section instruction can declare inline.

use fxhash::FxHashMap;
use instrument_il::{Constant, Function, InstructionKind, Program, Type, TypeId, ValueId};
use spirv_headers::{Decoration, Op};

use crate::raw::encode;
use crate::relocation::RelocationStream;
use crate::sections::SectionId;

/// Storage class numeric values this crate needs; SPIR-V names many more,
/// but the prelude only ever declares `UniformConstant` resources.
const STORAGE_CLASS_UNIFORM_CONSTANT: u32 = 0;

pub struct ExportGlobals {
    pub counter_image_numeric: u32,
    pub streams_array_numeric: u32,
}

/// Reserve the two globals named in §4.3: a `Buffer<uint>` counter image
/// at `(set=export_set, binding=0)` and an `RWBuffer<uint>[stream_count]`
/// streams array at `(set=export_set, binding=1)`. Declarations go at the
/// head of the Declarations section (ahead of whatever the shader itself
/// declared); decorations go into the Annotation section.
pub fn reserve_export_globals(
    program: &mut Program,
    export_set: u32,
    stream_count: u32,
    next_numeric_id: &mut u32,
    out: &mut RelocationStream,
) -> ExportGlobals {
    let mut fresh = || {
        let id = *next_numeric_id;
        *next_numeric_id += 1;
        id
    };

    let uint_ty = program.types.intern(Type::Int { bit_width: 32, signed: false });
    let image_ty = program.types.intern(image_type(uint_ty));
    let ptr_image_ty = program.types.intern(Type::Pointer { space: STORAGE_CLASS_UNIFORM_CONSTANT, pointee: image_ty });
    let array_ty = program.types.intern(Type::Array { elem: image_ty, count: stream_count });
    let ptr_array_ty = program.types.intern(Type::Pointer { space: STORAGE_CLASS_UNIFORM_CONSTANT, pointee: array_ty });

    let uint_ty_id = fresh();
    let image_ty_id = fresh();
    let ptr_image_ty_id = fresh();
    let counter_var = fresh();

    let count_const_id = fresh();
    let array_ty_id = fresh();
    let ptr_array_ty_id = fresh();
    let streams_var = fresh();

    program.add_global("__export_counter", ptr_image_ty);
    program.add_global("__export_streams", ptr_array_ty);

    let mut decls = Vec::new();
    encode(&mut decls, Op::TypeInt as u16, [uint_ty_id, 32, 0]);
    encode(&mut decls, Op::TypeImage as u16, image_type_operands(image_ty_id, uint_ty_id));
    encode(&mut decls, Op::TypePointer as u16, [ptr_image_ty_id, STORAGE_CLASS_UNIFORM_CONSTANT, image_ty_id]);
    encode(&mut decls, Op::Variable as u16, [ptr_image_ty_id, counter_var, STORAGE_CLASS_UNIFORM_CONSTANT]);
    encode(&mut decls, Op::Constant as u16, [uint_ty_id, count_const_id, stream_count]);
    encode(&mut decls, Op::TypeArray as u16, [array_ty_id, image_ty_id, count_const_id]);
    encode(&mut decls, Op::TypePointer as u16, [ptr_array_ty_id, STORAGE_CLASS_UNIFORM_CONSTANT, array_ty_id]);
    encode(&mut decls, Op::Variable as u16, [ptr_array_ty_id, streams_var, STORAGE_CLASS_UNIFORM_CONSTANT]);
    out.prepend(SectionId::Declarations, decls);

    let mut annotations = Vec::new();
    encode(&mut annotations, Op::Decorate as u16, [counter_var, Decoration::DescriptorSet as u32, export_set]);
    encode(&mut annotations, Op::Decorate as u16, [counter_var, Decoration::Binding as u32, 0]);
    encode(&mut annotations, Op::Decorate as u16, [streams_var, Decoration::DescriptorSet as u32, export_set]);
    encode(&mut annotations, Op::Decorate as u16, [streams_var, Decoration::Binding as u32, 1]);
    out.prepend(SectionId::Annotation, annotations);

    ExportGlobals { counter_image_numeric: counter_var, streams_array_numeric: streams_var }
}

/// Reserve a real `OpConstant`/`OpConstantTrue`/`OpConstantFalse`/`OpUndef`
/// for every `Literal` instruction `func` contains, and record each one's
/// result `ValueId` against the numeric id it was declared under.
/// `Literal` has no source span to copy through and, unlike every other
/// synthesized instruction, can't resolve to a record sitting in the
/// Function section at all: SPIR-V constants are declared once at module
/// scope, so the declaration has to land here, ahead of the function body,
/// the same reason `reserve_export_globals` reserves its own globals here
/// rather than inline.
pub fn reserve_literal_constants(
    func: &Function,
    program: &Program,
    next_numeric_id: &mut u32,
    numeric_of_value: &mut FxHashMap<ValueId, u32>,
    out: &mut RelocationStream,
) {
    let mut fresh = || {
        let id = *next_numeric_id;
        *next_numeric_id += 1;
        id
    };

    let mut decls = Vec::new();
    for block in func.blocks() {
        for inst in block.instructions() {
            let InstructionKind::Literal { value, .. } = &inst.kind else { continue };
            let Some(result) = inst.result else { continue };
            // Placeholder result-type id: the IL carries no per-value
            // OpType table to look an already-declared type up in, the
            // same simplification `compile::result_type_numeric` makes.
            let result_ty = fresh();
            let result_id = fresh();
            let (_, constant) = program.consts.get(*value);
            match constant {
                Constant::Bool(true) => encode(&mut decls, Op::ConstantTrue as u16, [result_ty, result_id]),
                Constant::Bool(false) => encode(&mut decls, Op::ConstantFalse as u16, [result_ty, result_id]),
                Constant::Int(v) => encode(&mut decls, Op::Constant as u16, [result_ty, result_id, *v as u32]),
                Constant::FP(bits) => encode(&mut decls, Op::Constant as u16, [result_ty, result_id, *bits as u32]),
                Constant::Undef => encode(&mut decls, Op::Undef as u16, [result_ty, result_id]),
                Constant::Unexposed(_) => encode(&mut decls, Op::Undef as u16, [result_ty, result_id]),
            }
            numeric_of_value.insert(result, result_id);
        }
    }
    out.prepend(SectionId::Declarations, decls);
}

fn image_type(sampled_type: TypeId) -> Type {
    Type::Buffer {
        elem: sampled_type,
        texel_format: instrument_il::TexelFormat::R32Uint,
        sampler_mode: instrument_il::SamplerMode::None,
    }
}

/// `OpTypeImage`'s operand layout: ResultId, SampledType, Dim, Depth,
/// Arrayed, MS, Sampled, Format — fixed at `Dim::Buffer`/`Format::R32ui`
/// for the counter/streams resources this prelude declares.
fn image_type_operands(result_id: u32, sampled_type_id: u32) -> [u32; 8] {
    const DIM_BUFFER: u32 = 5;
    const IMAGE_FORMAT_R32UI: u32 = 21;
    [result_id, sampled_type_id, DIM_BUFFER, 0, 0, 0, 2, IMAGE_FORMAT_R32UI]
}
