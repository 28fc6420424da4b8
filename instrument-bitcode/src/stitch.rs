//! Stitch (§4.2 "Stitch"): assemble a complete module bitstream around a
//! recompiled function body. Unlike `instrument-spir::stitch`, which
//! concatenates untouched sections byte-for-byte, every block here is
//! freshly written from the current `Program` state — the TYPE and
//! CONSTANTS blocks have to agree on the same relative-id/table-index
//! numbering `compile::compile_function` assumed, and nothing in a
//! bitcode stream is a flat relocatable section the way SPIR-V's are.
//!
//! The value symbol table is not re-emitted: it exists purely for
//! diagnostics (`symbols.rs`), and every name a feature or intrinsic call
//! needs is already carried directly on the IL (`InstructionKind::
//! Unexposed::callee`), so nothing downstream of compile ever looks a
//! name back up from the wire.

use fxhash::FxHashMap;
use instrument_il::{Constant, Program, Type, TypeId, ValueDef, ValueId};

use crate::codes::{BlockId, ConstantsCode, ModuleCode, TypeCode};
use crate::parse::ParsedModule;
use crate::reader::{encode_signed, Record};
use crate::writer::BitWriter;
use crate::Result;

/// Reserved type-table code for a type this backend never needs to
/// round-trip structurally (`Pointer`, `Struct`, `Buffer`, `Texture`,
/// `Matrix`): read back by `parse_type_block`'s `else` branch as
/// `Type::Unexposed`, the same outcome an unrecognized code from a real
/// module already produces.
const UNEXPOSED_TYPE_CODE: u64 = 0;

fn write_type_block(w: &mut BitWriter, program: &Program) {
    w.enter_subblock(BlockId::Type as u32, 5);
    let count = program.types.iter().count();
    w.write_unabbrev_record(TypeCode::NumEntry as u64, &[count as u64]);
    for (_, ty) in program.types.iter() {
        let (code, operands): (u64, Vec<u64>) = match ty {
            Type::Void => (TypeCode::Void as u64, vec![]),
            Type::Bool => (TypeCode::Integer as u64, vec![1]),
            Type::Int { bit_width, .. } => (TypeCode::Integer as u64, vec![*bit_width as u64]),
            Type::FP { bit_width: 32 } => (TypeCode::Float as u64, vec![]),
            Type::FP { bit_width: 64 } => (TypeCode::Double as u64, vec![]),
            Type::FP { .. } => (UNEXPOSED_TYPE_CODE, vec![]),
            Type::Array { elem, count } => (TypeCode::Array as u64, vec![*count as u64, elem.0 as u64]),
            Type::Vector { elem, dim } => (TypeCode::Vector as u64, vec![*dim as u64, elem.0 as u64]),
            Type::Function { ret, params } => {
                let mut ops = vec![0u64, ret.0 as u64];
                ops.extend(params.iter().map(|p| p.0 as u64));
                (TypeCode::Function as u64, ops)
            }
            Type::Pointer { .. } | Type::Matrix { .. } | Type::Struct { .. } | Type::Buffer { .. } | Type::Texture { .. } | Type::Unexposed { .. } => {
                (UNEXPOSED_TYPE_CODE, vec![])
            }
        };
        w.write_unabbrev_record(code, &operands);
    }
    w.end_block();
}

/// `base_ids`' leading run of function-declaration placeholders
/// (`ValueDef::Unresolved`, registered by `parse_module` ahead of every
/// constant): `base_ids[0]` is always the entry function's own
/// declaration, since `parse_module` assigns the first declared
/// signature to the first (and, in this pipeline, only) function body.
fn write_module_function_decls(w: &mut BitWriter, program: &Program, base_ids: &[ValueId], value_type: &FxHashMap<ValueId, TypeId>) -> usize {
    let mut count = 0;
    for &id in base_ids {
        if !matches!(program.ids.get(id), ValueDef::Unresolved) {
            break;
        }
        let ty = value_type.get(&id).copied().unwrap_or(TypeId(0));
        w.write_unabbrev_record(ModuleCode::Function as u64, &[ty.0 as u64, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        count += 1;
    }
    count
}

fn write_constants_block(w: &mut BitWriter, program: &Program, base_ids: &[ValueId], decl_count: usize) {
    w.enter_subblock(BlockId::Constants as u32, 5);
    let mut current_ty: Option<TypeId> = None;
    for &id in &base_ids[decl_count..] {
        let ValueDef::Constant(cid) = program.ids.get(id) else { continue };
        let (ty, value) = program.consts.get(cid);
        if current_ty != Some(ty) {
            w.write_unabbrev_record(ConstantsCode::Settype as u64, &[ty.0 as u64]);
            current_ty = Some(ty);
        }
        let (code, operands): (u64, Vec<u64>) = match value {
            Constant::Bool(b) => (ConstantsCode::Integer as u64, vec![encode_signed(*b as i64)]),
            Constant::Int(v) => (ConstantsCode::Integer as u64, vec![encode_signed(*v as i64)]),
            Constant::FP(bits) => (ConstantsCode::Float as u64, vec![*bits]),
            Constant::Undef => (ConstantsCode::Undef as u64, vec![]),
            Constant::Unexposed(tag) => (*tag as u64, vec![]),
        };
        w.write_unabbrev_record(code, &operands);
    }
    w.end_block();
}

fn write_function_block(w: &mut BitWriter, records: &[Record]) {
    w.enter_subblock(BlockId::Function as u32, 6);
    for rec in records {
        w.write_unabbrev_record(rec.code, &rec.operands);
    }
    w.end_block();
}

/// Assemble a complete module bitstream around an already-recompiled
/// function body: a fresh TYPE block, the module-level function
/// declarations, a fresh CONSTANTS block, and the FUNCTION block wrapping
/// `records`, in that order. `compile::compile_module` is the usual
/// entry point; this is the pure assembly half, split out the same way
/// `instrument-spir::stitch::stitch_module` is just concatenation while
/// `instrument-spir::compile::recompile_module` does the recompiling.
pub fn stitch_function(parsed: &ParsedModule, records: Vec<Record>) -> Result<Vec<u32>> {
    let mut w = BitWriter::new();
    w.enter_subblock(BlockId::Module as u32, 4);
    write_type_block(&mut w, &parsed.program);
    let decl_count = write_module_function_decls(&mut w, &parsed.program, &parsed.base_ids, &parsed.value_type);
    write_constants_block(&mut w, &parsed.program, &parsed.base_ids, decl_count);
    write_function_block(&mut w, &records);
    w.end_block();
    Ok(w.into_words())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_module;

    fn trivial_module_words() -> Vec<u32> {
        let mut w = BitWriter::new();
        w.enter_subblock(BlockId::Module as u32, 4);

        w.enter_subblock(BlockId::Type as u32, 5);
        w.write_unabbrev_record(TypeCode::NumEntry as u64, &[2]);
        w.write_unabbrev_record(TypeCode::Void as u64, &[]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0]);
        w.end_block();

        w.write_unabbrev_record(ModuleCode::Function as u64, &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        w.enter_subblock(BlockId::Function as u32, 6);
        w.write_unabbrev_record(crate::codes::FunctionCode::DeclareBlocks as u64, &[1]);
        w.write_unabbrev_record(crate::codes::FunctionCode::Ret as u64, &[]);
        w.end_block();

        w.end_block();
        w.into_words()
    }

    #[test]
    fn stitch_round_trips_a_trivial_void_function() {
        let words = trivial_module_words();
        let mut parsed = parse_module(&words).expect("module parses");
        assert_eq!(parsed.program.functions().count(), 1);

        let out = crate::compile::compile_module(&mut parsed).expect("compile succeeds");
        let reparsed = parse_module(&out).expect("stitched module reparses");
        assert_eq!(reparsed.program.functions().count(), 1);
        let func = reparsed.program.function(reparsed.entry_func);
        assert_eq!(func.blocks().len(), 1);
        assert!(matches!(func.blocks()[0].terminator().unwrap().kind, instrument_il::InstructionKind::Return { value: None }));
    }

    #[test]
    fn stitch_preserves_constant_values_across_a_reparse() {
        let mut w = BitWriter::new();
        w.enter_subblock(BlockId::Module as u32, 4);
        w.enter_subblock(BlockId::Type as u32, 5);
        w.write_unabbrev_record(TypeCode::NumEntry as u64, &[3]);
        w.write_unabbrev_record(TypeCode::Void as u64, &[]);
        w.write_unabbrev_record(TypeCode::Integer as u64, &[32]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0]);
        w.end_block();
        w.write_unabbrev_record(ModuleCode::Function as u64, &[2, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        w.enter_subblock(BlockId::Constants as u32, 5);
        w.write_unabbrev_record(ConstantsCode::Settype as u64, &[1]);
        w.write_unabbrev_record(ConstantsCode::Integer as u64, &[encode_signed(41)]);
        w.end_block();
        w.enter_subblock(BlockId::Function as u32, 6);
        w.write_unabbrev_record(crate::codes::FunctionCode::DeclareBlocks as u64, &[1]);
        w.write_unabbrev_record(crate::codes::FunctionCode::Ret as u64, &[]);
        w.end_block();
        w.end_block();
        let words = w.into_words();

        let mut parsed = parse_module(&words).expect("module parses");
        let out = crate::compile::compile_module(&mut parsed).expect("compile succeeds");
        let reparsed = parse_module(&out).expect("stitched module reparses");
        let has_41 = reparsed.program.consts.iter().any(|(_, _, c)| matches!(c, Constant::Int(41)));
        assert!(has_41, "constant value 41 must survive the stitch/reparse round trip");
    }
}
