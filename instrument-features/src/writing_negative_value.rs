//! The one concrete shipped feature (§4.4, §8 seed test 2), grounded
//! directly on `WritingNegativeValueFeature::Inject`/`Instrument`: finds
//! the first `StoreBuffer` in a program and replaces it with a guarded
//! form —
//!
//! ```text
//! pre:    cmp = value < 0; br cond(cmp) fail resume
//! fail:   export(msg); br resume
//! resume: original_store
//! ```
//!
//! using `Emitter::split` to carve `fail`/`resume` out of the block that
//! housed the store.

use smallvec::{smallvec, SmallVec};

use instrument_il::{
    BlockId, CmpKind, Constant, Emitter, FuncId, InstructionKind, Program, Type, ValueId,
};

use crate::export::{ExportField, ExportSchema, ExportSchemaSink};
use crate::feature::Feature;
use crate::registry::FeatureRegistry;

/// Message payload: one field, the value that tripped the check. The
/// original's `ShaderExport` additionally carries a `'proxy'` tag
/// constant purely to distinguish test fixtures at the wire level; that
/// has no counterpart once the schema itself carries a `schema_id`, so
/// it is dropped rather than carried forward as dead weight.
const VALUE_FIELD_BITS: u32 = 32;

pub struct WritingNegativeValue {
    schema_id: u32,
}

impl WritingNegativeValue {
    pub fn new() -> Self {
        WritingNegativeValue { schema_id: 0 }
    }

    fn find_first_store_buffer(program: &Program) -> Option<(FuncId, BlockId, usize, ValueId)> {
        for (fid, func) in program.functions() {
            for block in func.blocks() {
                for (index, inst) in block.instructions().iter().enumerate() {
                    if let InstructionKind::StoreBuffer { value, .. } = &inst.kind {
                        return Some((fid, block.id, index, *value));
                    }
                }
            }
        }
        None
    }
}

impl Default for WritingNegativeValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for WritingNegativeValue {
    fn install(&mut self, registry: &FeatureRegistry) -> bool {
        self.schema_id = registry
            .pending_id()
            .expect("register() always assigns a pending id before calling install")
            .index() as u32;
        true
    }

    fn collect_exports(&self, sink: &mut ExportSchemaSink) {
        sink.publish(ExportSchema {
            schema_id: self.schema_id,
            name: "WritingNegativeValue",
            has_sguid: false,
            fields: smallvec![ExportField { name: "value", bits: VALUE_FIELD_BITS }],
        });
    }

    fn inject(&self, program: &mut Program) {
        let Some((fid, block_id, index, value)) = Self::find_first_store_buffer(program) else {
            return;
        };

        let i32_ty = program.types.intern(Type::Int { bit_width: 32, signed: true });
        let zero = program.consts.intern(i32_ty, Constant::Int(0));

        let fail_block = program.function_mut(fid).alloc_block();

        let resume_block = {
            let (func, ids) = program.function_and_ids_mut(fid);
            let mut pre = Emitter::at_index(func, ids, block_id, index);
            pre.split()
        };

        {
            let (func, ids) = program.function_and_ids_mut(fid);
            let mut em = Emitter::at_end_of(func, ids, fail_block);
            let fields: SmallVec<[ValueId; 4]> = smallvec![value];
            em.emit_void(InstructionKind::Export { schema_id: self.schema_id, fields });
            em.emit_void(InstructionKind::Branch { target: resume_block });
        }

        {
            let (func, ids) = program.function_and_ids_mut(fid);
            let mut pre = Emitter::at_end_of(func, ids, block_id);
            let literal_zero = pre.emit(InstructionKind::Literal { ty: i32_ty, value: zero });
            let cond = pre.emit(InstructionKind::Cmp {
                op: CmpKind::Lt,
                lhs: value,
                rhs: literal_zero,
                signed: true,
            });
            pre.emit_void(InstructionKind::BranchConditional {
                cond,
                true_target: fail_block,
                false_target: resume_block,
                merge: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instrument_il::{Function, InstructionKind, Program, SourceSpan};

    fn store_buffer_shader() -> Program {
        let mut program = Program::new(0);
        let u32_ty = program.types.intern(Type::Int { bit_width: 32, signed: false });
        let void_ty = program.types.intern(Type::Void);
        let mut func = Function::new("main", vec![], void_ty);
        let resource = program.ids.alloc();
        program.ids.define(resource, instrument_il::ValueDef::Parameter(0));
        let index = program.consts.intern(u32_ty, Constant::Int(0));
        let index_value = program.ids.alloc();
        program.ids.define(index_value, instrument_il::ValueDef::Constant(index));
        let value = program.consts.intern(u32_ty, Constant::Int(u32::MAX as u64));
        let value_id = program.ids.alloc();
        program.ids.define(value_id, instrument_il::ValueDef::Constant(value));

        let entry = func.entry;
        func.block_mut(entry).push(instrument_il::Instruction::new(
            InstructionKind::StoreBuffer { resource, index: index_value, value: value_id },
            None,
            SourceSpan::Trivial(0),
        ));
        func.block_mut(entry).push(instrument_il::Instruction::new(
            InstructionKind::Return { value: None },
            None,
            SourceSpan::Trivial(1),
        ));
        program.add_function(func);
        program
    }

    #[test]
    fn inject_splits_the_store_into_a_guarded_pre_fail_resume_triple() {
        let mut program = store_buffer_shader();
        let mut registry = FeatureRegistry::new();
        registry.register(Box::new(WritingNegativeValue::new())).unwrap();
        registry.inject_all(&mut program, crate::registry::FeatureSet::ALL);

        let func = program.function(instrument_il::FuncId(0));
        assert_eq!(func.blocks().len(), 3, "expected pre, fail, and resume blocks");

        let pre = &func.blocks()[0];
        assert!(matches!(
            pre.terminator().unwrap().kind,
            InstructionKind::BranchConditional { .. }
        ));

        let fail = func.blocks().iter().find(|b| {
            b.instructions().iter().any(|i| matches!(i.kind, InstructionKind::Export { .. }))
        });
        assert!(fail.is_some(), "fail block must carry the Export instruction");
        assert!(matches!(fail.unwrap().terminator().unwrap().kind, InstructionKind::Branch { .. }));

        let resume = func.blocks().iter().find(|b| {
            b.instructions().iter().any(|i| matches!(i.kind, InstructionKind::StoreBuffer { .. }))
        });
        assert!(resume.is_some(), "resume block must still carry the original store");

        func.verify_ssa(&program.ids).expect("injected program stays SSA-valid");
    }

    #[test]
    fn a_program_with_no_store_buffer_is_left_untouched() {
        let mut program = Program::new(0);
        let void_ty = program.types.intern(Type::Void);
        let mut func = Function::new("main", vec![], void_ty);
        let entry = func.entry;
        func.block_mut(entry).push(instrument_il::Instruction::new(
            InstructionKind::Return { value: None },
            None,
            SourceSpan::Trivial(0),
        ));
        program.add_function(func);

        let mut registry = FeatureRegistry::new();
        registry.register(Box::new(WritingNegativeValue::new())).unwrap();
        registry.inject_all(&mut program, crate::registry::FeatureSet::ALL);

        let func = program.function(instrument_il::FuncId(0));
        assert_eq!(func.blocks().len(), 1);
    }
}
