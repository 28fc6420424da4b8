//! Dirty-set tracking, worker-pool compile fan-out, and atomic variant-table
//! publish for shader instrumentation, grounded on
//! `InstrumentationController`'s message-driven commit pipeline.

pub mod event;
pub mod key;
pub mod message;
pub mod pool;
pub mod scheduler;
pub mod state;

pub use event::CompilationEvent;
pub use key::InstrumentationKey;
pub use message::{ControlMessage, Specialization};
pub use pool::WorkerPool;
pub use scheduler::Scheduler;
pub use state::{CompileError, ParsedProgram, PipelineUid, ShaderUid};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use instrument_bitcode::writer::BitWriter;
    use instrument_bitcode::codes::{BlockId, FunctionCode, ModuleCode, TypeCode, ValueSymtabCode};
    use instrument_features::FeatureRegistry;

    use crate::message::ControlMessage;
    use crate::scheduler::Scheduler;

    /// A single-function module declaring the `dx.op.bufferStore.f32`
    /// intrinsic and calling it once, built the same way
    /// `instrument-bitcode`'s own parser tests build fixtures (enter a
    /// `Type` block, a `ValueSymtab` block naming the intrinsic's
    /// declaration, two `ModuleCode::Function` declarations, then a
    /// `Function` block whose only instruction besides `Ret` is the call).
    fn shader_with_a_buffer_store() -> Vec<u32> {
        let mut w = BitWriter::new();
        w.enter_subblock(BlockId::Module as u32, 4);

        w.enter_subblock(BlockId::Type as u32, 5);
        w.write_unabbrev_record(TypeCode::NumEntry as u64, &[2]);
        w.write_unabbrev_record(TypeCode::Integer as u64, &[32]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0, 0]);
        w.write_unabbrev_record(TypeCode::Function as u64, &[0, 0]);
        w.end_block();

        w.enter_subblock(BlockId::ValueSymtab as u32, 4);
        let name = "dx.op.bufferStore.f32";
        let mut entry = vec![1u64];
        entry.extend(name.chars().map(|c| c as u64));
        w.write_unabbrev_record(ValueSymtabCode::Entry as u64, &entry);
        w.end_block();

        // decl0: this module's own function (type 1, one i32 param).
        w.write_unabbrev_record(ModuleCode::Function as u64, &[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        // decl1: the bufferStore intrinsic, declared only (no body).
        w.write_unabbrev_record(ModuleCode::Function as u64, &[2, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        w.enter_subblock(BlockId::Function as u32, 6);
        w.write_unabbrev_record(FunctionCode::DeclareBlocks as u64, &[1]);
        // attrs, cc, fmf, callee=2, args=(resource, index, value) all = 1.
        w.write_unabbrev_record(FunctionCode::Call as u64, &[0, 0, 0, 2, 1, 1, 1]);
        w.write_unabbrev_record(FunctionCode::Ret as u64, &[]);
        w.end_block();

        w.end_block();
        w.into_words()
    }

    fn registry_with_negative_value_feature() -> Arc<FeatureRegistry> {
        let mut registry = FeatureRegistry::new();
        registry.register(Box::new(instrument_features::WritingNegativeValue::new())).unwrap();
        Arc::new(registry)
    }

    #[test]
    fn committing_a_dirty_shader_produces_a_variant_once_a_feature_is_enabled() {
        let scheduler = Scheduler::new(registry_with_negative_value_feature());
        scheduler.register_shader(1, shader_with_a_buffer_store());

        scheduler.on_message(ControlMessage::SetGlobalInstrumentation {
            feature_bits: 1,
            spec: Default::default(),
        });
        let id = scheduler.commit();
        scheduler.wait(id);

        let key = crate::key::InstrumentationKey::for_shader_compile(1);
        assert!(scheduler.variant(1, key).is_some(), "expected an instrumented variant after commit");
    }

    #[test]
    fn a_shader_untouched_by_any_control_message_never_gets_compiled() {
        let scheduler = Scheduler::new(registry_with_negative_value_feature());
        scheduler.register_shader(1, shader_with_a_buffer_store());

        let id = scheduler.commit();
        scheduler.wait(id);

        let key = crate::key::InstrumentationKey::for_shader_compile(0);
        assert!(scheduler.variant(1, key).is_none(), "nothing was ever marked dirty, so commit should be a no-op");
    }

    #[test]
    fn malformed_bytecode_is_marked_parse_failed_and_never_produces_a_variant() {
        let scheduler = Scheduler::new(registry_with_negative_value_feature());
        // Too short to contain even one valid block header; `scan_module`
        // rejects it well before any feature injection would run.
        scheduler.register_shader(1, vec![0, 0, 0]);

        scheduler.on_message(ControlMessage::SetGlobalInstrumentation {
            feature_bits: 1,
            spec: Default::default(),
        });
        let id = scheduler.commit();
        scheduler.wait(id);

        let key = crate::key::InstrumentationKey::for_shader_compile(1);
        assert!(scheduler.variant(1, key).is_none(), "a shader that fails to parse must never produce a variant");

        // Re-dirtying the same shader must not re-attempt parsing it once
        // it's marked parse-failed (§7 "subsequent instrumentation
        // requests for it log and skip").
        scheduler.on_message(ControlMessage::SetShaderInstrumentation {
            shader_uid: 1,
            feature_bits: 1,
            spec: Default::default(),
        });
        let id2 = scheduler.commit();
        scheduler.wait(id2);
        assert!(scheduler.variant(1, key).is_none());
    }

    #[test]
    fn a_pipeline_only_links_once_every_referenced_shader_has_the_matching_variant() {
        let scheduler = Scheduler::new(registry_with_negative_value_feature());
        scheduler.register_shader(1, shader_with_a_buffer_store());
        scheduler.register_shader(2, shader_with_a_buffer_store());
        scheduler.register_pipeline(100, vec![1, 2]);

        scheduler.on_message(ControlMessage::SetPipelineInstrumentation {
            pipeline_uid: 100,
            feature_bits: 1,
            spec: Default::default(),
        });
        let id = scheduler.commit();
        scheduler.wait(id);

        let keys = scheduler.pipeline_variant_keys(100).expect("pipeline should have linked");
        assert_eq!(keys.len(), 2);
        for key in keys {
            assert_eq!(key.feature_bit_set, 1);
        }
    }
}
