//! `StreamState` (§4.6 "bound one-per-command-list") and its six-step
//! per-command-list lifecycle, grounded on `ShaderExportStreamState` plus
//! `ShaderExportStreamer::{BeginCommandList, SetDescriptorHeap,
//! BindPipeline, SetComputeRootSignature, CommitCompute,
//! CloseCommandList}`. Descriptor heaps and command lists are external
//! GPU-API collaborators (§5 "not shown here"); this crate only tracks
//! the bookkeeping the streamer itself is responsible for, identifying
//! real resources by opaque handle. Allocating one of those descriptor
//! segments is the one GPU-resource-exhaustion path this crate models
//! (§7): a heap-full allocator failure fails the bind and the caller
//! continues uninstrumented for that command list, it never panics.

use crate::error::Result;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct DescriptorSegmentId(pub u64);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ConstantsBufferId(pub u64);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PipelineType {
    Graphics,
    Compute,
}

impl PipelineType {
    pub const COUNT: usize = 2;

    fn index(self) -> usize {
        match self {
            PipelineType::Graphics => 0,
            PipelineType::Compute => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PipelineBindState {
    pipeline_uid: Option<u64>,
    is_instrumented: bool,
    /// The layout compatibility hash bound the last time export
    /// descriptors were actually written for this pipeline type; `None`
    /// after any event that forces a rebind.
    last_bound_layout_hash: Option<u64>,
}

pub struct StreamState {
    bind_states: [PipelineBindState; PipelineType::COUNT],
    descriptor_segments: Vec<DescriptorSegmentId>,
    constants_buffer: Option<ConstantsBufferId>,
}

impl StreamState {
    pub fn new() -> Self {
        StreamState {
            bind_states: [PipelineBindState::default(); PipelineType::COUNT],
            descriptor_segments: Vec::new(),
            constants_buffer: None,
        }
    }

    /// Step 1: pop a stream state (the caller's job, via `StreamStatePool`),
    /// allocate an initial descriptor segment, acquire a constants buffer,
    /// map immutable descriptors (the `allocate_segment` callback stands
    /// in for that GPU-side allocation + mapping, an external collaborator).
    pub fn begin_command_list(
        &mut self,
        allocate_segment: impl FnOnce() -> Result<DescriptorSegmentId>,
        constants: ConstantsBufferId,
    ) -> Result<()> {
        self.bind_states = [PipelineBindState::default(); PipelineType::COUNT];
        self.descriptor_segments.clear();
        self.descriptor_segments.push(allocate_segment()?);
        self.constants_buffer = Some(constants);
        Ok(())
    }

    /// Step 2: a new segment from the changed heap; clears every
    /// pipeline type's bind mask so the next bind of each re-binds.
    pub fn on_descriptor_heap_change(&mut self, allocate_segment: impl FnOnce() -> Result<DescriptorSegmentId>) -> Result<()> {
        self.descriptor_segments.push(allocate_segment()?);
        for bind_state in &mut self.bind_states {
            bind_state.last_bound_layout_hash = None;
        }
        Ok(())
    }

    /// Step 3: record the pipeline bind and report whether the export
    /// descriptor table actually needs (re)binding — the idempotent-skip
    /// rule: only when uninstrumented-to-instrumented, or the layout
    /// compatibility hash differs from the last bind recorded for this
    /// pipeline type.
    pub fn on_pipeline_bind(&mut self, pipeline_type: PipelineType, pipeline_uid: u64, layout_hash: u64, is_instrumented: bool) -> bool {
        let bind_state = &mut self.bind_states[pipeline_type.index()];
        bind_state.pipeline_uid = Some(pipeline_uid);
        bind_state.is_instrumented = is_instrumented;

        if !is_instrumented {
            return false;
        }

        let needs_bind = bind_state.last_bound_layout_hash != Some(layout_hash);
        if needs_bind {
            bind_state.last_bound_layout_hash = Some(layout_hash);
        }
        needs_bind
    }

    /// Step 4: a new descriptor-data segment, and force the next pipeline
    /// bind of this type to rebind export descriptors.
    pub fn on_root_signature_bind(
        &mut self,
        pipeline_type: PipelineType,
        allocate_segment: impl FnOnce() -> Result<DescriptorSegmentId>,
    ) -> Result<()> {
        self.descriptor_segments.push(allocate_segment()?);
        self.bind_states[pipeline_type.index()].last_bound_layout_hash = None;
        Ok(())
    }

    /// Step 5: if the descriptor-data allocator rolled to a new chunk,
    /// begin a fresh segment and report that the root CBV needs rebinding.
    pub fn on_commit(&mut self, rolled_to_new_chunk: bool, allocate_segment: impl FnOnce() -> Result<DescriptorSegmentId>) -> Result<bool> {
        if rolled_to_new_chunk {
            self.descriptor_segments.push(allocate_segment()?);
        }
        Ok(rolled_to_new_chunk)
    }

    /// Step 6: commit the last descriptor-data segment. Returns every
    /// segment accumulated over the command list's lifetime, for
    /// `Streamer::map_segment` to hand off.
    pub fn close_command_list(&self) -> &[DescriptorSegmentId] {
        &self.descriptor_segments
    }

    pub fn constants_buffer(&self) -> Option<ConstantsBufferId> {
        self.constants_buffer
    }

    pub fn is_pipeline_instrumented(&self, pipeline_type: PipelineType) -> bool {
        self.bind_states[pipeline_type.index()].is_instrumented
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn begin_command_list_resets_bind_state_from_a_prior_use() {
        let mut state = StreamState::new();
        state.on_pipeline_bind(PipelineType::Graphics, 7, 0xAA, true);
        assert!(state.is_pipeline_instrumented(PipelineType::Graphics));

        state.begin_command_list(|| Ok(DescriptorSegmentId(1)), ConstantsBufferId(1)).unwrap();
        assert!(!state.is_pipeline_instrumented(PipelineType::Graphics));
        assert_eq!(state.close_command_list(), &[DescriptorSegmentId(1)]);
    }

    #[test]
    fn a_repeated_bind_with_the_same_layout_hash_is_skipped() {
        let mut state = StreamState::new();
        state.begin_command_list(|| Ok(DescriptorSegmentId(0)), ConstantsBufferId(0)).unwrap();

        assert!(state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true), "first bind must write descriptors");
        assert!(!state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true), "same layout hash must be skipped");
        assert!(state.on_pipeline_bind(PipelineType::Graphics, 2, 0xBB, true), "a changed layout hash must rebind");
    }

    #[test]
    fn an_uninstrumented_pipeline_bind_never_requests_a_descriptor_rebind() {
        let mut state = StreamState::new();
        state.begin_command_list(|| Ok(DescriptorSegmentId(0)), ConstantsBufferId(0)).unwrap();
        assert!(!state.on_pipeline_bind(PipelineType::Compute, 1, 0xAA, false));
    }

    #[test]
    fn a_root_signature_bind_forces_the_next_pipeline_bind_to_rebind() {
        let mut state = StreamState::new();
        state.begin_command_list(|| Ok(DescriptorSegmentId(0)), ConstantsBufferId(0)).unwrap();
        assert!(state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true));
        assert!(!state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true));

        state.on_root_signature_bind(PipelineType::Graphics, || Ok(DescriptorSegmentId(9))).unwrap();
        assert!(state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true), "root signature bind must force a rebind");
    }

    #[test]
    fn a_descriptor_heap_change_forces_every_pipeline_types_next_bind_to_rebind() {
        let mut state = StreamState::new();
        state.begin_command_list(|| Ok(DescriptorSegmentId(0)), ConstantsBufferId(0)).unwrap();
        state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true);
        state.on_pipeline_bind(PipelineType::Compute, 2, 0xBB, true);

        state.on_descriptor_heap_change(|| Ok(DescriptorSegmentId(5))).unwrap();

        assert!(state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true));
        assert!(state.on_pipeline_bind(PipelineType::Compute, 2, 0xBB, true));
    }

    #[test]
    fn a_descriptor_heap_allocation_failure_fails_the_bind_without_touching_state() {
        let mut state = StreamState::new();
        state.begin_command_list(|| Ok(DescriptorSegmentId(0)), ConstantsBufferId(0)).unwrap();
        state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true);

        let result = state.on_root_signature_bind(PipelineType::Graphics, || Err(Error::DescriptorHeapExhausted));
        assert!(result.is_err());
        assert!(
            !state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true),
            "a failed allocation must not have cleared the prior successful bind's layout hash"
        );
    }
}
