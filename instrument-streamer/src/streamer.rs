//! `Streamer` (§4.6), grounded on `ShaderExportStreamer`'s `Allocate*`/
//! `MapSegment`/`RecordPatchCommandList`/`Enqueue`/`Process` surface.
//! Descriptor heaps, constant buffers, and command list recording are
//! external GPU-API collaborators this crate never touches directly
//! (§5 "not shown here; external collaborator"); this type only owns the
//! pools, the fence-gated drain order, and the counter-clamp/decode step.

use std::sync::atomic::{AtomicU64, Ordering};

use instrument_features::{ExportSchema, MessageSink};

use crate::pool::{QueueStatePool, SegmentPool, StreamStatePool};
use crate::queue_state::QueueState;
use crate::segment::{CommandContextHandle, FenceHandle, Segment, SegmentLifecycle};
use crate::stream_state::StreamState;

/// The fixed three-step counter readback sequence
/// (`RecordPatchCommandList`): barrier the counter buffer to a copy
/// source, copy device to host, barrier back to UAV, then clear the
/// device counters for the next recording. Described rather than
/// executed, since command list recording is an external collaborator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PatchCommand {
    BarrierToCopySource,
    CopyDeviceToHost,
    BarrierToUnorderedAccess,
    ClearDeviceCounters,
}

/// Per-stream drain outcome for one segment (§3 invariant, §8 seed test 3):
/// `decoded` is the clamped count actually handed to the sink, `reported`
/// is the shader's raw, possibly-overflowing counter value.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StreamDrainStats {
    pub stream_index: usize,
    pub decoded: u32,
    pub reported: u32,
}

pub struct Streamer {
    segments: SegmentPool,
    stream_states: StreamStatePool,
    queue_states: QueueStatePool,
    stream_count: usize,
    next_version_point: AtomicU64,
}

impl Streamer {
    pub fn new(stream_count: usize) -> Self {
        Streamer {
            segments: SegmentPool::new(),
            stream_states: StreamStatePool::new(),
            queue_states: QueueStatePool::new(),
            stream_count,
            next_version_point: AtomicU64::new(0),
        }
    }

    pub fn allocate_stream_state(&self) -> StreamState {
        self.stream_states.acquire(StreamState::new)
    }

    pub fn free_stream_state(&self, state: StreamState) {
        self.stream_states.release(state);
    }

    pub fn allocate_queue_state(&self) -> QueueState {
        self.queue_states.acquire(QueueState::new)
    }

    pub fn free_queue_state(&self, state: QueueState) {
        self.queue_states.release(state);
    }

    /// `AllocateSegment`: pop a pooled segment, or build one sized for
    /// this streamer's physical stream count, and start recording into it.
    pub fn allocate_segment(&self) -> Segment {
        let mut segment = self.segments.acquire(|| Segment::new(self.stream_count));
        segment.transition(SegmentLifecycle::Recording);
        segment
    }

    /// `MapSegment`: stamp the segment with a fresh version point and
    /// record the command context that produced it, then release the
    /// stream state's accumulated descriptor-data bookkeeping (the actual
    /// descriptor/constants handoff happens on the GPU-heap side, an
    /// external collaborator this crate doesn't model).
    pub fn map_segment(&self, stream_state: &StreamState, segment: &mut Segment, context: CommandContextHandle) {
        segment.version_point = self.next_version_point.fetch_add(1, Ordering::AcqRel) + 1;
        segment.command_context_handles.push(context);
        let _ = stream_state.close_command_list();
    }

    pub fn record_patch_command_list(&self, _segment: &Segment) -> [PatchCommand; 4] {
        [
            PatchCommand::BarrierToCopySource,
            PatchCommand::CopyDeviceToHost,
            PatchCommand::BarrierToUnorderedAccess,
            PatchCommand::ClearDeviceCounters,
        ]
    }

    /// `Enqueue`: assign the queue's shared fence and append to
    /// `live_segments`. Double-enqueuing an already-submitted segment is a
    /// programmer bug (§7), caught here by `Segment::transition`'s own
    /// panic on an illegal `Recording -> Submitted` retry.
    pub fn enqueue(&self, queue: &mut QueueState, mut segment: Segment, fence: FenceHandle) {
        assert!(segment.fence.is_none(), "segment double submission");
        segment.transition(SegmentLifecycle::Submitted);
        segment.fence = Some(fence);
        segment.fence_target = queue.fence.commit();
        queue.live_segments.push_back(segment);
    }

    /// `Process`: drain `live_segments` in FIFO order up to the first
    /// segment whose fence hasn't completed (§5 "segments are drained in
    /// submission order ... stopping at the first non-ready segment").
    /// Each drained segment's counters are clamped to physical stream
    /// capacity before being decoded and handed to `sink` (§3 invariant,
    /// §8 seed test 3), then the segment is recycled back to the pool.
    pub fn process(&self, queue: &mut QueueState, schemas: &[ExportSchema], sink: &mut dyn MessageSink) -> Vec<StreamDrainStats> {
        let mut stats = Vec::new();
        while let Some(front) = queue.live_segments.front() {
            if !queue.fence.has_completed(front.fence_target) {
                break;
            }
            let mut segment = queue.live_segments.pop_front().expect("front() just confirmed an entry");
            stats.extend(Self::drain_segment(&mut segment, schemas, sink));
            segment.recycle();
            self.segments.release(segment);
        }
        stats
    }

    fn drain_segment(segment: &mut Segment, schemas: &[ExportSchema], sink: &mut dyn MessageSink) -> Vec<StreamDrainStats> {
        segment.transition(SegmentLifecycle::Drained);

        let mut stats = Vec::with_capacity(segment.stream_buffers.len());
        for (i, stream) in segment.stream_buffers.iter().enumerate() {
            let Some(schema) = schemas.get(i) else { continue };

            let physical_capacity = (stream.len() / 4) as u32;
            let reported = segment.counter_buffer.get(i).copied().unwrap_or(0);
            let decoded = reported.min(physical_capacity);
            if reported > physical_capacity {
                log::warn!(
                    "stream {i} overflowed its physical capacity: wrote {reported}, capacity {physical_capacity}"
                );
            }

            for slot in 0..decoded as usize {
                let bytes = &stream[slot * 4..slot * 4 + 4];
                let key = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                sink.accept(schema, key);
            }
            stats.push(StreamDrainStats { stream_index: i, decoded, reported });
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    struct RecordingSink {
        accepted: Vec<(u32, u32)>,
    }

    impl MessageSink for RecordingSink {
        fn accept(&mut self, schema: &ExportSchema, key: u32) {
            self.accepted.push((schema.schema_id, key));
        }
    }

    fn schema(id: u32) -> ExportSchema {
        ExportSchema { schema_id: id, name: "test", has_sguid: false, fields: smallvec![] }
    }

    fn push_u32(stream: &mut Vec<u8>, value: u32) {
        stream.extend_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn a_segment_is_held_until_its_fence_completes() {
        let streamer = Streamer::new(1);
        let mut queue = streamer.allocate_queue_state();

        let segment = streamer.allocate_segment();
        streamer.enqueue(&mut queue, segment, FenceHandle(1));

        let mut sink = RecordingSink { accepted: Vec::new() };
        streamer.process(&mut queue, &[schema(0)], &mut sink);
        assert!(sink.accepted.is_empty(), "fence not yet completed, nothing should drain");
        assert_eq!(queue.live_segments.len(), 1);

        queue.fence.advance_to(1);
        streamer.process(&mut queue, &[schema(0)], &mut sink);
        assert!(queue.live_segments.is_empty());
    }

    #[test]
    fn process_decodes_exactly_the_counted_entries_per_stream() {
        let streamer = Streamer::new(1);
        let mut queue = streamer.allocate_queue_state();

        let mut segment = streamer.allocate_segment();
        push_u32(&mut segment.stream_buffers[0], 0xAAAA_AAAA);
        push_u32(&mut segment.stream_buffers[0], 0xBBBB_BBBB);
        segment.counter_buffer[0] = 2;

        streamer.enqueue(&mut queue, segment, FenceHandle(1));
        queue.fence.advance_to(queue.live_segments.front().unwrap().fence_target);

        let mut sink = RecordingSink { accepted: Vec::new() };
        streamer.process(&mut queue, &[schema(5)], &mut sink);

        assert_eq!(sink.accepted, vec![(5, 0xAAAA_AAAA), (5, 0xBBBB_BBBB)]);
    }

    #[test]
    fn a_counter_past_physical_capacity_is_clamped_and_the_overflow_reported_as_a_high_water_mark() {
        let streamer = Streamer::new(1);
        let mut queue = streamer.allocate_queue_state();

        let mut segment = streamer.allocate_segment();
        push_u32(&mut segment.stream_buffers[0], 0x1111_1111);
        segment.counter_buffer[0] = 1024; // the shader claims 1024 entries, only 1 fits.

        streamer.enqueue(&mut queue, segment, FenceHandle(1));
        queue.fence.advance_to(queue.live_segments.front().unwrap().fence_target);

        let mut sink = RecordingSink { accepted: Vec::new() };
        let stats = streamer.process(&mut queue, &[schema(0)], &mut sink);

        assert_eq!(sink.accepted, vec![(0, 0x1111_1111)]);
        assert_eq!(stats, vec![StreamDrainStats { stream_index: 0, decoded: 1, reported: 1024 }]);
    }

    #[test]
    fn segments_are_drained_in_fifo_submission_order() {
        let streamer = Streamer::new(1);
        let mut queue = streamer.allocate_queue_state();

        let mut first = streamer.allocate_segment();
        first.counter_buffer[0] = 0;
        streamer.enqueue(&mut queue, first, FenceHandle(1));

        let mut second = streamer.allocate_segment();
        second.counter_buffer[0] = 0;
        streamer.enqueue(&mut queue, second, FenceHandle(1));

        // Only the first segment's fence target has completed.
        queue.fence.advance_to(1);

        let mut sink = RecordingSink { accepted: Vec::new() };
        streamer.process(&mut queue, &[schema(0)], &mut sink);
        assert_eq!(queue.live_segments.len(), 1, "second segment must still be waiting on its fence");
    }

    #[test]
    #[should_panic(expected = "segment double submission")]
    fn enqueuing_an_already_submitted_segment_panics() {
        let streamer = Streamer::new(1);
        let mut queue = streamer.allocate_queue_state();

        let mut segment = streamer.allocate_segment();
        segment.fence = Some(FenceHandle(1));

        streamer.enqueue(&mut queue, segment, FenceHandle(1));
    }
}
