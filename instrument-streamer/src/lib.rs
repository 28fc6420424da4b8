//! GPU-to-CPU shader export transport: segment/stream-state pools, the
//! per-command-list `StreamState` lifecycle, and the fence-gated drain
//! that decodes completed segments into `instrument_features::MessageSink`
//! calls, grounded on `ShaderExportStreamer`.

pub mod error;
pub mod fence;
pub mod pool;
pub mod queue_state;
pub mod segment;
pub mod stream_state;
pub mod streamer;

pub use error::{Error, Result};
pub use fence::IncrementalFence;
pub use pool::{ObjectPool, QueueStatePool, SegmentPool, StreamStatePool};
pub use queue_state::QueueState;
pub use segment::{CommandContextHandle, FenceHandle, Segment, SegmentLifecycle};
pub use stream_state::{ConstantsBufferId, DescriptorSegmentId, PipelineType, StreamState};
pub use streamer::{PatchCommand, StreamDrainStats, Streamer};

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use instrument_features::{ExportSchema, MessageSink};

    use crate::segment::FenceHandle;
    use crate::stream_state::{ConstantsBufferId, DescriptorSegmentId, PipelineType};
    use crate::streamer::Streamer;

    struct CountingSink {
        count: usize,
    }

    impl MessageSink for CountingSink {
        fn accept(&mut self, _schema: &ExportSchema, _key: u32) {
            self.count += 1;
        }
    }

    /// One full command-list lifecycle followed by one submission
    /// lifecycle: begin, bind an instrumented pipeline, commit, close,
    /// map into a segment, enqueue, complete the fence, and process.
    #[test]
    fn a_full_command_list_and_submission_round_trip_drains_its_export() {
        let streamer = Streamer::new(1);
        let mut stream_state = streamer.allocate_stream_state();
        let mut next_descriptor = 0u64;
        let mut alloc = || {
            next_descriptor += 1;
            Ok(DescriptorSegmentId(next_descriptor))
        };

        stream_state.begin_command_list(&mut alloc, ConstantsBufferId(1)).unwrap();
        assert!(stream_state.on_pipeline_bind(PipelineType::Graphics, 1, 0xAA, true));
        stream_state.on_commit(false, &mut alloc).unwrap();
        let _ = stream_state.close_command_list();

        let mut segment = streamer.allocate_segment();
        segment.stream_buffers[0].extend_from_slice(&7u32.to_le_bytes());
        segment.counter_buffer[0] = 1;
        streamer.map_segment(&stream_state, &mut segment, crate::segment::CommandContextHandle(1));

        let mut queue = streamer.allocate_queue_state();
        streamer.enqueue(&mut queue, segment, FenceHandle(1));
        queue.fence.advance_to(queue.live_segments.front().unwrap().fence_target);

        let schema = ExportSchema { schema_id: 0, name: "test", has_sguid: false, fields: smallvec![] };
        let mut sink = CountingSink { count: 0 };
        streamer.process(&mut queue, &[schema], &mut sink);

        assert_eq!(sink.count, 1);
        streamer.free_stream_state(stream_state);
        streamer.free_queue_state(queue);
    }
}
