//! `Segment` (§4.6 "a segment is bound one-per-submission-of-a-command-list")
//! and its lifecycle, grounded on `ShaderExportStreamSegment` plus
//! `ShaderExportStreamer::{Enqueue, ProcessSegment, FreeSegmentNoQueueLock}`'s
//! implicit free -> recording -> submitted -> drained progression.

use smallvec::SmallVec;

/// Opaque handles a real backend would back with actual device objects;
/// here they only need to round-trip through a segment's lifetime.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct FenceHandle(pub u64);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct CommandContextHandle(pub u64);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SegmentLifecycle {
    /// Sitting in the pool, available for `Streamer::allocate_segment`.
    Free,
    /// Bound to a command list currently being recorded into.
    Recording,
    /// Enqueued on a queue, waiting for its fence to complete.
    Submitted,
    /// Fence complete; counters and streams have been read back and
    /// handed to the message sink. Only a `Drained` segment may be read
    /// (§3 invariant).
    Drained,
}

impl SegmentLifecycle {
    /// The only legal forward transitions. An illegal transition (e.g.
    /// draining a segment that's still `Recording`, or enqueuing one
    /// that's already `Submitted`) is a programmer bug, not a recoverable
    /// error (§7 "Fence wait underflow / re-entrance ... is a programmer
    /// bug"), so it panics rather than returning a `Result`.
    fn is_legal_transition(self, next: SegmentLifecycle) -> bool {
        matches!(
            (self, next),
            (SegmentLifecycle::Free, SegmentLifecycle::Recording)
                | (SegmentLifecycle::Recording, SegmentLifecycle::Submitted)
                | (SegmentLifecycle::Submitted, SegmentLifecycle::Drained)
                | (SegmentLifecycle::Drained, SegmentLifecycle::Free)
        )
    }
}

pub struct Segment {
    pub counter_buffer: Vec<u32>,
    pub stream_buffers: Vec<Vec<u8>>,
    pub fence: Option<FenceHandle>,
    pub fence_target: u64,
    pub version_point: u64,
    pub command_context_handles: SmallVec<[CommandContextHandle; 4]>,
    lifecycle: SegmentLifecycle,
}

impl Segment {
    /// A segment freshly pulled from the pool (or built new when the pool
    /// was empty), sized for `stream_count` physical stream buffers.
    pub fn new(stream_count: usize) -> Self {
        Segment {
            counter_buffer: vec![0; stream_count],
            stream_buffers: vec![Vec::new(); stream_count],
            fence: None,
            fence_target: 0,
            version_point: 0,
            command_context_handles: SmallVec::new(),
            lifecycle: SegmentLifecycle::Free,
        }
    }

    pub fn lifecycle(&self) -> SegmentLifecycle {
        self.lifecycle
    }

    pub fn transition(&mut self, next: SegmentLifecycle) {
        assert!(
            self.lifecycle.is_legal_transition(next),
            "illegal segment lifecycle transition: {:?} -> {:?}",
            self.lifecycle,
            next
        );
        self.lifecycle = next;
    }

    /// Reset to a `Free` segment ready for reuse, keeping the backing
    /// allocations (`ShaderExportStreamer::FreeSegmentNoQueueLock`'s
    /// "keep the blocks themselves alive" pattern for descriptor data).
    pub fn recycle(&mut self) {
        self.transition(SegmentLifecycle::Free);
        for counter in &mut self.counter_buffer {
            *counter = 0;
        }
        for stream in &mut self.stream_buffers {
            stream.clear();
        }
        self.fence = None;
        self.fence_target = 0;
        self.version_point = 0;
        self.command_context_handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_segment_starts_free_and_sized_for_its_streams() {
        let segment = Segment::new(3);
        assert_eq!(segment.lifecycle(), SegmentLifecycle::Free);
        assert_eq!(segment.counter_buffer.len(), 3);
        assert_eq!(segment.stream_buffers.len(), 3);
    }

    #[test]
    fn the_full_lifecycle_walks_free_recording_submitted_drained_free() {
        let mut segment = Segment::new(1);
        segment.transition(SegmentLifecycle::Recording);
        segment.transition(SegmentLifecycle::Submitted);
        segment.transition(SegmentLifecycle::Drained);
        segment.recycle();
        assert_eq!(segment.lifecycle(), SegmentLifecycle::Free);
    }

    #[test]
    #[should_panic(expected = "illegal segment lifecycle transition")]
    fn draining_a_segment_still_being_recorded_into_panics() {
        let mut segment = Segment::new(1);
        segment.transition(SegmentLifecycle::Recording);
        segment.transition(SegmentLifecycle::Drained);
    }

    #[test]
    #[should_panic(expected = "illegal segment lifecycle transition")]
    fn double_submitting_a_segment_panics() {
        let mut segment = Segment::new(1);
        segment.transition(SegmentLifecycle::Recording);
        segment.transition(SegmentLifecycle::Submitted);
        segment.transition(SegmentLifecycle::Submitted);
    }
}
