//! `QueueState` (§4.6 "per submission"/§5 "Across command lists submitted
//! to the same queue, segments are drained in submission order"),
//! grounded on `CommandQueueState::exportState`'s `liveSegments` FIFO
//! list plus the queue's shared `IncrementalFence`.

use std::collections::VecDeque;

use crate::fence::IncrementalFence;
use crate::segment::Segment;

pub struct QueueState {
    pub fence: IncrementalFence,
    pub live_segments: VecDeque<Segment>,
}

impl QueueState {
    pub fn new() -> Self {
        QueueState { fence: IncrementalFence::new(), live_segments: VecDeque::new() }
    }
}

impl Default for QueueState {
    fn default() -> Self {
        Self::new()
    }
}
