//! `IncrementalFence` (supplemented from `original_source`'s
//! `IncrementalFence.cpp`, since §4.6/§5 reference `queue.sharedFence`/
//! `fence.commit()` without spelling the primitive out): a monotonic
//! commit counter plus a cached "latest known complete" value, so
//! `has_completed` can usually answer from the cache instead of a real
//! device query. Here there is no device to query, so the cache and the
//! ground truth are the same `AtomicU64`; a real backend would replace
//! `complete` with a call into its device fence object.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct IncrementalFence {
    next_commit: AtomicU64,
    completed: AtomicU64,
}

impl IncrementalFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next commit value (`CommitFence`).
    pub fn commit(&self) -> u64 {
        self.next_commit.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Advance the fence's completed value. Never moves backwards.
    pub fn advance_to(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::AcqRel);
    }

    /// `IsCommitted`: has `target` already completed?
    pub fn has_completed(&self, target: u64) -> bool {
        self.completed.load(Ordering::Acquire) >= target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_values_are_monotonic_and_start_at_one() {
        let fence = IncrementalFence::new();
        assert_eq!(fence.commit(), 1);
        assert_eq!(fence.commit(), 2);
        assert_eq!(fence.commit(), 3);
    }

    #[test]
    fn has_completed_is_false_until_advanced_past_the_target() {
        let fence = IncrementalFence::new();
        let target = fence.commit();
        assert!(!fence.has_completed(target));
        fence.advance_to(target);
        assert!(fence.has_completed(target));
    }

    #[test]
    fn advance_to_never_moves_the_completed_value_backwards() {
        let fence = IncrementalFence::new();
        fence.advance_to(5);
        fence.advance_to(2);
        assert!(fence.has_completed(5));
    }
}
