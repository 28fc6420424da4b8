//! `CompilationEvent` (§4.5 "Public surface", §6): a head/tail counter
//! pair plus a condvar, grounded on `InstrumentationController::Commit`'s
//! `IncrementHead`/`IncrementCounter`/`Wait`. `tail` is bumped the moment
//! a commit is issued (`commit()`'s return value is that tail value);
//! `head` is bumped only once that commit's `commit_table` stage has
//! actually run, so `wait(tail)` blocks until that specific commit, not
//! merely *some* commit, has published.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
pub struct CompilationEvent {
    tail: AtomicU64,
    head: AtomicU64,
    gate: Mutex<()>,
    woken: Condvar,
}

impl CompilationEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next commit id. Called once per `commit()`, before any
    /// compile work is scheduled.
    pub fn begin_commit(&self) -> u64 {
        self.tail.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Publish that commit `id`'s `commit_table` stage has run, waking
    /// every `wait` parked on it (and any commit before it, since `head`
    /// only moves forward).
    pub fn complete_commit(&self, id: u64) {
        let _guard = self.gate.lock();
        self.head.store(id, Ordering::Release);
        self.woken.notify_all();
    }

    pub fn head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    pub fn tail(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    /// Block the calling thread until commit `id`'s publish has happened
    /// (synchronous-recording mode's `BeginCommandBuffer` wait point, §5
    /// "Suspension points").
    pub fn wait(&self, id: u64) {
        let mut guard = self.gate.lock();
        while self.head.load(Ordering::Acquire) < id {
            self.woken.wait(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_once_head_already_reached_the_target() {
        let event = CompilationEvent::new();
        let id = event.begin_commit();
        event.complete_commit(id);
        event.wait(id);
    }

    #[test]
    fn wait_blocks_until_complete_commit_is_called() {
        let event = Arc::new(CompilationEvent::new());
        let id = event.begin_commit();

        let waiter_event = event.clone();
        let waiter = thread::spawn(move || waiter_event.wait(id));

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        event.complete_commit(id);
        waiter.join().unwrap();
    }
}
