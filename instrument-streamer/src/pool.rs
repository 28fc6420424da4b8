//! `SegmentPool`/`QueueStatePool`/`StreamStatePool` (§4.6 "Data
//! structures"), grounded on `ObjectPool<T>`'s try-pop-or-allocate shape
//! from `ShaderExportStreamer::Allocate*`. A `parking_lot::Mutex<Vec<T>>`
//! is enough here: unlike an unsafe `MaybeUninit`-backed pool that hands
//! out a recycling smart pointer so a dropped item auto-returns, these
//! pools are always paired with an explicit `Streamer`-owned `release`,
//! matching how `FreeSegmentNoQueueLock`/`Free` push back explicitly
//! rather than relying on RAII.

use parking_lot::Mutex;

pub struct ObjectPool<T> {
    free: Mutex<Vec<T>>,
}

impl<T> ObjectPool<T> {
    pub fn new() -> Self {
        ObjectPool { free: Mutex::new(Vec::new()) }
    }

    /// `TryPop` then fall back to `make` on an empty pool.
    pub fn acquire(&self, make: impl FnOnce() -> T) -> T {
        match self.free.lock().pop() {
            Some(item) => item,
            None => make(),
        }
    }

    pub fn release(&self, item: T) {
        self.free.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type SegmentPool = ObjectPool<crate::segment::Segment>;
pub type StreamStatePool = ObjectPool<crate::stream_state::StreamState>;
pub type QueueStatePool = ObjectPool<crate::queue_state::QueueState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_on_an_empty_pool_falls_back_to_make() {
        let pool: ObjectPool<u32> = ObjectPool::new();
        assert_eq!(pool.acquire(|| 7), 7);
    }

    #[test]
    fn a_released_item_is_returned_by_the_next_acquire() {
        let pool: ObjectPool<u32> = ObjectPool::new();
        pool.release(42);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.acquire(|| panic!("pool should not have been empty")), 42);
        assert!(pool.is_empty());
    }
}
