//! `RingChannel`: a bounded, pre-allocated, single-producer/multi-consumer
//! record buffer (design §4.1).
//!
//! The buffer is broadcast, not partitioned: every worker reads the same
//! sequence of stored records through its own read cursor. Capacity is a
//! power of two so indexing reduces to a bitmask, matching the
//! `data_head`/`data_tail` wraparound scheme in the teacher's own
//! `sample::rb::Rb` (grounded on `src/sample/rb/mod.rs`).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// A view over externally-owned storage: `slots` holds `capacity` records,
/// `write` is the single producer's monotonically increasing write
/// counter, and `read[w]` is worker `w`'s own monotonically increasing
/// read counter. None of the three ever wrap; the physical index is
/// `counter & mask`.
///
/// Storage is handed in by the caller rather than owned here so the same
/// type works whether the backing bytes live on the heap (`SingleThread`/
/// `MultiThread` transports) or inside a `mmap`'d shared-memory region
/// (`MultiProcess`).
pub struct RingChannel<'a, T> {
    capacity: usize,
    mask: u64,
    slots: &'a [UnsafeCell<T>],
    write: &'a AtomicU64,
    read: &'a [AtomicU64],
}

impl<'a, T: Copy> RingChannel<'a, T> {
    pub fn attach(slots: &'a [UnsafeCell<T>], write: &'a AtomicU64, read: &'a [AtomicU64]) -> Self {
        let capacity = slots.len();
        assert!(capacity != 0 && capacity.is_power_of_two(), "ring capacity must be a power of two");
        assert!(!read.is_empty(), "ring needs at least one worker read cursor");
        RingChannel {
            capacity,
            mask: capacity as u64 - 1,
            slots,
            write,
            read,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_workers(&self) -> usize {
        self.read.len()
    }

    /// `capacity - (write - read[worker])` (design invariant 4).
    pub fn remaining_space(&self, worker: usize) -> u64 {
        let w = self.write.load(Ordering::Relaxed);
        let r = self.read[worker].load(Ordering::Acquire);
        self.capacity as u64 - (w - r)
    }

    pub fn is_not_empty(&self, worker: usize) -> bool {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read[worker].load(Ordering::Relaxed);
        w != r
    }

    fn slowest_remaining_space(&self) -> u64 {
        (0..self.read.len())
            .map(|w| self.remaining_space(w))
            .min()
            .unwrap_or(u64::MAX)
    }

    /// Producer-only. Busy-waits at microsecond granularity while any
    /// worker is behind by `capacity - items.len()` or more (design §4.1,
    /// §5: "backpressure is bounded by the slowest worker").
    pub fn push_bulk(&self, items: &[T]) {
        let n = items.len() as u64;
        if n == 0 {
            return;
        }
        while self.slowest_remaining_space() <= n {
            thread::sleep(Duration::from_micros(1));
        }

        let w = self.write.load(Ordering::Relaxed);
        for (i, item) in items.iter().enumerate() {
            let idx = ((w + i as u64) & self.mask) as usize;
            unsafe { *self.slots[idx].get() = *item };
        }
        // Release: the slot writes above must be visible to any worker
        // that observes the new `write` value.
        self.write.store(w + n, Ordering::Release);
    }

    pub fn push(&self, item: T) {
        self.push_bulk(std::slice::from_ref(&item));
    }

    /// Worker-only, and only for its own `worker` id. Advances that
    /// worker's read cursor by the number of records copied into `dst`.
    pub fn pop_bulk(&self, worker: usize, dst: &mut [T]) -> usize {
        // Acquire: pairs with the producer's release store, so the slot
        // reads below observe the data written before `write` advanced.
        let w = self.write.load(Ordering::Acquire);
        let r = self.read[worker].load(Ordering::Relaxed);
        let avail = (w - r).min(dst.len() as u64);

        for i in 0..avail {
            let idx = ((r + i) & self.mask) as usize;
            dst[i as usize] = unsafe { *self.slots[idx].get() };
        }
        self.read[worker].store(r + avail, Ordering::Release);
        avail as usize
    }
}

// SAFETY: concurrent access to `slots` is only ever a data race on paper —
// `push_bulk` never writes a slot until `slowest_remaining_space` has
// confirmed every worker has already consumed it, so no worker is ever
// reading a slot the producer is writing.
unsafe impl<T: Send> Sync for RingChannel<'_, T> {}

/// Heap-backed storage for the `SingleThread`/`MultiThread` transports,
/// where the ring does not need to cross a `fork()` boundary.
pub struct RingStorage<T> {
    slots: Box<[UnsafeCell<T>]>,
    write: AtomicU64,
    read: Box<[AtomicU64]>,
}

impl<T: Copy + Default> RingStorage<T> {
    pub fn new(capacity: usize, num_workers: usize) -> Self {
        RingStorage {
            slots: (0..capacity).map(|_| UnsafeCell::new(T::default())).collect(),
            write: AtomicU64::new(0),
            read: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn channel(&self) -> RingChannel<'_, T> {
        RingChannel::attach(&self.slots, &self.write, &self.read)
    }
}

unsafe impl<T: Send> Sync for RingStorage<T> {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_then_pop_bulk_round_trips_fifo_order() {
        let storage: RingStorage<u32> = RingStorage::new(8, 1);
        let ring = storage.channel();

        ring.push_bulk(&[1, 2, 3]);
        let mut dst = [0u32; 8];
        let n = ring.pop_bulk(0, &mut dst);
        assert_eq!(n, 3);
        assert_eq!(&dst[..3], &[1, 2, 3]);
    }

    #[test]
    fn empty_ring_pop_returns_zero() {
        let storage: RingStorage<u32> = RingStorage::new(4, 1);
        let ring = storage.channel();
        let mut dst = [0u32; 4];
        assert_eq!(ring.pop_bulk(0, &mut dst), 0);
        assert!(!ring.is_not_empty(0));
    }

    #[test]
    fn remaining_space_tracks_unread_backlog() {
        let storage: RingStorage<u32> = RingStorage::new(8, 1);
        let ring = storage.channel();
        assert_eq!(ring.remaining_space(0), 8);

        ring.push_bulk(&[1, 2, 3]);
        assert_eq!(ring.remaining_space(0), 5);

        let mut dst = [0u32; 8];
        ring.pop_bulk(0, &mut dst);
        assert_eq!(ring.remaining_space(0), 8);
    }

    #[test]
    fn backpressure_blocks_slowest_worker_then_drains_in_order() {
        let storage: RingStorage<u32> = RingStorage::new(8, 1);
        let ring = storage.channel();

        let handle = thread::scope(|scope| {
            let ring = &ring;
            let producer = scope.spawn(move || {
                for batch in 0..4 {
                    ring.push_bulk(&[batch * 2, batch * 2 + 1]);
                }
            });
            // Give the producer a chance to block on the full ring before
            // we start draining.
            thread::sleep(Duration::from_millis(20));
            let mut received = Vec::new();
            let mut dst = [0u32; 8];
            while received.len() < 8 {
                let n = ring.pop_bulk(0, &mut dst);
                received.extend_from_slice(&dst[..n]);
                if n == 0 {
                    thread::sleep(Duration::from_micros(10));
                }
            }
            producer.join().unwrap();
            received
        });

        assert_eq!(handle, (0..8).collect::<Vec<_>>());
    }
}
