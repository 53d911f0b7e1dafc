//! `ControlPlane`: per-worker semaphores, the ordered-dump token, the
//! producer heartbeat, and the sync-counter/synced-flag words (design
//! §4.2).
//!
//! Like [`crate::ring::RingChannel`], a `ControlPlane` is a view over
//! externally-owned storage so the same code operates whether the backing
//! words live on the heap or inside a `mmap`'d shared-memory region.

use std::cell::UnsafeCell;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::ffi::syscall::{sem_init_shared, sem_post, sem_wait};

pub struct ControlPlane<'a> {
    token: &'a AtomicU32,
    heartbeat: &'a AtomicU64,
    semaphores: &'a [UnsafeCell<libc::sem_t>],
    sync_counter: &'a [AtomicU64],
    synced_flag: &'a [AtomicBool],
}

impl<'a> ControlPlane<'a> {
    pub fn attach(
        token: &'a AtomicU32,
        heartbeat: &'a AtomicU64,
        semaphores: &'a [UnsafeCell<libc::sem_t>],
        sync_counter: &'a [AtomicU64],
        synced_flag: &'a [AtomicBool],
    ) -> Self {
        assert_eq!(semaphores.len(), sync_counter.len());
        assert_eq!(semaphores.len(), synced_flag.len());
        ControlPlane {
            token,
            heartbeat,
            semaphores,
            sync_counter,
            synced_flag,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.semaphores.len()
    }

    /// Must run exactly once, before any `post`/`wait` call, on freshly
    /// zeroed storage.
    pub fn init_semaphores(&self) -> io::Result<()> {
        for sem in self.semaphores {
            unsafe { sem_init_shared(sem.get(), 0)? };
        }
        Ok(())
    }

    /// Producer-only: wakes worker `worker`.
    pub fn post(&self, worker: usize) -> io::Result<()> {
        unsafe { sem_post(self.semaphores[worker].get()) }
    }

    pub fn post_all(&self) -> io::Result<()> {
        for w in 0..self.semaphores.len() {
            self.post(w)?;
        }
        Ok(())
    }

    /// Worker-only: blocks until the producer posts this worker's semaphore.
    pub fn wait(&self, worker: usize) -> io::Result<()> {
        unsafe { sem_wait(self.semaphores[worker].get()) }
    }

    // --- Ordered dump (design §4.2) ---

    /// Producer-only: zeros the token ahead of writing a `DUMP_INFO` packet.
    pub fn begin_dump(&self) {
        self.token.store(0, Ordering::Release);
    }

    /// Worker-only: spins until it is `worker_id`'s turn to emit its report.
    pub fn wait_turn(&self, worker_id: usize) {
        while self.token.load(Ordering::Acquire) != worker_id as u32 {
            thread::sleep(Duration::from_micros(1));
        }
    }

    /// Worker-only: signals that `worker_id` has finished emitting its report.
    pub fn pass_turn(&self, worker_id: usize) {
        self.token.store(worker_id as u32 + 1, Ordering::Release);
    }

    /// Producer-only: blocks until every worker has passed the token.
    pub fn wait_all_dumped(&self) {
        let total = self.semaphores.len() as u32;
        while self.token.load(Ordering::Acquire) != total {
            thread::sleep(Duration::from_micros(1));
        }
    }

    // --- Sync counters (design invariant 5) ---

    pub fn sync_counter(&self, worker: usize) -> u64 {
        self.sync_counter[worker].load(Ordering::Acquire)
    }

    /// Advances `worker`'s sync counter by one if it is still behind
    /// `barrier_id`. Returns whether it advanced (i.e. whether this
    /// barrier/sync packet should be processed).
    pub fn advance_sync(&self, worker: usize, barrier_id: u64) -> bool {
        let current = self.sync_counter[worker].load(Ordering::Relaxed);
        if current < barrier_id {
            self.sync_counter[worker].store(current + 1, Ordering::Release);
            true
        } else {
            false
        }
    }

    // --- Heartbeat & boot sync (design §5, §9) ---

    pub fn beat(&self) {
        self.heartbeat.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat(&self) -> u64 {
        self.heartbeat.load(Ordering::Acquire)
    }

    pub fn mark_synced(&self, worker: usize) {
        self.synced_flag[worker].store(true, Ordering::Release);
    }

    pub fn is_synced(&self, worker: usize) -> bool {
        self.synced_flag[worker].load(Ordering::Acquire)
    }

    /// Blocks (up to `timeout`) until every worker has called
    /// [`ControlPlane::mark_synced`]. Returns `false` on timeout (design
    /// §5: "Boot synchronization waits up to a configurable timeout...
    /// failure is fatal").
    pub fn wait_all_synced(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if (0..self.synced_flag.len()).all(|w| self.is_synced(w)) {
                return true;
            }
            if start.elapsed() > timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64};

    use super::*;

    fn make(n: usize) -> (Vec<UnsafeCell<libc::sem_t>>, Vec<AtomicU64>, Vec<AtomicBool>) {
        (
            (0..n).map(|_| UnsafeCell::new(unsafe { std::mem::zeroed() })).collect(),
            (0..n).map(|_| AtomicU64::new(0)).collect(),
            (0..n).map(|_| AtomicBool::new(false)).collect(),
        )
    }

    #[test]
    fn dump_token_advances_in_worker_id_order() {
        let token = AtomicU32::new(0);
        let heartbeat = AtomicU64::new(0);
        let (sems, sync, synced) = make(3);
        let cp = ControlPlane::attach(&token, &heartbeat, &sems, &sync, &synced);
        cp.init_semaphores().unwrap();

        cp.begin_dump();
        for id in 0..3 {
            cp.wait_turn(id);
            cp.pass_turn(id);
        }
        cp.wait_all_dumped();
        assert_eq!(token.load(Ordering::Acquire), 3);
    }

    #[test]
    fn advance_sync_is_monotonic_and_bounded_by_barrier_id() {
        let token = AtomicU32::new(0);
        let heartbeat = AtomicU64::new(0);
        let (sems, sync, synced) = make(1);
        let cp = ControlPlane::attach(&token, &heartbeat, &sems, &sync, &synced);
        cp.init_semaphores().unwrap();

        assert!(cp.advance_sync(0, 1));
        assert_eq!(cp.sync_counter(0), 1);
        assert!(!cp.advance_sync(0, 1));
        assert!(cp.advance_sync(0, 5));
        assert_eq!(cp.sync_counter(0), 2);
    }

    #[test]
    fn heartbeat_is_monotonic() {
        let token = AtomicU32::new(0);
        let heartbeat = AtomicU64::new(0);
        let (sems, sync, synced) = make(1);
        let cp = ControlPlane::attach(&token, &heartbeat, &sems, &sync, &synced);
        cp.beat();
        cp.beat();
        assert_eq!(cp.heartbeat(), 2);
    }
}
