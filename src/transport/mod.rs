//! The three `StreamImpl` back-ends (design §4.3): `SingleThread`,
//! `MultiThread`, and `MultiProcess`. All three share the packet-dispatch
//! rule (design §4.3 "Dispatch") via [`packet_result`], and all three
//! expose the same [`StreamImpl`] contract so [`crate::stream::Stream`] can
//! swap between them at bind time.

pub mod multi_process;
pub mod multi_thread;
pub mod single_thread;

use crate::error::Result;
use crate::packet::{PacketType, Reference};
use crate::simulator::{Kind, Simulator};

/// Rolling history depth for `sync_data[worker]` (design §3:
/// `sync_data[worker][32]`).
pub const SYNC_HISTORY: usize = 32;

/// Number of records each worker drains from the ring per wakeup (design
/// §4.1: workers drain in bulk rather than one record at a time).
pub const DRAIN_BATCH: usize = 64;

pub trait StreamImpl<K: Kind> {
    /// Allocates whatever storage the backend needs (heap, or `mmap`'d
    /// shared memory) ahead of [`StreamImpl::run`].
    fn build(&mut self) -> Result<()>;
    fn destroy(&mut self);
    /// Spawns one worker per job and blocks until every worker has reached
    /// its initial sync point (design §5: "boot synchronization...failure
    /// is fatal").
    fn run(&mut self, jobs: Vec<Box<dyn Simulator<K>>>) -> Result<()>;
    fn send(&self, local: &[Reference<K::Payload>]);
    fn send_one(&self, reference: Reference<K::Payload>) {
        self.send(std::slice::from_ref(&reference));
    }
    /// Blocking, strictly-ordered dump (design §4.2).
    fn send_dump(&self);
    /// `idx = None` reads the most recent snapshot; `Some(i)` reads
    /// `sync_data[worker][i % 32]` directly (design §3).
    fn get_data(&self, worker: usize, idx: Option<usize>) -> Option<K::Data>;
    fn num_workers(&self) -> usize;
    /// How many `BARRIER`/`SYNC_DATA` packets `worker` has processed so
    /// far (design invariant 2: non-decreasing across all observations).
    /// Lets a caller turn `BARRIER` into a true blocking wait by polling
    /// until every worker's counter has reached the id it sent.
    fn sync_counter(&self, worker: usize) -> u64;
}

/// Applies the `HOT`-bit routing rule from design §4.3: a `DATA` packet
/// with `HOT` set goes to the worker's fast, partially-decoded path.
/// `BARRIER`/`SYNC_DATA`/`DUMP_INFO` packets are never routed through here
/// — each backend handles their cross-worker ordering itself.
pub fn packet_result<K: Kind>(
    sim: &mut dyn Simulator<K>,
    id: usize,
    reference: &Reference<K::Payload>,
) -> K::Data {
    if reference.kind.contains(PacketType::HOT) {
        sim.hot_packet_processor(id, reference)
    } else {
        sim.packet_processor(id, reference)
    }
}
