//! The `MultiThread` back-end: one OS thread per attached simulator,
//! communicating with the producer through a heap-backed [`RingChannel`]
//! and [`ControlPlane`]. Grounded on `VPMUStream_Impl<T>`'s drain loop in
//! the original source, with `pthread_create` replaced by `std::thread`
//! and the raw semaphore/token words replaced by [`ControlPlane`].

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::control::ControlPlane;
use crate::error::{Result, VpmuError};
use crate::packet::{PacketType, Reference};
use crate::ring::RingStorage;
use crate::simulator::{Kind, Simulator};
use crate::transport::{packet_result, StreamImpl, DRAIN_BATCH, SYNC_HISTORY};

/// Boot-sync timeout (design §5): how long the producer waits for every
/// worker to report itself alive before `run` gives up.
const BOOT_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared<K: Kind> {
    ring: RingStorage<Reference<K::Payload>>,
    token: AtomicU32,
    heartbeat: AtomicU64,
    semaphores: Vec<UnsafeCell<libc::sem_t>>,
    sync_counter: Vec<AtomicU64>,
    synced_flag: Vec<AtomicBool>,
    /// Set by `destroy()` and paired with a final `post_all()` so a worker
    /// blocked in `control.wait(id)` wakes up and exits its loop instead of
    /// waiting on a semaphore nothing will ever post again.
    shutdown: AtomicBool,
}

// SAFETY: `semaphores` are only ever accessed through `sem_post`/`sem_wait`
// (which are themselves safe for concurrent, disjoint-index use), and
// `RingStorage` already establishes its own `Sync` invariant.
unsafe impl<K: Kind> Sync for Shared<K> {}
unsafe impl<K: Kind> Send for Shared<K> {}

impl<K: Kind> Shared<K> {
    fn new(capacity: usize, num_workers: usize) -> Self {
        Shared {
            ring: RingStorage::new(capacity, num_workers),
            token: AtomicU32::new(0),
            heartbeat: AtomicU64::new(0),
            semaphores: (0..num_workers).map(|_| UnsafeCell::new(unsafe { std::mem::zeroed() })).collect(),
            sync_counter: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
            synced_flag: (0..num_workers).map(|_| AtomicBool::new(false)).collect(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn control(&self) -> ControlPlane<'_> {
        ControlPlane::attach(&self.token, &self.heartbeat, &self.semaphores, &self.sync_counter, &self.synced_flag)
    }
}

type History<K> = Vec<Mutex<[Option<<K as Kind>::Data>; SYNC_HISTORY]>>;

pub struct MultiThread<K: Kind> {
    capacity: usize,
    shared: Option<Arc<Shared<K>>>,
    history: Option<Arc<History<K>>>,
    handles: Vec<JoinHandle<()>>,
}

impl<K: Kind> MultiThread<K> {
    /// `capacity` sizes the ring shared with every worker spawned by a
    /// later [`StreamImpl::run`] call; the worker count itself is only
    /// known once `run` receives its jobs.
    pub fn new(capacity: usize) -> Self {
        MultiThread { capacity, shared: None, history: None, handles: Vec::new() }
    }
}

fn worker_loop<K: Kind>(
    id: usize,
    mut job: Box<dyn Simulator<K>>,
    shared: Arc<Shared<K>>,
    history: Arc<History<K>>,
) {
    let _ = crate::ffi::syscall::name_process(&format!("vpmu-w{id}"));
    let control = shared.control();
    control.mark_synced(id);
    let ring = shared.ring.channel();
    let mut buf: Vec<Reference<K::Payload>> = vec![Reference::default(); DRAIN_BATCH];

    loop {
        if control.wait(id).is_err() {
            return;
        }
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        control.beat();
        loop {
            let n = ring.pop_bulk(id, &mut buf);
            if n == 0 {
                break;
            }
            for reference in &buf[..n] {
                if let Err(err) = dispatch_one(id, job.as_mut(), reference, &control, &history) {
                    log::error!(target: "vpmu::transport", "{err}, exiting");
                    return;
                }
            }
            if !ring.is_not_empty(id) {
                break;
            }
        }
    }
}

fn dispatch_one<K: Kind>(
    id: usize,
    job: &mut dyn Simulator<K>,
    reference: &Reference<K::Payload>,
    control: &ControlPlane<'_>,
    history: &History<K>,
) -> Result<()> {
    let kind = reference.kind;
    if kind.contains(PacketType::DUMP_INFO) {
        control.wait_turn(id);
        let _ = job.packet_processor(id, reference);
        control.pass_turn(id);
    } else if kind.contains(PacketType::BARRIER) || kind.contains(PacketType::SYNC_DATA) {
        let data = job.packet_processor(id, reference);
        if control.advance_sync(id, reference.id) {
            let counter = control.sync_counter(id);
            history[id].lock().unwrap()[(counter as usize) % SYNC_HISTORY] = Some(data);
        }
    } else if kind.is_known() {
        let _ = packet_result(job, id, reference);
    } else {
        return Err(VpmuError::Protocol { worker: id, raw_kind: kind.raw() });
    }
    Ok(())
}

impl<K: Kind + 'static> StreamImpl<K> for MultiThread<K>
where
    K::Payload: Send,
    K::Data: Send,
{
    fn build(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(shared) = &self.shared {
            shared.shutdown.store(true, Ordering::Release);
            let _ = shared.control().post_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    fn run(&mut self, jobs: Vec<Box<dyn Simulator<K>>>) -> Result<()> {
        let num_workers = jobs.len();
        let shared = Arc::new(Shared::new(self.capacity, num_workers));
        shared.control().init_semaphores().map_err(VpmuError::Resource)?;
        let history: Arc<History<K>> =
            Arc::new((0..num_workers).map(|_| Mutex::new(std::array::from_fn(|_| None))).collect());

        let mut handles = Vec::with_capacity(num_workers);
        for (id, job) in jobs.into_iter().enumerate() {
            let shared = shared.clone();
            let history = history.clone();
            let handle = thread::Builder::new()
                .name(format!("vpmu-worker-{id}"))
                .spawn(move || worker_loop(id, job, shared, history))
                .map_err(VpmuError::Resource)?;
            handles.push(handle);
        }

        if num_workers > 0 && !shared.control().wait_all_synced(BOOT_SYNC_TIMEOUT) {
            return Err(VpmuError::Liveness { pending: num_workers, timeout_ms: BOOT_SYNC_TIMEOUT.as_millis() as u64 });
        }

        self.shared = Some(shared);
        self.history = Some(history);
        self.handles = handles;
        Ok(())
    }

    fn send(&self, local: &[Reference<K::Payload>]) {
        let Some(shared) = &self.shared else { return };
        let ring = shared.ring.channel();
        ring.push_bulk(local);
        let _ = shared.control().post_all();
    }

    fn send_dump(&self) {
        let Some(shared) = &self.shared else { return };
        let control = shared.control();
        control.begin_dump();
        self.send_one(Reference::control(PacketType::DUMP_INFO, 0));
        control.wait_all_dumped();
    }

    fn get_data(&self, worker: usize, idx: Option<usize>) -> Option<K::Data> {
        let shared = self.shared.as_ref()?;
        let history = self.history.as_ref()?;
        let i = idx.unwrap_or(shared.control().sync_counter(worker) as usize);
        history.get(worker)?.lock().unwrap()[i % SYNC_HISTORY].clone()
    }

    fn num_workers(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.synced_flag.len())
    }

    fn sync_counter(&self, worker: usize) -> u64 {
        self.shared.as_ref().map_or(0, |s| s.control().sync_counter(worker))
    }
}
