//! [`Stream`]: the producer-facing façade in front of a [`StreamImpl`]
//! back-end. Grounded on `VPMUStream_T<T>` in the original source: binds a
//! JSON simulator list, builds and runs one worker per attached simulator,
//! and buffers `send_ref` calls per core so most calls never touch a lock
//! (design §4.1, §6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use arrayvec::ArrayVec;
use serde::de::DeserializeOwned;

use crate::config::StreamConfig;
use crate::counters::PlatformInfo;
use crate::error::{Result, VpmuError};
use crate::packet::{PacketType, Reference};
use crate::simulator::{Kind, Simulator};
use crate::transport::multi_process::MultiProcess;
use crate::transport::multi_thread::MultiThread;
use crate::transport::single_thread::SingleThread;
use crate::transport::StreamImpl;

/// Per-core local buffer depth before a flush is forced (design §4.1,
/// matching `VPMULocalBuffer<Reference, 256>` in the original source).
const LOCAL_BUFFER_CAPACITY: usize = 256;

/// Looks up an attached simulator by its configured `name` (design §6).
/// One instance per [`Kind`] is supplied by `crate::simulator::{branch,
/// cache, pipeline}::create`.
pub type SimFactory<K> = fn(&str) -> Option<Box<dyn Simulator<K>>>;

/// Which [`StreamImpl`] a [`Stream`] runs its workers under (design §4.3).
#[derive(Clone, Copy, Debug)]
pub enum Backend {
    SingleThread,
    MultiThread { ring_capacity: usize },
    MultiProcess { ring_capacity: usize },
}

fn build_transport<K: Kind + 'static>(backend: Backend) -> Box<dyn StreamImpl<K>>
where
    K::Payload: Copy + Send,
    K::Data: Send + serde::Serialize + DeserializeOwned,
{
    match backend {
        Backend::SingleThread => Box::new(SingleThread::default()),
        Backend::MultiThread { ring_capacity } => Box::new(MultiThread::new(ring_capacity)),
        Backend::MultiProcess { ring_capacity } => Box::new(MultiProcess::new(ring_capacity)),
    }
}

pub struct Stream<K: Kind> {
    name: String,
    factory: SimFactory<K>,
    backend: Backend,
    platform: PlatformInfo,
    transport: Mutex<Option<Box<dyn StreamImpl<K>>>>,
    models: Mutex<Vec<K::Model>>,
    local_buffer: Vec<Mutex<ArrayVec<Reference<K::Payload>, LOCAL_BUFFER_CAPACITY>>>,
    target_configs: Mutex<serde_json::Value>,
    barrier_id: AtomicU64,
}

impl<K: Kind + 'static> Stream<K>
where
    K::Payload: Copy + Send,
    K::Data: Send + serde::Serialize + DeserializeOwned,
{
    pub fn new(name: impl Into<String>, factory: SimFactory<K>, backend: Backend, platform: PlatformInfo, num_cores: usize) -> Self {
        Stream {
            name: name.into(),
            factory,
            backend,
            platform,
            transport: Mutex::new(None),
            models: Mutex::new(Vec::new()),
            local_buffer: (0..num_cores.max(1)).map(|_| Mutex::new(ArrayVec::new())).collect(),
            target_configs: Mutex::new(serde_json::Value::Null),
            barrier_id: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores the simulator list this stream will attach on the next
    /// [`Stream::build`]. Accepts either a single simulator object or a
    /// JSON array of them (design §6).
    pub fn bind(&self, configs: serde_json::Value) -> Result<()> {
        StreamConfig::parse(configs.clone())?;
        *self.target_configs.lock().unwrap() = configs;
        Ok(())
    }

    /// Attaches every configured simulator, builds it with this stream's
    /// [`PlatformInfo`], and hands the whole job list to a freshly started
    /// [`StreamImpl`] (design §5, §6).
    pub fn build(&self) -> Result<()>
    where
        K::Model: DeserializeOwned,
    {
        let configs = self.target_configs.lock().unwrap().clone();
        let config = StreamConfig::parse(configs)?;

        let mut jobs: Vec<Box<dyn Simulator<K>>> = Vec::with_capacity(config.entries().len());
        let mut models: Vec<K::Model> = Vec::with_capacity(config.entries().len());
        for entry in config.entries() {
            let sim_name = StreamConfig::simulator_name(entry)?;

            log::debug!("attaching simulator `{sim_name}` to stream `{}`", self.name);
            let Some(mut sim) = (self.factory)(sim_name) else {
                log::warn!("simulator `{sim_name}` not found, skipping");
                continue;
            };
            let model: K::Model = serde_json::from_value(entry.clone())
                .map_err(|e| VpmuError::Config { key: sim_name.to_string(), detail: e.to_string() })?;
            sim.build(&self.platform, &model)?;
            jobs.push(sim);
            models.push(model);
        }

        if jobs.is_empty() {
            return Err(VpmuError::Config { key: "simulators".into(), detail: "# of total timing models cannot be zero".into() });
        }

        for buf in &self.local_buffer {
            buf.lock().unwrap().clear();
        }

        let mut transport = build_transport::<K>(self.backend);
        transport.build()?;
        transport.run(jobs)?;

        *self.models.lock().unwrap() = models;
        *self.transport.lock().unwrap() = Some(transport);
        Ok(())
    }

    pub fn destroy(&self) {
        if let Some(mut transport) = self.transport.lock().unwrap().take() {
            transport.destroy();
        }
        for buf in &self.local_buffer {
            buf.lock().unwrap().clear();
        }
    }

    fn flush_locked(&self, transport: &dyn StreamImpl<K>) {
        for buf in &self.local_buffer {
            let mut guard = buf.lock().unwrap();
            if !guard.is_empty() {
                transport.send(&guard);
                guard.clear();
            }
        }
    }

    /// Flushes every local buffer then sends a `RESET` control packet
    /// (design §4.3).
    pub fn reset(&self) {
        let guard = self.transport.lock().unwrap();
        let Some(transport) = guard.as_deref() else { return };
        self.flush_locked(transport);
        transport.send_one(Reference::control(PacketType::RESET, 0));
    }

    /// Flushes every local buffer then sends a blocking `BARRIER` (design
    /// §4.3: every worker's data snapshot at this barrier id becomes
    /// readable via [`Stream::get_data`]).
    pub fn sync(&self) {
        let guard = self.transport.lock().unwrap();
        let Some(transport) = guard.as_deref() else { return };
        self.flush_locked(transport);
        let id = self.barrier_id.fetch_add(1, Ordering::Relaxed) + 1;
        transport.send_one(Reference::control(PacketType::BARRIER, id));
        while (0..transport.num_workers()).any(|w| transport.sync_counter(w) < id) {
            std::thread::yield_now();
        }
    }

    /// Like [`Stream::sync`] but uses `SYNC_DATA`, which does not block
    /// the caller on worker drain (design §4.3).
    pub fn sync_none_blocking(&self) {
        let guard = self.transport.lock().unwrap();
        let Some(transport) = guard.as_deref() else { return };
        self.flush_locked(transport);
        let id = self.barrier_id.fetch_add(1, Ordering::Relaxed) + 1;
        transport.send_one(Reference::control(PacketType::SYNC_DATA, id));
    }

    /// Flushes every local buffer then runs the ordered `DUMP_INFO`
    /// protocol (design §4.2).
    pub fn dump(&self) {
        let guard = self.transport.lock().unwrap();
        let Some(transport) = guard.as_deref() else { return };
        self.flush_locked(transport);
        transport.send_dump();
    }

    /// Buffers one reference for `core`, flushing straight to the
    /// transport once the per-core buffer fills (design §4.1, §6). This is
    /// the hot path: it only takes the transport lock on a flush.
    pub fn send_ref(&self, core: usize, reference: Reference<K::Payload>) {
        let Some(buf) = self.local_buffer.get(core) else { return };
        let mut guard = buf.lock().unwrap();
        guard.push(reference);
        if guard.is_full() {
            let transport_guard = self.transport.lock().unwrap();
            let Some(transport) = transport_guard.as_deref() else {
                guard.clear();
                return;
            };
            transport.send(&guard);
            guard.clear();
        }
    }

    pub fn get_model(&self, worker: usize) -> Option<K::Model>
    where
        K::Model: Clone,
    {
        self.models.lock().unwrap().get(worker).cloned()
    }

    pub fn get_data(&self, worker: usize) -> Option<K::Data> {
        self.transport.lock().unwrap().as_ref()?.get_data(worker, None)
    }

    pub fn num_workers(&self) -> usize {
        self.transport.lock().unwrap().as_ref().map_or(0, |t| t.num_workers())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::simulator::BranchKind;

    #[test]
    fn bind_rejects_empty_simulator_list() {
        let stream: Stream<BranchKind> = Stream::new(
            "branch",
            crate::simulator::branch::create,
            Backend::SingleThread,
            PlatformInfo { cores: 1, frequency_mhz: 1000 },
            1,
        );
        assert!(stream.bind(serde_json::json!([])).is_err());
    }

    #[test]
    fn build_runs_attached_simulator_and_accepts_data() {
        let stream: Stream<BranchKind> = Stream::new(
            "branch",
            crate::simulator::branch::create,
            Backend::SingleThread,
            PlatformInfo { cores: 1, frequency_mhz: 1000 },
            1,
        );
        stream.bind(serde_json::json!({ "name": "two bits" })).unwrap();
        stream.build().unwrap();
        assert_eq!(stream.num_workers(), 1);

        stream.send_ref(0, Reference::data(crate::packet::Branch { core: 0, pc: 0, taken: true }));
        stream.sync();
        let data = stream.get_data(0).expect("snapshot present after sync");
        assert_eq!(data.correct[0] + data.wrong[0], 1);
    }

    #[test]
    fn build_rejects_unknown_simulator_name() {
        let stream: Stream<BranchKind> = Stream::new(
            "branch",
            crate::simulator::branch::create,
            Backend::SingleThread,
            PlatformInfo { cores: 1, frequency_mhz: 1000 },
            1,
        );
        stream.bind(serde_json::json!({ "name": "does-not-exist" })).unwrap();
        assert!(stream.build().is_err());
    }
}
