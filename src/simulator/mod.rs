//! The timing-model plug-in contract (design §4.5, §6) and the three
//! payload kinds it is generic over.
//!
//! The original source dispatches through classical virtual inheritance
//! (`VPMUSimulator<T>`, one concrete class per model). Design §9's first
//! note asks for this to be re-architected as a capability trait
//! parameterized by payload type; [`Kind`] carries that parameterization
//! and [`Simulator`] is the resulting trait object contract, registered in
//! a per-stream name-keyed factory the way `create_sim` does in the
//! original `VPMUStream_T`.

pub mod branch;
pub mod cache;
pub mod pipeline;

use crate::error::Result;
use crate::packet::Reference;

/// Ties together the payload, static model, and counters `Data` type for
/// one of the three streams (CPU / Branch / Cache).
pub trait Kind {
    type Payload: Copy + Default;
    type Model: Clone + Default;
    type Data: Clone + Default;
}

/// Pipeline-timer / CPU stream.
pub struct Insn;
impl Kind for Insn {
    type Payload = crate::packet::Cpu;
    type Model = crate::counters::Model;
    type Data = crate::counters::InsnData;
}

/// Branch-predictor stream.
pub struct BranchKind;
impl Kind for BranchKind {
    type Payload = crate::packet::Branch;
    type Model = crate::counters::Model;
    type Data = crate::counters::branch::Data;
}

/// Cache-hierarchy stream.
pub struct CacheKind;
impl Kind for CacheKind {
    type Payload = crate::packet::Cache;
    type Model = crate::counters::Model;
    type Data = crate::counters::cache::Data;
}

/// A pluggable timing model. One instance runs inside exactly one worker
/// (design §4.3/§4.5): it owns all of its state and is never shared across
/// workers.
///
/// `packet_processor` is the single dispatch point and is expected to
/// switch on `reference.kind` itself, mirroring the `switch (ref.type)`
/// found in every concrete simulator of the original source — `BARRIER`/
/// `SYNC_DATA` snapshot current counters, `DUMP_INFO` additionally emits a
/// textual report, `RESET` clears state, and plain `DATA` updates state.
/// Every branch returns the simulator's current `Data` so the caller can
/// publish it into `sync_data`.
pub trait Simulator<K: Kind>: Send {
    /// `platform` is the host-provided core count/frequency (design §3's
    /// `PlatformInfo`), copied in before `model` so a simulator can size
    /// its per-core state; `model` is this worker's configured `Model`
    /// slot (design §4.4: "each worker calls `Simulator::build()` with its
    /// slot's `Model`").
    fn build(&mut self, platform: &crate::counters::PlatformInfo, model: &K::Model) -> Result<()>;

    fn packet_processor(&mut self, id: usize, reference: &Reference<K::Payload>) -> K::Data;

    /// Fast path for `DATA` packets carrying the `HOT` bit. Defaults to the
    /// full decode path; models with a partially-decoded fast path override
    /// it.
    fn hot_packet_processor(&mut self, id: usize, reference: &Reference<K::Payload>) -> K::Data {
        self.packet_processor(id, reference)
    }

    fn destroy(&mut self) {}
}

pub type Factory<K> = fn() -> Box<dyn Simulator<K>>;
