//! A trace-driven virtual performance monitoring unit for a full-system
//! CPU emulator: a lock-light producer/worker pipeline that turns guest
//! memory/branch/instruction references into timing-model counters, plus
//! the event tracing and phase detection layers that give those counters
//! behavioral context.
//!
//! * [`packet`] — wire format shared by every [`Stream`](stream::Stream).
//! * [`ring`] / [`control`] — the lock-free SPSC/SPMC channel and sync
//!   primitives each [`transport`] backend is built from.
//! * [`transport`] — the three ways a [`Stream`](stream::Stream) can run
//!   its workers: in-process, threaded, or forked into separate processes.
//! * [`simulator`] — the timing-model plug-in contract (branch, cache,
//!   pipeline) and the per-[`Kind`](simulator::Kind) payload it operates on.
//! * [`stream`] — the producer-facing façade binding simulators to a
//!   transport.
//! * [`tracer`] — guest process/program bookkeeping and kernel event
//!   dispatch.
//! * [`phase`] — behavioral phase clustering over a rolling branch-target
//!   histogram.
//! * [`snapshot`] — the point-in-time counter reading phases and dumps are
//!   built from.
//! * [`config`] — the JSON configuration object tree.
//! * [`error`] — the crate's unified error type.

pub mod config;
pub mod control;
pub mod counters;
pub mod error;
pub mod ffi;
pub mod packet;
pub mod phase;
pub mod ring;
pub mod simulator;
pub mod snapshot;
pub mod stream;
pub mod tracer;
pub mod transport;

pub use error::{Result, VpmuError};
pub use stream::{Backend, Stream};
