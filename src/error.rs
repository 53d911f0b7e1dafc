use thiserror::Error;

/// Fatal error taxonomy for the VPMU core.
///
/// The core has no long-range error propagation: a data-path error is
/// fatal to the worker that hit it, and a configuration or resource error
/// is fatal to the producer. Every variant here is meant to be logged once
/// (via [`log::error!`]) and followed by an immediate exit, never retried.
///
/// `RecoverableWarning` from the design is intentionally not a variant of
/// this enum: per the design it is "log and continue", so call sites emit
/// a [`log::warn!`] directly instead of constructing and propagating an
/// error value.
#[derive(Debug, Error)]
pub enum VpmuError {
    /// A JSON configuration object was missing a required key, or a key
    /// held a value of the wrong type.
    #[error("configuration error: missing or invalid key `{key}`: {detail}")]
    Config { key: String, detail: String },

    /// Shared memory creation, semaphore initialization, or `fork` failed.
    #[error("resource error: {0}")]
    Resource(#[from] std::io::Error),

    /// Workers failed to reach their initial sync point within the boot
    /// timeout.
    #[error("liveness error: {0} worker(s) did not reach initial sync within {timeout_ms}ms")]
    Liveness { pending: usize, timeout_ms: u64 },

    /// A worker observed a packet type it cannot dispatch.
    #[error("protocol error: worker {worker} received an unexpected packet (raw kind {raw_kind:#x})")]
    Protocol { worker: usize, raw_kind: u16 },
}

pub type Result<T> = std::result::Result<T, VpmuError>;
