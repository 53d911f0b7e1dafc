//! Counter data types shared by the three streams (CPU/Branch/Cache) and
//! the static `Model`/`PlatformInfo` configuration that parameterizes a
//! simulator (design §3).

pub mod branch;
pub mod cache;
pub mod insn;
mod model;
mod platform;

pub use insn::Data as InsnData;
pub use model::Model;
pub use platform::PlatformInfo;
