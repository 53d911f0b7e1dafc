//! Trace packets: the fixed-size records that cross the [`crate::ring::RingChannel`]
//! between the producer (host emulator) and the worker simulators.

mod tb_info;

use std::fmt;

pub use tb_info::TbInfo;

/// Tag of a [`Reference`], matching the enum in the design plus the
/// OR-able `HOT` modifier.
///
/// `HOT` is not a variant of its own: it is a bit that may be set together
/// with [`PacketType::DATA`] to route the packet to a worker's fast,
/// partially-decoded path ([`crate::simulator::Simulator::hot_packet_processor`]).
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(test, derive(Debug))]
pub struct PacketType(u16);

impl PacketType {
    pub const DATA: PacketType = PacketType(0b0000_0001);
    pub const HOT: PacketType = PacketType(0b0000_0010);
    pub const BARRIER: PacketType = PacketType(0b0000_0100);
    pub const SYNC_DATA: PacketType = PacketType(0b0000_1000);
    pub const RESET: PacketType = PacketType(0b0001_0000);
    pub const DUMP_INFO: PacketType = PacketType(0b0010_0000);

    const CONTROL_MASK: u16 = Self::BARRIER.0 | Self::SYNC_DATA.0 | Self::RESET.0 | Self::DUMP_INFO.0;

    pub const fn contains(self, other: PacketType) -> bool {
        self.0 & other.0 == other.0
    }

    /// True for any packet type the worker recognizes. Anything else is a
    /// protocol error (design §7/§8: "unrecognized type enum is fatal").
    pub const fn is_known(self) -> bool {
        self.0 != 0 && (self.0 & !(Self::DATA.0 | Self::HOT.0 | Self::CONTROL_MASK)) == 0
    }

    pub const fn is_control(self) -> bool {
        self.0 & Self::CONTROL_MASK != 0
    }

    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl std::ops::BitOr for PacketType {
    type Output = PacketType;
    fn bitor(self, rhs: PacketType) -> PacketType {
        PacketType(self.0 | rhs.0)
    }
}

impl fmt::Debug for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketType({:#06x})", self.0)
    }
}

/// A fixed-size trace record. `P` is the per-stream payload (see [`Cpu`],
/// [`Branch`], [`Cache`]). `Reference` is `Copy` and `#[repr(C)]` so it can
/// be written into the shared trace buffer and reinterpreted on the
/// reader side without any serialization step.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Reference<P: Copy> {
    pub kind: PacketType,
    /// Carries the barrier/sync id for `BARRIER`/`SYNC_DATA` packets, and
    /// the worker id for `DUMP_INFO` token handshaking. Unused for `DATA`.
    pub id: u64,
    pub payload: P,
}

impl<P: Copy + Default> Default for Reference<P> {
    fn default() -> Self {
        Reference {
            kind: PacketType::default(),
            id: 0,
            payload: P::default(),
        }
    }
}

impl<P: Copy + Default> Reference<P> {
    pub fn control(kind: PacketType, id: u64) -> Self {
        debug_assert!(kind.is_control());
        Reference {
            kind,
            id,
            payload: P::default(),
        }
    }

    pub fn data(payload: P) -> Self {
        Reference {
            kind: PacketType::DATA,
            id: 0,
            payload,
        }
    }

    pub fn hot_data(payload: P) -> Self {
        Reference {
            kind: PacketType::DATA | PacketType::HOT,
            id: 0,
            payload,
        }
    }
}

/// CPU-stream payload: one translated-block event.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Cpu {
    pub core: u16,
    pub mode: Mode,
    /// Emulator-owned metadata for the translated block this reference
    /// describes. The emulator must keep this block live until the
    /// consuming worker has drained past this reference (design §5).
    pub tb_info: *const TbInfo,
}

// SAFETY: `Cpu` references cross the producer/worker boundary as `Copy`
// bytes inside the shared trace buffer; the pointee is never mutated or
// dereferenced by anything but the owning emulator and the worker that
// reads past it while the emulator keeps the block alive (design §5).
unsafe impl Send for Cpu {}

/// Execution privilege level at the time of the reference.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    User,
    System,
}

/// Branch-stream payload.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Branch {
    pub core: u16,
    pub pc: u64,
    pub taken: bool,
}

/// Which physical access path a cache reference travelled through.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProcessorKind {
    #[default]
    Cpu,
    Gpu,
}

/// Read/write direction of a cache access.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RwType {
    #[default]
    Read,
    Write,
}

/// Cache-stream payload.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Cache {
    pub processor: ProcessorKind,
    pub core: u16,
    pub addr: u64,
    pub rw_type: RwType,
    pub size: u32,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hot_is_or_able_modifier() {
        let ref_ = Reference::hot_data(Cache {
            processor: ProcessorKind::Cpu,
            core: 0,
            addr: 0x1000,
            rw_type: RwType::Read,
            size: 8,
        });
        assert!(ref_.kind.contains(PacketType::DATA));
        assert!(ref_.kind.contains(PacketType::HOT));
        assert!(ref_.kind.is_known());
    }

    #[test]
    fn unrecognized_kind_is_not_known() {
        let bogus = PacketType(0b1000_0000);
        assert!(!bogus.is_known());
    }

    #[test]
    fn control_packet_is_control_not_data() {
        let barrier: Reference<Branch> = Reference::control(PacketType::BARRIER, 7);
        assert!(barrier.kind.is_control());
        assert!(!barrier.kind.contains(PacketType::DATA));
        assert_eq!(barrier.id, 7);
    }
}
