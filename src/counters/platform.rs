/// Host-provided platform description, copied into the `StreamLayout`
/// header at `build()` time (design §3, §6).
#[derive(Clone, Copy, Debug, Default)]
#[repr(C)]
pub struct PlatformInfo {
    pub cores: u32,
    pub frequency_mhz: u32,
}

impl PlatformInfo {
    /// `cycles = ns * frequency_MHz / 1000`, the inverse of the
    /// `scale_factor` used to convert `memory_time_ns` into cycles
    /// (design §4.5).
    pub fn ns_to_cycles(&self, ns: u64) -> u64 {
        ns * self.frequency_mhz as u64 / 1000
    }
}
