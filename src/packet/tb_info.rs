/// Emulator-owned metadata describing one translated guest block (TB).
///
/// Referenced by pointer only from [`super::Cpu`] — the core never owns or
/// mutates it. Per-class instruction counts let a pipeline-timer simulator
/// attribute cycles without re-decoding guest code (design §1, §3).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TbInfo {
    pub start_pc: u64,
    /// Size of the translated block, in bytes.
    pub byte_size: u32,
    pub insn_alu: u32,
    pub insn_bit: u32,
    pub insn_load: u32,
    pub insn_store: u32,
    pub insn_total: u32,
    pub has_branch: bool,
}

impl TbInfo {
    pub fn end_pc(&self) -> u64 {
        self.start_pc + self.byte_size as u64
    }
}
