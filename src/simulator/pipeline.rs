//! Per-ISA pipeline timer (design §4.5): maps a translated block's
//! instruction-class counts to a cycle cost, with optional dual-issue
//! collapsing. Grounded on `CPU_IntelI7::accumulate` in the original
//! source, generalized from a single hard-coded x86 instruction-time table
//! to a small per-class latency vector taken from `Model`.

use crate::counters::insn::CoreTotals;
use crate::counters::{InsnData, Model};
use crate::error::Result;
use crate::packet::{Cpu, Mode, PacketType, Reference};
use crate::simulator::{Insn, Simulator};

/// Looks up a pipeline timer by its configured `name` (design §6). Any ISA
/// name resolves to the same generalized class-latency model; the name is
/// still required so configuration files document which target they mean.
pub fn create(name: &str) -> Option<Box<dyn Simulator<Insn>>> {
    match name {
        "pipeline" | "arm" | "x86" | "riscv" => Some(Box::new(PipelineTimer::default())),
        _ => None,
    }
}

/// `model.latency` is read as `[alu, bit, load, store]` per-instruction
/// cycle costs; a missing entry defaults to 1 cycle. `model.ways` doubles
/// as the dual-issue factor: `ways >= 2` collapses the ALU/bit class cost
/// by half, rounding up, mirroring a 2-wide in-order front end.
pub struct PipelineTimer {
    latency: [u32; 4],
    dual_issue: bool,
    data: InsnData,
}

impl Default for PipelineTimer {
    fn default() -> Self {
        PipelineTimer {
            latency: [1, 1, 1, 1],
            dual_issue: false,
            data: InsnData::default(),
        }
    }
}

impl PipelineTimer {
    fn class_latency(&self, index: usize) -> u32 {
        self.latency.get(index).copied().unwrap_or(1)
    }

    fn accumulate(&mut self, core: usize, mode: Mode, payload: &Cpu) {
        self.data.grow_to(core + 1);
        let tb = unsafe { &*payload.tb_info };

        let mut alu_bit_cycles = tb.insn_alu as u64 * self.class_latency(0) as u64
            + tb.insn_bit as u64 * self.class_latency(1) as u64;
        if self.dual_issue {
            alu_bit_cycles = alu_bit_cycles.div_ceil(2);
        }
        let load_cycles = tb.insn_load as u64 * self.class_latency(2) as u64;
        let store_cycles = tb.insn_store as u64 * self.class_latency(3) as u64;

        let totals = CoreTotals {
            cycles: alu_bit_cycles + load_cycles + store_cycles,
            total_insn: tb.insn_total as u64,
            load: tb.insn_load as u64,
            store: tb.insn_store as u64,
        };

        let bucket = match mode {
            Mode::User => &mut self.data.user[core],
            Mode::System => &mut self.data.system[core],
        };
        *bucket = *bucket + totals;
    }
}

impl Simulator<Insn> for PipelineTimer {
    fn build(&mut self, platform: &crate::counters::PlatformInfo, model: &Model) -> Result<()> {
        for (slot, value) in self.latency.iter_mut().zip(model.latency.iter()) {
            *slot = *value;
        }
        self.dual_issue = model.ways >= 2;
        self.data = InsnData::for_cores(platform.cores.max(1) as usize);
        Ok(())
    }

    fn packet_processor(&mut self, id: usize, reference: &Reference<Cpu>) -> InsnData {
        match reference.kind {
            k if k.contains(PacketType::RESET) => {
                self.data = InsnData::for_cores(self.data.user.len());
            }
            k if k.contains(PacketType::DATA) => {
                self.accumulate(reference.payload.core as usize, reference.payload.mode, &reference.payload);
            }
            k if k.contains(PacketType::DUMP_INFO) => {
                let totals = self.data.reduce();
                log::info!(target: "vpmu::dump", "worker {id} pipeline: cycles={} total_insn={}", totals.cycles, totals.total_insn);
            }
            _ => {}
        }
        self.data.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::TbInfo;

    fn reference(core: u16, mode: Mode, tb: &TbInfo) -> Reference<Cpu> {
        Reference {
            kind: PacketType::DATA,
            id: 0,
            payload: Cpu { core, mode, tb_info: tb as *const TbInfo },
        }
    }

    #[test]
    fn single_issue_cost_matches_class_latencies() {
        let mut sim = PipelineTimer::default();
        let platform = crate::counters::PlatformInfo { cores: 1, frequency_mhz: 1000 };
        sim.build(
            &platform,
            &Model {
                latency: vec![2, 3, 4, 5],
                ways: 1,
                ..Default::default()
            },
        )
        .unwrap();

        let tb = TbInfo {
            start_pc: 0,
            byte_size: 16,
            insn_alu: 2,
            insn_bit: 1,
            insn_load: 1,
            insn_store: 1,
            insn_total: 5,
            has_branch: false,
        };
        let data = sim.packet_processor(0, &reference(0, Mode::User, &tb));
        // alu: 2*2=4, bit: 1*3=3, load: 1*4=4, store: 1*5=5 => 16
        assert_eq!(data.user[0].cycles, 16);
        assert_eq!(data.user[0].total_insn, 5);
    }

    #[test]
    fn dual_issue_halves_alu_bit_cost() {
        let mut sim = PipelineTimer::default();
        let platform = crate::counters::PlatformInfo { cores: 1, frequency_mhz: 1000 };
        sim.build(
            &platform,
            &Model {
                latency: vec![1, 1, 1, 1],
                ways: 2,
                ..Default::default()
            },
        )
        .unwrap();

        let tb = TbInfo {
            start_pc: 0,
            byte_size: 16,
            insn_alu: 4,
            insn_bit: 0,
            insn_load: 0,
            insn_store: 0,
            insn_total: 4,
            has_branch: false,
        };
        let data = sim.packet_processor(0, &reference(0, Mode::User, &tb));
        assert_eq!(data.user[0].cycles, 2);
    }
}
