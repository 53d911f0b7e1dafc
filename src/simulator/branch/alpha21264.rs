use crate::counters::branch::Data;
use crate::counters::Model;
use crate::error::Result;
use crate::packet::{Branch, PacketType, Reference};
use crate::simulator::{BranchKind, Simulator};

const LOCAL_HISTORY_BITS: u32 = 10;
const LOCAL_HISTORY_SIZE: usize = 1 << LOCAL_HISTORY_BITS;
const GLOBAL_HISTORY_BITS: u32 = 12;
const GLOBAL_HISTORY_SIZE: usize = 1 << GLOBAL_HISTORY_BITS;
const GLOBAL_HISTORY_MASK: u16 = (GLOBAL_HISTORY_SIZE - 1) as u16;
const LOCAL_HISTORY_MASK: u16 = (LOCAL_HISTORY_SIZE - 1) as u16;

fn saturate_toward(state: u8, taken: bool) -> u8 {
    match (state, taken) {
        (3, true) => 3,
        (0, false) => 0,
        (s, true) => s + 1,
        (s, false) => s - 1,
    }
}

/// Tournament predictor in the style of the Alpha 21264: a per-PC local
/// predictor and a global-history predictor, arbitrated per-branch by a
/// meta-predictor indexed by global history (the chooser itself is a 2-bit
/// saturating counter, same as the component predictors).
pub struct Alpha21264 {
    local_history: Vec<u16>,
    local_table: Vec<u8>,
    global_history: u16,
    global_table: Vec<u8>,
    chooser: Vec<u8>,
    counters: Data,
}

impl Default for Alpha21264 {
    fn default() -> Self {
        Alpha21264 {
            local_history: vec![0; LOCAL_HISTORY_SIZE],
            local_table: vec![0; LOCAL_HISTORY_SIZE],
            global_history: 0,
            global_table: vec![0; GLOBAL_HISTORY_SIZE],
            chooser: vec![1; GLOBAL_HISTORY_SIZE],
            counters: Data::default(),
        }
    }
}

impl Alpha21264 {
    fn predict_and_update(&mut self, core: usize, pc: u64, taken: bool) {
        self.counters.grow_to(core + 1);

        let pc_index = (pc as usize) & (LOCAL_HISTORY_SIZE - 1);
        let local_idx = (self.local_history[pc_index] & LOCAL_HISTORY_MASK) as usize;
        let local_state = self.local_table[local_idx];
        let local_predicted = local_state >= 2;

        let global_idx = (self.global_history & GLOBAL_HISTORY_MASK) as usize;
        let global_state = self.global_table[global_idx];
        let global_predicted = global_state >= 2;

        let pick_global = self.chooser[global_idx] >= 2;
        let predicted = if pick_global { global_predicted } else { local_predicted };

        if predicted == taken {
            self.counters.correct[core] += 1;
        } else {
            self.counters.wrong[core] += 1;
        }

        if local_predicted != global_predicted {
            self.chooser[global_idx] = if global_predicted == taken {
                saturate_toward(self.chooser[global_idx], true)
            } else {
                saturate_toward(self.chooser[global_idx], false)
            };
        }

        self.local_table[local_idx] = saturate_toward(local_state, taken);
        self.global_table[global_idx] = saturate_toward(global_state, taken);
        self.local_history[pc_index] = (self.local_history[pc_index] << 1 | taken as u16) & LOCAL_HISTORY_MASK;
        self.global_history = (self.global_history << 1 | taken as u16) & GLOBAL_HISTORY_MASK;
    }
}

impl Simulator<BranchKind> for Alpha21264 {
    fn build(&mut self, _platform: &crate::counters::PlatformInfo, _model: &Model) -> Result<()> {
        Ok(())
    }

    fn packet_processor(&mut self, _id: usize, reference: &Reference<Branch>) -> Data {
        match reference.kind {
            k if k.contains(PacketType::RESET) => {
                *self = Alpha21264::default();
            }
            k if k.contains(PacketType::DATA) => {
                self.predict_and_update(reference.payload.core as usize, reference.payload.pc, reference.payload.taken);
            }
            _ => {}
        }
        self.counters.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn repeating_per_pc_pattern_is_learned_better_than_chance() {
        let mut sim = Alpha21264::default();
        for i in 0..200 {
            let taken = (i / 3) % 2 == 0;
            sim.packet_processor(
                0,
                &Reference {
                    kind: PacketType::DATA,
                    id: 0,
                    payload: Branch { core: 0, pc: 0x4000, taken },
                },
            );
        }
        assert!(sim.counters.accuracy(0) > 0.6);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut sim = Alpha21264::default();
        sim.packet_processor(
            0,
            &Reference {
                kind: PacketType::DATA,
                id: 0,
                payload: Branch { core: 0, pc: 0x4000, taken: true },
            },
        );
        sim.packet_processor(0, &Reference::control(PacketType::RESET, 0));
        assert_eq!(sim.counters.correct.len(), 0);
    }
}
