use crate::counters::branch::Data;
use crate::counters::Model;
use crate::error::Result;
use crate::packet::{Branch, PacketType, Reference};
use crate::simulator::{BranchKind, Simulator};

const HISTORY_BITS: u32 = 8;
const TABLE_SIZE: usize = 1 << HISTORY_BITS;
const HISTORY_MASK: u16 = (TABLE_SIZE - 1) as u16;

/// Global-history-table predictor: a single shift register of the last
/// `HISTORY_BITS` outcomes (shared across cores, as in a real global branch
/// history) indexes a table of 2-bit saturating counters.
pub struct Ght {
    history: u16,
    table: Vec<u8>,
    counters: Data,
}

impl Default for Ght {
    fn default() -> Self {
        Ght {
            history: 0,
            table: vec![0; TABLE_SIZE],
            counters: Data::default(),
        }
    }
}

impl Ght {
    fn predict_and_update(&mut self, core: usize, taken: bool) {
        self.counters.grow_to(core + 1);
        let index = (self.history & HISTORY_MASK) as usize;
        let state = self.table[index];
        let predicted_taken = state >= 2;

        if predicted_taken == taken {
            self.counters.correct[core] += 1;
        } else {
            self.counters.wrong[core] += 1;
        }

        self.table[index] = match (state, taken) {
            (3, true) => 3,
            (0, false) => 0,
            (s, true) => s + 1,
            (s, false) => s - 1,
        };
        self.history = (self.history << 1 | taken as u16) & HISTORY_MASK;
    }
}

impl Simulator<BranchKind> for Ght {
    fn build(&mut self, _platform: &crate::counters::PlatformInfo, _model: &Model) -> Result<()> {
        Ok(())
    }

    fn packet_processor(&mut self, _id: usize, reference: &Reference<Branch>) -> Data {
        match reference.kind {
            k if k.contains(PacketType::RESET) => {
                self.history = 0;
                self.table.iter_mut().for_each(|s| *s = 0);
                self.counters = Data::for_cores(self.counters.correct.len());
            }
            k if k.contains(PacketType::DATA) => {
                self.predict_and_update(reference.payload.core as usize, reference.payload.taken);
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
    fn alternating_pattern_is_learned() {
        let mut sim = Ght::default();
        let mut correct_in_tail = 0;
        for i in 0..64 {
            let taken = i % 2 == 0;
            let before = sim.counters.correct.first().copied().unwrap_or(0);
            sim.packet_processor(
                0,
                &Reference {
                    kind: PacketType::DATA,
                    id: 0,
                    payload: Branch { core: 0, pc: 0, taken },
                },
            );
            let after = sim.counters.correct[0];
            if i >= 32 && after > before {
                correct_in_tail += 1;
            }
        }
        assert!(correct_in_tail > 16, "GHT should learn a fixed alternating pattern");
    }
}
