use crate::counters::branch::Data;
use crate::counters::Model;
use crate::error::Result;
use crate::packet::{Branch, PacketType, Reference};
use crate::simulator::{BranchKind, Simulator};

/// Single-bit last-outcome predictor: predicts whatever the branch did last
/// time, per core.
#[derive(Default)]
pub struct OneBit {
    last_taken: Vec<bool>,
    counters: Data,
}

impl Simulator<BranchKind> for OneBit {
    fn build(&mut self, _platform: &crate::counters::PlatformInfo, _model: &Model) -> Result<()> {
        Ok(())
    }

    fn packet_processor(&mut self, _id: usize, reference: &Reference<Branch>) -> Data {
        match reference.kind {
            k if k.contains(PacketType::RESET) => {
                self.counters = Data::for_cores(self.last_taken.len());
            }
            k if k.contains(PacketType::DATA) => {
                let core = reference.payload.core as usize;
                if core >= self.last_taken.len() {
                    self.last_taken.resize(core + 1, false);
                }
                self.counters.grow_to(core + 1);
                let taken = reference.payload.taken;
                if self.last_taken[core] == taken {
                    self.counters.correct[core] += 1;
                } else {
                    self.counters.wrong[core] += 1;
                }
                self.last_taken[core] = taken;
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
    fn repeated_outcome_is_always_predicted_correctly_after_the_first() {
        let mut sim = OneBit::default();
        for _ in 0..5 {
            sim.packet_processor(
                0,
                &Reference {
                    kind: PacketType::DATA,
                    id: 0,
                    payload: Branch { core: 0, pc: 0, taken: true },
                },
            );
        }
        assert_eq!(sim.counters.correct[0], 4);
        assert_eq!(sim.counters.wrong[0], 0);
    }
}
