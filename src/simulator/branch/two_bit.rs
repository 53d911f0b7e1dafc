use crate::counters::branch::Data;
use crate::counters::Model;
use crate::error::Result;
use crate::packet::{Branch, PacketType, Reference};
use crate::simulator::{BranchKind, Simulator};

/// 2-bit saturating-counter predictor, states `0..=3` (strongly/weakly
/// not-taken, weakly/strongly taken), grounded on
/// `Branch_Two_Bits::two_bits_branch_predictor` in the original source.
#[derive(Default)]
pub struct TwoBits {
    state: Vec<u8>,
    counters: Data,
}

impl TwoBits {
    fn predict_and_update(&mut self, core: usize, taken: bool) {
        if core >= self.state.len() {
            self.state.resize(core + 1, 0);
        }
        self.counters.grow_to(core + 1);

        let s = self.state[core];
        let predicted_taken = s >= 2;
        if predicted_taken == taken {
            self.counters.correct[core] += 1;
        } else {
            self.counters.wrong[core] += 1;
        }
        self.state[core] = match (s, taken) {
            (0, false) => 0,
            (0, true) => 1,
            (1, false) => 0,
            (1, true) => 3,
            (2, false) => 0,
            (2, true) => 3,
            (3, false) => 2,
            (3, true) => 3,
            _ => unreachable!("2-bit state is always 0..=3"),
        };
    }
}

impl Simulator<BranchKind> for TwoBits {
    fn build(&mut self, _platform: &crate::counters::PlatformInfo, _model: &Model) -> Result<()> {
        Ok(())
    }

    fn packet_processor(&mut self, id: usize, reference: &Reference<Branch>) -> Data {
        match reference.kind {
            k if k.contains(PacketType::RESET) => {
                self.counters = Data::for_cores(self.state.len());
            }
            k if k.contains(PacketType::DATA) => {
                self.predict_and_update(reference.payload.core as usize, reference.payload.taken);
            }
            k if k.contains(PacketType::DUMP_INFO) => {
                for core in 0..self.counters.correct.len() {
                    log::info!(
                        target: "vpmu::dump",
                        "worker {id} branch core {core}: correct={} wrong={} accuracy={:.3}",
                        self.counters.correct[core],
                        self.counters.wrong[core],
                        self.counters.accuracy(core)
                    );
                }
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
    fn two_bit_branch_accuracy_matches_reference_sequence() {
        // Scenario S1 (design §8): taken sequence [1,1,0,1,1,1] from state 0.
        let mut sim = TwoBits::default();
        for taken in [true, true, false, true, true, true] {
            sim.packet_processor(
                0,
                &Reference {
                    kind: PacketType::DATA,
                    id: 0,
                    payload: Branch { core: 0, pc: 0, taken },
                },
            );
        }
        assert_eq!(sim.counters.correct[0], 3);
        assert_eq!(sim.counters.wrong[0], 3);
    }

    #[test]
    fn reset_clears_counters_but_keeps_state_width() {
        let mut sim = TwoBits::default();
        sim.predict_and_update(0, true);
        sim.packet_processor(0, &Reference::control(PacketType::RESET, 0));
        assert_eq!(sim.counters.correct[0], 0);
        assert_eq!(sim.counters.wrong[0], 0);
    }

    #[test]
    fn seeing_a_higher_core_first_does_not_discard_lower_cores_counts() {
        let mut sim = TwoBits::default();
        // Three taken branches from state 0 saturate the counter to state 3,
        // so the third prediction (state 2, predict-taken) is correct.
        sim.predict_and_update(0, true);
        sim.predict_and_update(0, true);
        sim.predict_and_update(0, true);
        assert_eq!(sim.counters.correct[0], 1);
        sim.predict_and_update(2, true);
        assert_eq!(sim.counters.correct[0], 1, "core 0's history must survive widening for core 2");
        assert_eq!(sim.counters.correct.len(), 3);
    }
}
