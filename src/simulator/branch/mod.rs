//! Branch-predictor timing models (design §4.5): one-bit, two-bit, a
//! global-history-table predictor, and an Alpha 21264-style tournament
//! predictor. All four share the same counter bookkeeping, grounded on
//! `Branch_Two_Bits::packet_processor` in the original source.

mod alpha21264;
mod ght;
mod one_bit;
mod two_bit;

use super::{BranchKind, Factory, Simulator};

/// Looks up a branch-predictor model by its configured `name` (design §6:
/// `create_sim`).
pub fn create(name: &str) -> Option<Box<dyn Simulator<BranchKind>>> {
    FACTORIES.iter().find(|(n, _)| *n == name).map(|(_, f)| f())
}

const FACTORIES: &[(&str, Factory<BranchKind>)] = &[
    ("one bit", || Box::new(one_bit::OneBit::default())),
    ("two bits", || Box::new(two_bit::TwoBits::default())),
    ("ght", || Box::new(ght::Ght::default())),
    ("alpha21264", || Box::new(alpha21264::Alpha21264::default())),
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_name_is_not_found() {
        assert!(create("nonexistent").is_none());
    }

    #[test]
    fn every_registered_name_resolves() {
        for (name, _) in FACTORIES {
            assert!(create(name).is_some(), "{name} did not resolve");
        }
    }
}
