use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Per-core instruction/timing totals for one privilege level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreTotals {
    pub cycles: u64,
    pub total_insn: u64,
    pub load: u64,
    pub store: u64,
}

impl Add for CoreTotals {
    type Output = CoreTotals;
    fn add(self, rhs: CoreTotals) -> CoreTotals {
        CoreTotals {
            cycles: self.cycles + rhs.cycles,
            total_insn: self.total_insn + rhs.total_insn,
            load: self.load + rhs.load,
            store: self.store + rhs.store,
        }
    }
}

impl Sub for CoreTotals {
    type Output = CoreTotals;
    fn sub(self, rhs: CoreTotals) -> CoreTotals {
        CoreTotals {
            cycles: self.cycles.saturating_sub(rhs.cycles),
            total_insn: self.total_insn.saturating_sub(rhs.total_insn),
            load: self.load.saturating_sub(rhs.load),
            store: self.store.saturating_sub(rhs.store),
        }
    }
}

/// Pipeline-timer counters: per-{user, system} x per-core totals.
///
/// `Data` supports element-wise reduction across cores (design §3), used
/// by dumps that report an aggregate across a whole CPU cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub user: Vec<CoreTotals>,
    pub system: Vec<CoreTotals>,
}

impl Data {
    pub fn for_cores(cores: usize) -> Self {
        Data {
            user: vec![CoreTotals::default(); cores],
            system: vec![CoreTotals::default(); cores],
        }
    }

    /// Extends both per-mode vectors with zeroed totals up to `cores`,
    /// leaving any already-tracked core's totals untouched. A no-op if
    /// `cores` is not larger than the current width.
    pub fn grow_to(&mut self, cores: usize) {
        if self.user.len() < cores {
            self.user.resize(cores, CoreTotals::default());
            self.system.resize(cores, CoreTotals::default());
        }
    }

    /// Sums `user` and `system` totals across all cores.
    pub fn reduce(&self) -> CoreTotals {
        self.user
            .iter()
            .chain(self.system.iter())
            .fold(CoreTotals::default(), |acc, t| acc + *t)
    }
}

impl Add for Data {
    type Output = Data;
    fn add(self, rhs: Data) -> Data {
        let zip_add = |a: &[CoreTotals], b: &[CoreTotals]| -> Vec<CoreTotals> {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| *x + *y)
                .collect()
        };
        Data {
            user: zip_add(&self.user, &rhs.user),
            system: zip_add(&self.system, &rhs.system),
        }
    }
}

impl AddAssign for Data {
    fn add_assign(&mut self, rhs: Data) {
        *self = self.clone() + rhs;
    }
}

impl Sub for Data {
    type Output = Data;
    fn sub(self, rhs: Data) -> Data {
        let zip_sub = |a: &[CoreTotals], b: &[CoreTotals]| -> Vec<CoreTotals> {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| *x - *y)
                .collect()
        };
        Data {
            user: zip_sub(&self.user, &rhs.user),
            system: zip_sub(&self.system, &rhs.system),
        }
    }
}

impl SubAssign for Data {
    fn sub_assign(&mut self, rhs: Data) {
        *self = self.clone() - rhs;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reduce_sums_user_and_system_across_cores() {
        let mut data = Data::for_cores(2);
        data.user[0].total_insn = 10;
        data.user[1].total_insn = 20;
        data.system[0].total_insn = 1;
        assert_eq!(data.reduce().total_insn, 31);
    }

    #[test]
    fn sub_is_inverse_of_add() {
        let mut a = Data::for_cores(1);
        a.user[0].cycles = 100;
        let mut b = Data::for_cores(1);
        b.user[0].cycles = 40;

        let delta = a.clone() - b.clone();
        assert_eq!(delta.user[0].cycles, 60);
        assert_eq!((delta + b).user[0].cycles, a.user[0].cycles);
    }
}
