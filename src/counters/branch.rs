use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Branch-predictor counters: per-core `{correct, wrong}` (design §3).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub correct: Vec<u64>,
    pub wrong: Vec<u64>,
}

impl Data {
    pub fn for_cores(cores: usize) -> Self {
        Data {
            correct: vec![0; cores],
            wrong: vec![0; cores],
        }
    }

    /// Extends both counter vectors with zeros up to `cores`, leaving any
    /// already-tracked core's counts untouched. A no-op if `cores` is not
    /// larger than the current width.
    pub fn grow_to(&mut self, cores: usize) {
        if self.correct.len() < cores {
            self.correct.resize(cores, 0);
            self.wrong.resize(cores, 0);
        }
    }

    pub fn accuracy(&self, core: usize) -> f64 {
        let correct = self.correct[core] as f64;
        let wrong = self.wrong[core] as f64;
        if correct + wrong == 0.0 {
            0.0
        } else {
            correct / (correct + wrong)
        }
    }
}

impl Add for Data {
    type Output = Data;
    fn add(self, rhs: Data) -> Data {
        let zip_add = |a: &[u64], b: &[u64]| -> Vec<u64> { a.iter().zip(b).map(|(x, y)| x + y).collect() };
        Data {
            correct: zip_add(&self.correct, &rhs.correct),
            wrong: zip_add(&self.wrong, &rhs.wrong),
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
        let zip_sub =
            |a: &[u64], b: &[u64]| -> Vec<u64> { a.iter().zip(b).map(|(x, y)| x.saturating_sub(*y)).collect() };
        Data {
            correct: zip_sub(&self.correct, &rhs.correct),
            wrong: zip_sub(&self.wrong, &rhs.wrong),
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
    fn accuracy_of_empty_core_is_zero() {
        let data = Data::for_cores(1);
        assert_eq!(data.accuracy(0), 0.0);
    }

    #[test]
    fn accuracy_divides_correct_by_total() {
        let mut data = Data::for_cores(1);
        data.correct[0] = 4;
        data.wrong[0] = 2;
        assert!((data.accuracy(0) - (4.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn grow_to_preserves_lower_cores_counts() {
        let mut data = Data::for_cores(1);
        data.correct[0] = 7;
        data.wrong[0] = 1;
        data.grow_to(3);
        assert_eq!(data.correct, vec![7, 0, 0]);
        assert_eq!(data.wrong, vec![1, 0, 0]);
        data.grow_to(1); // shrinking request is a no-op
        assert_eq!(data.correct.len(), 3);
    }
}
