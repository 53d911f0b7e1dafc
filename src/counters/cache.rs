use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::packet::ProcessorKind;

/// One `{READ, READ_MISS, WRITE, WRITE_MISS}` histogram slot (design §3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    pub read: u64,
    pub read_miss: u64,
    pub write: u64,
    pub write_miss: u64,
}

impl Histogram {
    pub fn hits(&self) -> u64 {
        (self.read - self.read_miss) + (self.write - self.write_miss)
    }

    pub fn misses(&self) -> u64 {
        self.read_miss + self.write_miss
    }
}

impl Add for Histogram {
    type Output = Histogram;
    fn add(self, rhs: Histogram) -> Histogram {
        Histogram {
            read: self.read + rhs.read,
            read_miss: self.read_miss + rhs.read_miss,
            write: self.write + rhs.write,
            write_miss: self.write_miss + rhs.write_miss,
        }
    }
}

impl Sub for Histogram {
    type Output = Histogram;
    fn sub(self, rhs: Histogram) -> Histogram {
        Histogram {
            read: self.read.saturating_sub(rhs.read),
            read_miss: self.read_miss.saturating_sub(rhs.read_miss),
            write: self.write.saturating_sub(rhs.write),
            write_miss: self.write_miss.saturating_sub(rhs.write_miss),
        }
    }
}

/// Cache-hierarchy counters: a `{processor-kind x level x core}` histogram
/// table plus scalar memory-system timings (design §3).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    levels: usize,
    cores: usize,
    cpu_hist: Vec<Histogram>,
    gpu_hist: Vec<Histogram>,
    pub memory_accesses: u64,
    pub memory_time_ns: u64,
}

impl Data {
    pub fn new(levels: usize, cores: usize) -> Self {
        Data {
            levels,
            cores,
            cpu_hist: vec![Histogram::default(); levels * cores],
            gpu_hist: vec![Histogram::default(); levels * cores],
            memory_accesses: 0,
            memory_time_ns: 0,
        }
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    fn index(&self, level: usize, core: usize) -> usize {
        level * self.cores + core
    }

    pub fn histogram(&self, kind: ProcessorKind, level: usize, core: usize) -> &Histogram {
        let idx = self.index(level, core);
        match kind {
            ProcessorKind::Cpu => &self.cpu_hist[idx],
            ProcessorKind::Gpu => &self.gpu_hist[idx],
        }
    }

    pub fn histogram_mut(&mut self, kind: ProcessorKind, level: usize, core: usize) -> &mut Histogram {
        let idx = self.index(level, core);
        match kind {
            ProcessorKind::Cpu => &mut self.cpu_hist[idx],
            ProcessorKind::Gpu => &mut self.gpu_hist[idx],
        }
    }

    /// Sums the histogram for `level` across all cores, for a given processor kind.
    pub fn level_total(&self, kind: ProcessorKind, level: usize) -> Histogram {
        (0..self.cores).fold(Histogram::default(), |acc, core| acc + *self.histogram(kind, level, core))
    }
}

impl Add for Data {
    type Output = Data;
    fn add(self, rhs: Data) -> Data {
        debug_assert_eq!(self.levels, rhs.levels);
        debug_assert_eq!(self.cores, rhs.cores);
        let zip_add = |a: &[Histogram], b: &[Histogram]| -> Vec<Histogram> {
            a.iter().zip(b).map(|(x, y)| *x + *y).collect()
        };
        Data {
            levels: self.levels,
            cores: self.cores,
            cpu_hist: zip_add(&self.cpu_hist, &rhs.cpu_hist),
            gpu_hist: zip_add(&self.gpu_hist, &rhs.gpu_hist),
            memory_accesses: self.memory_accesses + rhs.memory_accesses,
            memory_time_ns: self.memory_time_ns + rhs.memory_time_ns,
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
        debug_assert_eq!(self.levels, rhs.levels);
        debug_assert_eq!(self.cores, rhs.cores);
        let zip_sub = |a: &[Histogram], b: &[Histogram]| -> Vec<Histogram> {
            a.iter().zip(b).map(|(x, y)| *x - *y).collect()
        };
        Data {
            levels: self.levels,
            cores: self.cores,
            cpu_hist: zip_sub(&self.cpu_hist, &rhs.cpu_hist),
            gpu_hist: zip_sub(&self.gpu_hist, &rhs.gpu_hist),
            memory_accesses: self.memory_accesses.saturating_sub(rhs.memory_accesses),
            memory_time_ns: self.memory_time_ns.saturating_sub(rhs.memory_time_ns),
        }
    }
}

impl SubAssign for Data {
    fn sub_assign(&mut self, rhs: Data) {
        *self = self.clone() - rhs;
    }
}
