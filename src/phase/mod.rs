//! Phase detection: groups runs of instructions into recurring behavioral
//! phases by clustering a rolling branch-target histogram (design §4.7).
//! Grounded on `Window` / `Phase` / `PhaseDetect` in the original source's
//! `phase.hpp`.

pub mod classifier;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::packet::TbInfo;
use crate::snapshot::Snapshot;
pub use classifier::{Classifier, NearestCluster};

/// Default branch-vector size (`DEFAULT_VECTOR_SIZE` in the original).
pub const DEFAULT_VECTOR_SIZE: usize = 64;

/// `(start_pc, end_pc)`, the key `code_walk_count` is indexed by.
pub type CodeRange = (u64, u64);

/// Instruction-mix totals accumulated by a [`Window`] or [`Phase`]
/// (`GPUFriendnessCounter` in the original).
#[derive(Clone, Copy, Debug, Default)]
pub struct MixCounters {
    pub insn: u64,
    pub load: u64,
    pub store: u64,
    pub alu: u64,
    pub bit: u64,
    pub branch: u64,
}

impl MixCounters {
    fn accumulate(&mut self, tb: &TbInfo) {
        self.insn += tb.insn_total as u64;
        self.load += tb.insn_load as u64;
        self.store += tb.insn_store as u64;
        self.alu += tb.insn_alu as u64;
        self.bit += tb.insn_bit as u64;
        self.branch += tb.has_branch as u64;
    }

    fn merge(&mut self, other: &MixCounters) {
        self.insn += other.insn;
        self.load += other.load;
        self.store += other.store;
        self.alu += other.alu;
        self.bit += other.bit;
        self.branch += other.branch;
    }
}

/// An in-progress window of execution: a rolling branch-target histogram
/// plus instruction-mix totals, reset every `window_size` instructions
/// (design §4.7).
#[derive(Clone, Debug)]
pub struct Window {
    pub timestamp: u64,
    pub branch_vector: Vec<f64>,
    pub instruction_count: u64,
    pub code_walk_count: HashMap<CodeRange, u32>,
    pub counters: MixCounters,
}

impl Window {
    pub fn new(vector_len: usize) -> Self {
        Window {
            timestamp: 0,
            branch_vector: vec![0.0; vector_len],
            instruction_count: 0,
            code_walk_count: HashMap::new(),
            counters: MixCounters::default(),
        }
    }

    /// Hashes `pc` into a branch-vector bucket (design §4.7: `pc/4 mod K`).
    fn update_vector(&mut self, pc: u64) {
        let len = self.branch_vector.len() as u64;
        if len == 0 {
            return;
        }
        let bucket = ((pc / 4) % len) as usize;
        self.branch_vector[bucket] += 1.0;
    }

    /// Folds one basic block's counters into this window and records it in
    /// `code_walk_count` (design §4.7).
    pub fn update(&mut self, tb: &TbInfo, timestamp: u64) {
        if self.instruction_count == 0 {
            self.timestamp = timestamp;
        }
        self.update_vector(tb.start_pc);
        self.counters.accumulate(tb);
        self.instruction_count += tb.insn_total as u64;
        *self.code_walk_count.entry((tb.start_pc, tb.end_pc())).or_insert(0) += 1;
    }

    pub fn reset(&mut self) {
        self.timestamp = 0;
        self.instruction_count = 0;
        self.branch_vector.iter_mut().for_each(|v| *v = 0.0);
        self.code_walk_count.clear();
        self.counters = MixCounters::default();
    }
}

/// An accumulated behavioral phase: the windows classified into it, folded
/// together, plus its own timing snapshot (design §4.7).
#[derive(Clone, Debug)]
pub struct Phase {
    pub id: usize,
    branch_vector: Vec<f64>,
    normalized_vector: Vec<f64>,
    vector_dirty: bool,
    num_windows: u64,
    counters: MixCounters,
    pub code_walk_count: HashMap<CodeRange, u32>,
    pub snapshot: Snapshot,
    /// Reserved hook for stack-pointer-driven micro-phase promotion; not
    /// yet acted on by the classifier.
    pub sub_phase_flag: bool,
}

impl Phase {
    pub fn new(window: Window) -> Self {
        let mut phase = Phase {
            id: 0,
            branch_vector: window.branch_vector.clone(),
            normalized_vector: Vec::new(),
            vector_dirty: true,
            num_windows: 1,
            counters: window.counters,
            code_walk_count: window.code_walk_count,
            snapshot: Snapshot::default(),
            sub_phase_flag: false,
        };
        phase.refresh_normalized_vector();
        phase
    }

    fn refresh_normalized_vector(&mut self) {
        let norm = self.branch_vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        self.normalized_vector = if norm == 0.0 {
            self.branch_vector.clone()
        } else {
            self.branch_vector.iter().map(|v| v / norm).collect()
        };
        self.vector_dirty = false;
    }

    pub fn normalized_vector(&self) -> &[f64] {
        &self.normalized_vector
    }

    pub fn num_windows(&self) -> u64 {
        self.num_windows
    }

    pub fn counters(&self) -> MixCounters {
        self.counters
    }

    fn accumulate_vector(&mut self, vec: &[f64]) {
        if vec.len() != self.branch_vector.len() {
            log::error!("phase branch vector size does not match: {} vs {}", vec.len(), self.branch_vector.len());
            return;
        }
        for (a, b) in self.branch_vector.iter_mut().zip(vec) {
            *a += b;
        }
        self.vector_dirty = true;
    }

    fn accumulate_walk_count(&mut self, walk: &HashMap<CodeRange, u32>) {
        for (range, count) in walk {
            *self.code_walk_count.entry(*range).or_insert(0) += count;
        }
    }

    /// Folds `window` into this phase (design §4.7).
    pub fn update(&mut self, window: &Window) {
        self.accumulate_vector(&window.branch_vector);
        self.counters.merge(&window.counters);
        self.accumulate_walk_count(&window.code_walk_count);
        self.num_windows += 1;
        if self.vector_dirty {
            self.refresh_normalized_vector();
        }
    }

    /// Diffs `current` against `last_process_snapshot`, folds the delta
    /// into this phase's own snapshot, and advances `last_process_snapshot`
    /// (design §4.8).
    pub fn update_snapshot(&mut self, current: &Snapshot, last_process_snapshot: &mut Snapshot) {
        *last_process_snapshot = current.update_into(last_process_snapshot, &mut self.snapshot);
    }
}

/// Groups windows of execution into recurring phases (`PhaseDetect` in the
/// original). Owns one in-progress [`Window`] per traced core.
pub struct PhaseDetector {
    window_size: u64,
    vector_len: usize,
    classifier: Box<dyn Classifier>,
    windows: Vec<Mutex<Window>>,
    phase_list: Mutex<Vec<Phase>>,
    /// `(window timestamp, phase id)`, appended on every classification
    /// (design §4.7).
    phase_history: Mutex<Vec<(u64, usize)>>,
}

impl PhaseDetector {
    /// `vector_len` sizes every core's branch-vector histogram (design
    /// §4.7/§8 S4: a detector built for a 8-entry vector, 1000-instruction
    /// window, and a 0.05 similarity threshold).
    pub fn new(window_size: u64, vector_len: usize, classifier: Box<dyn Classifier>, num_cores: usize) -> Self {
        PhaseDetector {
            window_size,
            vector_len,
            classifier,
            windows: (0..num_cores.max(1)).map(|_| Mutex::new(Window::new(vector_len))).collect(),
            phase_list: Mutex::new(Vec::new()),
            phase_history: Mutex::new(Vec::new()),
        }
    }

    pub fn window_size(&self) -> u64 {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: u64) {
        self.window_size = window_size;
    }

    pub fn vector_len(&self) -> usize {
        self.vector_len
    }

    pub fn set_classifier(&mut self, classifier: Box<dyn Classifier>) {
        self.classifier = classifier;
    }

    fn classify_and_finalize(&self, window: &Window) -> usize {
        let mut phase_list = self.phase_list.lock().unwrap();
        let phase_id = match self.classifier.classify(&phase_list, window) {
            Some(idx) => {
                phase_list[idx].update(window);
                idx
            }
            None => {
                let mut phase = Phase::new(window.clone());
                phase.id = phase_list.len();
                phase_list.push(phase);
                phase_list.len() - 1
            }
        };
        self.phase_history.lock().unwrap().push((window.timestamp, phase_id));
        phase_id
    }

    /// Feeds one basic block into `core`'s window; once it crosses
    /// `window_size` instructions, classifies and resets it (design §4.7).
    pub fn record(&self, core: usize, tb: &TbInfo, timestamp: u64) {
        let Some(slot) = self.windows.get(core) else { return };
        let mut window = slot.lock().unwrap();
        window.update(tb, timestamp);
        if window.instruction_count > self.window_size {
            self.classify_and_finalize(&window);
            window.reset();
        }
    }

    pub fn phase_history(&self) -> Vec<(u64, usize)> {
        self.phase_history.lock().unwrap().clone()
    }

    pub fn phase_count(&self) -> usize {
        self.phase_list.lock().unwrap().len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tb(start_pc: u64, insn_total: u32) -> TbInfo {
        TbInfo { start_pc, byte_size: 4, insn_total, ..Default::default() }
    }

    #[test]
    fn window_resets_after_crossing_window_size() {
        let detector = PhaseDetector::new(2, DEFAULT_VECTOR_SIZE, Box::new(NearestCluster::default()), 1);
        detector.record(0, &tb(0x1000, 1), 10);
        detector.record(0, &tb(0x1004, 1), 11);
        assert_eq!(detector.phase_count(), 0);
        detector.record(0, &tb(0x1008, 1), 12);
        assert_eq!(detector.phase_count(), 1);
    }

    #[test]
    fn repeated_phase_accumulates_into_same_entry() {
        let detector = PhaseDetector::new(1, DEFAULT_VECTOR_SIZE, Box::new(NearestCluster::new(1000.0)), 1);
        detector.record(0, &tb(0x1000, 1), 1);
        detector.record(0, &tb(0x1000, 1), 2);
        assert_eq!(detector.phase_count(), 1);

        detector.record(0, &tb(0x1000, 1), 3);
        detector.record(0, &tb(0x1000, 1), 4);
        assert_eq!(detector.phase_count(), 1);
        assert_eq!(detector.phase_history().len(), 2);
    }

    #[test]
    fn out_of_range_core_is_ignored() {
        let detector = PhaseDetector::new(10, DEFAULT_VECTOR_SIZE, Box::new(NearestCluster::default()), 1);
        detector.record(5, &tb(0x1000, 1), 1);
        assert_eq!(detector.phase_count(), 0);
    }

    #[test]
    fn custom_vector_length_sizes_every_core_window() {
        // Scenario S4 (design §8): vector length 8, window_size 1000,
        // similarity threshold 0.05.
        let detector = PhaseDetector::new(1000, 8, Box::new(NearestCluster::new(0.05)), 1);
        assert_eq!(detector.vector_len(), 8);
        detector.record(0, &tb(0x1000, 1), 1);
        assert_eq!(detector.phase_count(), 0);
        for i in 0..1000 {
            detector.record(0, &tb(0x1000 + i * 4, 1), i as u64 + 2);
        }
        assert_eq!(detector.phase_count(), 1);
    }
}
