//! Timing snapshots: one aggregate `{instruction, branch, cache}` counter
//! set plus a fixed set of elapsed-time slots, taken at a barrier and
//! diffed against the previous one (design §4.8).

use std::fmt::Write as _;
use std::ops::{Add, Sub};

use crate::counters::{branch, cache, insn};

/// Index into [`Snapshot::time_ns`], in the fixed order design §4.8
/// specifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum TimeSlot {
    Cpu = 0,
    Branch = 1,
    Cache = 2,
    SystemMemory = 3,
    IoMemory = 4,
    EstimatedTotal = 5,
    HostEmulation = 6,
}

pub const TIME_SLOT_NAMES: [&str; 7] =
    ["cpu", "branch", "cache", "system_memory", "io_memory", "estimated_total", "host_emulation"];

/// One point-in-time reading across all three counter families, plus the
/// elapsed-time breakdown design §4.8 lists (design §4.8:
/// `Snapshot := {insn_data, branch_data, cache_data, time_ns[7]}`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub insn_data: insn::Data,
    pub branch_data: branch::Data,
    pub cache_data: cache::Data,
    pub time_ns: [u64; 7],
}

impl Snapshot {
    pub fn get_time(&self, slot: TimeSlot) -> u64 {
        self.time_ns[slot as usize]
    }

    pub fn set_time(&mut self, slot: TimeSlot, value_ns: u64) {
        self.time_ns[slot as usize] = value_ns;
    }

    /// `Phase::update_snapshot`: diffs `self` against `last`, folds the
    /// delta into `phase_total`, and returns the new "last" value for the
    /// next call (design §4.8).
    pub fn update_into(&self, last: &Snapshot, phase_total: &mut Snapshot) -> Snapshot {
        let delta = self.clone() - last.clone();
        *phase_total = phase_total.clone() + delta;
        self.clone()
    }

    /// Renders the snapshot as fixed-width, right-aligned text columns,
    /// wrapped at `width` characters (design §4.8).
    pub fn dump_text(&self, width: usize) -> String {
        const COLUMN: usize = 20;
        let per_row = (width / COLUMN).max(1);
        let mut rows: Vec<(String, String)> = Vec::new();
        for (i, name) in TIME_SLOT_NAMES.iter().enumerate() {
            rows.push((name.to_string(), format!("{} ns", self.time_ns[i])));
        }
        rows.push(("insn.cycles".into(), self.insn_data.reduce().cycles.to_string()));
        rows.push(("branch.correct".into(), self.branch_data.correct.iter().sum::<u64>().to_string()));
        rows.push(("branch.wrong".into(), self.branch_data.wrong.iter().sum::<u64>().to_string()));
        rows.push(("cache.memory_accesses".into(), self.cache_data.memory_accesses.to_string()));

        let mut out = String::new();
        for chunk in rows.chunks(per_row) {
            for (name, value) in chunk {
                let cell = format!("{name}: {value}");
                let _ = write!(out, "{cell:>width$} ", width = COLUMN);
            }
            out.push('\n');
        }
        out
    }

    /// Renders the snapshot as a nested key → value tree, for JSON-style
    /// consumers (design §4.8).
    pub fn dump_tree(&self) -> serde_json::Value {
        let mut time = serde_json::Map::new();
        for (i, name) in TIME_SLOT_NAMES.iter().enumerate() {
            time.insert((*name).to_string(), serde_json::json!(self.time_ns[i]));
        }
        serde_json::json!({
            "time_ns": time,
            "insn": { "cycles": self.insn_data.reduce().cycles, "total_insn": self.insn_data.reduce().total_insn },
            "branch": { "correct": self.branch_data.correct, "wrong": self.branch_data.wrong },
            "cache": { "memory_accesses": self.cache_data.memory_accesses, "memory_time_ns": self.cache_data.memory_time_ns },
        })
    }
}

impl Add for Snapshot {
    type Output = Snapshot;
    fn add(self, rhs: Snapshot) -> Snapshot {
        let mut time_ns = [0u64; 7];
        for i in 0..7 {
            time_ns[i] = self.time_ns[i] + rhs.time_ns[i];
        }
        Snapshot {
            insn_data: self.insn_data + rhs.insn_data,
            branch_data: self.branch_data + rhs.branch_data,
            cache_data: self.cache_data + rhs.cache_data,
            time_ns,
        }
    }
}

impl Sub for Snapshot {
    type Output = Snapshot;
    fn sub(self, rhs: Snapshot) -> Snapshot {
        let mut time_ns = [0u64; 7];
        for i in 0..7 {
            time_ns[i] = self.time_ns[i].saturating_sub(rhs.time_ns[i]);
        }
        Snapshot {
            insn_data: self.insn_data - rhs.insn_data,
            branch_data: self.branch_data - rhs.branch_data,
            cache_data: self.cache_data - rhs.cache_data,
            time_ns,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn snapshot_with_cpu_ns(ns: u64) -> Snapshot {
        let mut s = Snapshot::default();
        s.set_time(TimeSlot::Cpu, ns);
        s
    }

    #[test]
    fn update_into_accumulates_delta_and_advances_last() {
        let mut phase_total = Snapshot::default();
        let last = snapshot_with_cpu_ns(100);
        let current = snapshot_with_cpu_ns(150);

        let new_last = current.update_into(&last, &mut phase_total);
        assert_eq!(phase_total.get_time(TimeSlot::Cpu), 50);
        assert_eq!(new_last.get_time(TimeSlot::Cpu), 150);

        let current2 = snapshot_with_cpu_ns(210);
        let _ = current2.update_into(&new_last, &mut phase_total);
        assert_eq!(phase_total.get_time(TimeSlot::Cpu), 110);
    }

    #[test]
    fn dump_text_folds_to_requested_width() {
        let snapshot = snapshot_with_cpu_ns(42);
        let text = snapshot.dump_text(40);
        assert!(text.contains("cpu"));
        assert!(text.lines().next().unwrap().len() <= 44);
    }

    #[test]
    fn dump_tree_is_valid_json_object() {
        let snapshot = snapshot_with_cpu_ns(7);
        let tree = snapshot.dump_tree();
        assert_eq!(tree["time_ns"]["cpu"], 7);
    }
}
