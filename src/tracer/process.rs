//! One traced guest process (design §4.6): its mapped regions, its program
//! association, and its child list.

use std::sync::Mutex;

/// One `mmap`'d region reported via `attach_mapped_region`.
#[derive(Clone, Debug)]
pub struct MMapInfo {
    pub path: String,
    pub start: u64,
    pub end: u64,
    pub executable: bool,
}

#[derive(Default)]
struct ProcessMut {
    /// Index into `EventTracer::program_list`, once resolved.
    program: Option<usize>,
    mapped_regions: Vec<MMapInfo>,
}

/// A traced process. `pid` and `parent` are fixed at construction; `program`
/// and `mapped_regions` may be updated later as regions are reported, so
/// they live behind their own lock. The child-PID list gets a lock of its
/// own (design §5: "a per-process mutable child list" is one of the three
/// named mutex roles — kept separate from `mutable` since a fork only ever
/// touches the parent's child list, never its program/region state).
pub struct Process {
    pub pid: u32,
    pub name: Option<String>,
    pub parent: Option<u32>,
    mutable: Mutex<ProcessMut>,
    children: Mutex<Vec<u32>>,
}

impl Process {
    pub fn new(pid: u32, name: Option<String>, parent: Option<u32>, program: Option<usize>) -> Self {
        Process {
            pid,
            name,
            parent,
            mutable: Mutex::new(ProcessMut { program, mapped_regions: Vec::new() }),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn program(&self) -> Option<usize> {
        self.mutable.lock().unwrap().program
    }

    pub fn set_program(&self, idx: usize) {
        self.mutable.lock().unwrap().program = Some(idx);
    }

    pub fn push_region(&self, region: MMapInfo) {
        self.mutable.lock().unwrap().mapped_regions.push(region);
    }

    pub fn mapped_regions(&self) -> Vec<MMapInfo> {
        self.mutable.lock().unwrap().mapped_regions.clone()
    }

    pub fn push_child(&self, child_pid: u32) {
        self.children.lock().unwrap().push(child_pid);
    }

    pub fn children(&self) -> Vec<u32> {
        self.children.lock().unwrap().clone()
    }
}
