//! Event tracing: keeps track of which guest processes exist, what program
//! they run, and which kernel function addresses the simulators should
//! react to (design §4.6). Grounded on `event-tracing.hpp` /
//! `et-kernel.hpp` in the original source.

pub mod kernel;
pub mod process;
pub mod program;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{Result, VpmuError};

pub use kernel::{EventKind, Kernel};
pub use process::{MMapInfo, Process};
pub use program::{Program, ProgramKind};

/// Which edge of a traced call `call_event` is reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallEdge {
    In(EventKind),
    Return(EventKind),
}

/// Tracks guest processes, their program associations, and the kernel
/// symbol table that drives `call_event`. The three mutex roles design §5
/// calls out are: `process_id_map` (global), a process's own child list,
/// and `program_list`; ordinary lookups (`find_event`, `program`,
/// `mapped_regions`) never take the map-level lock for longer than the
/// single hash lookup.
pub struct EventTracer {
    process_id_map: Mutex<HashMap<u32, std::sync::Arc<Process>>>,
    program_list: Mutex<Vec<Program>>,
    kernel: Mutex<Kernel>,
    /// Per-core stack of (return address, kind) pairs so a return-edge only
    /// fires for the call-in that pushed it (design §4.6).
    call_stack: Mutex<HashMap<u16, Vec<(u64, EventKind)>>>,
}

impl Default for EventTracer {
    fn default() -> Self {
        EventTracer {
            process_id_map: Mutex::new(HashMap::new()),
            program_list: Mutex::new(Vec::new()),
            kernel: Mutex::new(Kernel::default()),
            call_stack: Mutex::new(HashMap::new()),
        }
    }
}

impl EventTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_named(&self, name: &str, kind: ProgramKind) -> usize {
        let basename = program::basename(name);
        let mut list = self.program_list.lock().unwrap();
        if let Some(idx) = list.iter().position(|p| p.name == basename) {
            return idx;
        }
        list.push(Program { name: basename.to_string(), kind });
        list.len() - 1
    }

    /// Registers an executable program, de-duplicating by basename
    /// (design §4.6).
    pub fn add_program(&self, name: &str) -> usize {
        self.add_named(name, ProgramKind::Executable)
    }

    /// Registers a shared library, de-duplicating by basename.
    pub fn add_library(&self, name: &str) -> usize {
        self.add_named(name, ProgramKind::Library)
    }

    /// Finds a registered program whose basename is a substring of `path`
    /// or vice versa (design §4.6: "fuzzy basename substring match").
    fn find_program_by_path(&self, path: &str) -> Option<usize> {
        let base = program::basename(path);
        let list = self.program_list.lock().unwrap();
        list.iter().position(|p| base.contains(&p.name) || p.name.contains(base))
    }

    /// Registers a brand-new process, associating it with a previously
    /// registered program if `name` fuzzy-matches one (design §4.6).
    pub fn add_new_process(&self, name: &str, pid: u32) -> std::sync::Arc<Process> {
        let program = self.find_program_by_path(name);
        let process = std::sync::Arc::new(Process::new(pid, Some(name.to_string()), None, program));
        self.process_id_map.lock().unwrap().insert(pid, process.clone());
        process
    }

    /// Shallow-copies `parent` into a new process entry for `child_pid`
    /// (fork), and records the child under the parent's child list
    /// (design §4.6).
    pub fn attach_to_parent(&self, parent_pid: u32, child_pid: u32) -> Option<std::sync::Arc<Process>> {
        let parent = self.process_id_map.lock().unwrap().get(&parent_pid)?.clone();
        let child = std::sync::Arc::new(Process::new(child_pid, parent.name.clone(), Some(parent_pid), parent.program()));
        self.process_id_map.lock().unwrap().insert(child_pid, child.clone());
        parent.push_child(child_pid);
        Some(child)
    }

    /// Records a mapped region for `pid`. If the region is executable and
    /// the process has no program association yet, tries to resolve one
    /// from the region's path (design §4.6).
    pub fn attach_mapped_region(&self, pid: u32, region: MMapInfo) -> Result<()> {
        let process = self
            .process_id_map
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or_else(|| VpmuError::Config { key: "pid".into(), detail: format!("no such process: {pid}") })?;

        if region.executable && process.program().is_none() {
            if let Some(idx) = self.find_program_by_path(&region.path) {
                process.set_program(idx);
            }
        }
        process.push_region(region);
        Ok(())
    }

    pub fn process(&self, pid: u32) -> Option<std::sync::Arc<Process>> {
        if pid == 0 {
            return None;
        }
        self.process_id_map.lock().unwrap().get(&pid).cloned()
    }

    /// Drops `pid` from `process_id_map` on `EXIT` (design §4.6). Children
    /// are left in place with their `parent` field now pointing at a PID
    /// that no longer resolves — they are not recursively torn down, since
    /// a child process legitimately outlives its parent's `exit()` on a
    /// real kernel (design §9's lifecycle open question, resolved this
    /// way: detach rather than cascade).
    pub fn remove_process(&self, pid: u32) -> Option<std::sync::Arc<Process>> {
        self.process_id_map.lock().unwrap().remove(&pid)
    }

    /// Scans `path` (a `vmlinux` image) for the kernel version banner
    /// (design §4.6).
    pub fn parse_and_set_kernel_symbol(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(VpmuError::Resource)?;
        let version = Kernel::scan_version_banner(&bytes)
            .ok_or_else(|| VpmuError::Config { key: "vmlinux".into(), detail: "missing \"Linux version\" banner".into() })?;
        self.kernel.lock().unwrap().version = Some(version.clone());
        Ok(version)
    }

    /// Populates the fixed 8-entry kind table from an already-resolved
    /// `name → address` symbol table (design §4.6). Kept separate from
    /// `parse_and_set_kernel_symbol` because address resolution from a raw
    /// ELF image is the emulator's job, not the tracer's.
    pub fn resolve_kernel_symbols(&self, symbols: &HashMap<String, u64>) {
        self.kernel.lock().unwrap().resolve_symbols(symbols);
    }

    pub fn find_event(&self, vaddr: u64) -> Option<EventKind> {
        self.kernel.lock().unwrap().find_event(vaddr)
    }

    /// Dispatches a call-in/call-return edge for `core` hitting `vaddr`.
    /// A call-in (`vaddr` matches a kernel trigger symbol) stashes
    /// `return_addr` so the matching call-return only fires once, for this
    /// specific invocation, even under recursion (design §4.6).
    pub fn call_event(&self, core: u16, vaddr: u64, return_addr: u64) -> Option<CallEdge> {
        if let Some(kind) = self.find_event(vaddr) {
            self.call_stack.lock().unwrap().entry(core).or_default().push((return_addr, kind));
            return Some(CallEdge::In(kind));
        }
        let mut stack = self.call_stack.lock().unwrap();
        let frames = stack.get_mut(&core)?;
        if frames.last().is_some_and(|&(addr, _)| addr == vaddr) {
            let (_, kind) = frames.pop().unwrap();
            Some(CallEdge::Return(kind))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_program_dedupes_by_basename() {
        let tracer = EventTracer::new();
        let a = tracer.add_program("/usr/bin/ls");
        let b = tracer.add_program("/bin/ls");
        assert_eq!(a, b);
    }

    #[test]
    fn new_process_associates_with_matching_program() {
        let tracer = EventTracer::new();
        tracer.add_program("ls");
        let process = tracer.add_new_process("/usr/bin/ls", 100);
        assert_eq!(process.program(), Some(0));
    }

    #[test]
    fn fork_copies_parent_and_updates_child_list() {
        let tracer = EventTracer::new();
        let parent = tracer.add_new_process("ls", 100);
        let child = tracer.attach_to_parent(100, 101).unwrap();
        assert_eq!(child.parent, Some(100));
        assert_eq!(child.program(), parent.program());
        assert_eq!(parent.children(), vec![101]);
    }

    #[test]
    fn mapped_region_resolves_program_when_unset() {
        let tracer = EventTracer::new();
        tracer.add_program("libc.so");
        let process = tracer.add_new_process("unknown-binary", 5);
        assert!(process.program().is_none());
        tracer
            .attach_mapped_region(5, MMapInfo { path: "/lib/x86_64/libc.so".into(), start: 0, end: 0x1000, executable: true })
            .unwrap();
        assert!(process.program().is_some());
    }

    #[test]
    fn call_event_return_only_fires_for_matching_return_address() {
        let tracer = EventTracer::new();
        let mut symbols = HashMap::new();
        symbols.insert("do_exit".to_string(), 0x1000);
        tracer.resolve_kernel_symbols(&symbols);

        assert_eq!(tracer.call_event(0, 0x1000, 0x2000), Some(CallEdge::In(EventKind::Exit)));
        assert_eq!(tracer.call_event(0, 0x3000, 0), None);
        assert_eq!(tracer.call_event(0, 0x2000, 0), Some(CallEdge::Return(EventKind::Exit)));
        assert_eq!(tracer.call_event(0, 0x2000, 0), None);
    }
}
