//! Kernel symbol table: maps a fixed set of kernel function addresses to
//! the [`EventKind`] they trigger (design §4.6).

use std::collections::HashMap;

/// One kind of guest-kernel event `EventTracer` understands, keyed by the
/// kernel symbol(s) that trigger it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Execv,
    ContextSwitch,
    Exit,
    WakeNewTask,
    Fork,
    Mmap,
    Mprotect,
    Munmap,
}

impl EventKind {
    /// The trigger symbol names design §4.6's table associates with each
    /// kind. More than one name covers kernel-version renames (e.g.
    /// `do_fork` → `_do_fork`).
    pub const TRIGGER_SYMBOLS: &'static [(EventKind, &'static [&'static str])] = &[
        (EventKind::Execv, &["do_execve_common", "do_execveat_common"]),
        (EventKind::ContextSwitch, &["__switch_to"]),
        (EventKind::Exit, &["do_exit"]),
        (EventKind::WakeNewTask, &["wake_up_new_task"]),
        (EventKind::Fork, &["_do_fork", "do_fork"]),
        (EventKind::Mmap, &["mmap_region"]),
        (EventKind::Mprotect, &["mprotect_fixup"]),
        (EventKind::Munmap, &["unmap_region"]),
    ];
}

/// The banner `parse_and_set_kernel_symbol` looks for (design §4.6).
const VERSION_BANNER: &[u8] = b"Linux version";

#[derive(Default)]
pub struct Kernel {
    pub version: Option<String>,
    /// Address → kind, populated by `resolve_symbols`.
    pub event_table: HashMap<u64, EventKind>,
}

impl Kernel {
    /// Scans raw `vmlinux` bytes for the `"Linux version ..."` banner and
    /// returns the text up to the next newline (design §4.6).
    pub fn scan_version_banner(bytes: &[u8]) -> Option<String> {
        let start = bytes.windows(VERSION_BANNER.len()).position(|w| w == VERSION_BANNER)?;
        let rest = &bytes[start..];
        let end = rest.iter().position(|&b| b == b'\n' || b == 0).unwrap_or(rest.len());
        Some(String::from_utf8_lossy(&rest[..end]).into_owned())
    }

    /// Populates `event_table` from a resolved `name → address` symbol
    /// table (design §4.6: "symbol resolution populates
    /// `kernel.event_table[kind]` for a fixed kind set"). The first
    /// matching trigger name for each kind wins. Names are normalized to
    /// lower-case before matching against `TRIGGER_SYMBOLS` (design §4.6),
    /// so a caller supplying `"Do_Exit"`/`"DO_EXIT"` still resolves.
    pub fn resolve_symbols(&mut self, symbols: &HashMap<String, u64>) {
        self.event_table.clear();
        let lower: HashMap<String, u64> = symbols.iter().map(|(name, &addr)| (name.to_lowercase(), addr)).collect();
        for (kind, names) in EventKind::TRIGGER_SYMBOLS {
            if let Some(&addr) = names.iter().find_map(|name| lower.get(*name)) {
                self.event_table.insert(addr, *kind);
            }
        }
    }

    /// Linear scan of `event_table` (design §4.6: `find_event`).
    pub fn find_event(&self, vaddr: u64) -> Option<EventKind> {
        self.event_table.get(&vaddr).copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scans_version_banner_up_to_newline() {
        let image = b"garbage\0\0Linux version 5.10.0-rt #1\nmore bytes";
        let version = Kernel::scan_version_banner(image).unwrap();
        assert_eq!(version, "Linux version 5.10.0-rt #1");
    }

    #[test]
    fn resolve_symbols_maps_any_trigger_alias() {
        let mut kernel = Kernel::default();
        let mut symbols = HashMap::new();
        symbols.insert("do_fork".to_string(), 0xffff_0000);
        kernel.resolve_symbols(&symbols);
        assert_eq!(kernel.find_event(0xffff_0000), Some(EventKind::Fork));
    }

    #[test]
    fn resolve_symbols_normalizes_case_before_matching() {
        let mut kernel = Kernel::default();
        let mut symbols = HashMap::new();
        symbols.insert("DO_EXIT".to_string(), 0x1000);
        kernel.resolve_symbols(&symbols);
        assert_eq!(kernel.find_event(0x1000), Some(EventKind::Exit));
    }

    #[test]
    fn unresolved_vaddr_has_no_event() {
        let kernel = Kernel::default();
        assert_eq!(kernel.find_event(0x1234), None);
    }
}
