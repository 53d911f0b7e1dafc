//! Programs and libraries the tracer has been told about (design §4.6:
//! `add_program` / `add_library`).

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramKind {
    Executable,
    Library,
}

#[derive(Clone, Debug)]
pub struct Program {
    pub name: String,
    pub kind: ProgramKind,
}

/// `basename(path)`, tolerant of both `/` and already-bare names.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
