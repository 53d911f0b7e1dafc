use std::ffi::CString;
use std::io::Result;
use std::os::fd::OwnedFd;

use super::syscall::{mmap_shared, munmap, shm_open, shm_unlink};

/// An owned POSIX shared-memory mapping, unlinked when dropped.
///
/// Resolves the open question in design §9: the fixed name
/// `vpmu_cache_ring_buffer` from the original collides across concurrent
/// VM instances, so the name is derived from the creating process's pid
/// and a caller-supplied tag, and the segment is unlinked automatically on
/// drop so a crash can never leak it.
pub struct ShmGuard {
    name: CString,
    _fd: OwnedFd,
    ptr: *mut u8,
    len: usize,
}

impl ShmGuard {
    pub fn create(tag: &str, len: usize) -> Result<Self> {
        let name = CString::new(format!("/vpmu-{tag}-{}", std::process::id()))
            .expect("tag must not contain NUL bytes");
        // Best-effort cleanup of a name left behind by a crashed previous run.
        let _ = shm_unlink(&name);
        let fd = shm_open(&name, true, len)?;
        let ptr = unsafe { mmap_shared::<u8>(&fd, len)? };
        Ok(ShmGuard {
            name,
            _fd: fd,
            ptr,
            len,
        })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for ShmGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr, self.len);
        }
        let _ = shm_unlink(&self.name);
    }
}

// SAFETY: the mapping is `MAP_SHARED`; every byte of it is either raw
// trace data or a `CommonSlot` meant to be shared across the fork boundary.
unsafe impl Send for ShmGuard {}
unsafe impl Sync for ShmGuard {}
