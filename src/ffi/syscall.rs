//! Thin wrappers over the raw OS primitives the transport layer needs:
//! POSIX shared memory, process-shared semaphores, and process control.
//! Each function returns `std::io::Result` and maps `-1`/`NULL` results to
//! `Error::last_os_error()`, the same convention the teacher's own
//! `ffi::syscall` module uses for `perf_event_open`/`ioctl`/`mmap`.

use std::ffi::CString;
use std::io::{Error, Result};
use std::os::fd::{FromRawFd, OwnedFd};

/// Opens (and, if `create`, truncates to `len`) a POSIX shared-memory
/// object named `name`.
pub fn shm_open(name: &CString, create: bool, len: usize) -> Result<OwnedFd> {
    let flags = if create {
        libc::O_CREAT | libc::O_EXCL | libc::O_RDWR
    } else {
        libc::O_RDWR
    };
    let fd = unsafe { libc::shm_open(name.as_ptr(), flags, 0o600) };
    if fd == -1 {
        return Err(Error::last_os_error());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    if create {
        let result = unsafe { libc::ftruncate(std::os::fd::AsRawFd::as_raw_fd(&fd), len as _) };
        if result == -1 {
            return Err(Error::last_os_error());
        }
    }
    Ok(fd)
}

pub fn shm_unlink(name: &CString) -> Result<()> {
    let result = unsafe { libc::shm_unlink(name.as_ptr()) };
    if result == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

pub unsafe fn mmap_shared<T>(fd: &OwnedFd, len: usize) -> Result<*mut T> {
    let ptr = libc::mmap(
        std::ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        std::os::fd::AsRawFd::as_raw_fd(fd),
        0,
    );
    if ptr == libc::MAP_FAILED {
        Err(Error::last_os_error())
    } else {
        Ok(ptr as *mut T)
    }
}

pub unsafe fn munmap<T>(ptr: *mut T, len: usize) -> Result<()> {
    let result = libc::munmap(ptr as _, len);
    if result == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Initializes a process-shared, unnamed POSIX semaphore in place.
///
/// # Safety
/// `sem` must point to valid, writable memory for the lifetime of every
/// process that will `sem_wait`/`sem_post` it (i.e. shared-memory backed).
pub unsafe fn sem_init_shared(sem: *mut libc::sem_t, value: u32) -> Result<()> {
    let result = libc::sem_init(sem, 1, value);
    if result == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

/// # Safety
/// `sem` must have been initialized by [`sem_init_shared`] and still be valid.
pub unsafe fn sem_post(sem: *mut libc::sem_t) -> Result<()> {
    if libc::sem_post(sem) == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Blocks until the semaphore can be decremented.
///
/// # Safety
/// Same as [`sem_post`].
pub unsafe fn sem_wait(sem: *mut libc::sem_t) -> Result<()> {
    loop {
        if libc::sem_wait(sem) == 0 {
            return Ok(());
        }
        let err = Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// `fork(2)`. Returns `0` in the child, the child's pid in the parent.
///
/// # Safety
/// Forking a multi-threaded process only leaves async-signal-safe state
/// valid in the child; callers must restrict the child's pre-exec/pre-loop
/// work accordingly (design §5's worker drain loop assumption).
pub unsafe fn fork() -> Result<i32> {
    let pid = libc::fork();
    if pid == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(pid)
    }
}

pub fn kill(pid: i32, signal: i32) -> Result<()> {
    let result = unsafe { libc::kill(pid, signal) };
    if result == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

/// `kill(pid, 0)`: checks whether `pid` still exists without signaling it.
pub fn process_exists(pid: i32) -> bool {
    unsafe { libc::kill(pid, 0) == 0 || Error::last_os_error().raw_os_error() != Some(libc::ESRCH) }
}

/// Best-effort rename of the calling process/thread, as seen by `ps`/`htop`
/// (design §4.3: "each worker names itself").
pub fn name_process(name: &str) -> Result<()> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.truncate(15); // PR_SET_NAME limit, excluding the NUL terminator.
    bytes.push(0);
    let result = unsafe { libc::prctl(libc::PR_SET_NAME, bytes.as_ptr()) };
    if result == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

pub fn waitpid_nohang(pid: i32) -> Result<Option<i32>> {
    let mut status = 0;
    let result = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
    if result == -1 {
        Err(Error::last_os_error())
    } else if result == 0 {
        Ok(None)
    } else {
        Ok(Some(status))
    }
}
