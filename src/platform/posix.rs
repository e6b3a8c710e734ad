// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX implementation: a robust pthread_mutex_t living in a named shared
// memory segment (shm_open + ftruncate + mmap). The segment holds exactly
// one mutex and persists until explicitly destroyed.

use std::ffi::CString;
use std::io;
use std::ptr;

use tracing::{debug, warn};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Robust mutex symbols — not exposed by `libc` crate on all platforms.
// On macOS robust mutexes are not available, so owner-death recovery and
// ownership checking on unlock are disabled there.
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "macos"))]
const EOWNERDEAD: i32 = libc::EOWNERDEAD;

#[cfg(not(target_os = "macos"))]
extern "C" {
    fn pthread_mutexattr_setrobust(
        attr: *mut libc::pthread_mutexattr_t,
        robustness: libc::c_int,
    ) -> libc::c_int;
    fn pthread_mutex_consistent(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;
}

#[cfg(not(target_os = "macos"))]
const PTHREAD_MUTEX_ROBUST: libc::c_int = 1;

/// The segment is sized to hold exactly one mutex, nothing else.
const SEGMENT_SIZE: usize = std::mem::size_of::<libc::pthread_mutex_t>();

/// Read/write for owner and group — the mode the segment is created with.
const SEGMENT_PERMS: libc::mode_t = 0o660;

fn os_err(eno: i32) -> io::Error {
    io::Error::from_raw_os_error(eno)
}

// ---------------------------------------------------------------------------
// PlatformMutex — handle to the named segment and the mutex mapped from it
// ---------------------------------------------------------------------------

pub struct PlatformMutex {
    name: String,
    fd: libc::c_int,                 // -1 when not open
    mtx: *mut libc::pthread_mutex_t, // null when not mapped
    created: bool,
    init_error: Option<Error>,
}

// Safety: the mapped mutex is process-shared by design; the pthread calls
// on it are themselves thread-safe.
unsafe impl Send for PlatformMutex {}
unsafe impl Sync for PlatformMutex {}

impl PlatformMutex {
    /// Open the named segment, or create it on ENOENT.
    ///
    /// Never fails outright: each failing step records a classified error in
    /// the returned handle and stops, leaving the handle invalid. Callers
    /// probe `is_valid()` / `init_error()`.
    pub fn init(name: &str) -> Self {
        let mut handle = Self {
            name: name.to_string(),
            fd: -1,
            mtx: ptr::null_mut(),
            created: false,
            init_error: None,
        };

        if name.is_empty() {
            handle.init_error = Some(Error::ResourceUnavailable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "name is empty",
            )));
            return handle;
        }
        let c_name = match CString::new(name.as_bytes()) {
            Ok(c) => c,
            Err(e) => {
                handle.init_error = Some(Error::ResourceUnavailable(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    e,
                )));
                return handle;
            }
        };

        // Open existing first; create only on not-found. Two separate calls
        // so the fact of creation is known for the one-time mutex init below.
        // The open/create decision itself is unsynchronized: the first init
        // for a name must happen before concurrent use begins.
        let mut fd =
            unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, SEGMENT_PERMS as libc::c_uint) };
        if fd == -1 {
            let e = io::Error::last_os_error();
            if e.raw_os_error() != Some(libc::ENOENT) {
                warn!(name, error = %e, "shm_open failed");
                handle.init_error = Some(Error::ResourceUnavailable(e));
                return handle;
            }
            fd = unsafe {
                libc::shm_open(
                    c_name.as_ptr(),
                    libc::O_RDWR | libc::O_CREAT,
                    SEGMENT_PERMS as libc::c_uint,
                )
            };
            if fd == -1 {
                let e = io::Error::last_os_error();
                warn!(name, error = %e, "shm_open(O_CREAT) failed");
                handle.init_error = Some(Error::ResourceUnavailable(e));
                return handle;
            }
            handle.created = true;
        }
        handle.fd = fd;

        // shm_open applies the umask; force the intended group-writable mode.
        unsafe { libc::fchmod(fd, SEGMENT_PERMS) };

        // Size the segment to hold the mutex. Idempotent if already sized.
        if unsafe { libc::ftruncate(fd, SEGMENT_SIZE as libc::off_t) } != 0 {
            let e = io::Error::last_os_error();
            warn!(name, error = %e, "ftruncate failed");
            handle.init_error = Some(Error::ResourceUnavailable(e));
            return handle;
        }

        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                SEGMENT_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if mem == libc::MAP_FAILED {
            let e = io::Error::last_os_error();
            warn!(name, error = %e, "mmap failed");
            handle.init_error = Some(Error::ResourceUnavailable(e));
            return handle;
        }
        let mtx_ptr = mem as *mut libc::pthread_mutex_t;

        // Fresh segment: construct the mutex in place. An existing segment is
        // assumed to already contain one; its contents are not validated.
        if handle.created {
            if let Err(e) = unsafe { init_mutex_in_place(mtx_ptr) } {
                warn!(name, error = %e, "mutex construction failed");
                unsafe { libc::munmap(mem, SEGMENT_SIZE) };
                handle.init_error = Some(e);
                return handle;
            }
        }

        handle.mtx = mtx_ptr;
        debug!(name, created = handle.created, "named mutex initialized");
        handle
    }

    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && self.fd >= 0 && !self.mtx.is_null()
    }

    pub fn was_creator(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init_error(&self) -> Option<&Error> {
        self.init_error.as_ref()
    }

    /// Block until the mutex is acquired. If the previous owner died while
    /// holding it, the lock is still granted and the mutex is marked
    /// consistent again; failure of that recovery step is reported as
    /// `RecoveryFailed` (the lock is held by the caller either way).
    pub fn lock(&self) -> Result<()> {
        let eno = unsafe { libc::pthread_mutex_lock(self.mtx) };
        match eno {
            0 => Ok(()),
            #[cfg(not(target_os = "macos"))]
            EOWNERDEAD => {
                let eno2 = unsafe { pthread_mutex_consistent(self.mtx) };
                if eno2 != 0 {
                    warn!(name = %self.name, eno = eno2, "pthread_mutex_consistent failed");
                    return Err(Error::RecoveryFailed(os_err(eno2)));
                }
                debug!(name = %self.name, "recovered mutex after owner death");
                Ok(())
            }
            _ => Err(Error::LockFailed(os_err(eno))),
        }
    }

    /// Release the mutex. EPERM (caller does not hold it) maps to `NotHeld`.
    pub fn unlock(&self) -> Result<()> {
        let eno = unsafe { libc::pthread_mutex_unlock(self.mtx) };
        match eno {
            0 => Ok(()),
            libc::EPERM => Err(Error::NotHeld(os_err(eno))),
            _ => Err(Error::UnlockFailed(os_err(eno))),
        }
    }

    /// Unmap the mutex and close the segment descriptor. The segment itself
    /// stays in the system for other and future handles; a lock held through
    /// this handle stays held. Safe to call again after success.
    pub fn close(&mut self) -> Result<()> {
        if !self.mtx.is_null() {
            if unsafe { libc::munmap(self.mtx as *mut libc::c_void, SEGMENT_SIZE) } != 0 {
                let e = io::Error::last_os_error();
                warn!(name = %self.name, error = %e, "munmap failed");
                return Err(Error::Teardown {
                    op: "munmap",
                    source: e,
                });
            }
            self.mtx = ptr::null_mut();
        }
        if self.fd >= 0 {
            if unsafe { libc::close(self.fd) } != 0 {
                let e = io::Error::last_os_error();
                warn!(name = %self.name, error = %e, "close failed");
                return Err(Error::Teardown {
                    op: "close",
                    source: e,
                });
            }
            self.fd = -1;
        }
        debug!(name = %self.name, "named mutex closed");
        Ok(())
    }

    /// Destroy the mutex, unmap it, close the descriptor and unlink the
    /// segment. Every other handle attached to the name becomes unusable;
    /// the next `init` for the name creates fresh state. Destroying a mutex
    /// that is currently locked is the caller's responsibility to avoid.
    pub fn destroy(&mut self) -> Result<()> {
        let eno = unsafe { libc::pthread_mutex_destroy(self.mtx) };
        if eno != 0 {
            warn!(name = %self.name, eno, "pthread_mutex_destroy failed");
            return Err(Error::Teardown {
                op: "pthread_mutex_destroy",
                source: os_err(eno),
            });
        }
        self.close()?;
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
                let e = io::Error::last_os_error();
                warn!(name = %self.name, error = %e, "shm_unlink failed");
                return Err(Error::Teardown {
                    op: "shm_unlink",
                    source: e,
                });
            }
        }
        debug!(name = %self.name, "named mutex destroyed");
        Ok(())
    }

    /// Remove the named segment without an open handle (best effort).
    pub fn remove_storage(name: &str) {
        if let Ok(c_name) = CString::new(name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformMutex {
    fn drop(&mut self) {
        // Best-effort detach for handles that were never explicitly closed.
        // Never destroys the mutex or unlinks the segment.
        if !self.mtx.is_null() {
            unsafe { libc::munmap(self.mtx as *mut libc::c_void, SEGMENT_SIZE) };
            self.mtx = ptr::null_mut();
        }
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
            self.fd = -1;
        }
    }
}

/// Construct a process-shared, robust mutex in place at `mtx_ptr`.
///
/// # Safety
/// `mtx_ptr` must point to writable memory of at least
/// `size_of::<pthread_mutex_t>()` bytes that no other process is using yet.
unsafe fn init_mutex_in_place(mtx_ptr: *mut libc::pthread_mutex_t) -> Result<()> {
    ptr::write_bytes(mtx_ptr, 0, 1);

    let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
    let mut eno = libc::pthread_mutexattr_init(&mut attr);
    if eno != 0 {
        return Err(Error::AttributeSetup(os_err(eno)));
    }

    eno = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
    if eno != 0 {
        libc::pthread_mutexattr_destroy(&mut attr);
        return Err(Error::AttributeSetup(os_err(eno)));
    }

    #[cfg(not(target_os = "macos"))]
    {
        eno = pthread_mutexattr_setrobust(&mut attr, PTHREAD_MUTEX_ROBUST);
        if eno != 0 {
            libc::pthread_mutexattr_destroy(&mut attr);
            return Err(Error::AttributeSetup(os_err(eno)));
        }
    }

    eno = libc::pthread_mutex_init(mtx_ptr, &attr);
    libc::pthread_mutexattr_destroy(&mut attr);
    if eno != 0 {
        return Err(Error::PrimitiveInit(os_err(eno)));
    }
    Ok(())
}
