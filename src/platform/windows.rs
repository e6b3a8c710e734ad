// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Windows implementation: a named kernel mutex via CreateMutexW. The kernel
// object plays the role of the shared segment; abandonment (WAIT_ABANDONED)
// is the owner-died condition and the kernel makes the mutex consistent
// again by itself.

use std::io;
use std::ptr;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Encode a name as a null-terminated wide string for Win32 APIs.
fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

pub struct PlatformMutex {
    name: String,
    handle: windows_sys::Win32::Foundation::HANDLE,
    created: bool,
    init_error: Option<Error>,
}

unsafe impl Send for PlatformMutex {}
unsafe impl Sync for PlatformMutex {}

impl PlatformMutex {
    /// Open (or create) the named kernel mutex. Mirrors the POSIX contract:
    /// failures are recorded in the handle, never returned.
    pub fn init(name: &str) -> Self {
        use windows_sys::Win32::Foundation::{GetLastError, ERROR_ALREADY_EXISTS};
        use windows_sys::Win32::System::Threading::CreateMutexW;

        let mut handle = Self {
            name: name.to_string(),
            handle: ptr::null_mut(),
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

        let wide_name = to_wide(name);
        let h = unsafe { CreateMutexW(ptr::null(), 0, wide_name.as_ptr()) };
        if h.is_null() {
            let e = io::Error::last_os_error();
            warn!(name, error = %e, "CreateMutexW failed");
            handle.init_error = Some(Error::ResourceUnavailable(e));
            return handle;
        }
        handle.created = unsafe { GetLastError() } != ERROR_ALREADY_EXISTS;
        handle.handle = h;
        debug!(name, created = handle.created, "named mutex initialized");
        handle
    }

    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.handle.is_null()
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

    /// Block until the mutex is acquired. WAIT_ABANDONED means the previous
    /// owner died; the kernel has already made the mutex consistent, so the
    /// acquisition is reported as success.
    pub fn lock(&self) -> Result<()> {
        use windows_sys::Win32::Foundation::{WAIT_ABANDONED, WAIT_OBJECT_0};
        use windows_sys::Win32::System::Threading::{WaitForSingleObject, INFINITE};

        let ret = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        match ret {
            WAIT_OBJECT_0 => Ok(()),
            WAIT_ABANDONED => {
                debug!(name = %self.name, "recovered mutex after owner death");
                Ok(())
            }
            _ => Err(Error::LockFailed(io::Error::last_os_error())),
        }
    }

    /// Release the mutex. ERROR_NOT_OWNER maps to `NotHeld`.
    pub fn unlock(&self) -> Result<()> {
        use windows_sys::Win32::Foundation::{GetLastError, ERROR_NOT_OWNER};
        use windows_sys::Win32::System::Threading::ReleaseMutex;

        if unsafe { ReleaseMutex(self.handle) } == 0 {
            let e = io::Error::last_os_error();
            if unsafe { GetLastError() } == ERROR_NOT_OWNER {
                return Err(Error::NotHeld(e));
            }
            return Err(Error::UnlockFailed(e));
        }
        Ok(())
    }

    /// Close this process's handle. The kernel object lives on while other
    /// handles are open.
    pub fn close(&mut self) -> Result<()> {
        use windows_sys::Win32::Foundation::CloseHandle;

        if !self.handle.is_null() {
            if unsafe { CloseHandle(self.handle) } == 0 {
                let e = io::Error::last_os_error();
                warn!(name = %self.name, error = %e, "CloseHandle failed");
                return Err(Error::Teardown {
                    op: "CloseHandle",
                    source: e,
                });
            }
            self.handle = ptr::null_mut();
        }
        debug!(name = %self.name, "named mutex closed");
        Ok(())
    }

    /// Windows named mutexes are destroyed by the kernel when the last
    /// handle closes; there is nothing to unlink, so destroy degrades to
    /// closing this handle.
    pub fn destroy(&mut self) -> Result<()> {
        self.close()
    }

    /// No persistent storage to remove on Windows.
    pub fn remove_storage(_name: &str) {}
}

impl Drop for PlatformMutex {
    fn drop(&mut self) {
        use windows_sys::Win32::Foundation::CloseHandle;
        if !self.handle.is_null() {
            unsafe { CloseHandle(self.handle) };
            self.handle = ptr::null_mut();
        }
    }
}
