// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-platform named inter-process mutex handle.
// Delegates to platform::PlatformMutex (POSIX or Windows).

use crate::error::{Error, Result};
use crate::platform::PlatformMutex;

/// A named, inter-process mutual exclusion handle.
///
/// On POSIX the lock is a `pthread_mutex_t` stored in a named shared memory
/// segment, initialized with `PTHREAD_PROCESS_SHARED` and (where available)
/// `PTHREAD_MUTEX_ROBUST` attributes. On Windows it is a named kernel mutex.
/// Any process on the same host that uses the same name attaches to the same
/// lock; the segment outlives its creator until [`destroy`](Self::destroy).
///
/// `init` is deliberately non-transactional: it always returns a handle, and
/// a failed step leaves the handle invalid with the platform error recorded.
/// Callers check [`is_valid`](Self::is_valid) before locking.
pub struct NamedMutex {
    inner: PlatformMutex,
}

impl NamedMutex {
    /// Attach to the named mutex, creating segment and lock if no process
    /// has created them yet.
    ///
    /// `name` must follow the platform's shared-object naming rules (on
    /// POSIX: start with `/`, contain no further `/`, stay within the
    /// platform name limit). No normalization is performed.
    ///
    /// The first `init` for an unused name must happen before concurrent or
    /// multi-process use of that name begins: the create-or-attach decision
    /// is not itself protected by any lock, so two simultaneous first calls
    /// can corrupt the lock for both. The same applies to reusing a name
    /// whose creator crashed mid-initialization; [`remove_storage`]
    /// (Self::remove_storage) is the manual escape hatch.
    ///
    /// On macOS, keep at most one handle per name per process: the pthread
    /// implementation there stores address-relative internals, so locking
    /// through a second mapping of the same segment fails with `EINVAL`.
    pub fn init(name: &str) -> Self {
        Self {
            inner: PlatformMutex::init(name),
        }
    }

    /// Whether the handle has a non-empty name, an open segment and a mapped
    /// lock. False after a failed `init`, after `close` and after `destroy`.
    pub fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    /// True iff this handle's `init` call created the segment (and thus
    /// performed the one-time lock construction).
    pub fn was_creator(&self) -> bool {
        self.inner.was_creator()
    }

    /// The name this handle was initialized with.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The error that invalidated `init`, if initialization failed.
    pub fn init_error(&self) -> Option<&Error> {
        self.inner.init_error()
    }

    /// Block until the lock is acquired.
    ///
    /// If the previous holder terminated while holding the lock, acquisition
    /// still succeeds and the lock is recovered for normal future use;
    /// [`Error::RecoveryFailed`] reports the case where that recovery step
    /// itself fails.
    pub fn lock(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::InvalidHandle);
        }
        self.inner.lock()
    }

    /// Release the lock. Unlocking without holding it yields
    /// [`Error::NotHeld`].
    pub fn unlock(&self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::InvalidHandle);
        }
        self.inner.unlock()
    }

    /// Detach from the lock: unmap it and close this process's reference to
    /// the segment. Other handles and future `init` calls for the same name
    /// are unaffected. Does not release a lock currently held through this
    /// handle. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    /// Destroy the lock and remove the named segment from the system.
    /// Irreversible: other attached handles become unusable, and the next
    /// `init` for this name creates a brand-new lock. Does not release a
    /// currently-held lock first.
    pub fn destroy(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Err(Error::InvalidHandle);
        }
        self.inner.destroy()
    }

    /// Remove the backing storage for a named mutex without an open handle
    /// (static helper, best effort). No-op on Windows.
    pub fn remove_storage(name: &str) {
        PlatformMutex::remove_storage(name);
    }
}
