// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Convenience wrapper over NamedMutex: same operations, plus automatic
// close when the wrapper goes out of scope.

use crate::error::{Error, Result};
use crate::mutex::NamedMutex;

/// Scoped wrapper around [`NamedMutex`].
///
/// Forwards every operation 1:1 and closes the handle on drop. Dropping
/// never destroys the lock or the segment; a held lock stays held.
pub struct ScopedMutex {
    inner: NamedMutex,
}

impl ScopedMutex {
    /// Attach to (or create) the named mutex. Check
    /// [`is_valid`](Self::is_valid) afterwards, as with [`NamedMutex::init`].
    pub fn new(name: &str) -> Self {
        Self {
            inner: NamedMutex::init(name),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.inner.is_valid()
    }

    pub fn was_creator(&self) -> bool {
        self.inner.was_creator()
    }

    pub fn init_error(&self) -> Option<&Error> {
        self.inner.init_error()
    }

    pub fn lock(&self) -> Result<()> {
        self.inner.lock()
    }

    pub fn unlock(&self) -> Result<()> {
        self.inner.unlock()
    }

    /// Detach early, before scope exit. The drop close afterwards is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    /// Destroy the lock and remove the segment for everyone.
    pub fn destroy(&mut self) -> Result<()> {
        self.inner.destroy()
    }
}

impl Drop for ScopedMutex {
    fn drop(&mut self) {
        let _ = self.inner.close();
    }
}
