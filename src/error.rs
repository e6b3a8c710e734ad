// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for named mutex operations. Every variant that stems from
// a syscall carries the raw OS error so callers can still inspect errno.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by [`NamedMutex`](crate::NamedMutex) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening/creating the shared segment, resizing it, or mapping it failed.
    #[error("shared memory segment unavailable: {0}")]
    ResourceUnavailable(#[source] io::Error),

    /// Setting up the process-shared / robust mutex attributes failed.
    #[error("mutex attribute setup failed: {0}")]
    AttributeSetup(#[source] io::Error),

    /// In-place construction of the mutex failed even though the segment is valid.
    #[error("mutex initialization in shared memory failed: {0}")]
    PrimitiveInit(#[source] io::Error),

    /// Acquisition failed for a reason other than a dead previous owner.
    #[error("lock failed: {0}")]
    LockFailed(#[source] io::Error),

    /// The previous owner died while holding the lock and marking the mutex
    /// consistent again failed. The lock is held by the caller regardless.
    #[error("recovery after owner death failed: {0}")]
    RecoveryFailed(#[source] io::Error),

    /// Unlock was attempted by a handle that does not hold the lock.
    #[error("mutex is not held by this handle: {0}")]
    NotHeld(#[source] io::Error),

    /// Unlock failed for a reason other than not holding the lock.
    #[error("unlock failed: {0}")]
    UnlockFailed(#[source] io::Error),

    /// Unmapping, closing, or unlinking the segment failed.
    #[error("teardown failed during {op}: {source}")]
    Teardown {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The operation was attempted on a handle whose initialization failed
    /// or that was already closed or destroyed.
    #[error("operation on an invalid mutex handle")]
    InvalidHandle,
}

impl Error {
    /// The raw OS error number behind this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::ResourceUnavailable(e)
            | Error::AttributeSetup(e)
            | Error::PrimitiveInit(e)
            | Error::LockFailed(e)
            | Error::RecoveryFailed(e)
            | Error::NotHeld(e)
            | Error::UnlockFailed(e) => e.raw_os_error(),
            Error::Teardown { source, .. } => source.raw_os_error(),
            Error::InvalidHandle => None,
        }
    }
}
