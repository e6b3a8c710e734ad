// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

// Re-export the platform-specific implementation under a uniform name.

#[cfg(unix)]
pub use posix::PlatformMutex;

#[cfg(windows)]
pub use windows::PlatformMutex;
