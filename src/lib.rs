// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named mutual-exclusion primitive shareable by unrelated processes.
// On POSIX: a robust, process-shared pthread mutex inside a named shared
// memory segment. On Windows: a named kernel mutex.

mod platform;

mod error;
pub use error::{Error, Result};

mod mutex;
pub use mutex::NamedMutex;

mod scoped;
pub use scoped::ScopedMutex;
