/*!
 * Thread Status
 * Execution state shared between the dispatch engine and interrupt context
 */

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Execution status of a thread object
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    /// Executing on its CPU; exactly one per CPU
    Running = 1,
    /// Eligible and queued
    Runnable = 2,
    /// Not eligible, not queued
    Blocked = 3,
}

impl ThreadStatus {
    #[inline(always)]
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Runnable,
            _ => Self::Blocked,
        }
    }
}

/// Atomic cell holding a `ThreadStatus`
///
/// Written only under the owning CPU's scheduler lock, read from anywhere.
#[derive(Debug)]
pub(crate) struct AtomicStatus(AtomicU8);

impl AtomicStatus {
    pub(crate) const fn new(status: ThreadStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    #[inline(always)]
    pub(crate) fn load(&self) -> ThreadStatus {
        ThreadStatus::from_raw(self.0.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub(crate) fn store(&self, status: ThreadStatus) {
        self.0.store(status as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        let status = AtomicStatus::new(ThreadStatus::Blocked);
        assert_eq!(status.load(), ThreadStatus::Blocked);

        for next in [ThreadStatus::Runnable, ThreadStatus::Running, ThreadStatus::Blocked] {
            status.store(next);
            assert_eq!(status.load(), next);
        }
    }
}
