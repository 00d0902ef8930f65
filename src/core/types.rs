/*!
 * Core Types
 * Common types used across the scheduling core
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Physical CPU identifier
pub type PcpuId = u16;

/// Timestamp in platform clock ticks
pub type Ticks = u64;

/// Size of the per-thread policy block a payload owner reserves
pub const THREAD_DATA_SIZE: usize = 256;

/// Maximum length of a thread name (diagnostics only)
pub const THREAD_NAME_LEN: usize = 16;

/// Upper bound on physical CPUs a single scheduler instance manages
pub const MAX_PCPUS: usize = 64;

/// Stable thread identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

impl ThreadId {
    /// Allocate the next identifier (never recycled)
    pub(crate) fn allocate() -> Self {
        Self(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a remote CPU is kicked when it must re-evaluate scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Fixed-vector inter-processor interrupt
    #[default]
    Ipi,
    /// INIT signal, used for threads that run with external interrupts unhandled
    Init,
}

/// How an idle CPU waits for the next interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleMode {
    /// Spin with a pause hint, lowest wake latency
    Pause,
    /// Halt until an interrupt arrives
    #[default]
    Halt,
}

impl IdleMode {
    /// Parse from string representation
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pause" | "spin" => Ok(Self::Pause),
            "hlt" | "halt" => Ok(Self::Halt),
            _ => Err(format!("Invalid idle mode '{}'. Valid: pause, hlt", s)),
        }
    }

    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Halt => "hlt",
        }
    }
}

impl Serialize for IdleMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IdleMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_ids_are_unique() {
        let a = ThreadId::allocate();
        let b = ThreadId::allocate();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_idle_mode_parsing() {
        assert_eq!(IdleMode::from_str("hlt").unwrap(), IdleMode::Halt);
        assert_eq!(IdleMode::from_str("PAUSE").unwrap(), IdleMode::Pause);
        assert!(IdleMode::from_str("mwait").is_err());
    }
}
