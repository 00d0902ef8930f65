/*!
 * Hypervisor Scheduler Library
 * Per-CPU thread scheduling core exposed as a library
 */

pub mod core;
pub mod monitoring;
pub mod platform;
pub mod scheduler;
pub mod thread;

// Re-exports
pub use crate::core::{
    IdleMode, NotifyMode, PcpuId, SchedConfig, SchedError, SchedResult, ThreadId, Ticks,
};
pub use monitoring::{init_tracing, span_pcpu};
pub use platform::{Platform, SimPlatform};
pub use scheduler::{
    is_idle_thread, sched_get_pcpuid, SchedParams, SchedStats, Scheduler, SchedulerKind,
    ThreadPriority,
};
pub use thread::{ThreadBuilder, ThreadObject, ThreadStatus};
