/*!
 * Scheduler Module
 *
 * Per-CPU thread scheduling for the hypervisor:
 * - One `SchedControl` per physical CPU, owned by the `Scheduler`
 * - A policy bound to each CPU at `init_sched`
 * - The dispatch engine (`schedule`, `sleep_thread`, `wake_thread`, ...)
 *   driving status transitions and the hand-off to the switch boundary
 * - The idle loop run by each CPU's idle thread
 */

mod arena;
mod atomic_stats;
mod control;
mod dispatch;
mod idle;
mod lifecycle;
pub mod policy;
mod stats;
pub mod traits;
pub mod types;

pub use arena::ThreadArena;
pub use atomic_stats::AtomicSchedStats;
pub use control::{SchedControl, SchedFlags, SchedLockGuard, SchedState};
pub use policy::{BvtData, PrioData, SchedData};
pub use stats::SchedStats;
pub use traits::{PolicyCtx, SchedPolicy};
pub use types::{PeriodMs, SchedParams, SchedulerKind, ThreadPriority, PRIO_MAX};

use crate::core::config::SchedConfig;
use crate::core::errors::SchedResult;
use crate::core::types::{PcpuId, ThreadId};
use crate::platform::Platform;
use crate::thread::ThreadObject;
use std::sync::Arc;
use tracing::info;

/// Scheduling core of every physical CPU in the system
///
/// # Performance
/// - Per-CPU controls in one contiguous slice, indexed by CPU id
/// - Lock-free atomic stats and request flags for hot paths
pub struct Scheduler {
    config: SchedConfig,
    platform: Arc<dyn Platform>,
    controls: Box<[SchedControl]>,
}

impl Scheduler {
    /// Create the controls for `config.nr_pcpus` CPUs
    ///
    /// No CPU is usable until `init_sched` runs for it.
    pub fn new(config: SchedConfig, platform: Arc<dyn Platform>) -> SchedResult<Self> {
        let config = config.validate()?;
        let controls = (0..config.nr_pcpus)
            .map(|pcpu| SchedControl::new(pcpu as PcpuId))
            .collect();

        info!(
            policy = config.policy.as_str(),
            idle_mode = config.idle_mode.as_str(),
            nr_pcpus = config.nr_pcpus,
            "scheduler created"
        );

        Ok(Self {
            config,
            platform,
            controls,
        })
    }

    #[inline]
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    #[inline]
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    #[inline]
    pub fn nr_pcpus(&self) -> usize {
        self.controls.len()
    }

    /// Control block of `pcpu_id`
    ///
    /// # Panics
    /// If the CPU is not managed by this scheduler.
    #[inline]
    pub fn control(&self, pcpu_id: PcpuId) -> &SchedControl {
        match self.controls.get(usize::from(pcpu_id)) {
            Some(control) => control,
            None => panic!(
                "pcpu{} out of range ({} managed)",
                pcpu_id,
                self.controls.len()
            ),
        }
    }

    #[inline]
    pub(crate) fn lock_control<'a>(&'a self, control: &'a SchedControl) -> SchedLockGuard<'a> {
        control.lock(&*self.platform)
    }

    /// Take `pcpu_id`'s scheduler lock with local interrupts masked
    ///
    /// The guard releases the lock and restores the interrupt state on drop.
    pub fn obtain_schedule_lock(&self, pcpu_id: PcpuId) -> SchedLockGuard<'_> {
        self.lock_control(self.control(pcpu_id))
    }

    /// Thread running on `pcpu_id`
    pub fn sched_get_current(&self, pcpu_id: PcpuId) -> Option<Arc<ThreadObject>> {
        self.obtain_schedule_lock(pcpu_id).current().cloned()
    }

    /// Idle thread of `pcpu_id`, present once the CPU is initialised
    pub fn idle_thread(&self, pcpu_id: PcpuId) -> Option<Arc<ThreadObject>> {
        self.obtain_schedule_lock(pcpu_id).idle().cloned()
    }

    /// Policy bound to `pcpu_id`
    pub fn policy_kind(&self, pcpu_id: PcpuId) -> Option<SchedulerKind> {
        self.obtain_schedule_lock(pcpu_id).policy_kind()
    }

    /// Runqueue of `pcpu_id` in pick order
    pub fn runqueue(&self, pcpu_id: PcpuId) -> Vec<ThreadId> {
        self.obtain_schedule_lock(pcpu_id).queued()
    }
}

/// Whether `obj` is a CPU's idle thread
#[inline]
pub fn is_idle_thread(obj: &ThreadObject) -> bool {
    obj.is_idle()
}

/// CPU `obj` is bound to
#[inline]
pub fn sched_get_pcpuid(obj: &ThreadObject) -> PcpuId {
    obj.pcpu_id()
}
