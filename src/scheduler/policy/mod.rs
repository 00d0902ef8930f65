/*!
 * Scheduling Policies
 *
 * Four interchangeable algorithms behind `SchedPolicy`:
 * - Noop: one fixed thread per CPU
 * - IORR: FIFO round robin preempted by a periodic tick
 * - BVT: borrowed virtual time with warp
 * - PRIO: strict priority levels, no time slicing
 *
 * The policy is chosen when a CPU is initialised and stays bound until
 * the CPU is torn down.
 */

mod bvt;
mod iorr;
mod noop;
mod prio;

pub use bvt::{BvtData, BvtSched, BVT_VT_SCALE};
pub use iorr::IorrSched;
pub use noop::NoopSched;
pub use prio::{PrioData, PrioSched};

use super::traits::SchedPolicy;
use super::types::SchedulerKind;
use crate::core::config::SchedConfig;
use crate::core::types::THREAD_DATA_SIZE;

/// Policy-private block carried by every thread object
///
/// The variant always matches the policy of the thread's CPU.
#[derive(Debug, Clone, Default)]
pub enum SchedData {
    /// Not registered with any CPU (or the idle thread)
    #[default]
    Unset,
    Noop,
    Iorr,
    Bvt(BvtData),
    Prio(PrioData),
}

// The typed block replaces the payload owner's fixed-size reservation
const _: () = assert!(std::mem::size_of::<SchedData>() <= THREAD_DATA_SIZE);

impl SchedData {
    pub(crate) fn bvt(&self) -> &BvtData {
        match self {
            SchedData::Bvt(data) => data,
            other => panic!("expected BVT thread data, found {:?}", other),
        }
    }

    pub(crate) fn bvt_mut(&mut self) -> &mut BvtData {
        match self {
            SchedData::Bvt(data) => data,
            other => panic!("expected BVT thread data, found {:?}", other),
        }
    }

    pub(crate) fn prio(&self) -> &PrioData {
        match self {
            SchedData::Prio(data) => data,
            other => panic!("expected PRIO thread data, found {:?}", other),
        }
    }

    pub(crate) fn prio_mut(&mut self) -> &mut PrioData {
        match self {
            SchedData::Prio(data) => data,
            other => panic!("expected PRIO thread data, found {:?}", other),
        }
    }
}

/// Policy bound to a CPU, dispatched by tag
pub enum Policy {
    Noop(NoopSched),
    Iorr(IorrSched),
    Bvt(BvtSched),
    Prio(PrioSched),
}

impl Policy {
    /// Build the policy state for one CPU
    pub fn new(kind: SchedulerKind, config: &SchedConfig, ticks_per_ms: u64) -> Self {
        match kind {
            SchedulerKind::Noop => Policy::Noop(NoopSched::new()),
            SchedulerKind::Iorr => {
                Policy::Iorr(IorrSched::new(config.iorr_tick_ms.to_ticks(ticks_per_ms)))
            }
            SchedulerKind::Bvt => Policy::Bvt(BvtSched::new(
                config.bvt_mcu_ms.to_ticks(ticks_per_ms),
                u64::from(config.bvt_csa_mcu),
            )),
            SchedulerKind::Prio => Policy::Prio(PrioSched::new()),
        }
    }

    #[inline]
    pub fn as_dyn(&self) -> &dyn SchedPolicy {
        match self {
            Policy::Noop(p) => p,
            Policy::Iorr(p) => p,
            Policy::Bvt(p) => p,
            Policy::Prio(p) => p,
        }
    }

    #[inline]
    pub fn as_dyn_mut(&mut self) -> &mut dyn SchedPolicy {
        match self {
            Policy::Noop(p) => p,
            Policy::Iorr(p) => p,
            Policy::Bvt(p) => p,
            Policy::Prio(p) => p,
        }
    }

    pub fn kind(&self) -> SchedulerKind {
        self.as_dyn().kind()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers to drive a policy without the dispatch engine

    use super::super::arena::ThreadArena;
    use super::super::traits::PolicyCtx;
    use crate::platform::SimPlatform;
    use crate::thread::{ThreadObject, ThreadStatus};
    use std::sync::Arc;

    pub(crate) struct Bench {
        pub platform: SimPlatform,
        pub threads: ThreadArena,
        pub current: Option<Arc<ThreadObject>>,
        pub idle: Arc<ThreadObject>,
    }

    impl Bench {
        pub fn new() -> Self {
            SimPlatform::bind_cpu(0);
            let idle = ThreadObject::builder("idle0", 0).idle().build();
            idle.status.store(ThreadStatus::Running);
            let mut threads = ThreadArena::new();
            threads.insert(Arc::clone(&idle));
            Self {
                platform: SimPlatform::new(1),
                threads,
                current: Some(Arc::clone(&idle)),
                idle,
            }
        }

        pub fn thread(&mut self, name: &str) -> Arc<ThreadObject> {
            let obj = ThreadObject::builder(name, 0).build();
            self.threads.insert(Arc::clone(&obj));
            obj
        }

        pub fn ctx(&self) -> PolicyCtx<'_> {
            PolicyCtx {
                pcpu_id: 0,
                now: crate::platform::Clock::now(&self.platform),
                current: self.current.as_ref(),
                threads: &self.threads,
                platform: &self.platform,
            }
        }

        /// Make `obj` current the way the engine would after a pick
        pub fn dispatch(&mut self, obj: &Arc<ThreadObject>) {
            if let Some(prev) = self.current.take() {
                if !Arc::ptr_eq(&prev, obj) {
                    let status = if prev.is_blocking() {
                        ThreadStatus::Blocked
                    } else {
                        ThreadStatus::Runnable
                    };
                    prev.status.store(status);
                    prev.be_blocking.store(false, std::sync::atomic::Ordering::SeqCst);
                }
            }
            obj.status.store(ThreadStatus::Running);
            self.current = Some(Arc::clone(obj));
        }

        pub fn resolve(&self, picked: Option<crate::core::types::ThreadId>) -> Arc<ThreadObject> {
            match picked {
                Some(id) => Arc::clone(self.threads.get(id)),
                None => Arc::clone(&self.idle),
            }
        }
    }
}
